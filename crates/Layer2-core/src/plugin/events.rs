//! Plugin Events - 호스트가 보내는 메시지
//!
//! 호스트는 세 종류의 메시지를 하나의 스트림으로 밀어 넣습니다:
//! 플러그인 생명주기/명령/테마 이벤트, UI 이동 요청, 샌드박스 창 요청.

use super::descriptor::CommandDescriptor;
use serde::{Deserialize, Serialize};

// ============================================================================
// PluginEvent
// ============================================================================

/// 플러그인 이벤트
///
/// 알 수 없는 `type`은 `Unknown`으로 역직렬화되며 전체 재동기화를 유발합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum PluginEvent {
    Installed {
        plugin_id: String,
    },
    Uninstalled {
        plugin_id: String,
    },
    Enabled {
        plugin_id: String,
    },
    Disabled {
        plugin_id: String,
    },
    Ready {
        plugin_id: String,
    },
    Error {
        plugin_id: String,
        #[serde(default)]
        error: String,
    },
    Stopped {
        plugin_id: String,
    },
    CommandRegistered {
        plugin_id: String,
        command: CommandDescriptor,
    },
    CommandUnregistered {
        plugin_id: String,
        command_id: String,
    },
    ThemeRegisterStyle {
        plugin_id: String,
        style_id: String,
        css: String,
        #[serde(default)]
        priority: i32,
    },
    ThemeUnregisterStyle {
        plugin_id: String,
        style_id: String,
    },
    ThemeUpdateStyle {
        plugin_id: String,
        style_id: String,
        css: String,
        #[serde(default)]
        priority: Option<i32>,
    },
    #[serde(other)]
    Unknown,
}

impl PluginEvent {
    /// 대상 플러그인 ID
    pub fn plugin_id(&self) -> Option<&str> {
        match self {
            PluginEvent::Installed { plugin_id }
            | PluginEvent::Uninstalled { plugin_id }
            | PluginEvent::Enabled { plugin_id }
            | PluginEvent::Disabled { plugin_id }
            | PluginEvent::Ready { plugin_id }
            | PluginEvent::Error { plugin_id, .. }
            | PluginEvent::Stopped { plugin_id }
            | PluginEvent::CommandRegistered { plugin_id, .. }
            | PluginEvent::CommandUnregistered { plugin_id, .. }
            | PluginEvent::ThemeRegisterStyle { plugin_id, .. }
            | PluginEvent::ThemeUnregisterStyle { plugin_id, .. }
            | PluginEvent::ThemeUpdateStyle { plugin_id, .. } => Some(plugin_id),
            PluginEvent::Unknown => None,
        }
    }

    /// 이벤트 이름 (로그용)
    pub fn kind(&self) -> &'static str {
        match self {
            PluginEvent::Installed { .. } => "installed",
            PluginEvent::Uninstalled { .. } => "uninstalled",
            PluginEvent::Enabled { .. } => "enabled",
            PluginEvent::Disabled { .. } => "disabled",
            PluginEvent::Ready { .. } => "ready",
            PluginEvent::Error { .. } => "error",
            PluginEvent::Stopped { .. } => "stopped",
            PluginEvent::CommandRegistered { .. } => "command-registered",
            PluginEvent::CommandUnregistered { .. } => "command-unregistered",
            PluginEvent::ThemeRegisterStyle { .. } => "theme-register-style",
            PluginEvent::ThemeUnregisterStyle { .. } => "theme-unregister-style",
            PluginEvent::ThemeUpdateStyle { .. } => "theme-update-style",
            PluginEvent::Unknown => "unknown",
        }
    }

    /// 증분 이벤트만으로 신뢰할 수 없어 전체 재동기화가 필요한 이벤트
    pub fn needs_reconcile(&self) -> bool {
        matches!(
            self,
            PluginEvent::Uninstalled { .. }
                | PluginEvent::Error { .. }
                | PluginEvent::Stopped { .. }
                | PluginEvent::Unknown
        )
    }

    /// 명령 목록 재조회가 필요한 생명주기 이벤트
    pub fn needs_command_refresh(&self) -> bool {
        matches!(
            self,
            PluginEvent::Installed { .. }
                | PluginEvent::Enabled { .. }
                | PluginEvent::Disabled { .. }
                | PluginEvent::Ready { .. }
        )
    }
}

// ============================================================================
// UI / Window 요청
// ============================================================================

/// 셸에 대한 이동 요청
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum UiRequest {
    OpenNote { note_id: String },
    OpenTodo { todo_id: String },
    Navigate { path: String },
    #[serde(other)]
    Unknown,
}

/// 샌드박스 창 열기 요청
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowRequest {
    pub plugin_id: String,

    /// 플러그인 디렉토리 기준 상대 경로
    pub url: String,

    #[serde(default)]
    pub title: String,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default = "default_true")]
    pub resizable: bool,

    #[serde(default = "default_true")]
    pub closable: bool,
}

fn default_width() -> u32 {
    800
}

fn default_height() -> u32 {
    600
}

fn default_true() -> bool {
    true
}

impl WindowRequest {
    pub fn new(plugin_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            url: url.into(),
            title: String::new(),
            width: default_width(),
            height: default_height(),
            resizable: true,
            closable: true,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// 제목이 없으면 플러그인 ID
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            &self.plugin_id
        } else {
            &self.title
        }
    }
}

/// 호스트 메시지 스트림 항목
#[derive(Debug, Clone, PartialEq)]
pub enum HostMessage {
    Plugin(PluginEvent),
    Ui(UiRequest),
    Window(WindowRequest),
}

impl From<PluginEvent> for HostMessage {
    fn from(event: PluginEvent) -> Self {
        HostMessage::Plugin(event)
    }
}
