//! Capability surface - 샌드박스에 주입되는 고정된 전역 목록
//!
//! | 전역 | 내용 |
//! |------|------|
//! | `quill` | 이 플러그인에 묶인 명령 실행 브릿지 |
//! | `__quillTheme` | 현재 테마 설명 |
//! | `__quillStyleRoot` | 샌드박스 head를 가리키는 스타일 주입 컨텍스트 |
//! | 공유 모듈 | 호스트 UI 런타임, 컴포넌트 라이브러리 참조 |

use crate::document::StyleHead;
use crate::plugin::{CommandResult, PluginHost};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use quill_foundation::{Result, SharedModule, ThemeConfig};

pub const BRIDGE_GLOBAL: &str = "quill";
pub const THEME_GLOBAL: &str = "__quillTheme";
pub const STYLE_ROOT_GLOBAL: &str = "__quillStyleRoot";

/// 플러그인 범위 명령 브릿지
///
/// 명령 실행 진입점 하나만 노출하며 plugin ID는 생성 시 고정됩니다.
#[derive(Clone)]
pub struct CommandBridge {
    plugin_id: String,
    host: Arc<dyn PluginHost>,
}

impl CommandBridge {
    pub fn new(plugin_id: impl Into<String>, host: Arc<dyn PluginHost>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            host,
        }
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub async fn execute(&self, command_id: &str, payload: Value) -> Result<CommandResult> {
        debug!("Sandbox of {} executing {}", self.plugin_id, command_id);
        self.host
            .execute_command(&self.plugin_id, command_id, payload)
            .await
    }
}

impl std::fmt::Debug for CommandBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBridge")
            .field("plugin_id", &self.plugin_id)
            .finish()
    }
}

/// 해석된 공유 모듈 참조
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedModuleRef {
    pub name: String,
    pub global: String,
    pub url: Url,
}

impl SharedModuleRef {
    /// 호스트 위치 기준으로 모듈 URL 해석
    pub fn resolve(host: &Url, module: &SharedModule) -> Result<Self> {
        Ok(Self {
            name: module.name.clone(),
            global: module.global.clone(),
            url: host.join(&module.url)?,
        })
    }
}

/// 주입 대상 전체
#[derive(Clone)]
pub struct CapabilitySurface {
    pub bridge: CommandBridge,
    pub theme: ThemeConfig,
    pub modules: Vec<SharedModuleRef>,
    /// 동적 스타일이 들어갈 head (샌드박스 자신의 head)
    pub style_root: Arc<StyleHead>,
}

impl CapabilitySurface {
    /// 설치될 전역 이름
    pub fn globals(&self) -> Vec<&str> {
        let mut names = vec![BRIDGE_GLOBAL, THEME_GLOBAL, STYLE_ROOT_GLOBAL];
        names.extend(self.modules.iter().map(|m| m.global.as_str()));
        names
    }

    pub fn plugin_id(&self) -> &str {
        self.bridge.plugin_id()
    }
}

impl std::fmt::Debug for CapabilitySurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilitySurface")
            .field("plugin_id", &self.plugin_id())
            .field("modules", &self.modules)
            .field("style_root", &self.style_root.name())
            .finish()
    }
}
