//! Plugin Descriptor - 플러그인/명령 메타데이터
//!
//! 호스트 브릿지가 돌려주는 플러그인 목록과 `plugin.json` 매니페스트가
//! 모두 이 형식으로 역직렬화됩니다.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use quill_foundation::{Error, Result};

/// 플러그인 ID 최대 길이
pub const MAX_PLUGIN_ID_LEN: usize = 64;

// ============================================================================
// SourceType
// ============================================================================

/// 플러그인 출처
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// 마켓플레이스
    #[default]
    Market,
    /// 로컬 설치
    Local,
    /// 개발 중 (dev 디렉토리)
    Development,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Market => "market",
            SourceType::Local => "local",
            SourceType::Development => "development",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// CommandDescriptor
// ============================================================================

/// 플러그인이 노출하는 명령
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandDescriptor {
    /// 플러그인 내 고유 ID
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    /// 단축키 (예: "Ctrl+Shift+P")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcut: Option<String>,

    /// 노출 위치 태그 (toolbar, palette 등)
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub surfaces: BTreeSet<String>,
}

impl CommandDescriptor {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_surface(mut self, surface: impl Into<String>) -> Self {
        self.surfaces.insert(surface.into());
        self
    }

    pub fn with_shortcut(mut self, shortcut: impl Into<String>) -> Self {
        self.shortcut = Some(shortcut.into());
        self
    }
}

// ============================================================================
// PluginDescriptor
// ============================================================================

/// 플러그인 설명자
///
/// 정적 메타데이터(이름, 설명, 권한, 명령)와 런타임 상태(설치, 활성화,
/// 마지막 에러, 설치 버전)를 함께 담습니다.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PluginDescriptor {
    pub id: String,

    pub name: String,

    pub description: String,

    pub version: String,

    pub author: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,

    /// 요청 권한 (선언 순서 유지)
    pub permissions: Vec<String>,

    pub commands: Vec<CommandDescriptor>,

    pub installed: bool,

    pub enabled: bool,

    pub source_type: SourceType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed_version: Option<String>,

    /// 마켓에 게시된 최신 버전
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<String>,
}

impl PluginDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }

    pub fn with_command(mut self, command: CommandDescriptor) -> Self {
        self.commands.push(command);
        self
    }

    pub fn with_source(mut self, source_type: SourceType) -> Self {
        self.source_type = source_type;
        self
    }

    /// 설치 버전보다 최신 버전이 있는지
    pub fn has_update(&self) -> bool {
        match (&self.installed_version, &self.latest_version) {
            (Some(installed), Some(latest)) => installed != latest,
            _ => false,
        }
    }

    /// 상태 라벨 (목록 표시용)
    pub fn status_label(&self) -> &'static str {
        if self.last_error.is_some() {
            "error"
        } else if !self.installed {
            "available"
        } else if self.enabled {
            "enabled"
        } else {
            "disabled"
        }
    }
}

// ============================================================================
// ID 검증
// ============================================================================

/// 플러그인 ID 검증
///
/// 경로 구성 요소로 사용되므로 구분자와 `..`는 허용하지 않습니다.
pub fn validate_plugin_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::InvalidInput("Plugin ID cannot be empty".into()));
    }
    if id.len() > MAX_PLUGIN_ID_LEN {
        return Err(Error::InvalidInput(format!(
            "Plugin ID too long ({} > {})",
            id.len(),
            MAX_PLUGIN_ID_LEN
        )));
    }
    if id.contains('/') || id.contains('\\') || id.contains("..") {
        return Err(Error::InvalidInput(format!(
            "Plugin ID contains path characters: {}",
            id
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
    {
        return Err(Error::InvalidInput(format!(
            "Plugin ID contains invalid characters: {}",
            id
        )));
    }
    Ok(())
}
