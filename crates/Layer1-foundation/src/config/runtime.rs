//! Runtime Config - 플러그인 런타임 설정
//!
//! 글로벌 설정(`<config_dir>/quill/runtime.json`) 위에 프로젝트 설정
//! (`.quill/runtime.json`)을 덮어씁니다. 파일에 없는 값은 기본값을 유지합니다.

use crate::storage::JsonStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// 설정 파일명
pub const RUNTIME_CONFIG_FILE: &str = "runtime.json";

// ============================================================================
// Theme
// ============================================================================

/// 테마 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeMode {
    #[default]
    Light,
    Dark,
}

/// 샌드박스에 전달되는 테마 설명
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeConfig {
    #[serde(default)]
    pub mode: ThemeMode,

    /// 강조 색상
    #[serde(default = "default_accent")]
    pub accent_color: String,

    #[serde(default = "default_font_family")]
    pub font_family: String,

    /// 추가 디자인 토큰 (CSS 변수 이름 -> 값)
    #[serde(default)]
    pub tokens: BTreeMap<String, String>,
}

fn default_accent() -> String {
    "#3b82f6".to_string()
}

fn default_font_family() -> String {
    "system-ui, sans-serif".to_string()
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            mode: ThemeMode::default(),
            accent_color: default_accent(),
            font_family: default_font_family(),
            tokens: BTreeMap::new(),
        }
    }
}

// ============================================================================
// Shared modules
// ============================================================================

/// 샌드박스에 노출되는 호스트 공유 모듈 (UI 런타임, 컴포넌트 라이브러리)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedModule {
    /// 모듈 이름
    pub name: String,

    /// 샌드박스 전역 이름
    pub global: String,

    /// 호스트 위치 기준 상대 URL
    pub url: String,
}

impl SharedModule {
    pub fn new(name: impl Into<String>, global: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            global: global.into(),
            url: url.into(),
        }
    }
}

fn default_shared_modules() -> Vec<SharedModule> {
    vec![
        SharedModule::new("ui-runtime", "QuillRuntime", "vendor/ui-runtime.js"),
        SharedModule::new("components", "QuillComponents", "vendor/components.js"),
    ]
}

// ============================================================================
// RuntimeConfig
// ============================================================================

/// 플러그인 런타임 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// 호스트 문서 위치 (샌드박스 base URL 계산에 사용)
    pub host_location: String,

    /// 플러그인 리소스 경로 접두사
    pub plugin_base_path: String,

    /// 주입 재시도 스케줄 (ms)
    pub injection_retry_ms: Vec<u64>,

    /// 공유 모듈
    pub shared_modules: Vec<SharedModule>,

    /// 테마
    pub theme: ThemeConfig,

    /// 호스트 이벤트 채널 용량
    pub event_channel_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            host_location: "app://quill/index.html".to_string(),
            plugin_base_path: "plugins".to_string(),
            injection_retry_ms: vec![0, 50, 200],
            shared_modules: default_shared_modules(),
            theme: ThemeConfig::default(),
            event_channel_capacity: 256,
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// 글로벌 + 프로젝트 병합 로드
    pub fn load() -> Result<Self> {
        let mut config = Self::new();

        // 1. 글로벌 설정
        if let Ok(global) = JsonStore::global() {
            config.apply_store(&global)?;
        }

        // 2. 프로젝트 설정
        if let Ok(project) = JsonStore::current_project() {
            config.apply_store(&project)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// 특정 저장소의 설정을 덮어쓰기
    pub fn apply_store(&mut self, store: &JsonStore) -> Result<()> {
        let overrides = store.load_optional::<RuntimeConfigOverrides>(RUNTIME_CONFIG_FILE)?;
        if let Some(overrides) = overrides {
            debug!("Applying runtime config from {}", store.base_dir().display());
            self.merge(overrides);
        }
        Ok(())
    }

    /// 저장
    pub fn save(&self, store: &JsonStore) -> Result<()> {
        store.save(RUNTIME_CONFIG_FILE, self)
    }

    /// 값이 있는 항목만 덮어쓰기
    pub fn merge(&mut self, other: RuntimeConfigOverrides) {
        if let Some(v) = other.host_location {
            self.host_location = v;
        }
        if let Some(v) = other.plugin_base_path {
            self.plugin_base_path = v;
        }
        if let Some(v) = other.injection_retry_ms {
            self.injection_retry_ms = v;
        }
        if let Some(v) = other.shared_modules {
            self.shared_modules = v;
        }
        if let Some(v) = other.theme {
            self.theme = v;
        }
        if let Some(v) = other.event_channel_capacity {
            self.event_channel_capacity = v;
        }
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        self.host_url()?;
        if self.event_channel_capacity == 0 {
            return Err(Error::Config(
                "eventChannelCapacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    // ========================================================================
    // 접근자
    // ========================================================================

    /// 호스트 위치 URL
    pub fn host_url(&self) -> Result<Url> {
        Url::parse(&self.host_location).map_err(|e| {
            Error::Config(format!("Invalid hostLocation '{}': {}", self.host_location, e))
        })
    }

    /// 주입 재시도 스케줄
    pub fn retry_schedule(&self) -> Vec<Duration> {
        self.injection_retry_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }
}

/// 설정 파일 구조 (모든 항목 선택)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfigOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_location: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_base_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub injection_retry_ms: Option<Vec<u64>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_modules: Option<Vec<SharedModule>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<ThemeConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_channel_capacity: Option<usize>,
}
