//! Host bridge - 런타임이 소비하는 호스트 계약
//!
//! 런타임은 호스트를 이 트레이트로만 봅니다. 전송 실패(브릿지 도달 불가)는
//! `Err(Error::Transport)`, 호스트가 응답했지만 실패한 작업은
//! `success: false` 결과로 구분됩니다.

mod directory;

pub use directory::{CommandHandler, DirectoryHost};

use super::commands::CommandEntry;
use super::descriptor::PluginDescriptor;
use super::events::HostMessage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use tokio::sync::broadcast;

use quill_foundation::Result;

// ============================================================================
// 결과 타입
// ============================================================================

/// 생명주기 작업 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// 명령 실행 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CommandResult {
    pub fn ok(data: Option<Value>) -> Self {
        Self {
            success: true,
            error: None,
            data,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            data: None,
        }
    }
}

/// 플러그인 파일 로드 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLoadResult {
    pub success: bool,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileLoadResult {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: content.into(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: String::new(),
            error: Some(error.into()),
        }
    }
}

// ============================================================================
// PluginHost
// ============================================================================

/// 호스트 브릿지
#[async_trait]
pub trait PluginHost: Send + Sync {
    /// 마켓에 게시된 플러그인
    async fn list_available(&self) -> Result<Vec<PluginDescriptor>>;

    /// 설치된 플러그인 (런타임 상태 포함)
    async fn list_installed(&self) -> Result<Vec<PluginDescriptor>>;

    /// 로컬 개발 플러그인
    async fn list_local(&self) -> Result<Vec<PluginDescriptor>>;

    async fn get_details(&self, plugin_id: &str) -> Result<Option<PluginDescriptor>>;

    /// 현재 호출 가능한 전체 명령 스냅샷
    async fn list_commands(&self) -> Result<Vec<CommandEntry>>;

    async fn install(&self, plugin_id: &str) -> Result<ActionResult>;

    async fn uninstall(&self, plugin_id: &str) -> Result<ActionResult>;

    async fn enable(&self, plugin_id: &str) -> Result<ActionResult>;

    async fn disable(&self, plugin_id: &str) -> Result<ActionResult>;

    async fn execute_command(
        &self,
        plugin_id: &str,
        command_id: &str,
        payload: Value,
    ) -> Result<CommandResult>;

    /// 호스트 메시지 구독
    ///
    /// 수신자를 drop하면 구독이 해제됩니다.
    fn subscribe(&self) -> broadcast::Receiver<HostMessage>;

    /// 플러그인 범위로 제한된 파일 로드
    async fn load_plugin_file(&self, plugin_id: &str, relative_url: &str) -> Result<FileLoadResult>;

    /// 플러그인 폴더 열기 (열린 경로 반환)
    async fn open_plugin_folder(&self, plugin_id: &str) -> Result<PathBuf>;

    /// 플러그인 루트 디렉토리 열기
    async fn open_plugins_directory(&self) -> Result<PathBuf>;
}
