//! Error types for Quill
//!
//! 모든 에러를 중앙에서 관리

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Quill 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 설정 관련
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // Host bridge 관련
    // ========================================================================
    /// 호스트 브릿지에 도달할 수 없음 (런타임이 호스트 밖에서 로드된 경우 등)
    #[error("Host bridge unreachable: {0}")]
    Transport(String),

    // ========================================================================
    // 플러그인 관련
    // ========================================================================
    #[error("Plugin action already in progress: {plugin_id}")]
    ActionInProgress { plugin_id: String },

    // ========================================================================
    // 샌드박스 관련
    // ========================================================================
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    // ========================================================================
    // 일반
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// 브릿지 전송 실패인지 확인
    ///
    /// 조회 함수는 이 경우 안전한 기본값으로 대체합니다.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Transport 에러 생성 헬퍼
    pub fn transport(message: impl Into<String>) -> Self {
        Error::Transport(message.into())
    }

    /// ActionInProgress 에러 생성 헬퍼
    pub fn action_in_progress(plugin_id: impl Into<String>) -> Self {
        Error::ActionInProgress {
            plugin_id: plugin_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(Error::transport("bridge missing").is_transport());
        assert!(!Error::Sandbox("boom".into()).is_transport());
    }

    #[test]
    fn test_action_in_progress_message() {
        assert_eq!(
            Error::action_in_progress("p1").to_string(),
            "Plugin action already in progress: p1"
        );
    }
}
