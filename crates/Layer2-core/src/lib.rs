//! quill-core: Plugin runtime for Quill
//!
//! Layer2 - 플러그인 확장 런타임
//!
//! # 주요 모듈
//!
//! - `document`: 관찰 가능한 스타일 head (호스트/샌드박스)
//! - `plugin`: 명령/스타일 레지스트리, 이벤트 브릿지, 호스트 계약, 스토어 컨트롤러
//! - `sandbox`: 격리 창 호스트, 문서 재작성, capability surface
//! - `runtime`: 구성 요소 조립 (`PluginRuntime`)
//!
//! # 사용 예시
//!
//! ```ignore
//! use quill_core::{DirectoryHost, PluginRuntime};
//!
//! let host = Arc::new(DirectoryHost::open(root, config.event_channel_capacity).await?);
//! let runtime = PluginRuntime::headless(host, config)?;
//! runtime.start().await;
//!
//! runtime.controller().install("word-count").await?;
//! for command in runtime.commands().list_for_surface("palette") {
//!     println!("{}", command.label());
//! }
//!
//! runtime.shutdown().await;
//! ```

pub mod document;
pub mod plugin;
pub mod runtime;
pub mod sandbox;

// Re-exports: Document
pub use document::{MutationKind, MutationObserver, StyleHead, StyleNode, StyleOrigin};

// Re-exports: Plugin
pub use plugin::{
    // Host bridge
    ActionResult,
    BridgePump,
    // Registries
    CommandDescriptor,
    CommandEntry,
    CommandPatch,
    CommandRegistry,
    CommandResult,
    DirectoryHost,
    // Events
    EventBridge,
    FileLoadResult,
    HostMessage,
    // Controller
    Notification,
    PermissionInfo,
    PluginAction,
    PluginDescriptor,
    PluginEvent,
    PluginEventListener,
    PluginHost,
    PluginStoreController,
    SourceType,
    StyleFragment,
    StyleRegistry,
    UiRequest,
    WindowRequest,
};

// Re-exports: Sandbox
pub use sandbox::{HeadlessRuntime, SandboxRuntime, SandboxWindowHost, SessionInfo};

// Re-exports: Runtime
pub use runtime::PluginRuntime;

// Layer1 re-exports
pub use quill_foundation::{Error, Result, RuntimeConfig};

/// Layer2 버전
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
