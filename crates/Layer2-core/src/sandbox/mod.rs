//! # Sandbox
//!
//! 플러그인이 제공한 문서를 격리된 컨텍스트에서 렌더링합니다.
//!
//! - `rewrite`: 상대 참조 해석, `<base href>` 삽입
//! - `runtime`: 격리 컨텍스트 추상화 (`SandboxRuntime`, `SandboxContext`)와 헤드리스 구현
//! - `surface`: 주입되는 capability surface
//! - `host`: 창 세션 관리, 주입 재시도, 스타일 미러링

mod host;
pub mod rewrite;
mod runtime;
mod surface;

pub use host::{SandboxSession, SandboxWindowHost, SessionInfo};
pub use rewrite::{insert_base_tag, plugin_base_url, resolve_style_urls, rewrite_document};
pub use runtime::{
    ContextSpec, HeadlessContext, HeadlessRuntime, ReadyNotifier, ReadySignal, SandboxContext,
    SandboxPolicy, SandboxRuntime,
};
pub use surface::{
    CapabilitySurface, CommandBridge, SharedModuleRef, BRIDGE_GLOBAL, STYLE_ROOT_GLOBAL,
    THEME_GLOBAL,
};
