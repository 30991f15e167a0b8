//! Config - 런타임 설정 관리
//!
//! - `runtime.rs` - RuntimeConfig (호스트 위치, 샌드박스 주입, 테마)

mod runtime;

pub use runtime::{
    RuntimeConfig, RuntimeConfigOverrides, SharedModule, ThemeConfig, ThemeMode,
    RUNTIME_CONFIG_FILE,
};
