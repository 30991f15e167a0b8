//! # quill-foundation
//!
//! Foundation layer for Quill:
//! - Error: 공통 에러 타입 (`Error`, `Result`)
//! - Config: 플러그인 런타임 설정 (`RuntimeConfig`)
//! - Storage: JSON 파일 저장소 (`JsonStore`)

pub mod config;
pub mod error;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config
// ============================================================================
pub use config::{RuntimeConfig, RuntimeConfigOverrides, SharedModule, ThemeConfig, ThemeMode};

// ============================================================================
// Storage
// ============================================================================
pub use storage::JsonStore;
