//! Storage module for Quill
//!
//! - `json`: JSON - 설정 및 설치 상태 파일 저장/로드

mod json;

pub use json::JsonStore;
