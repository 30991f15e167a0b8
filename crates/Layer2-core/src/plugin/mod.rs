//! # Plugin
//!
//! 플러그인 확장 런타임
//!
//! ## 아키텍처
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    PluginStoreController                     │
//! │   install / uninstall / enable / disable / execute_command   │
//! └───────────────┬──────────────────────────────┬───────────────┘
//!                 │                              │ refresh
//!                 ▼                              ▼
//!        ┌─────────────────┐   HostMessage   ┌─────────────────┐
//!        │   PluginHost    │ ──────────────▶ │   EventBridge   │
//!        │ (async bridge)  │                 │                 │
//!        └─────────────────┘                 └──┬──────────┬───┘
//!                                               │          │
//!                                 ┌─────────────▼──┐  ┌────▼──────────┐
//!                                 │CommandRegistry │  │ StyleRegistry │
//!                                 └────────────────┘  └───────────────┘
//! ```
//!
//! 리스너(`PluginEventListener`)로 컨트롤러와 샌드박스 창 호스트가 연결됩니다.

mod bridge;
mod commands;
mod controller;
mod descriptor;
mod events;
mod host;
pub mod permissions;
mod store;
mod styles;

pub use bridge::{BridgePump, EventBridge, ListenerId, PluginEventListener};
pub use commands::{CommandEntry, CommandPatch, CommandRegistry};
pub use controller::{merge_descriptors, Notification, PluginAction, PluginStoreController};
pub use descriptor::{
    validate_plugin_id, CommandDescriptor, PluginDescriptor, SourceType, MAX_PLUGIN_ID_LEN,
};
pub use events::{HostMessage, PluginEvent, UiRequest, WindowRequest};
pub use host::{
    ActionResult, CommandHandler, CommandResult, DirectoryHost, FileLoadResult, PluginHost,
};
pub use permissions::PermissionInfo;
pub use store::{InstalledPlugin, InstalledStore};
pub use styles::{StyleFragment, StyleRegistry};
