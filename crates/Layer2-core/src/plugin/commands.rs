//! Command Registry - 호출 가능한 플러그인 명령 캐시
//!
//! (pluginId, commandId) 키로 유일성을 보장합니다. 증분 이벤트로 갱신되고
//! `refresh_all()`로 호스트 스냅샷과 다시 맞춰집니다.

use super::descriptor::CommandDescriptor;
use super::host::PluginHost;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace, warn};

// ============================================================================
// CommandEntry
// ============================================================================

/// 레지스트리 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEntry {
    pub plugin_id: String,

    #[serde(flatten)]
    pub command: CommandDescriptor,
}

impl CommandEntry {
    pub fn new(plugin_id: impl Into<String>, command: CommandDescriptor) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            command,
        }
    }

    pub fn command_id(&self) -> &str {
        &self.command.id
    }

    /// 표시 이름 (title이 비어 있으면 ID)
    pub fn label(&self) -> &str {
        if self.command.title.is_empty() {
            &self.command.id
        } else {
            &self.command.title
        }
    }

    fn key(&self) -> (String, String) {
        (self.plugin_id.clone(), self.command.id.clone())
    }
}

/// `add()` 입력 - 없는 필드는 기존 값을 유지
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub shortcut: Option<String>,
    pub surfaces: Option<BTreeSet<String>>,
}

impl CommandPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    fn apply(self, command: &mut CommandDescriptor) {
        if let Some(title) = self.title {
            command.title = title;
        }
        if let Some(description) = self.description {
            command.description = Some(description);
        }
        if let Some(icon) = self.icon {
            command.icon = Some(icon);
        }
        if let Some(shortcut) = self.shortcut {
            command.shortcut = Some(shortcut);
        }
        if let Some(surfaces) = self.surfaces {
            command.surfaces = surfaces;
        }
    }
}

impl From<CommandDescriptor> for CommandPatch {
    fn from(command: CommandDescriptor) -> Self {
        Self {
            title: Some(command.title).filter(|t| !t.is_empty()),
            description: command.description,
            icon: command.icon,
            shortcut: command.shortcut,
            surfaces: Some(command.surfaces).filter(|s| !s.is_empty()),
        }
    }
}

// ============================================================================
// CommandRegistry
// ============================================================================

/// 명령 레지스트리
#[derive(Default)]
pub struct CommandRegistry {
    entries: RwLock<BTreeMap<(String, String), CommandEntry>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 삽입 또는 병합
    pub fn add(&self, plugin_id: &str, command_id: &str, patch: CommandPatch) {
        let key = (plugin_id.to_string(), command_id.to_string());
        let mut entries = self.entries.write();

        match entries.get_mut(&key) {
            Some(entry) => {
                patch.apply(&mut entry.command);
                trace!("Merged command {}/{}", plugin_id, command_id);
            }
            None => {
                let mut command = CommandDescriptor::new(command_id, "");
                patch.apply(&mut command);
                entries.insert(key, CommandEntry::new(plugin_id, command));
                debug!("Added command {}/{}", plugin_id, command_id);
            }
        }
    }

    /// 설명자 전체로 추가 (command-registered 이벤트 경로)
    pub fn add_descriptor(&self, plugin_id: &str, command: CommandDescriptor) {
        let command_id = command.id.clone();
        self.add(plugin_id, &command_id, command.into());
    }

    /// 제거 (없어도 에러 아님)
    pub fn remove(&self, plugin_id: &str, command_id: &str) -> bool {
        let removed = self
            .entries
            .write()
            .remove(&(plugin_id.to_string(), command_id.to_string()))
            .is_some();

        if removed {
            debug!("Removed command {}/{}", plugin_id, command_id);
        } else {
            trace!("Command {}/{} already absent", plugin_id, command_id);
        }
        removed
    }

    /// 플러그인의 모든 명령 제거
    pub fn remove_plugin(&self, plugin_id: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(p, _), _| p != plugin_id);
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Removed {} commands of plugin {}", removed, plugin_id);
        }
        removed
    }

    /// 호스트 스냅샷으로 전체 교체
    ///
    /// 조회 실패 시 현재 내용을 유지합니다.
    pub async fn refresh_all(&self, host: &dyn PluginHost) -> bool {
        match host.list_commands().await {
            Ok(snapshot) => {
                self.replace_all(snapshot);
                true
            }
            Err(e) => {
                warn!("Command refresh failed, keeping cached commands: {}", e);
                false
            }
        }
    }

    /// 스냅샷으로 교체 (같은 키가 여러 번 오면 마지막 값)
    pub fn replace_all(&self, snapshot: Vec<CommandEntry>) {
        let fresh: BTreeMap<_, _> = snapshot.into_iter().map(|e| (e.key(), e)).collect();
        let count = fresh.len();
        *self.entries.write() = fresh;
        debug!("Command registry refreshed ({} commands)", count);
    }

    // ========================================================================
    // 조회
    // ========================================================================

    pub fn get(&self, plugin_id: &str, command_id: &str) -> Option<CommandEntry> {
        self.entries
            .read()
            .get(&(plugin_id.to_string(), command_id.to_string()))
            .cloned()
    }

    /// 전체 목록 (pluginId, commandId 순)
    pub fn list(&self) -> Vec<CommandEntry> {
        self.entries.read().values().cloned().collect()
    }

    /// 특정 위치에 노출되는 명령
    pub fn list_for_surface(&self, surface: &str) -> Vec<CommandEntry> {
        self.entries
            .read()
            .values()
            .filter(|e| e.command.surfaces.contains(surface))
            .cloned()
            .collect()
    }

    pub fn list_for_plugin(&self, plugin_id: &str) -> Vec<CommandEntry> {
        self.entries
            .read()
            .values()
            .filter(|e| e.plugin_id == plugin_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
