//! Plugin Store Controller - 설치/제거/활성화 조율
//!
//! - 플러그인당 진행 중인 작업은 하나뿐입니다 (pending 맵).
//! - 작업이 끝나면 성공/실패와 관계없이 설명자 목록을 다시 가져옵니다.
//! - 마켓/설치/로컬 개발 설명자를 하나의 목록으로 병합합니다.

use super::bridge::PluginEventListener;
use super::commands::CommandRegistry;
use super::descriptor::{PluginDescriptor, SourceType};
use super::events::PluginEvent;
use super::host::{ActionResult, CommandResult, PluginHost};
use super::permissions::{describe_all, PermissionInfo};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use quill_foundation::{Error, Result};

// ============================================================================
// 작업 / 알림
// ============================================================================

/// 생명주기 작업
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginAction {
    Install,
    Uninstall,
    Enable,
    Disable,
}

impl PluginAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginAction::Install => "install",
            PluginAction::Uninstall => "uninstall",
            PluginAction::Enable => "enable",
            PluginAction::Disable => "disable",
        }
    }
}

impl std::fmt::Display for PluginAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 일시적 알림 (작업 실패)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub plugin_id: String,
    pub action: PluginAction,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// pending 표시 해제 가드
struct PendingGuard<'a> {
    pending: &'a Mutex<HashMap<String, PluginAction>>,
    plugin_id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.plugin_id);
    }
}

// ============================================================================
// 병합
// ============================================================================

/// 설명자 병합
///
/// 1. 마켓 설명자 (최신 버전 정보 제공)
/// 2. 설치 설명자가 같은 ID를 대체 (런타임 상태 보존, 마켓 최신 버전 유지)
/// 3. 로컬 개발 설명자의 정적 메타데이터가 덮어씀 (런타임 상태는 유지)
pub fn merge_descriptors(
    market: Vec<PluginDescriptor>,
    installed: Vec<PluginDescriptor>,
    local: Vec<PluginDescriptor>,
) -> Vec<PluginDescriptor> {
    let mut merged: BTreeMap<String, PluginDescriptor> = BTreeMap::new();

    for mut descriptor in market {
        if descriptor.latest_version.is_none() && !descriptor.version.is_empty() {
            descriptor.latest_version = Some(descriptor.version.clone());
        }
        merged.insert(descriptor.id.clone(), descriptor);
    }

    for installed in installed {
        match merged.get_mut(&installed.id) {
            Some(existing) => overlay_runtime(existing, installed),
            None => {
                let mut descriptor = installed;
                descriptor.installed = true;
                merged.insert(descriptor.id.clone(), descriptor);
            }
        }
    }

    for local in local {
        match merged.get_mut(&local.id) {
            Some(existing) => {
                overlay_static(existing, local);
                existing.source_type = SourceType::Development;
            }
            None => {
                let mut descriptor = local;
                descriptor.source_type = SourceType::Development;
                merged.insert(descriptor.id.clone(), descriptor);
            }
        }
    }

    merged.into_values().collect()
}

/// 설치 상태 덮어쓰기
///
/// 런타임 필드는 항상 설치 설명자를 따르고, 정적 메타데이터는 값이 있을
/// 때만 바꿉니다. 마켓의 최신 버전은 유지합니다.
fn overlay_runtime(target: &mut PluginDescriptor, installed: PluginDescriptor) {
    target.installed = true;
    target.enabled = installed.enabled;
    target.last_error = installed.last_error.clone();
    target.installed_version = installed.installed_version.clone();
    if target.latest_version.is_none() {
        target.latest_version = installed.latest_version.clone();
    }
    overlay_static(target, installed);
}

/// 정적 메타데이터만 덮어쓰기 (비어 있는 값은 무시)
fn overlay_static(target: &mut PluginDescriptor, local: PluginDescriptor) {
    if !local.name.is_empty() {
        target.name = local.name;
    }
    if !local.description.is_empty() {
        target.description = local.description;
    }
    if !local.version.is_empty() {
        target.version = local.version;
    }
    if !local.author.is_empty() {
        target.author = local.author;
    }
    if local.homepage.is_some() {
        target.homepage = local.homepage;
    }
    if !local.permissions.is_empty() {
        target.permissions = local.permissions;
    }
    if !local.commands.is_empty() {
        target.commands = local.commands;
    }
}

// ============================================================================
// PluginStoreController
// ============================================================================

pub struct PluginStoreController {
    host: Arc<dyn PluginHost>,

    commands: Arc<CommandRegistry>,

    /// 병합된 설명자 (ID 순)
    descriptors: RwLock<Vec<PluginDescriptor>>,

    pending: Mutex<HashMap<String, PluginAction>>,

    notifications: Mutex<Vec<Notification>>,
}

impl PluginStoreController {
    pub fn new(host: Arc<dyn PluginHost>, commands: Arc<CommandRegistry>) -> Self {
        Self {
            host,
            commands,
            descriptors: RwLock::new(Vec::new()),
            pending: Mutex::new(HashMap::new()),
            notifications: Mutex::new(Vec::new()),
        }
    }

    // ========================================================================
    // 새로고침
    // ========================================================================

    /// 설명자 목록 재조회
    ///
    /// 조회 실패는 빈 목록으로 대체합니다.
    pub async fn refresh_descriptors(&self) -> usize {
        let (market, installed, local) = futures::join!(
            self.host.list_available(),
            self.host.list_installed(),
            self.host.list_local()
        );

        let merged = merge_descriptors(
            or_empty("available", market),
            or_empty("installed", installed),
            or_empty("local", local),
        );
        let count = merged.len();
        *self.descriptors.write() = merged;
        debug!("Refreshed {} plugin descriptors", count);
        count
    }

    /// 설명자와 명령 전체 재조회
    pub async fn refresh(&self) {
        self.refresh_descriptors().await;
        self.commands.refresh_all(self.host.as_ref()).await;
    }

    // ========================================================================
    // 생명주기 작업
    // ========================================================================

    pub async fn install(&self, plugin_id: &str) -> Result<ActionResult> {
        self.run_action(plugin_id, PluginAction::Install).await
    }

    pub async fn uninstall(&self, plugin_id: &str) -> Result<ActionResult> {
        self.run_action(plugin_id, PluginAction::Uninstall).await
    }

    pub async fn enable(&self, plugin_id: &str) -> Result<ActionResult> {
        self.run_action(plugin_id, PluginAction::Enable).await
    }

    pub async fn disable(&self, plugin_id: &str) -> Result<ActionResult> {
        self.run_action(plugin_id, PluginAction::Disable).await
    }

    fn begin(&self, plugin_id: &str, action: PluginAction) -> Result<PendingGuard<'_>> {
        let mut pending = self.pending.lock();
        if let Some(current) = pending.get(plugin_id) {
            debug!("Rejected {} of {}: {} in progress", action, plugin_id, current);
            return Err(Error::action_in_progress(plugin_id));
        }
        pending.insert(plugin_id.to_string(), action);
        Ok(PendingGuard {
            pending: &self.pending,
            plugin_id: plugin_id.to_string(),
        })
    }

    async fn run_action(&self, plugin_id: &str, action: PluginAction) -> Result<ActionResult> {
        let _guard = self.begin(plugin_id, action)?;
        info!("Plugin {} requested for {}", action, plugin_id);

        let result = match action {
            PluginAction::Install => self.host.install(plugin_id).await,
            PluginAction::Uninstall => self.host.uninstall(plugin_id).await,
            PluginAction::Enable => self.host.enable(plugin_id).await,
            PluginAction::Disable => self.host.disable(plugin_id).await,
        };

        self.refresh().await;

        let result = result?;
        if !result.success {
            let message = result
                .error
                .clone()
                .unwrap_or_else(|| format!("Failed to {} {}", action, plugin_id));
            warn!("Plugin {} failed for {}: {}", action, plugin_id, message);
            self.notifications.lock().push(Notification {
                plugin_id: plugin_id.to_string(),
                action,
                message,
                created_at: Utc::now(),
            });
        }
        Ok(result)
    }

    pub fn is_pending(&self, plugin_id: &str) -> bool {
        self.pending.lock().contains_key(plugin_id)
    }

    pub fn pending_action(&self, plugin_id: &str) -> Option<PluginAction> {
        self.pending.lock().get(plugin_id).copied()
    }

    // ========================================================================
    // 명령 / 조회
    // ========================================================================

    /// 명령 실행
    ///
    /// 호스트가 응답한 실패는 결과로, 전송 실패는 에러로 반환합니다.
    pub async fn execute_command(
        &self,
        plugin_id: &str,
        command_id: &str,
        payload: Value,
    ) -> Result<CommandResult> {
        let result = self
            .host
            .execute_command(plugin_id, command_id, payload)
            .await?;
        if !result.success {
            debug!(
                "Command {}/{} failed: {}",
                plugin_id,
                command_id,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        Ok(result)
    }

    pub fn descriptors(&self) -> Vec<PluginDescriptor> {
        self.descriptors.read().clone()
    }

    pub fn get(&self, plugin_id: &str) -> Option<PluginDescriptor> {
        self.descriptors
            .read()
            .iter()
            .find(|d| d.id == plugin_id)
            .cloned()
    }

    /// 호스트에서 상세 정보 조회 (실패 시 `None`)
    pub async fn details(&self, plugin_id: &str) -> Option<PluginDescriptor> {
        match self.host.get_details(plugin_id).await {
            Ok(details) => details,
            Err(e) => {
                warn!("Failed to fetch details of {}: {}", plugin_id, e);
                None
            }
        }
    }

    /// 설치 전 표시할 권한 설명
    pub async fn permissions_for(&self, plugin_id: &str) -> Option<Vec<PermissionInfo>> {
        let descriptor = match self.get(plugin_id) {
            Some(descriptor) => Some(descriptor),
            None => self.details(plugin_id).await,
        };
        descriptor.map(|d| describe_all(&d.permissions))
    }

    /// 쌓인 알림 가져오기
    pub fn take_notifications(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.notifications.lock())
    }

    pub async fn open_plugin_folder(&self, plugin_id: &str) -> Result<PathBuf> {
        self.host.open_plugin_folder(plugin_id).await
    }

    pub async fn open_plugins_directory(&self) -> Result<PathBuf> {
        self.host.open_plugins_directory().await
    }

    /// 캐시된 설명자 부분 갱신
    fn patch<F>(&self, plugin_id: &str, apply: F)
    where
        F: FnOnce(&mut PluginDescriptor),
    {
        let mut descriptors = self.descriptors.write();
        if let Some(descriptor) = descriptors.iter_mut().find(|d| d.id == plugin_id) {
            apply(descriptor);
        }
    }
}

fn or_empty(source: &str, result: Result<Vec<PluginDescriptor>>) -> Vec<PluginDescriptor> {
    result.unwrap_or_else(|e| {
        warn!("Failed to list {} plugins: {}", source, e);
        Vec::new()
    })
}

#[async_trait]
impl PluginEventListener for PluginStoreController {
    fn name(&self) -> &str {
        "plugin-store"
    }

    async fn on_event(&self, event: &PluginEvent) {
        match event {
            PluginEvent::Installed { plugin_id } => self.patch(plugin_id, |d| d.installed = true),
            PluginEvent::Enabled { plugin_id } => self.patch(plugin_id, |d| {
                d.enabled = true;
                d.last_error = None;
            }),
            PluginEvent::Disabled { plugin_id } => self.patch(plugin_id, |d| d.enabled = false),
            PluginEvent::Ready { plugin_id } => self.patch(plugin_id, |d| d.last_error = None),
            PluginEvent::Error { plugin_id, error } => {
                let error = error.clone();
                self.patch(plugin_id, |d| d.last_error = Some(error));
            }
            PluginEvent::Uninstalled { plugin_id } => self.patch(plugin_id, |d| {
                d.installed = false;
                d.enabled = false;
                d.installed_version = None;
            }),
            _ => {}
        }
    }

    async fn on_reconcile(&self) {
        self.refresh_descriptors().await;
    }
}
