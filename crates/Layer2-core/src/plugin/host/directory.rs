//! DirectoryHost - 디렉토리 기반 개발용 호스트
//!
//! ```text
//! <root>/
//!   ├── market.json            # 게시된 플러그인 설명자 배열
//!   ├── installed.json         # 설치 상태 (InstalledStore)
//!   ├── <plugin-id>/           # 설치된 플러그인 파일
//!   └── dev/<plugin-id>/       # 개발 중인 플러그인 (plugin.json 필수)
//! ```
//!
//! 생명주기 작업은 실제 호스트와 같은 순서로 이벤트를 발행합니다.

use super::{ActionResult, CommandResult, FileLoadResult, PluginHost};
use crate::plugin::commands::CommandEntry;
use crate::plugin::descriptor::{validate_plugin_id, PluginDescriptor, SourceType};
use crate::plugin::events::{HostMessage, PluginEvent};
use crate::plugin::store::{InstalledPlugin, InstalledStore};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use quill_foundation::{Error, Result};

/// 마켓 목록 파일
pub const MARKET_FILE: &str = "market.json";

/// 개발 플러그인 디렉토리
pub const DEV_DIR: &str = "dev";

/// 매니페스트 파일
pub const MANIFEST_FILE: &str = "plugin.json";

/// 프로세스 내 명령 핸들러
pub type CommandHandler = Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>;

/// 디렉토리 기반 호스트
pub struct DirectoryHost {
    root: PathBuf,

    store: InstalledStore,

    events: broadcast::Sender<HostMessage>,

    handlers: RwLock<HashMap<(String, String), CommandHandler>>,

    /// 폴더 열기 명령 (예: "xdg-open")
    opener: Option<String>,
}

impl DirectoryHost {
    /// 디렉토리를 열고 installed.json 로드
    pub async fn open(root: impl Into<PathBuf>, channel_capacity: usize) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;

        let store = InstalledStore::new(&root);
        store.load().await?;

        let (events, _) = broadcast::channel(channel_capacity.max(1));
        info!("Opened plugin directory host at {:?}", root);

        Ok(Self {
            root,
            store,
            events,
            handlers: RwLock::new(HashMap::new()),
            opener: None,
        })
    }

    pub fn with_opener(mut self, opener: impl Into<String>) -> Self {
        self.opener = Some(opener.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 명령 핸들러 등록
    pub fn register_handler<F>(&self, plugin_id: &str, command_id: &str, handler: F)
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.handlers.write().insert(
            (plugin_id.to_string(), command_id.to_string()),
            Arc::new(handler),
        );
    }

    /// 플러그인 이벤트 발행 (호스트 측 플러그인 런타임이 보내는 이벤트)
    fn emit_event(&self, event: PluginEvent) {
        self.emit(HostMessage::Plugin(event));
    }

    fn emit(&self, message: HostMessage) {
        if self.events.send(message).is_err() {
            trace!("No subscribers for host message");
        }
    }

    // ========================================================================
    // 디렉토리 읽기
    // ========================================================================

    async fn read_market(&self) -> Result<Vec<PluginDescriptor>> {
        let path = self.root.join(MARKET_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path).await?;
        let mut plugins: Vec<PluginDescriptor> = serde_json::from_str(&content)?;
        for plugin in &mut plugins {
            plugin.source_type = SourceType::Market;
            plugin.latest_version = Some(plugin.version.clone());
            plugin.installed = false;
            plugin.enabled = false;
        }
        Ok(plugins)
    }

    /// dev/ 아래 plugin.json 스캔
    async fn scan_dev(&self) -> Result<Vec<PluginDescriptor>> {
        let dir = self.root.join(DEV_DIR);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut plugins = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            let manifest_path = path.join(MANIFEST_FILE);
            if !manifest_path.exists() {
                continue;
            }

            match read_manifest(&manifest_path).await {
                Ok(mut manifest) => {
                    if validate_plugin_id(&manifest.id).is_err() {
                        warn!("Skipping dev plugin with invalid id at {:?}", path);
                        continue;
                    }
                    manifest.source_type = SourceType::Development;
                    debug!("Found dev plugin: {} at {:?}", manifest.id, path);
                    plugins.push(manifest);
                }
                Err(e) => warn!("Failed to parse plugin manifest {:?}: {}", manifest_path, e),
            }
        }

        plugins.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(plugins)
    }

    async fn find_manifest(&self, plugin_id: &str) -> Result<Option<PluginDescriptor>> {
        if let Some(dev) = self.scan_dev().await?.into_iter().find(|p| p.id == plugin_id) {
            return Ok(Some(dev));
        }
        Ok(self.read_market().await?.into_iter().find(|p| p.id == plugin_id))
    }

    /// 플러그인 파일 디렉토리 (개발 플러그인 우선)
    fn plugin_dir(&self, plugin_id: &str) -> PathBuf {
        let dev = self.root.join(DEV_DIR).join(plugin_id);
        if dev.is_dir() {
            dev
        } else {
            self.root.join(plugin_id)
        }
    }

    fn emit_commands_registered(&self, manifest: &PluginDescriptor) {
        for command in &manifest.commands {
            self.emit_event(PluginEvent::CommandRegistered {
                plugin_id: manifest.id.clone(),
                command: command.clone(),
            });
        }
    }

    fn emit_commands_unregistered(&self, manifest: &PluginDescriptor) {
        for command in &manifest.commands {
            self.emit_event(PluginEvent::CommandUnregistered {
                plugin_id: manifest.id.clone(),
                command_id: command.id.clone(),
            });
        }
    }
}

async fn read_manifest(path: &Path) -> Result<PluginDescriptor> {
    let content = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

/// 상대 URL을 플러그인 디렉토리 내부 경로로 변환
fn resolve_in_plugin_dir(dir: &Path, relative_url: &str) -> Result<PathBuf> {
    let path_part = relative_url
        .split(&['?', '#'][..])
        .next()
        .unwrap_or_default()
        .trim_start_matches("./");

    if path_part.is_empty() {
        return Err(Error::InvalidInput("Empty plugin file path".into()));
    }

    let relative = Path::new(path_part);
    if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(Error::InvalidInput(format!(
            "Path escapes plugin directory: {}",
            relative_url
        )));
    }

    let root = dir.canonicalize()?;
    let resolved = root.join(relative).canonicalize()?;
    if !resolved.starts_with(&root) {
        return Err(Error::InvalidInput(format!(
            "Path escapes plugin directory: {}",
            relative_url
        )));
    }
    Ok(resolved)
}

#[async_trait]
impl PluginHost for DirectoryHost {
    async fn list_available(&self) -> Result<Vec<PluginDescriptor>> {
        self.read_market().await
    }

    async fn list_installed(&self) -> Result<Vec<PluginDescriptor>> {
        Ok(self
            .store
            .list()
            .await
            .iter()
            .map(InstalledPlugin::to_descriptor)
            .collect())
    }

    async fn list_local(&self) -> Result<Vec<PluginDescriptor>> {
        self.scan_dev().await
    }

    async fn get_details(&self, plugin_id: &str) -> Result<Option<PluginDescriptor>> {
        if let Some(installed) = self.store.get(plugin_id).await {
            return Ok(Some(installed.to_descriptor()));
        }
        self.find_manifest(plugin_id).await
    }

    async fn list_commands(&self) -> Result<Vec<CommandEntry>> {
        Ok(self
            .store
            .list()
            .await
            .into_iter()
            .filter(|p| p.enabled)
            .flat_map(|p| {
                let plugin_id = p.manifest.id.clone();
                p.manifest
                    .commands
                    .into_iter()
                    .map(move |c| CommandEntry::new(plugin_id.clone(), c))
            })
            .collect())
    }

    async fn install(&self, plugin_id: &str) -> Result<ActionResult> {
        if let Err(e) = validate_plugin_id(plugin_id) {
            return Ok(ActionResult::failed(e.to_string()));
        }
        if self.store.contains(plugin_id).await {
            return Ok(ActionResult::failed(format!("{} is already installed", plugin_id)));
        }
        let Some(manifest) = self.find_manifest(plugin_id).await? else {
            return Ok(ActionResult::failed(format!("Plugin not found: {}", plugin_id)));
        };

        if manifest.source_type == SourceType::Market {
            let dir = self.root.join(plugin_id);
            fs::create_dir_all(&dir).await?;
            fs::write(dir.join(MANIFEST_FILE), serde_json::to_string_pretty(&manifest)?).await?;
        }

        self.store.record_install(InstalledPlugin::new(manifest.clone())).await?;

        self.emit_event(PluginEvent::Installed { plugin_id: plugin_id.to_string() });
        self.emit_event(PluginEvent::Enabled { plugin_id: plugin_id.to_string() });
        self.emit_commands_registered(&manifest);
        self.emit_event(PluginEvent::Ready { plugin_id: plugin_id.to_string() });
        Ok(ActionResult::ok())
    }

    async fn uninstall(&self, plugin_id: &str) -> Result<ActionResult> {
        let Some(removed) = self.store.record_uninstall(plugin_id).await? else {
            return Ok(ActionResult::failed(format!("{} is not installed", plugin_id)));
        };

        if removed.manifest.source_type == SourceType::Market {
            let dir = self.root.join(plugin_id);
            if dir.exists() {
                fs::remove_dir_all(&dir).await?;
            }
        }

        self.handlers.write().retain(|(p, _), _| p != plugin_id);
        self.emit_event(PluginEvent::Uninstalled { plugin_id: plugin_id.to_string() });
        Ok(ActionResult::ok())
    }

    async fn enable(&self, plugin_id: &str) -> Result<ActionResult> {
        let Some(installed) = self.store.get(plugin_id).await else {
            return Ok(ActionResult::failed(format!("{} is not installed", plugin_id)));
        };
        if installed.enabled {
            return Ok(ActionResult::ok());
        }

        self.store.set_enabled(plugin_id, true).await?;
        self.emit_event(PluginEvent::Enabled { plugin_id: plugin_id.to_string() });
        self.emit_commands_registered(&installed.manifest);
        self.emit_event(PluginEvent::Ready { plugin_id: plugin_id.to_string() });
        Ok(ActionResult::ok())
    }

    async fn disable(&self, plugin_id: &str) -> Result<ActionResult> {
        let Some(installed) = self.store.get(plugin_id).await else {
            return Ok(ActionResult::failed(format!("{} is not installed", plugin_id)));
        };
        if !installed.enabled {
            return Ok(ActionResult::ok());
        }

        self.store.set_enabled(plugin_id, false).await?;
        self.emit_commands_unregistered(&installed.manifest);
        self.emit_event(PluginEvent::Disabled { plugin_id: plugin_id.to_string() });
        Ok(ActionResult::ok())
    }

    async fn execute_command(
        &self,
        plugin_id: &str,
        command_id: &str,
        payload: Value,
    ) -> Result<CommandResult> {
        let Some(installed) = self.store.get(plugin_id).await else {
            return Ok(CommandResult::failed(format!("{} is not installed", plugin_id)));
        };
        if !installed.enabled {
            return Ok(CommandResult::failed(format!("{} is disabled", plugin_id)));
        }
        if !installed.manifest.commands.iter().any(|c| c.id == command_id) {
            return Ok(CommandResult::failed(format!(
                "Unknown command {}/{}",
                plugin_id, command_id
            )));
        }

        let handler = self
            .handlers
            .read()
            .get(&(plugin_id.to_string(), command_id.to_string()))
            .cloned();

        match handler {
            Some(handler) => match handler(payload) {
                Ok(data) => Ok(CommandResult::ok(Some(data))),
                Err(e) => {
                    let message = e.to_string();
                    self.store.set_error(plugin_id, Some(message.clone())).await?;
                    self.emit_event(PluginEvent::Error {
                        plugin_id: plugin_id.to_string(),
                        error: message.clone(),
                    });
                    Ok(CommandResult::failed(message))
                }
            },
            None => Ok(CommandResult::failed(format!(
                "No executor available for {}/{}",
                plugin_id, command_id
            ))),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<HostMessage> {
        self.events.subscribe()
    }

    async fn load_plugin_file(
        &self,
        plugin_id: &str,
        relative_url: &str,
    ) -> Result<FileLoadResult> {
        if let Err(e) = validate_plugin_id(plugin_id) {
            return Ok(FileLoadResult::failed(e.to_string()));
        }

        let dir = self.plugin_dir(plugin_id);
        let path = match resolve_in_plugin_dir(&dir, relative_url) {
            Ok(path) => path,
            Err(e) => return Ok(FileLoadResult::failed(e.to_string())),
        };

        match fs::read_to_string(&path).await {
            Ok(content) => Ok(FileLoadResult::ok(content)),
            Err(e) => Ok(FileLoadResult::failed(format!("{}: {}", relative_url, e))),
        }
    }

    async fn open_plugin_folder(&self, plugin_id: &str) -> Result<PathBuf> {
        validate_plugin_id(plugin_id)?;
        let dir = self.plugin_dir(plugin_id);
        if !dir.is_dir() {
            return Err(Error::NotFound(format!("Plugin folder for {}", plugin_id)));
        }
        self.open_path(&dir).await?;
        Ok(dir)
    }

    async fn open_plugins_directory(&self) -> Result<PathBuf> {
        self.open_path(&self.root).await?;
        Ok(self.root.clone())
    }
}

impl DirectoryHost {
    async fn open_path(&self, path: &Path) -> Result<()> {
        let Some(opener) = &self.opener else {
            debug!("No opener configured, not launching {:?}", path);
            return Ok(());
        };

        let status = tokio::process::Command::new(opener).arg(path).status().await?;
        if !status.success() {
            warn!("Opener {} exited with {}", opener, status);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::descriptor::CommandDescriptor;
    use tempfile::TempDir;

    async fn host_with_market() -> (DirectoryHost, TempDir) {
        let temp = TempDir::new().unwrap();
        let market = vec![PluginDescriptor::new("timer")
            .with_version("1.0.0")
            .with_permission("scheduler")
            .with_command(CommandDescriptor::new("start", "Start").with_surface("toolbar"))];
        std::fs::write(
            temp.path().join(MARKET_FILE),
            serde_json::to_string(&market).unwrap(),
        )
        .unwrap();

        let host = DirectoryHost::open(temp.path(), 16).await.unwrap();
        (host, temp)
    }

    fn drain(rx: &mut broadcast::Receiver<HostMessage>) -> Vec<&'static str> {
        let mut kinds = Vec::new();
        while let Ok(HostMessage::Plugin(event)) = rx.try_recv() {
            kinds.push(event.kind());
        }
        kinds
    }

    #[tokio::test]
    async fn test_install_emits_lifecycle_events() {
        let (host, _temp) = host_with_market().await;
        let mut rx = host.subscribe();

        let result = host.install("timer").await.unwrap();
        assert!(result.success);
        assert_eq!(
            drain(&mut rx),
            vec!["installed", "enabled", "command-registered", "ready"]
        );

        let installed = host.list_installed().await.unwrap();
        assert_eq!(installed[0].installed_version.as_deref(), Some("1.0.0"));
        assert_eq!(host.list_commands().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_install_twice_is_structured_failure() {
        let (host, _temp) = host_with_market().await;
        assert!(host.install("timer").await.unwrap().success);
        let again = host.install("timer").await.unwrap();
        assert!(!again.success);
        assert!(again.error.unwrap().contains("already installed"));
        assert!(!host.install("missing").await.unwrap().success);
    }

    #[tokio::test]
    async fn test_disable_hides_commands() {
        let (host, _temp) = host_with_market().await;
        host.install("timer").await.unwrap();
        let mut rx = host.subscribe();

        host.disable("timer").await.unwrap();
        assert_eq!(drain(&mut rx), vec!["command-unregistered", "disabled"]);
        assert!(host.list_commands().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_execute_command_with_handler() {
        let (host, _temp) = host_with_market().await;
        host.install("timer").await.unwrap();

        let missing = host.execute_command("timer", "start", Value::Null).await.unwrap();
        assert!(!missing.success);

        host.register_handler("timer", "start", |payload| {
            Ok(serde_json::json!({ "echo": payload }))
        });
        let result = host
            .execute_command("timer", "start", serde_json::json!(5))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.data.unwrap()["echo"], 5);
    }

    #[tokio::test]
    async fn test_dev_plugins_and_file_loading() {
        let (host, temp) = host_with_market().await;
        let dev = temp.path().join(DEV_DIR).join("sketch");
        std::fs::create_dir_all(dev.join("ui")).unwrap();
        std::fs::write(dev.join(MANIFEST_FILE), r#"{"id":"sketch","name":"Sketch"}"#).unwrap();
        std::fs::write(dev.join("ui/index.html"), "<p>hi</p>").unwrap();

        let local = host.list_local().await.unwrap();
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].source_type, SourceType::Development);

        let loaded = host.load_plugin_file("sketch", "ui/index.html?v=2").await.unwrap();
        assert!(loaded.success);
        assert_eq!(loaded.content, "<p>hi</p>");

        let escaped = host.load_plugin_file("sketch", "../../market.json").await.unwrap();
        assert!(!escaped.success);

        let missing = host.load_plugin_file("sketch", "nope.html").await.unwrap();
        assert!(!missing.success);
    }
}
