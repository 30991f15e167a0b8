//! Installed Store - 설치 상태 관리
//!
//! installed.json을 통해 설치된 플러그인과 런타임 상태(활성화, 마지막 에러)를
//! 관리합니다.

use super::descriptor::PluginDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use quill_foundation::Result;

/// installed.json 파일 이름
pub const INSTALLED_FILE: &str = "installed.json";

// ============================================================================
// InstalledPlugin
// ============================================================================

/// 설치된 플러그인 정보
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledPlugin {
    /// 설치 시점의 매니페스트
    pub manifest: PluginDescriptor,

    pub installed_at: DateTime<Utc>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

fn default_true() -> bool {
    true
}

impl InstalledPlugin {
    pub fn new(manifest: PluginDescriptor) -> Self {
        Self {
            manifest,
            installed_at: Utc::now(),
            enabled: true,
            last_error: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.manifest.id
    }

    /// 런타임 상태를 반영한 설명자
    pub fn to_descriptor(&self) -> PluginDescriptor {
        let mut descriptor = self.manifest.clone();
        descriptor.installed = true;
        descriptor.enabled = self.enabled;
        descriptor.last_error = self.last_error.clone();
        descriptor.installed_version = Some(self.manifest.version.clone());
        descriptor
    }
}

// ============================================================================
// InstalledFile - installed.json 구조
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct InstalledFile {
    #[serde(default = "default_version")]
    version: String,

    #[serde(default)]
    plugins: Vec<InstalledPlugin>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for InstalledFile {
    fn default() -> Self {
        Self {
            version: default_version(),
            plugins: Vec::new(),
        }
    }
}

// ============================================================================
// InstalledStore
// ============================================================================

/// 설치 상태 저장소
pub struct InstalledStore {
    base_dir: PathBuf,

    cache: RwLock<InstalledFile>,
}

impl InstalledStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            cache: RwLock::new(InstalledFile::default()),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn installed_file(&self) -> PathBuf {
        self.base_dir.join(INSTALLED_FILE)
    }

    // ========================================================================
    // 로드 / 저장
    // ========================================================================

    /// installed.json 로드 (없으면 빈 상태)
    pub async fn load(&self) -> Result<()> {
        let path = self.installed_file();

        if !path.exists() {
            debug!("installed.json not found at {:?}, using empty", path);
            return Ok(());
        }

        let content = fs::read_to_string(&path).await?;
        let file: InstalledFile = serde_json::from_str(&content)?;
        let count = file.plugins.len();
        *self.cache.write().await = file;

        info!("Loaded {} installed plugins", count);
        Ok(())
    }

    async fn save(&self) -> Result<()> {
        if !self.base_dir.exists() {
            fs::create_dir_all(&self.base_dir).await?;
        }

        let cache = self.cache.read().await;
        let content = serde_json::to_string_pretty(&*cache)?;
        fs::write(self.installed_file(), content).await?;

        debug!("Saved installed.json with {} plugins", cache.plugins.len());
        Ok(())
    }

    // ========================================================================
    // 조회
    // ========================================================================

    pub async fn list(&self) -> Vec<InstalledPlugin> {
        self.cache.read().await.plugins.clone()
    }

    pub async fn get(&self, id: &str) -> Option<InstalledPlugin> {
        self.cache
            .read()
            .await
            .plugins
            .iter()
            .find(|p| p.id() == id)
            .cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.cache.read().await.plugins.iter().any(|p| p.id() == id)
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.plugins.len()
    }

    // ========================================================================
    // 변경
    // ========================================================================

    /// 설치 기록 (이미 있으면 매니페스트 갱신)
    pub async fn record_install(&self, plugin: InstalledPlugin) -> Result<()> {
        {
            let mut cache = self.cache.write().await;
            if let Some(existing) = cache.plugins.iter_mut().find(|p| p.id() == plugin.id()) {
                info!("Updating plugin: {} -> v{}", plugin.id(), plugin.manifest.version);
                *existing = plugin;
            } else {
                info!("Installing plugin: {} v{}", plugin.id(), plugin.manifest.version);
                cache.plugins.push(plugin);
            }
        }
        self.save().await
    }

    /// 제거 기록
    pub async fn record_uninstall(&self, id: &str) -> Result<Option<InstalledPlugin>> {
        let removed = {
            let mut cache = self.cache.write().await;
            match cache.plugins.iter().position(|p| p.id() == id) {
                Some(index) => {
                    info!("Uninstalled plugin: {}", id);
                    Some(cache.plugins.remove(index))
                }
                None => {
                    warn!("Plugin not found for uninstall: {}", id);
                    None
                }
            }
        };

        if removed.is_some() {
            self.save().await?;
        }
        Ok(removed)
    }

    /// 활성화 상태 변경 (활성화 시 마지막 에러 초기화)
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<bool> {
        let updated = {
            let mut cache = self.cache.write().await;
            match cache.plugins.iter_mut().find(|p| p.id() == id) {
                Some(plugin) => {
                    plugin.enabled = enabled;
                    if enabled {
                        plugin.last_error = None;
                    }
                    info!("Plugin {} {}", id, if enabled { "enabled" } else { "disabled" });
                    true
                }
                None => false,
            }
        };

        if updated {
            self.save().await?;
        }
        Ok(updated)
    }

    /// 마지막 에러 기록
    pub async fn set_error(&self, id: &str, error: Option<String>) -> Result<bool> {
        let updated = {
            let mut cache = self.cache.write().await;
            match cache.plugins.iter_mut().find(|p| p.id() == id) {
                Some(plugin) => {
                    plugin.last_error = error;
                    true
                }
                None => false,
            }
        };

        if updated {
            self.save().await?;
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (InstalledStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let store = InstalledStore::new(temp.path().join("plugins"));
        (store, temp)
    }

    #[tokio::test]
    async fn test_record_install_and_reload() {
        let (store, temp) = test_store();
        let manifest = PluginDescriptor::new("word-count").with_version("1.2.0");
        store.record_install(InstalledPlugin::new(manifest)).await.unwrap();

        let reloaded = InstalledStore::new(temp.path().join("plugins"));
        reloaded.load().await.unwrap();
        let plugin = reloaded.get("word-count").await.unwrap();
        let descriptor = plugin.to_descriptor();
        assert!(descriptor.installed);
        assert!(descriptor.enabled);
        assert_eq!(descriptor.installed_version.as_deref(), Some("1.2.0"));
    }

    #[tokio::test]
    async fn test_set_enabled_clears_error() {
        let (store, _temp) = test_store();
        store
            .record_install(InstalledPlugin::new(PluginDescriptor::new("p1")))
            .await
            .unwrap();

        store.set_error("p1", Some("crashed".into())).await.unwrap();
        store.set_enabled("p1", false).await.unwrap();
        assert_eq!(store.get("p1").await.unwrap().last_error.as_deref(), Some("crashed"));

        store.set_enabled("p1", true).await.unwrap();
        assert!(store.get("p1").await.unwrap().last_error.is_none());
        assert!(!store.set_enabled("missing", true).await.unwrap());
    }

    #[tokio::test]
    async fn test_record_uninstall() {
        let (store, _temp) = test_store();
        store
            .record_install(InstalledPlugin::new(PluginDescriptor::new("p1")))
            .await
            .unwrap();

        assert!(store.record_uninstall("p1").await.unwrap().is_some());
        assert!(store.record_uninstall("p1").await.unwrap().is_none());
        assert_eq!(store.len().await, 0);
    }
}
