//! Sandbox runtime - 격리 실행 컨텍스트 추상화
//!
//! 생성 → 문서 로드 → 고정된 capability surface 주입 → 닫을 때 파기.
//! 별도 프로세스, 워커, 스크립트 샌드박스 어느 것으로든 구현할 수 있습니다.

use super::surface::{CapabilitySurface, BRIDGE_GLOBAL, STYLE_ROOT_GLOBAL, THEME_GLOBAL};
use crate::document::StyleHead;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, trace};
use url::Url;

use quill_foundation::{Error, Result};

// ============================================================================
// 정책 / 생성 명세
// ============================================================================

/// 샌드박스 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxPolicy {
    pub allow_scripts: bool,
    pub allow_navigation: bool,
    /// 호스트 저장소(쿠키, localStorage 등) 접근
    pub allow_host_storage: bool,
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self {
            allow_scripts: true,
            allow_navigation: false,
            allow_host_storage: false,
        }
    }
}

/// 컨텍스트 생성 명세
#[derive(Debug, Clone)]
pub struct ContextSpec {
    pub session_id: String,
    pub plugin_id: String,
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
    pub closable: bool,
    /// 재작성된 문서
    pub document: String,
    pub base_url: Url,
    pub policy: SandboxPolicy,
}

// ============================================================================
// ReadySignal
// ============================================================================

/// 샌드박스 문서 준비 완료 신호
#[derive(Debug, Clone)]
pub struct ReadySignal {
    rx: watch::Receiver<bool>,
}

/// 신호 발신 측
#[derive(Debug)]
pub struct ReadyNotifier {
    tx: watch::Sender<bool>,
}

impl ReadySignal {
    pub fn channel() -> (ReadyNotifier, ReadySignal) {
        let (tx, rx) = watch::channel(false);
        (ReadyNotifier { tx }, ReadySignal { rx })
    }

    /// 준비될 때까지 대기 (발신 측이 사라지면 `false`)
    pub async fn wait(mut self) -> bool {
        let ready = self.rx.wait_for(|ready| *ready).await.is_ok();
        ready
    }

    pub fn is_ready(&self) -> bool {
        *self.rx.borrow()
    }
}

impl ReadyNotifier {
    pub fn notify(&self) {
        self.tx.send_replace(true);
    }
}

// ============================================================================
// Traits
// ============================================================================

/// 격리 실행 컨텍스트 생성기
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    fn name(&self) -> &str;

    async fn create_context(&self, spec: ContextSpec) -> Result<Arc<dyn SandboxContext>>;
}

/// 격리 실행 컨텍스트
#[async_trait]
pub trait SandboxContext: Send + Sync {
    fn session_id(&self) -> &str;

    /// 샌드박스 문서의 head (아직 파싱되지 않았거나 파기되었으면 `None`)
    fn head(&self) -> Option<Arc<StyleHead>>;

    /// 실제 준비 완료 신호 (플랫폼이 제공하지 않으면 `None`)
    fn ready_signal(&self) -> Option<ReadySignal>;

    /// capability surface 주입
    async fn inject(&self, surface: &CapabilitySurface) -> Result<()>;

    fn is_destroyed(&self) -> bool;

    async fn destroy(&self);
}

// ============================================================================
// HeadlessRuntime - 프로세스 내 구현
// ============================================================================

/// 프로세스 내 헤드리스 런타임
///
/// 주입 가능한 전역은 허용 목록으로 제한됩니다. 테스트와 CLI 렌더링에
/// 사용됩니다.
pub struct HeadlessRuntime {
    allowed_globals: BTreeSet<String>,

    /// 문서 파싱에 걸리는 시간
    parse_delay: Duration,

    /// 준비 완료 신호 제공 여부
    ready_signal: bool,
}

impl HeadlessRuntime {
    pub fn new() -> Self {
        Self {
            allowed_globals: [BRIDGE_GLOBAL, THEME_GLOBAL, STYLE_ROOT_GLOBAL]
                .into_iter()
                .map(String::from)
                .collect(),
            parse_delay: Duration::ZERO,
            ready_signal: false,
        }
    }

    /// 공유 모듈 전역 허용
    pub fn allow_globals<I, S>(mut self, globals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_globals.extend(globals.into_iter().map(Into::into));
        self
    }

    pub fn with_parse_delay(mut self, delay: Duration) -> Self {
        self.parse_delay = delay;
        self
    }

    pub fn with_ready_signal(mut self, enabled: bool) -> Self {
        self.ready_signal = enabled;
        self
    }

    /// 구체 타입으로 컨텍스트 생성 (검사용)
    pub async fn create_headless(&self, spec: ContextSpec) -> Arc<HeadlessContext> {
        let ready = if self.ready_signal {
            let (notifier, signal) = ReadySignal::channel();
            let delay = self.parse_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                notifier.notify();
            });
            Some(signal)
        } else {
            None
        };

        debug!(
            "Created headless context {} for {} ({}x{})",
            spec.session_id, spec.plugin_id, spec.width, spec.height
        );

        Arc::new(HeadlessContext {
            head: Arc::new(StyleHead::new(format!("sandbox:{}", spec.session_id))),
            parsed_at: Instant::now() + self.parse_delay,
            allowed_globals: self.allowed_globals.clone(),
            ready,
            globals: Mutex::new(BTreeMap::new()),
            surface: Mutex::new(None),
            attempts: AtomicUsize::new(0),
            destroyed: AtomicBool::new(false),
            spec,
        })
    }
}

impl Default for HeadlessRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SandboxRuntime for HeadlessRuntime {
    fn name(&self) -> &str {
        "headless"
    }

    async fn create_context(&self, spec: ContextSpec) -> Result<Arc<dyn SandboxContext>> {
        let context: Arc<dyn SandboxContext> = self.create_headless(spec).await;
        Ok(context)
    }
}

/// 헤드리스 컨텍스트
pub struct HeadlessContext {
    spec: ContextSpec,
    head: Arc<StyleHead>,
    parsed_at: Instant,
    allowed_globals: BTreeSet<String>,
    ready: Option<ReadySignal>,
    /// 설치된 전역 (이름 → 설명)
    globals: Mutex<BTreeMap<String, String>>,
    surface: Mutex<Option<CapabilitySurface>>,
    attempts: AtomicUsize,
    destroyed: AtomicBool,
}

impl HeadlessContext {
    pub fn spec(&self) -> &ContextSpec {
        &self.spec
    }

    pub fn document(&self) -> &str {
        &self.spec.document
    }

    pub fn installed_globals(&self) -> Vec<String> {
        self.globals.lock().keys().cloned().collect()
    }

    pub fn surface(&self) -> Option<CapabilitySurface> {
        self.surface.lock().clone()
    }

    /// 주입 시도 횟수
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// 샌드박스 내 탐색 시도
    pub fn navigate(&self, url: &str) -> Result<()> {
        if !self.spec.policy.allow_navigation {
            return Err(Error::Sandbox(format!("Navigation to {} is not allowed", url)));
        }
        trace!("Sandbox {} navigating to {}", self.spec.session_id, url);
        Ok(())
    }

    fn is_parsed(&self) -> bool {
        Instant::now() >= self.parsed_at
    }
}

#[async_trait]
impl SandboxContext for HeadlessContext {
    fn session_id(&self) -> &str {
        &self.spec.session_id
    }

    fn head(&self) -> Option<Arc<StyleHead>> {
        if self.is_destroyed() || !self.is_parsed() {
            return None;
        }
        Some(Arc::clone(&self.head))
    }

    fn ready_signal(&self) -> Option<ReadySignal> {
        self.ready.clone()
    }

    async fn inject(&self, surface: &CapabilitySurface) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.is_destroyed() {
            return Err(Error::Sandbox("Context already destroyed".into()));
        }
        if !self.spec.policy.allow_scripts {
            return Err(Error::Sandbox("Scripts are disabled for this context".into()));
        }
        if !self.is_parsed() {
            return Err(Error::Sandbox("Document is not parsed yet".into()));
        }
        if !Arc::ptr_eq(&surface.style_root, &self.head) {
            return Err(Error::Sandbox("Style root must be the sandbox head".into()));
        }

        let names = surface.globals();
        if let Some(name) = names.iter().find(|n| !self.allowed_globals.contains(**n)) {
            return Err(Error::Sandbox(format!("Global {} is not allowed", name)));
        }

        let mut globals = self.globals.lock();
        if !globals.is_empty() {
            return Err(Error::Sandbox("Capability surface already injected".into()));
        }

        globals.insert(BRIDGE_GLOBAL.into(), format!("command bridge for {}", surface.plugin_id()));
        globals.insert(THEME_GLOBAL.into(), format!("{:?} theme", surface.theme.mode));
        globals.insert(STYLE_ROOT_GLOBAL.into(), surface.style_root.name().to_string());
        for module in &surface.modules {
            globals.insert(module.global.clone(), module.url.to_string());
        }
        *self.surface.lock() = Some(surface.clone());

        debug!("Injected {} globals into {}", globals.len(), self.spec.session_id);
        Ok(())
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    async fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::SeqCst) {
            self.globals.lock().clear();
            *self.surface.lock() = None;
            debug!("Destroyed headless context {}", self.spec.session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::surface::{CommandBridge, SharedModuleRef};
    use crate::plugin::{
        ActionResult, CommandEntry, CommandResult, FileLoadResult, HostMessage, PluginDescriptor,
        PluginHost,
    };
    use quill_foundation::ThemeConfig;
    use serde_json::Value;
    use std::path::PathBuf;
    use tokio::sync::broadcast;

    struct EchoHost;

    #[async_trait]
    impl PluginHost for EchoHost {
        async fn list_available(&self) -> Result<Vec<PluginDescriptor>> {
            Ok(Vec::new())
        }
        async fn list_installed(&self) -> Result<Vec<PluginDescriptor>> {
            Ok(Vec::new())
        }
        async fn list_local(&self) -> Result<Vec<PluginDescriptor>> {
            Ok(Vec::new())
        }
        async fn get_details(&self, _id: &str) -> Result<Option<PluginDescriptor>> {
            Ok(None)
        }
        async fn list_commands(&self) -> Result<Vec<CommandEntry>> {
            Ok(Vec::new())
        }
        async fn install(&self, _id: &str) -> Result<ActionResult> {
            Ok(ActionResult::ok())
        }
        async fn uninstall(&self, _id: &str) -> Result<ActionResult> {
            Ok(ActionResult::ok())
        }
        async fn enable(&self, _id: &str) -> Result<ActionResult> {
            Ok(ActionResult::ok())
        }
        async fn disable(&self, _id: &str) -> Result<ActionResult> {
            Ok(ActionResult::ok())
        }
        async fn execute_command(
            &self,
            plugin_id: &str,
            command_id: &str,
            _payload: Value,
        ) -> Result<CommandResult> {
            Ok(CommandResult::ok(Some(Value::String(format!("{}/{}", plugin_id, command_id)))))
        }
        fn subscribe(&self) -> broadcast::Receiver<HostMessage> {
            broadcast::channel(1).1
        }
        async fn load_plugin_file(&self, _id: &str, _url: &str) -> Result<FileLoadResult> {
            Ok(FileLoadResult::failed("unsupported"))
        }
        async fn open_plugin_folder(&self, _id: &str) -> Result<PathBuf> {
            Ok(PathBuf::new())
        }
        async fn open_plugins_directory(&self) -> Result<PathBuf> {
            Ok(PathBuf::new())
        }
    }

    fn spec(policy: SandboxPolicy) -> ContextSpec {
        ContextSpec {
            session_id: "s1".into(),
            plugin_id: "p1".into(),
            title: "P1".into(),
            width: 800,
            height: 600,
            resizable: true,
            closable: true,
            document: "<head></head>".into(),
            base_url: Url::parse("https://host/plugins/p1/").unwrap(),
            policy,
        }
    }

    fn surface(head: Arc<StyleHead>, modules: Vec<SharedModuleRef>) -> CapabilitySurface {
        CapabilitySurface {
            bridge: CommandBridge::new("p1", Arc::new(EchoHost)),
            theme: ThemeConfig::default(),
            modules,
            style_root: head,
        }
    }

    #[tokio::test]
    async fn test_inject_once_with_bound_bridge() {
        let runtime = HeadlessRuntime::new();
        let context = runtime.create_headless(spec(SandboxPolicy::default())).await;
        let head = context.head().unwrap();

        context.inject(&surface(head.clone(), Vec::new())).await.unwrap();
        assert!(context.installed_globals().contains(&BRIDGE_GLOBAL.to_string()));
        assert!(context.inject(&surface(head, Vec::new())).await.is_err());

        let bridge = context.surface().unwrap().bridge;
        let result = bridge.execute("go", Value::Null).await.unwrap();
        assert_eq!(result.data, Some(Value::String("p1/go".into())));
    }

    #[tokio::test]
    async fn test_globals_outside_allowlist_are_rejected() {
        let runtime = HeadlessRuntime::new();
        let context = runtime.create_headless(spec(SandboxPolicy::default())).await;
        let module = SharedModuleRef {
            name: "evil".into(),
            global: "window.top".into(),
            url: Url::parse("https://host/vendor/evil.js").unwrap(),
        };

        let err = context
            .inject(&surface(context.head().unwrap(), vec![module]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("window.top"));
        assert!(context.installed_globals().is_empty());
    }

    #[tokio::test]
    async fn test_policy_blocks_navigation_and_scripts() {
        let runtime = HeadlessRuntime::new();
        let context = runtime.create_headless(spec(SandboxPolicy::default())).await;
        assert!(context.navigate("https://example.com").is_err());

        let no_scripts = SandboxPolicy {
            allow_scripts: false,
            ..Default::default()
        };
        let context = runtime.create_headless(spec(no_scripts)).await;
        assert!(context
            .inject(&surface(context.head().unwrap(), Vec::new()))
            .await
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_parse_delay_and_ready_signal() {
        let runtime = HeadlessRuntime::new()
            .with_parse_delay(Duration::from_millis(30))
            .with_ready_signal(true);
        let context = runtime.create_headless(spec(SandboxPolicy::default())).await;

        assert!(context.head().is_none());
        let signal = context.ready_signal().unwrap();
        assert!(signal.wait().await);
        assert!(context.head().is_some());
    }

    #[tokio::test]
    async fn test_destroy_hides_head() {
        let runtime = HeadlessRuntime::new();
        let context = runtime.create_headless(spec(SandboxPolicy::default())).await;
        context.destroy().await;
        assert!(context.is_destroyed());
        assert!(context.head().is_none());
    }
}
