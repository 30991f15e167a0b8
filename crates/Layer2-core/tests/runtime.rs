//! 런타임 통합 테스트 - 메모리 호스트로 브릿지/스토어/샌드박스 창 검증
//!
//! `cargo test -p quill-core --test runtime`

use async_trait::async_trait;
use parking_lot::Mutex;
use quill_core::plugin::{CommandPatch, ListenerId};
use quill_core::sandbox::HeadlessRuntime;
use quill_core::{
    ActionResult, CommandDescriptor, CommandEntry, CommandResult, Error, FileLoadResult,
    HostMessage, PluginDescriptor, PluginEvent, PluginEventListener, PluginHost, PluginRuntime,
    Result, RuntimeConfig, StyleOrigin, UiRequest, WindowRequest,
};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

// ============================================================================
// MockHost
// ============================================================================

#[derive(Default)]
struct MockState {
    available: Vec<PluginDescriptor>,
    commands: Vec<CommandEntry>,
    files: HashMap<(String, String), String>,
    action_failure: Option<String>,
}

struct MockHost {
    tx: broadcast::Sender<HostMessage>,
    state: Mutex<MockState>,
    /// 전송 실패 흉내
    offline: AtomicBool,
    block_install: AtomicBool,
    install_gate: Notify,
    list_calls: AtomicUsize,
}

impl MockHost {
    fn new() -> Arc<Self> {
        let (tx, _) = broadcast::channel(64);
        Arc::new(Self {
            tx,
            state: Mutex::new(MockState::default()),
            offline: AtomicBool::new(false),
            block_install: AtomicBool::new(false),
            install_gate: Notify::new(),
            list_calls: AtomicUsize::new(0),
        })
    }

    fn with_document(self: Arc<Self>, plugin_id: &str, url: &str, content: &str) -> Arc<Self> {
        self.state
            .lock()
            .files
            .insert((plugin_id.to_string(), url.to_string()), content.to_string());
        self
    }

    fn emit(&self, message: impl Into<HostMessage>) {
        let _ = self.tx.send(message.into());
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::transport("bridge unreachable"));
        }
        Ok(())
    }

    fn action(&self) -> Result<ActionResult> {
        self.check_online()?;
        Ok(match &self.state.lock().action_failure {
            Some(error) => ActionResult::failed(error.clone()),
            None => ActionResult::ok(),
        })
    }
}

#[async_trait]
impl PluginHost for MockHost {
    async fn list_available(&self) -> Result<Vec<PluginDescriptor>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        Ok(self.state.lock().available.clone())
    }

    async fn list_installed(&self) -> Result<Vec<PluginDescriptor>> {
        self.check_online()?;
        Ok(Vec::new())
    }

    async fn list_local(&self) -> Result<Vec<PluginDescriptor>> {
        self.check_online()?;
        Ok(Vec::new())
    }

    async fn get_details(&self, plugin_id: &str) -> Result<Option<PluginDescriptor>> {
        self.check_online()?;
        Ok(self
            .state
            .lock()
            .available
            .iter()
            .find(|d| d.id == plugin_id)
            .cloned())
    }

    async fn list_commands(&self) -> Result<Vec<CommandEntry>> {
        self.check_online()?;
        Ok(self.state.lock().commands.clone())
    }

    async fn install(&self, _plugin_id: &str) -> Result<ActionResult> {
        if self.block_install.load(Ordering::SeqCst) {
            self.install_gate.notified().await;
        }
        self.action()
    }

    async fn uninstall(&self, _plugin_id: &str) -> Result<ActionResult> {
        self.action()
    }

    async fn enable(&self, _plugin_id: &str) -> Result<ActionResult> {
        self.action()
    }

    async fn disable(&self, _plugin_id: &str) -> Result<ActionResult> {
        self.action()
    }

    async fn execute_command(
        &self,
        plugin_id: &str,
        command_id: &str,
        payload: Value,
    ) -> Result<CommandResult> {
        self.check_online()?;
        Ok(CommandResult::ok(Some(serde_json::json!({
            "plugin": plugin_id,
            "command": command_id,
            "payload": payload,
        }))))
    }

    fn subscribe(&self) -> broadcast::Receiver<HostMessage> {
        self.tx.subscribe()
    }

    async fn load_plugin_file(
        &self,
        plugin_id: &str,
        relative_url: &str,
    ) -> Result<FileLoadResult> {
        self.check_online()?;
        let key = (plugin_id.to_string(), relative_url.to_string());
        Ok(match self.state.lock().files.get(&key) {
            Some(content) => FileLoadResult::ok(content.clone()),
            None => FileLoadResult::failed(format!("{} not found", relative_url)),
        })
    }

    async fn open_plugin_folder(&self, plugin_id: &str) -> Result<PathBuf> {
        Ok(PathBuf::from("/plugins").join(plugin_id))
    }

    async fn open_plugins_directory(&self) -> Result<PathBuf> {
        Ok(PathBuf::from("/plugins"))
    }
}

// ============================================================================
// Helpers
// ============================================================================

#[derive(Default)]
struct RecordingListener {
    events: Mutex<Vec<String>>,
    ui_requests: Mutex<Vec<UiRequest>>,
    reconciles: AtomicUsize,
}

#[async_trait]
impl PluginEventListener for RecordingListener {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn on_event(&self, event: &PluginEvent) {
        self.events.lock().push(event.kind().to_string());
    }

    async fn on_reconcile(&self) {
        self.reconciles.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_ui_request(&self, request: &UiRequest) {
        self.ui_requests.lock().push(request.clone());
    }
}

const DOCUMENT: &str = concat!(
    r#"<html><head><style>body { background: url(img/bg.png); }</style></head>"#,
    "<body></body></html>"
);

fn runtime_with(host: Arc<MockHost>, sandbox: HeadlessRuntime) -> PluginRuntime {
    let config = RuntimeConfig::default();
    let sandbox = sandbox.allow_globals(config.shared_modules.iter().map(|m| m.global.clone()));
    PluginRuntime::new(host, Arc::new(sandbox), config).unwrap()
}

fn headless(host: Arc<MockHost>) -> PluginRuntime {
    PluginRuntime::headless(host, RuntimeConfig::default()).unwrap()
}

fn subscribe_recorder(runtime: &PluginRuntime) -> (Arc<RecordingListener>, ListenerId) {
    let recorder = Arc::new(RecordingListener::default());
    let id = runtime.bridge().subscribe(recorder.clone());
    (recorder, id)
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

fn mirrored_count(head: &quill_core::StyleHead) -> usize {
    head.nodes().iter().filter(|n| n.is_mirrored()).count()
}

// ============================================================================
// Event bridge
// ============================================================================

#[tokio::test]
async fn test_register_twice_then_uninstall_leaves_no_commands() {
    let host = MockHost::new();
    let runtime = headless(host.clone());
    let bridge = runtime.bridge();

    bridge
        .dispatch(PluginEvent::Installed { plugin_id: "p1".into() }.into())
        .await;
    for _ in 0..2 {
        bridge
            .dispatch(
                PluginEvent::CommandRegistered {
                    plugin_id: "p1".into(),
                    command: CommandDescriptor::new("c1", "Count words"),
                }
                .into(),
            )
            .await;
    }
    assert_eq!(runtime.commands().len(), 1);

    bridge
        .dispatch(PluginEvent::Uninstalled { plugin_id: "p1".into() }.into())
        .await;
    assert!(runtime.commands().is_empty());
    assert_eq!(bridge.message_count(), 4);
}

#[tokio::test]
async fn test_unknown_event_reconciles() {
    let host = MockHost::new();
    host.state.lock().commands = vec![CommandEntry::new(
        "p1",
        CommandDescriptor::new("c1", "Count words").with_surface("palette"),
    )];
    let runtime = headless(host.clone());
    let (recorder, _) = subscribe_recorder(&runtime);

    runtime.bridge().dispatch(PluginEvent::Unknown.into()).await;

    assert_eq!(recorder.reconciles.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.events.lock().as_slice(), ["unknown"]);
    assert_eq!(runtime.commands().list_for_surface("palette").len(), 1);
}

#[tokio::test]
async fn test_ui_request_reaches_listeners() {
    let runtime = headless(MockHost::new());
    let (recorder, id) = subscribe_recorder(&runtime);

    let request = UiRequest::OpenNote { note_id: "n1".into() };
    runtime.bridge().dispatch(HostMessage::Ui(request.clone())).await;
    assert_eq!(recorder.ui_requests.lock().as_slice(), [request]);

    assert!(runtime.bridge().unsubscribe(id));
    runtime
        .bridge()
        .dispatch(HostMessage::Ui(UiRequest::Navigate { path: "/todos".into() }))
        .await;
    assert_eq!(recorder.ui_requests.lock().len(), 1);
}

#[tokio::test]
async fn test_theme_events_drive_host_head() {
    let runtime = headless(MockHost::new());
    let bridge = runtime.bridge();
    let head = runtime.host_head();

    bridge
        .dispatch(
            PluginEvent::ThemeRegisterStyle {
                plugin_id: "dark".into(),
                style_id: "base".into(),
                css: "body { color: white; }".into(),
                priority: 10,
            }
            .into(),
        )
        .await;
    bridge
        .dispatch(
            PluginEvent::ThemeUpdateStyle {
                plugin_id: "dark".into(),
                style_id: "base".into(),
                css: "body { color: #eee; }".into(),
                priority: None,
            }
            .into(),
        )
        .await;

    let nodes = head.nodes_for_plugin("dark");
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].css, "body { color: #eee; }");
    assert_eq!(nodes[0].priority(), Some(10));

    bridge
        .dispatch(PluginEvent::Disabled { plugin_id: "dark".into() }.into())
        .await;
    assert!(head.nodes_for_plugin("dark").is_empty());
    assert!(runtime.styles().is_empty());
}

#[tokio::test]
async fn test_started_runtime_pumps_host_messages() {
    let host = MockHost::new();
    let runtime = headless(host.clone());
    runtime.start().await;
    assert!(runtime.is_running());

    host.emit(PluginEvent::CommandRegistered {
        plugin_id: "p1".into(),
        command: CommandDescriptor::new("c1", "Count words"),
    });
    wait_until(|| runtime.commands().len() == 1).await;

    runtime.commands().add("p1", "c1", CommandPatch::title("Renamed"));
    assert_eq!(runtime.commands().get("p1", "c1").unwrap().label(), "Renamed");

    runtime.shutdown().await;
    assert!(!runtime.is_running());
    assert_eq!(runtime.bridge().listener_count(), 0);
}

// ============================================================================
// Plugin store controller
// ============================================================================

#[tokio::test]
async fn test_second_action_while_pending_is_rejected() {
    let host = MockHost::new();
    host.block_install.store(true, Ordering::SeqCst);
    let runtime = Arc::new(headless(host.clone()));

    let first = {
        let runtime = Arc::clone(&runtime);
        tokio::spawn(async move { runtime.controller().install("p1").await })
    };
    wait_until(|| runtime.controller().is_pending("p1")).await;

    let err = runtime.controller().install("p1").await.unwrap_err();
    assert!(matches!(err, Error::ActionInProgress { ref plugin_id } if plugin_id == "p1"));
    assert!(runtime.controller().enable("p1").await.is_err());

    // 다른 플러그인은 영향 없음
    assert!(runtime.controller().enable("p2").await.unwrap().success);

    host.install_gate.notify_one();
    assert!(first.await.unwrap().unwrap().success);
    assert!(!runtime.controller().is_pending("p1"));
}

#[tokio::test]
async fn test_structured_failure_notifies_and_refreshes() {
    let host = MockHost::new();
    host.state.lock().available = vec![PluginDescriptor::new("p1").with_version("1.0.0")];
    host.state.lock().action_failure = Some("disk full".into());
    let runtime = headless(host.clone());

    let before = host.list_calls.load(Ordering::SeqCst);
    let result = runtime.controller().install("p1").await.unwrap();
    assert!(!result.success);
    assert!(host.list_calls.load(Ordering::SeqCst) > before);
    assert_eq!(runtime.controller().descriptors().len(), 1);

    let notifications = runtime.controller().take_notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].plugin_id, "p1");
    assert_eq!(notifications[0].message, "disk full");
    assert!(runtime.controller().take_notifications().is_empty());
    assert!(!runtime.controller().is_pending("p1"));
}

#[tokio::test]
async fn test_transport_failure_yields_empty_lists() {
    let host = MockHost::new();
    host.state.lock().available = vec![PluginDescriptor::new("p1")];
    let runtime = headless(host.clone());
    assert_eq!(runtime.controller().refresh_descriptors().await, 1);

    host.offline.store(true, Ordering::SeqCst);
    assert_eq!(runtime.controller().refresh_descriptors().await, 0);
    assert!(runtime.controller().descriptors().is_empty());
    assert!(runtime.controller().details("p1").await.is_none());

    let err = runtime.controller().install("p1").await.unwrap_err();
    assert!(err.is_transport());
    assert!(!runtime.controller().is_pending("p1"));
    assert!(runtime.controller().take_notifications().is_empty());
}

#[tokio::test]
async fn test_permissions_shown_before_install() {
    let host = MockHost::new();
    host.state.lock().available = vec![PluginDescriptor::new("sync")
        .with_permission("notes:read")
        .with_permission("telepathy")];
    let runtime = headless(host.clone());
    runtime.controller().refresh().await;

    let permissions = runtime.controller().permissions_for("sync").await.unwrap();
    assert_eq!(permissions.len(), 2);
    assert!(permissions[0].recognized);
    assert!(!permissions[1].recognized);
    assert!(runtime.controller().permissions_for("missing").await.is_none());
}

// ============================================================================
// Sandboxed windows
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_injection_retries_until_document_parsed() {
    let host = MockHost::new().with_document("p1", "index.html", DOCUMENT);
    let runtime = runtime_with(
        host,
        HeadlessRuntime::new().with_parse_delay(Duration::from_millis(100)),
    );
    runtime
        .host_head()
        .append(StyleOrigin::Generated, ".btn { color: red; }");

    let id = runtime
        .windows()
        .open(&WindowRequest::new("p1", "index.html").with_title("Word Count"))
        .await
        .unwrap();
    let session = runtime.windows().session(&id).unwrap();
    assert_eq!(session.title(), "Word Count");
    assert!(session
        .source()
        .contains("url(app://quill/plugins/p1/img/bg.png)"));

    // 0ms, 50ms 시도는 파싱 전이라 실패
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(!session.is_injected());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(session.is_injected());

    let head = session.head().unwrap();
    assert_eq!(mirrored_count(&head), 1);
    assert_eq!(head.nodes()[0].css, ".btn { color: red; }");

    // 이후 생성 스타일도 따라감
    runtime
        .host_head()
        .append(StyleOrigin::Generated, ".card { padding: 4px; }");
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(mirrored_count(&head), 2);

    // 플러그인 스타일은 복제하지 않음
    runtime.styles().register("p2", "theme", "body {}", 0);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(head.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_ready_signal_starts_schedule() {
    let host = MockHost::new().with_document("p1", "index.html", DOCUMENT);
    let runtime = runtime_with(
        host,
        HeadlessRuntime::new()
            .with_parse_delay(Duration::from_millis(100))
            .with_ready_signal(true),
    );

    let id = runtime
        .windows()
        .open(&WindowRequest::new("p1", "index.html"))
        .await
        .unwrap();
    let session = runtime.windows().session(&id).unwrap();

    tokio::time::sleep(Duration::from_millis(90)).await;
    assert!(!session.is_injected());

    // 준비 신호 직후 첫 시도에서 성공
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(session.is_injected());
}

#[tokio::test(start_paused = true)]
async fn test_closed_window_stops_mirroring() {
    let host = MockHost::new().with_document("p1", "index.html", DOCUMENT);
    let runtime = runtime_with(host, HeadlessRuntime::new());

    let id = runtime
        .windows()
        .open(&WindowRequest::new("p1", "index.html"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let session = runtime.windows().session(&id).unwrap();
    assert!(session.is_injected());
    let head = session.head().unwrap();
    assert_eq!(runtime.host_head().observer_count(), 1);

    assert!(runtime.windows().close(&id).await);
    assert!(!runtime.windows().close(&id).await);
    assert!(session.head().is_none());
    assert_eq!(runtime.host_head().observer_count(), 0);

    runtime
        .host_head()
        .append(StyleOrigin::Generated, ".late { color: blue; }");
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(head.is_empty());
    assert_eq!(runtime.windows().session_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_removed_generated_style_leaves_sandbox() {
    let host = MockHost::new().with_document("p1", "index.html", DOCUMENT);
    let runtime = runtime_with(host, HeadlessRuntime::new());
    let first = runtime
        .host_head()
        .append(StyleOrigin::Generated, ".btn { color: red; }");
    runtime
        .host_head()
        .append(StyleOrigin::Generated, ".card { padding: 4px; }");

    let id = runtime
        .windows()
        .open(&WindowRequest::new("p1", "index.html"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let session = runtime.windows().session(&id).unwrap();
    let head = session.head().unwrap();
    assert_eq!(mirrored_count(&head), 2);

    assert!(runtime.host_head().remove(first).is_some());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(mirrored_count(&head), 1);
    assert_eq!(head.nodes()[0].css, ".card { padding: 4px; }");
}

#[tokio::test(start_paused = true)]
async fn test_style_generated_before_parse_is_mirrored_on_injection() {
    let host = MockHost::new().with_document("p1", "index.html", DOCUMENT);
    let runtime = runtime_with(
        host,
        HeadlessRuntime::new().with_parse_delay(Duration::from_millis(100)),
    );

    let id = runtime
        .windows()
        .open(&WindowRequest::new("p1", "index.html"))
        .await
        .unwrap();
    let session = runtime.windows().session(&id).unwrap();

    // 파싱 전 추가된 생성 스타일은 바로 복제되지 않음
    tokio::time::sleep(Duration::from_millis(20)).await;
    runtime
        .host_head()
        .append(StyleOrigin::Generated, ".early { margin: 0; }");
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!session.is_injected());
    assert!(session.head().is_none());

    // 200ms 시도에서 주입되며 그때까지의 생성 스타일이 들어감
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(session.is_injected());
    let head = session.head().unwrap();
    assert_eq!(mirrored_count(&head), 1);
    assert_eq!(head.nodes()[0].css, ".early { margin: 0; }");
}

#[tokio::test]
async fn test_failed_fetch_creates_no_session() {
    let host = MockHost::new();
    let runtime = headless(host);

    let err = runtime
        .windows()
        .open(&WindowRequest::new("p1", "missing.html"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Sandbox(_)));
    assert_eq!(runtime.windows().session_count(), 0);
    assert_eq!(runtime.host_head().observer_count(), 0);
}

#[tokio::test]
async fn test_window_request_through_bridge() {
    let host = MockHost::new().with_document("p1", "index.html", DOCUMENT);
    let runtime = headless(host.clone());
    runtime.start().await;

    host.emit(HostMessage::Window(WindowRequest::new("p1", "index.html")));
    wait_until(|| runtime.windows().session_count() == 1).await;

    let info = &runtime.windows().sessions()[0];
    assert_eq!(info.plugin_id, "p1");
    wait_until(|| runtime.windows().sessions()[0].injected).await;

    host.emit(PluginEvent::Disabled { plugin_id: "p1".into() });
    wait_until(|| runtime.windows().session_count() == 0).await;

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_drains_queued_events() {
    let host = MockHost::new();
    let runtime = headless(host.clone());
    runtime.start().await;
    let before = runtime.bridge().message_count();

    for id in ["c1", "c2"] {
        host.emit(PluginEvent::CommandRegistered {
            plugin_id: "p1".into(),
            command: CommandDescriptor::new(id, "Count words"),
        });
    }
    runtime.shutdown().await;

    assert!(!runtime.is_running());
    assert_eq!(runtime.bridge().message_count(), before + 2);
    assert_eq!(runtime.commands().len(), 2);
}

#[tokio::test]
async fn test_shutdown_cleans_up() {
    let host = MockHost::new().with_document("p1", "index.html", DOCUMENT);
    let runtime = headless(host);
    runtime.start().await;

    runtime.styles().register("p1", "theme", "body {}", 0);
    runtime
        .windows()
        .open(&WindowRequest::new("p1", "index.html"))
        .await
        .unwrap();

    runtime.shutdown().await;
    assert!(runtime.styles().is_empty());
    assert!(runtime.host_head().nodes_for_plugin("p1").is_empty());
    assert_eq!(runtime.windows().session_count(), 0);
}
