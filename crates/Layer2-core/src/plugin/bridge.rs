//! Event Bridge - 호스트 메시지 단일 구독 지점
//!
//! 호스트 메시지를 발행 순서대로 하나씩 처리합니다.
//!
//! ```text
//! host.subscribe() ──▶ EventBridge::run
//!                         │ 1. 레지스트리 반영 (commands / styles)
//!                         │ 2. 생명주기 이벤트면 명령 재조회
//!                         │ 3. 리스너 on_event / on_ui_request / on_window_request
//!                         └ 4. 종료성 이벤트면 전체 재동기화 (on_reconcile)
//! ```

use super::commands::CommandRegistry;
use super::events::{HostMessage, PluginEvent, UiRequest, WindowRequest};
use super::host::PluginHost;
use super::styles::StyleRegistry;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

// ============================================================================
// PluginEventListener
// ============================================================================

/// 리스너 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// 브릿지 리스너
///
/// 모든 메서드는 기본 구현이 있어 필요한 것만 구현하면 됩니다.
/// 같은 이벤트가 중복 전달될 수 있으므로 처리는 멱등이어야 합니다.
#[async_trait]
pub trait PluginEventListener: Send + Sync {
    /// 리스너 이름 (디버깅용)
    fn name(&self) -> &str;

    async fn on_event(&self, _event: &PluginEvent) {}

    /// 전체 재동기화 요청
    async fn on_reconcile(&self) {}

    async fn on_ui_request(&self, _request: &UiRequest) {}

    async fn on_window_request(&self, _request: &WindowRequest) {}
}

// ============================================================================
// EventBridge
// ============================================================================

pub struct EventBridge {
    host: Arc<dyn PluginHost>,

    commands: Arc<CommandRegistry>,

    styles: Arc<StyleRegistry>,

    /// 등록 순서 유지
    listeners: RwLock<Vec<(ListenerId, Arc<dyn PluginEventListener>)>>,

    listener_counter: AtomicU64,

    /// 처리한 메시지 수
    message_count: AtomicU64,
}

impl EventBridge {
    pub fn new(
        host: Arc<dyn PluginHost>,
        commands: Arc<CommandRegistry>,
        styles: Arc<StyleRegistry>,
    ) -> Self {
        Self {
            host,
            commands,
            styles,
            listeners: RwLock::new(Vec::new()),
            listener_counter: AtomicU64::new(1),
            message_count: AtomicU64::new(0),
        }
    }

    // ========================================================================
    // 구독
    // ========================================================================

    pub fn subscribe(&self, listener: Arc<dyn PluginEventListener>) -> ListenerId {
        let id = ListenerId(self.listener_counter.fetch_add(1, Ordering::SeqCst));
        debug!("Subscribed {} ({})", listener.name(), id);
        self.listeners.write().push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        let removed = listeners.len() != before;
        if removed {
            debug!("Unsubscribed {}", id);
        }
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn message_count(&self) -> u64 {
        self.message_count.load(Ordering::SeqCst)
    }

    /// 잠금을 쥔 채 await하지 않도록 스냅샷 사용
    fn snapshot(&self) -> Vec<Arc<dyn PluginEventListener>> {
        self.listeners.read().iter().map(|(_, l)| Arc::clone(l)).collect()
    }

    // ========================================================================
    // 처리
    // ========================================================================

    /// 메시지 하나 처리
    pub async fn dispatch(&self, message: HostMessage) {
        self.message_count.fetch_add(1, Ordering::SeqCst);

        match message {
            HostMessage::Plugin(event) => self.handle_event(event).await,
            HostMessage::Ui(request) => {
                trace!("UI request: {:?}", request);
                for listener in self.snapshot() {
                    listener.on_ui_request(&request).await;
                }
            }
            HostMessage::Window(request) => {
                debug!("Window request from {}: {}", request.plugin_id, request.url);
                for listener in self.snapshot() {
                    listener.on_window_request(&request).await;
                }
            }
        }
    }

    async fn handle_event(&self, event: PluginEvent) {
        debug!(
            "Plugin event {} ({})",
            event.kind(),
            event.plugin_id().unwrap_or("-")
        );

        self.apply_to_registries(&event);

        if event.needs_command_refresh() {
            self.commands.refresh_all(self.host.as_ref()).await;
        }

        for listener in self.snapshot() {
            listener.on_event(&event).await;
        }

        if event.needs_reconcile() {
            self.reconcile().await;
        }
    }

    fn apply_to_registries(&self, event: &PluginEvent) {
        match event {
            PluginEvent::CommandRegistered { plugin_id, command } => {
                self.commands.add_descriptor(plugin_id, command.clone());
            }
            PluginEvent::CommandUnregistered { plugin_id, command_id } => {
                self.commands.remove(plugin_id, command_id);
            }
            PluginEvent::ThemeRegisterStyle {
                plugin_id,
                style_id,
                css,
                priority,
            } => {
                self.styles.register(plugin_id, style_id, css, *priority);
            }
            PluginEvent::ThemeUpdateStyle {
                plugin_id,
                style_id,
                css,
                priority,
            } => {
                self.styles.update(plugin_id, style_id, css, *priority);
            }
            PluginEvent::ThemeUnregisterStyle { plugin_id, style_id } => {
                self.styles.unregister(plugin_id, style_id);
            }
            PluginEvent::Uninstalled { plugin_id } => {
                self.commands.remove_plugin(plugin_id);
                self.styles.unregister_all(plugin_id);
            }
            PluginEvent::Disabled { plugin_id } => {
                self.styles.unregister_all(plugin_id);
            }
            PluginEvent::Error { plugin_id, error } => {
                warn!("Plugin {} reported error: {}", plugin_id, error);
            }
            PluginEvent::Installed { .. }
            | PluginEvent::Enabled { .. }
            | PluginEvent::Ready { .. }
            | PluginEvent::Stopped { .. } => {}
            PluginEvent::Unknown => {
                warn!("Unknown plugin event received, reconciling");
            }
        }
    }

    /// 전체 재동기화
    pub async fn reconcile(&self) {
        debug!("Reconciling plugin state");
        self.commands.refresh_all(self.host.as_ref()).await;
        for listener in self.snapshot() {
            listener.on_reconcile().await;
        }
    }

    // ========================================================================
    // 펌프
    // ========================================================================

    /// 스트림이 닫힐 때까지 메시지 처리
    ///
    /// 수신이 밀려 메시지를 잃으면 전체 재동기화로 복구합니다.
    ///
    /// `stop`이 바뀌면 이미 도착한 메시지를 모두 처리한 뒤 종료합니다.
    pub async fn run(
        &self,
        mut rx: broadcast::Receiver<HostMessage>,
        mut stop: watch::Receiver<bool>,
    ) {
        info!("Event bridge started");
        loop {
            tokio::select! {
                biased;
                received = rx.recv() => match received {
                    Ok(message) => self.dispatch(message).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Event bridge lagged, {} messages dropped", skipped);
                        self.reconcile().await;
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = stop.changed() => {
                    let drained = self.drain(&mut rx).await;
                    debug!("Event bridge drained {} queued messages", drained);
                    break;
                }
            }
        }
        info!("Event bridge stopped");
    }

    /// 대기 중인 메시지를 기다리지 않고 모두 처리
    async fn drain(&self, rx: &mut broadcast::Receiver<HostMessage>) -> usize {
        let mut drained = 0;
        loop {
            match rx.try_recv() {
                Ok(message) => {
                    self.dispatch(message).await;
                    drained += 1;
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("Event bridge lagged, {} messages dropped", skipped);
                    self.reconcile().await;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return drained,
            }
        }
    }

    /// 펌프 태스크 시작
    pub fn spawn(self: &Arc<Self>, rx: broadcast::Receiver<HostMessage>) -> BridgePump {
        let bridge = Arc::clone(self);
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move { bridge.run(rx, stop_rx).await });
        BridgePump { task, stop }
    }
}

// ============================================================================
// BridgePump
// ============================================================================

/// 실행 중인 펌프 태스크 핸들
pub struct BridgePump {
    task: JoinHandle<()>,
    stop: watch::Sender<bool>,
}

impl BridgePump {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// 대기 중인 메시지를 처리하게 한 뒤 종료 (`timeout` 안에 끝나지 않으면 중단)
    pub async fn stop(mut self, timeout: Duration) {
        let _ = self.stop.send(true);
        if tokio::time::timeout(timeout, &mut self.task).await.is_err() {
            warn!("Event bridge did not drain within {:?}, aborting", timeout);
            self.task.abort();
        }
    }
}
