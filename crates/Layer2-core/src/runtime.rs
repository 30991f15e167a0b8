//! PluginRuntime - 런타임 구성 요소 조립
//!
//! 셸 시작 시 `start()`, 종료 시 `shutdown()`을 호출합니다. 전역 상태 없이
//! 모든 구성 요소를 이 인스턴스가 소유합니다.

use crate::document::StyleHead;
use crate::plugin::{
    BridgePump, CommandRegistry, EventBridge, ListenerId, PluginEventListener, PluginHost,
    PluginStoreController, StyleRegistry,
};
use crate::sandbox::{HeadlessRuntime, SandboxRuntime, SandboxWindowHost};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use quill_foundation::{Result, RuntimeConfig};

/// 종료 시 대기 중인 호스트 메시지 처리에 허용하는 시간
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

pub struct PluginRuntime {
    config: RuntimeConfig,
    host: Arc<dyn PluginHost>,
    host_head: Arc<StyleHead>,
    commands: Arc<CommandRegistry>,
    styles: Arc<StyleRegistry>,
    bridge: Arc<EventBridge>,
    windows: Arc<SandboxWindowHost>,
    controller: Arc<PluginStoreController>,
    pump: Mutex<Option<BridgePump>>,
    listeners: Mutex<Vec<ListenerId>>,
}

impl PluginRuntime {
    pub fn new(
        host: Arc<dyn PluginHost>,
        sandbox: Arc<dyn SandboxRuntime>,
        config: RuntimeConfig,
    ) -> Result<Self> {
        config.validate()?;

        let host_head = Arc::new(StyleHead::new("host"));
        let commands = Arc::new(CommandRegistry::new());
        let styles = Arc::new(StyleRegistry::new(Arc::clone(&host_head)));
        let bridge = Arc::new(EventBridge::new(
            Arc::clone(&host),
            Arc::clone(&commands),
            Arc::clone(&styles),
        ));
        let windows = Arc::new(SandboxWindowHost::new(
            Arc::clone(&host),
            sandbox,
            Arc::clone(&host_head),
            &config,
        )?);
        let controller = Arc::new(PluginStoreController::new(
            Arc::clone(&host),
            Arc::clone(&commands),
        ));

        Ok(Self {
            config,
            host,
            host_head,
            commands,
            styles,
            bridge,
            windows,
            controller,
            pump: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// 프로세스 내 헤드리스 샌드박스로 생성
    pub fn headless(host: Arc<dyn PluginHost>, config: RuntimeConfig) -> Result<Self> {
        let sandbox = HeadlessRuntime::new()
            .allow_globals(config.shared_modules.iter().map(|m| m.global.clone()));
        Self::new(host, Arc::new(sandbox), config)
    }

    /// 시작
    ///
    /// 초기 조회 전에 구독해 그 사이에 발행된 이벤트도 처리합니다.
    pub async fn start(&self) {
        if self.is_running() {
            debug!("Plugin runtime already running");
            return;
        }

        let rx = self.host.subscribe();

        {
            let mut listeners = self.listeners.lock();
            let controller: Arc<dyn PluginEventListener> = self.controller.clone();
            let windows: Arc<dyn PluginEventListener> = self.windows.clone();
            listeners.push(self.bridge.subscribe(controller));
            listeners.push(self.bridge.subscribe(windows));
        }

        self.controller.refresh().await;
        *self.pump.lock() = Some(self.bridge.spawn(rx));

        info!(
            "Plugin runtime started ({} plugins, {} commands)",
            self.controller.descriptors().len(),
            self.commands.len()
        );
    }

    /// 종료 - 대기 중인 메시지를 처리하고 펌프를 멈춘 뒤 창과 스타일 정리
    pub async fn shutdown(&self) {
        let pump = self.pump.lock().take();
        if let Some(pump) = pump {
            pump.stop(DRAIN_TIMEOUT).await;
        }

        let ids: Vec<ListenerId> = self.listeners.lock().drain(..).collect();
        for id in ids {
            self.bridge.unsubscribe(id);
        }

        self.windows.close_all().await;
        self.styles.shutdown();
        info!("Plugin runtime shut down");
    }

    pub fn is_running(&self) -> bool {
        self.pump
            .lock()
            .as_ref()
            .is_some_and(|pump| !pump.is_finished())
    }

    // ========================================================================
    // 접근자
    // ========================================================================

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn host(&self) -> &Arc<dyn PluginHost> {
        &self.host
    }

    pub fn host_head(&self) -> &Arc<StyleHead> {
        &self.host_head
    }

    pub fn commands(&self) -> &Arc<CommandRegistry> {
        &self.commands
    }

    pub fn styles(&self) -> &Arc<StyleRegistry> {
        &self.styles
    }

    pub fn bridge(&self) -> &Arc<EventBridge> {
        &self.bridge
    }

    pub fn windows(&self) -> &Arc<SandboxWindowHost> {
        &self.windows
    }

    pub fn controller(&self) -> &Arc<PluginStoreController> {
        &self.controller
    }
}
