//! Sandbox Window Host - 플러그인 문서용 격리 창 관리
//!
//! ```text
//! WindowRequest
//!   │ 1. host.load_plugin_file()      실패 시 창을 만들지 않음
//!   │ 2. rewrite_document()           url(...) 해석 + <base href>
//!   │ 3. runtime.create_context()     scripts O / navigation X / host storage X
//!   │ 4. host head observe()          세션이 관찰자를 단독 소유
//!   ├─▶ injection task                ready 신호 또는 재시도 스케줄, 성공 시 1회
//!   └─▶ mirror task                   생성된 스타일을 샌드박스 head로 복제
//! close(): 관찰 해제 → 태스크 중단 → 컨텍스트 파기
//! ```

use super::rewrite::{plugin_base_url, rewrite_document};
use super::runtime::{ContextSpec, SandboxContext, SandboxPolicy, SandboxRuntime};
use super::surface::{CapabilitySurface, CommandBridge, SharedModuleRef};
use crate::document::{MutationObserver, MutationStream, StyleHead, StyleOrigin};
use crate::plugin::{
    validate_plugin_id, PluginEvent, PluginEventListener, PluginHost, WindowRequest,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use url::Url;

use quill_foundation::{Error, Result, RuntimeConfig, SharedModule, ThemeConfig};

// ============================================================================
// SandboxSession
// ============================================================================

/// 열린 샌드박스 창
pub struct SandboxSession {
    id: String,
    plugin_id: String,
    title: String,
    /// 재작성된 문서
    source: String,
    context: Arc<dyn SandboxContext>,
    injected: AtomicBool,
    closed: AtomicBool,
    /// 호스트 head 관찰자 (이 세션 전용)
    observer: MutationObserver,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SandboxSession {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_injected(&self) -> bool {
        self.injected.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// 샌드박스 head (파싱 전이거나 닫혔으면 `None`)
    pub fn head(&self) -> Option<Arc<StyleHead>> {
        self.context.head()
    }

    /// 호스트 head의 생성 스타일을 샌드박스 head로 교체 복제
    fn mirror_from(&self, host_head: &StyleHead) {
        if self.is_closed() || !self.is_injected() {
            return;
        }
        let Some(head) = self.context.head() else {
            trace!("Sandbox head of {} unavailable, skipping mirror", self.id);
            return;
        };

        let css = host_head.generated_css();
        head.replace_origin(&StyleOrigin::Mirrored, &css);
        trace!("Mirrored {} generated styles into {}", css.len(), self.id);
    }

    async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.observer.disconnect();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.context.destroy().await;
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            plugin_id: self.plugin_id.clone(),
            title: self.title.clone(),
            injected: self.is_injected(),
        }
    }
}

/// 세션 요약
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub plugin_id: String,
    pub title: String,
    pub injected: bool,
}

// ============================================================================
// SandboxWindowHost
// ============================================================================

struct InjectionPlan {
    bridge: CommandBridge,
    theme: ThemeConfig,
    modules: Vec<SharedModuleRef>,
    schedule: Vec<Duration>,
}

pub struct SandboxWindowHost {
    host: Arc<dyn PluginHost>,

    runtime: Arc<dyn SandboxRuntime>,

    host_head: Arc<StyleHead>,

    host_url: Url,

    plugin_base_path: String,

    retry_schedule: Vec<Duration>,

    shared_modules: Vec<SharedModule>,

    theme: ThemeConfig,

    sessions: Mutex<HashMap<String, Arc<SandboxSession>>>,
}

impl SandboxWindowHost {
    pub fn new(
        host: Arc<dyn PluginHost>,
        runtime: Arc<dyn SandboxRuntime>,
        host_head: Arc<StyleHead>,
        config: &RuntimeConfig,
    ) -> Result<Self> {
        Ok(Self {
            host,
            runtime,
            host_head,
            host_url: config.host_url()?,
            plugin_base_path: config.plugin_base_path.clone(),
            retry_schedule: config.retry_schedule(),
            shared_modules: config.shared_modules.clone(),
            theme: config.theme.clone(),
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// 문서 기준 URL
    pub fn base_url_for(&self, plugin_id: &str, document_url: &str) -> Result<Url> {
        plugin_base_url(&self.host_url, &self.plugin_base_path, plugin_id, document_url)
    }

    /// 문서를 가져와 재작성 (창은 만들지 않음)
    pub async fn render(&self, plugin_id: &str, document_url: &str) -> Result<String> {
        validate_plugin_id(plugin_id)?;

        let loaded = self.host.load_plugin_file(plugin_id, document_url).await?;
        if !loaded.success {
            return Err(Error::Sandbox(format!(
                "Failed to load {} for {}: {}",
                document_url,
                plugin_id,
                loaded.error.unwrap_or_else(|| "unknown error".to_string())
            )));
        }

        let base = self.base_url_for(plugin_id, document_url)?;
        Ok(rewrite_document(&loaded.content, &base))
    }

    fn resolve_modules(&self) -> Vec<SharedModuleRef> {
        self.shared_modules
            .iter()
            .filter_map(|module| match SharedModuleRef::resolve(&self.host_url, module) {
                Ok(resolved) => Some(resolved),
                Err(e) => {
                    warn!("Skipping shared module {}: {}", module.name, e);
                    None
                }
            })
            .collect()
    }

    // ========================================================================
    // 열기 / 닫기
    // ========================================================================

    /// 창 열기
    ///
    /// 문서를 가져오지 못하면 세션을 만들지 않고 에러를 반환합니다.
    pub async fn open(&self, request: &WindowRequest) -> Result<String> {
        let document = self.render(&request.plugin_id, &request.url).await?;
        let base_url = self.base_url_for(&request.plugin_id, &request.url)?;

        let session_id = uuid::Uuid::new_v4().to_string();
        let context = self
            .runtime
            .create_context(ContextSpec {
                session_id: session_id.clone(),
                plugin_id: request.plugin_id.clone(),
                title: request.display_title().to_string(),
                width: request.width,
                height: request.height,
                resizable: request.resizable,
                closable: request.closable,
                document: document.clone(),
                base_url,
                policy: SandboxPolicy::default(),
            })
            .await?;

        let (observer, stream) = self.host_head.observe();
        let session = Arc::new(SandboxSession {
            id: session_id.clone(),
            plugin_id: request.plugin_id.clone(),
            title: request.display_title().to_string(),
            source: document,
            context,
            injected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            observer,
            tasks: Mutex::new(Vec::new()),
        });

        let plan = InjectionPlan {
            bridge: CommandBridge::new(&request.plugin_id, Arc::clone(&self.host)),
            theme: self.theme.clone(),
            modules: self.resolve_modules(),
            schedule: self.retry_schedule.clone(),
        };

        let injection = tokio::spawn(run_injection(
            Arc::clone(&session),
            Arc::clone(&self.host_head),
            plan,
        ));
        let mirror = tokio::spawn(run_mirror(
            Arc::clone(&session),
            Arc::clone(&self.host_head),
            stream,
        ));
        session.tasks.lock().extend([injection, mirror]);

        self.sessions.lock().insert(session_id.clone(), session);
        info!(
            "Opened sandbox window {} for {} ({})",
            session_id, request.plugin_id, request.url
        );
        Ok(session_id)
    }

    /// 창 닫기
    pub async fn close(&self, session_id: &str) -> bool {
        let session = self.sessions.lock().remove(session_id);
        match session {
            Some(session) => {
                session.shutdown().await;
                info!("Closed sandbox window {}", session_id);
                true
            }
            None => {
                trace!("Sandbox window {} already closed", session_id);
                false
            }
        }
    }

    /// 플러그인의 모든 창 닫기
    pub async fn close_plugin(&self, plugin_id: &str) -> usize {
        let ids: Vec<String> = self
            .sessions
            .lock()
            .values()
            .filter(|s| s.plugin_id == plugin_id)
            .map(|s| s.id.clone())
            .collect();

        let mut closed = 0;
        for id in ids {
            if self.close(&id).await {
                closed += 1;
            }
        }
        closed
    }

    pub async fn close_all(&self) {
        let sessions: Vec<Arc<SandboxSession>> =
            self.sessions.lock().drain().map(|(_, s)| s).collect();
        for session in &sessions {
            session.shutdown().await;
        }
        if !sessions.is_empty() {
            info!("Closed {} sandbox windows", sessions.len());
        }
    }

    // ========================================================================
    // 조회
    // ========================================================================

    pub fn session(&self, session_id: &str) -> Option<Arc<SandboxSession>> {
        self.sessions.lock().get(session_id).cloned()
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self.sessions.lock().values().map(|s| s.info()).collect();
        infos.sort_by(|a, b| a.plugin_id.cmp(&b.plugin_id).then(a.id.cmp(&b.id)));
        infos
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

// ============================================================================
// 백그라운드 태스크
// ============================================================================

/// 주입 - 준비 신호가 있으면 기다린 뒤 스케줄에 따라 시도, 첫 성공에서 종료
async fn run_injection(
    session: Arc<SandboxSession>,
    host_head: Arc<StyleHead>,
    plan: InjectionPlan,
) {
    if let Some(signal) = session.context.ready_signal() {
        if !signal.wait().await {
            warn!("Sandbox {} ready signal dropped before ready", session.id);
            return;
        }
        debug!("Sandbox {} reported ready", session.id);
    }

    let start = Instant::now();
    let schedule = if plan.schedule.is_empty() {
        vec![Duration::ZERO]
    } else {
        plan.schedule.clone()
    };

    for (attempt, offset) in schedule.iter().enumerate() {
        tokio::time::sleep_until(start + *offset).await;

        if session.is_closed() {
            return;
        }

        let Some(style_root) = session.context.head() else {
            warn!(
                "Injection attempt {} for {} failed: sandbox document not ready",
                attempt + 1,
                session.id
            );
            continue;
        };

        let surface = CapabilitySurface {
            bridge: plan.bridge.clone(),
            theme: plan.theme.clone(),
            modules: plan.modules.clone(),
            style_root,
        };

        match session.context.inject(&surface).await {
            Ok(()) => {
                session.injected.store(true, Ordering::SeqCst);
                debug!("Injected capability surface into {} (attempt {})", session.id, attempt + 1);
                session.mirror_from(&host_head);
                return;
            }
            Err(e) => warn!(
                "Injection attempt {} for {} failed: {}",
                attempt + 1,
                session.id,
                e
            ),
        }
    }

    warn!("Giving up injection for sandbox {}", session.id);
}

/// 미러링 - 생성 스타일이 바뀐 배치마다 교체 복제
async fn run_mirror(
    session: Arc<SandboxSession>,
    host_head: Arc<StyleHead>,
    mut stream: MutationStream,
) {
    while let Some(batch) = stream.next_batch().await {
        if session.is_closed() {
            break;
        }
        if batch.iter().any(|record| record.node.is_generated()) {
            session.mirror_from(&host_head);
        }
    }
    trace!("Mirror task for {} finished", session.id);
}

// ============================================================================
// 이벤트 리스너
// ============================================================================

#[async_trait]
impl PluginEventListener for SandboxWindowHost {
    fn name(&self) -> &str {
        "sandbox-window-host"
    }

    async fn on_event(&self, event: &PluginEvent) {
        match event {
            PluginEvent::Uninstalled { plugin_id } | PluginEvent::Disabled { plugin_id } => {
                let closed = self.close_plugin(plugin_id).await;
                if closed > 0 {
                    debug!("Closed {} windows of {} after {}", closed, plugin_id, event.kind());
                }
            }
            _ => {}
        }
    }

    async fn on_window_request(&self, request: &WindowRequest) {
        if let Err(e) = self.open(request).await {
            warn!("Window request from {} rejected: {}", request.plugin_id, e);
        }
    }
}
