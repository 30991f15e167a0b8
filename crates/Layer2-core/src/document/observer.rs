//! Mutation observation for a [`StyleHead`](super::StyleHead)

use super::head::StyleNode;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// 변경 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Added,
    Removed,
    Updated,
}

/// 단일 노드 변경 기록
#[derive(Debug, Clone)]
pub struct MutationRecord {
    pub kind: MutationKind,
    pub node: StyleNode,
}

impl MutationRecord {
    pub fn new(kind: MutationKind, node: StyleNode) -> Self {
        Self { kind, node }
    }
}

/// 한 번의 조작으로 발생한 변경 묶음
pub type MutationBatch = Vec<MutationRecord>;

pub(crate) type ObserverMap = Arc<Mutex<HashMap<u64, mpsc::UnboundedSender<MutationBatch>>>>;

/// 관찰 해제 핸들
///
/// 소유자가 하나뿐이며, `disconnect()` 또는 drop 시점에 head에서 분리됩니다.
pub struct MutationObserver {
    id: u64,
    observers: ObserverMap,
    connected: AtomicBool,
}

impl MutationObserver {
    pub(crate) fn new(id: u64, observers: ObserverMap) -> Self {
        Self {
            id,
            observers,
            connected: AtomicBool::new(true),
        }
    }

    /// 관찰 해제
    ///
    /// 이후 head 변경은 이 관찰자의 스트림으로 전달되지 않습니다.
    pub fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.observers.lock().remove(&self.id);
            trace!(observer_id = self.id, "Mutation observer disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for MutationObserver {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for MutationObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationObserver")
            .field("id", &self.id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// 변경 배치 수신 스트림
pub struct MutationStream {
    rx: mpsc::UnboundedReceiver<MutationBatch>,
}

impl MutationStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<MutationBatch>) -> Self {
        Self { rx }
    }

    /// 다음 배치 수신 (관찰 해제 후 남은 배치를 모두 소비하면 `None`)
    pub async fn next_batch(&mut self) -> Option<MutationBatch> {
        self.rx.recv().await
    }
}
