//! StyleHead - 순서가 있는 스타일 노드 컨테이너

use super::observer::{
    MutationBatch, MutationKind, MutationObserver, MutationRecord, MutationStream, ObserverMap,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// 노드 ID (head 내에서 고유)
pub type NodeId = u64;

/// 스타일 노드 출처
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StyleOrigin {
    /// 호스트 기본 스타일
    Static,

    /// 스타일 레지스트리가 소유한 플러그인 조각
    Plugin {
        plugin_id: String,
        style_id: String,
        priority: i32,
    },

    /// 런타임에 동적으로 생성된 스타일 (컴포넌트 라이브러리 등)
    Generated,

    /// 호스트 head에서 복제된 스타일 (샌드박스 head 전용)
    Mirrored,
}

impl StyleOrigin {
    pub fn plugin(
        plugin_id: impl Into<String>,
        style_id: impl Into<String>,
        priority: i32,
    ) -> Self {
        StyleOrigin::Plugin {
            plugin_id: plugin_id.into(),
            style_id: style_id.into(),
            priority,
        }
    }
}

/// 스타일 노드
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleNode {
    pub id: NodeId,
    pub origin: StyleOrigin,
    pub css: String,
}

impl StyleNode {
    /// 플러그인 ID 태그
    pub fn plugin_id(&self) -> Option<&str> {
        match &self.origin {
            StyleOrigin::Plugin { plugin_id, .. } => Some(plugin_id),
            _ => None,
        }
    }

    /// 플러그인 조각 우선순위
    pub fn priority(&self) -> Option<i32> {
        match &self.origin {
            StyleOrigin::Plugin { priority, .. } => Some(*priority),
            _ => None,
        }
    }

    /// (pluginId, styleId) 태그 일치 여부
    pub fn is_fragment(&self, plugin: &str, style: &str) -> bool {
        matches!(
            &self.origin,
            StyleOrigin::Plugin { plugin_id, style_id, .. }
                if plugin_id == plugin && style_id == style
        )
    }

    pub fn is_generated(&self) -> bool {
        self.origin == StyleOrigin::Generated
    }

    pub fn is_mirrored(&self) -> bool {
        self.origin == StyleOrigin::Mirrored
    }
}

/// 스타일 노드 컨테이너
///
/// 모든 조작은 짧은 동기 잠금 안에서 끝나며, 조작 하나당 관찰자에게
/// 하나의 [`MutationBatch`]가 전달됩니다.
pub struct StyleHead {
    /// 디버깅용 이름 ("host", "sandbox:<id>")
    name: String,

    nodes: Mutex<Vec<StyleNode>>,

    node_counter: AtomicU64,

    observers: ObserverMap,

    observer_counter: AtomicU64,
}

impl StyleHead {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Mutex::new(Vec::new()),
            node_counter: AtomicU64::new(1),
            observers: Arc::new(Mutex::new(HashMap::new())),
            observer_counter: AtomicU64::new(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn next_id(&self) -> NodeId {
        self.node_counter.fetch_add(1, Ordering::SeqCst)
    }

    // ========================================================================
    // 관찰
    // ========================================================================

    /// 변경 관찰 시작
    pub fn observe(&self) -> (MutationObserver, MutationStream) {
        let id = self.observer_counter.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.lock().insert(id, tx);
        trace!(head = %self.name, observer_id = id, "Mutation observer connected");
        (
            MutationObserver::new(id, Arc::clone(&self.observers)),
            MutationStream::new(rx),
        )
    }

    /// 연결된 관찰자 수
    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    fn notify(&self, batch: MutationBatch) {
        if batch.is_empty() {
            return;
        }
        let mut observers = self.observers.lock();
        observers.retain(|_, tx| tx.send(batch.clone()).is_ok());
    }

    // ========================================================================
    // 삽입
    // ========================================================================

    /// 끝에 추가
    pub fn append(&self, origin: StyleOrigin, css: impl Into<String>) -> NodeId {
        self.insert_before_first(origin, css, |_| false)
    }

    /// `anchor` 노드 바로 앞에 삽입 (anchor가 없으면 끝에 추가)
    pub fn insert_before(
        &self,
        anchor: NodeId,
        origin: StyleOrigin,
        css: impl Into<String>,
    ) -> NodeId {
        self.insert_before_first(origin, css, |node| node.id == anchor)
    }

    /// 조건을 만족하는 첫 노드 앞에 삽입 (없으면 끝에 추가)
    ///
    /// 위치 계산과 삽입이 같은 잠금 안에서 이루어집니다.
    pub fn insert_before_first<F>(
        &self,
        origin: StyleOrigin,
        css: impl Into<String>,
        predicate: F,
    ) -> NodeId
    where
        F: Fn(&StyleNode) -> bool,
    {
        let node = StyleNode {
            id: self.next_id(),
            origin,
            css: css.into(),
        };
        let id = node.id;

        {
            let mut nodes = self.nodes.lock();
            match nodes.iter().position(|n| predicate(n)) {
                Some(index) => nodes.insert(index, node.clone()),
                None => nodes.push(node.clone()),
            }
        }

        trace!(head = %self.name, node_id = id, "Style node inserted");
        self.notify(vec![MutationRecord::new(MutationKind::Added, node)]);
        id
    }

    // ========================================================================
    // 수정 / 삭제
    // ========================================================================

    /// 내용만 교체 (노드 재사용)
    pub fn set_css(&self, id: NodeId, css: impl Into<String>) -> bool {
        let updated = {
            let mut nodes = self.nodes.lock();
            match nodes.iter_mut().find(|n| n.id == id) {
                Some(node) => {
                    node.css = css.into();
                    Some(node.clone())
                }
                None => None,
            }
        };

        match updated {
            Some(node) => {
                self.notify(vec![MutationRecord::new(MutationKind::Updated, node)]);
                true
            }
            None => false,
        }
    }

    /// 노드 삭제
    pub fn remove(&self, id: NodeId) -> Option<StyleNode> {
        let removed = {
            let mut nodes = self.nodes.lock();
            nodes
                .iter()
                .position(|n| n.id == id)
                .map(|index| nodes.remove(index))
        };

        if let Some(ref node) = removed {
            self.notify(vec![MutationRecord::new(MutationKind::Removed, node.clone())]);
        }
        removed
    }

    /// 조건을 만족하는 모든 노드 삭제
    pub fn remove_where<F>(&self, predicate: F) -> Vec<StyleNode>
    where
        F: Fn(&StyleNode) -> bool,
    {
        let removed: Vec<StyleNode> = {
            let mut nodes = self.nodes.lock();
            let mut removed = Vec::new();
            nodes.retain(|n| {
                if predicate(n) {
                    removed.push(n.clone());
                    false
                } else {
                    true
                }
            });
            removed
        };

        self.notify(
            removed
                .iter()
                .cloned()
                .map(|n| MutationRecord::new(MutationKind::Removed, n))
                .collect(),
        );
        removed
    }

    /// 특정 출처의 노드를 모두 교체 (한 배치)
    ///
    /// 기존 노드를 제거한 뒤 새 내용을 끝에 추가합니다.
    pub fn replace_origin(&self, origin: &StyleOrigin, css_list: &[String]) -> Vec<NodeId> {
        let mut batch = Vec::new();
        let mut ids = Vec::with_capacity(css_list.len());

        {
            let mut nodes = self.nodes.lock();
            nodes.retain(|n| {
                if &n.origin == origin {
                    batch.push(MutationRecord::new(MutationKind::Removed, n.clone()));
                    false
                } else {
                    true
                }
            });

            for css in css_list {
                let node = StyleNode {
                    id: self.next_id(),
                    origin: origin.clone(),
                    css: css.clone(),
                };
                ids.push(node.id);
                batch.push(MutationRecord::new(MutationKind::Added, node.clone()));
                nodes.push(node);
            }
        }

        self.notify(batch);
        ids
    }

    /// 모든 노드 삭제
    pub fn clear(&self) -> usize {
        self.remove_where(|_| true).len()
    }

    // ========================================================================
    // 조회
    // ========================================================================

    pub fn get(&self, id: NodeId) -> Option<StyleNode> {
        self.nodes.lock().iter().find(|n| n.id == id).cloned()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.lock().iter().any(|n| n.id == id)
    }

    pub fn position(&self, id: NodeId) -> Option<usize> {
        self.nodes.lock().iter().position(|n| n.id == id)
    }

    /// 현재 노드 스냅샷 (문서 순서)
    pub fn nodes(&self) -> Vec<StyleNode> {
        self.nodes.lock().clone()
    }

    /// 플러그인 태그가 붙은 노드
    pub fn nodes_for_plugin(&self, plugin_id: &str) -> Vec<StyleNode> {
        self.nodes
            .lock()
            .iter()
            .filter(|n| n.plugin_id() == Some(plugin_id))
            .cloned()
            .collect()
    }

    /// 동적 생성 노드의 CSS (문서 순서)
    pub fn generated_css(&self) -> Vec<String> {
        self.nodes
            .lock()
            .iter()
            .filter(|n| n.is_generated())
            .map(|n| n.css.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.lock().is_empty()
    }
}

impl std::fmt::Debug for StyleHead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StyleHead")
            .field("name", &self.name)
            .field("nodes", &self.len())
            .field("observers", &self.observer_count())
            .finish()
    }
}
