//! Style Registry - 플러그인 스타일 조각 관리
//!
//! 조각은 head 안에서 우선순위 오름차순으로 유지됩니다. 나중에 적용된
//! 규칙이 이기므로 우선순위가 높은 조각이 최종적으로 적용됩니다.
//! 같은 우선순위는 등록 순서를 유지합니다.
//!
//! 잠금 순서: `entries` → head

use crate::document::{NodeId, StyleHead, StyleOrigin};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// 등록된 스타일 조각
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleFragment {
    pub plugin_id: String,
    pub style_id: String,
    pub css: String,
    pub priority: i32,
}

#[derive(Debug, Clone)]
struct FragmentEntry {
    node_id: NodeId,
    priority: i32,
    css: String,
}

type FragmentKey = (String, String);

/// 스타일 레지스트리
///
/// 조각과 그 노드를 단독으로 소유합니다.
pub struct StyleRegistry {
    head: Arc<StyleHead>,
    entries: Mutex<HashMap<FragmentKey, FragmentEntry>>,
}

impl StyleRegistry {
    pub fn new(head: Arc<StyleHead>) -> Self {
        Self {
            head,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn head(&self) -> &Arc<StyleHead> {
        &self.head
    }

    // ========================================================================
    // 등록
    // ========================================================================

    /// 조각 등록
    ///
    /// 같은 키와 같은 우선순위면 노드를 재사용해 내용만 바꾸고,
    /// 우선순위가 다르면 제거 후 새 위치에 다시 삽입합니다.
    /// 인자가 비어 있으면 `false`.
    pub fn register(&self, plugin_id: &str, style_id: &str, css: &str, priority: i32) -> bool {
        if plugin_id.is_empty() || style_id.is_empty() || css.is_empty() {
            warn!(
                "Rejected style registration with missing arguments (plugin: {:?}, style: {:?})",
                plugin_id, style_id
            );
            return false;
        }

        let key = (plugin_id.to_string(), style_id.to_string());
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.get_mut(&key) {
            if entry.priority == priority && self.head.set_css(entry.node_id, css) {
                entry.css = css.to_string();
                debug!("Updated style {}/{} in place", plugin_id, style_id);
                return true;
            }
            self.head.remove(entry.node_id);
        }

        // 레지스트리에 없는 같은 태그 노드 정리
        let stray = self.head.remove_where(|n| n.is_fragment(plugin_id, style_id));
        if !stray.is_empty() {
            trace!("Removed {} stray nodes for {}/{}", stray.len(), plugin_id, style_id);
        }

        let node_id = self.head.insert_before_first(
            StyleOrigin::plugin(plugin_id, style_id, priority),
            css,
            |n| n.priority().is_some_and(|p| p > priority),
        );

        entries.insert(
            key,
            FragmentEntry {
                node_id,
                priority,
                css: css.to_string(),
            },
        );
        debug!("Registered style {}/{} (priority {})", plugin_id, style_id, priority);
        true
    }

    /// theme-update 경로 - 우선순위가 없으면 기존 값 유지
    pub fn update(
        &self,
        plugin_id: &str,
        style_id: &str,
        css: &str,
        priority: Option<i32>,
    ) -> bool {
        let priority = match priority {
            Some(p) => p,
            None => self
                .entries
                .lock()
                .get(&(plugin_id.to_string(), style_id.to_string()))
                .map(|e| e.priority)
                .unwrap_or(0),
        };
        self.register(plugin_id, style_id, css, priority)
    }

    // ========================================================================
    // 해제
    // ========================================================================

    /// 조각 해제
    ///
    /// 레지스트리 항목과 head 노드를 각각 제거합니다. 어느 한쪽만 남아
    /// 있어도 정리됩니다.
    pub fn unregister(&self, plugin_id: &str, style_id: &str) -> bool {
        if plugin_id.is_empty() || style_id.is_empty() {
            warn!("Rejected style removal with missing arguments");
            return false;
        }

        let mut entries = self.entries.lock();
        let entry = entries.remove(&(plugin_id.to_string(), style_id.to_string()));

        if let Some(ref entry) = entry {
            self.head.remove(entry.node_id);
        }
        let stray = self.head.remove_where(|n| n.is_fragment(plugin_id, style_id));

        if entry.is_some() || !stray.is_empty() {
            debug!("Unregistered style {}/{}", plugin_id, style_id);
        } else {
            trace!("Style {}/{} was not registered", plugin_id, style_id);
        }
        true
    }

    /// 플러그인의 모든 조각 해제
    ///
    /// 레지스트리 항목을 지운 뒤 head 전체를 스캔해 남은 태그 노드도
    /// 제거합니다. 제거된 노드 수를 반환하며, 플러그인 ID가 비어 있으면
    /// `None`입니다.
    pub fn unregister_all(&self, plugin_id: &str) -> Option<usize> {
        if plugin_id.is_empty() {
            warn!("Rejected style removal with missing plugin id");
            return None;
        }

        let mut entries = self.entries.lock();
        let mut removed = 0;

        entries.retain(|(p, _), entry| {
            if p == plugin_id {
                if self.head.remove(entry.node_id).is_some() {
                    removed += 1;
                }
                false
            } else {
                true
            }
        });

        let stray = self.head.remove_where(|n| n.plugin_id() == Some(plugin_id));
        if !stray.is_empty() {
            warn!(
                "Removed {} untracked style nodes of plugin {}",
                stray.len(),
                plugin_id
            );
        }
        removed += stray.len();

        if removed > 0 {
            debug!("Unregistered {} styles of plugin {}", removed, plugin_id);
        }
        Some(removed)
    }

    /// 모든 조각 제거 (셸 종료 시)
    pub fn shutdown(&self) {
        let mut entries = self.entries.lock();
        entries.clear();
        let removed = self
            .head
            .remove_where(|n| matches!(n.origin, StyleOrigin::Plugin { .. }));
        info!("Style registry shut down ({} nodes removed)", removed.len());
    }

    // ========================================================================
    // 조회
    // ========================================================================

    /// head 순서대로 등록된 조각
    pub fn fragments(&self) -> Vec<StyleFragment> {
        let entries = self.entries.lock();
        let mut ordered: Vec<(usize, StyleFragment)> = entries
            .iter()
            .filter_map(|((plugin_id, style_id), entry)| {
                self.head.position(entry.node_id).map(|pos| {
                    (
                        pos,
                        StyleFragment {
                            plugin_id: plugin_id.clone(),
                            style_id: style_id.clone(),
                            css: entry.css.clone(),
                            priority: entry.priority,
                        },
                    )
                })
            })
            .collect();
        ordered.sort_by_key(|(pos, _)| *pos);
        ordered.into_iter().map(|(_, f)| f).collect()
    }

    pub fn contains(&self, plugin_id: &str, style_id: &str) -> bool {
        self.entries
            .lock()
            .contains_key(&(plugin_id.to_string(), style_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> StyleRegistry {
        StyleRegistry::new(Arc::new(StyleHead::new("host")))
    }

    fn plugin_nodes(registry: &StyleRegistry) -> usize {
        registry
            .head()
            .nodes()
            .iter()
            .filter(|n| n.plugin_id().is_some())
            .count()
    }

    #[test]
    fn test_node_count_matches_registrations() {
        let registry = registry();
        assert!(registry.register("p1", "a", "a{}", 0));
        assert!(registry.register("p1", "b", "b{}", 5));
        assert!(registry.register("p2", "a", "c{}", -1));
        assert_eq!(plugin_nodes(&registry), 3);

        registry.unregister("p1", "a");
        assert_eq!(plugin_nodes(&registry), registry.len());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_same_priority_updates_in_place() {
        let registry = registry();
        registry.register("p1", "theme", "body{color:red}", 1);
        let before = registry.head().nodes();

        registry.register("p1", "theme", "body{color:blue}", 1);
        let after = registry.head().nodes();

        assert_eq!(after.len(), before.len());
        assert_eq!(after[0].id, before[0].id);
        assert_eq!(after[0].css, "body{color:blue}");
    }

    #[test]
    fn test_higher_priority_applies_last() {
        let registry = registry();
        registry.register("p1", "high", "h{}", 10);
        registry.register("p2", "low", "l{}", -5);
        registry.register("p3", "mid", "m{}", 0);
        registry.register("p4", "mid2", "m2{}", 0);

        let order: Vec<String> = registry.fragments().into_iter().map(|f| f.style_id).collect();
        assert_eq!(order, vec!["low", "mid", "mid2", "high"]);
    }

    #[test]
    fn test_priority_change_moves_node() {
        let registry = registry();
        registry.register("p1", "a", "a{}", 0);
        registry.register("p1", "b", "b{}", 1);
        registry.register("p1", "a", "a{}", 2);

        let order: Vec<String> = registry.fragments().into_iter().map(|f| f.style_id).collect();
        assert_eq!(order, vec!["b", "a"]);
        assert_eq!(plugin_nodes(&registry), 2);
    }

    #[test]
    fn test_update_keeps_priority() {
        let registry = registry();
        registry.register("p1", "a", "a{}", 7);
        assert!(registry.update("p1", "a", "a2{}", None));
        let fragments = registry.fragments();
        assert_eq!(fragments[0].priority, 7);
        assert_eq!(fragments[0].css, "a2{}");
    }

    #[test]
    fn test_missing_arguments_fail() {
        let registry = registry();
        assert!(!registry.register("", "a", "x{}", 0));
        assert!(!registry.register("p1", "", "x{}", 0));
        assert!(!registry.register("p1", "a", "", 0));
        assert!(!registry.unregister("", "a"));
        assert!(registry.head().is_empty());
    }

    #[test]
    fn test_unregister_all_after_desync() {
        let registry = registry();
        for i in 0..4 {
            registry.register("p1", &format!("s{}", i), "x{}", i);
        }
        registry.register("p2", "keep", "k{}", 0);

        // 레지스트리를 거치지 않은 노드
        registry
            .head()
            .append(StyleOrigin::plugin("p1", "ghost", 0), "g{}");

        let removed = registry.unregister_all("p1");
        assert_eq!(removed, Some(5));
        assert!(registry.head().nodes_for_plugin("p1").is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister_all_missing_id_vs_nothing_registered() {
        let registry = registry();
        registry.register("p1", "a", "x{}", 0);

        assert_eq!(registry.unregister_all(""), None);
        assert_eq!(registry.unregister_all("p2"), Some(0));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister_node_only_in_head() {
        let registry = registry();
        registry
            .head()
            .append(StyleOrigin::plugin("p1", "orphan", 0), "o{}");
        assert!(registry.unregister("p1", "orphan"));
        assert!(registry.head().is_empty());
    }

    #[test]
    fn test_shutdown_keeps_foreign_nodes() {
        let registry = registry();
        registry.head().append(StyleOrigin::Static, "base{}");
        registry.register("p1", "a", "a{}", 0);
        registry.shutdown();
        assert_eq!(registry.head().len(), 1);
        assert!(registry.is_empty());
    }
}
