//! Presentation model - 스타일 노드 트리
//!
//! 호스트 문서의 `<head>`와 각 샌드박스의 `<head>`를 모델링합니다.
//! 노드는 삽입 순서대로 적용되며 (last-applied-wins), 변경 사항은
//! [`MutationObserver`]를 통해 배치 단위로 관찰할 수 있습니다.
//!
//! ```text
//! StyleHead ("host")
//!   ├── #1 Static     (호스트 기본 스타일)
//!   ├── #2 Plugin     (p1/base, priority 0)
//!   ├── #3 Plugin     (p2/dark, priority 10)
//!   └── #4 Generated  (런타임 생성 스타일 → 샌드박스로 미러링)
//! ```

mod head;
mod observer;

pub use head::{NodeId, StyleHead, StyleNode, StyleOrigin};
pub use observer::{MutationBatch, MutationKind, MutationObserver, MutationRecord, MutationStream};
