//! Pre/post-order placement events shared by the arena and codec walkers

use crate::domain::node::NodeId;

/// Emitted by a stack-based depth-first walk that numbers slots with one counter.
///
/// `Enter` carries the slot a node's `left` must hold, `Leave` the slot its
/// `right` must hold. `depth` counts levels below the walk's start node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkEvent {
    Enter { id: NodeId, left: i64, depth: i64 },
    Leave { id: NodeId, right: i64 },
}

/// Running slot counter; the first slot handed out is 1.
#[derive(Debug, Default)]
pub(crate) struct SlotCounter(i64);

impl SlotCounter {
    pub(crate) fn next(&mut self) -> i64 {
        self.0 += 1;
        self.0
    }
}
