//! Tree mutation service
//!
//! Creates, deletes and moves nodes while keeping left/right/depth/parent
//! consistent. Every operation runs as one transaction of bulk range shifts.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::application::transaction::in_transaction;
use crate::application::ApplicationResult;
use crate::domain::{
    Cmp, Column, ColumnDeltas, DomainError, NestedSetNode, NewNode, NodeId, NodeOrder, NodeRow,
    Predicate,
};
use crate::infrastructure::traits::NodeStore;

/// Where a moved node lands relative to the boundary node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Semantics {
    /// First child of the node whose left is the boundary
    Parent,
    /// Next sibling of the node whose right is the boundary
    Sibling,
}

/// Service for structural changes of nested-set groups.
pub struct TreeMutator {
    store: Arc<dyn NodeStore>,
}

impl TreeMutator {
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        Self { store }
    }

    fn require(&self, id: NodeId) -> ApplicationResult<NodeRow> {
        self.store
            .find(id)?
            .ok_or_else(|| DomainError::NodeNotFound(id).into())
    }

    /// Create a node: a new root in a fresh group, or the last child of `parent`.
    #[instrument(level = "debug", skip(self))]
    pub fn create_node(
        &self,
        parent: Option<NodeId>,
        label: Option<String>,
    ) -> ApplicationResult<NodeRow> {
        let store = self.store.as_ref();
        let row = in_transaction(store, || match parent {
            None => {
                let group = store.max_group_id()? + 1;
                Ok(store.insert_row(NewNode::root(group, label))?)
            }
            Some(parent_id) => {
                let parent = self.require(parent_id)?;
                let group = parent.group_id;
                let rights = store.bulk_update(
                    group,
                    &Predicate::compare(Column::Right, Cmp::Ge, parent.right),
                    ColumnDeltas::right(2),
                )?;
                let lefts = store.bulk_update(
                    group,
                    &Predicate::compare(Column::Left, Cmp::Gt, parent.right),
                    ColumnDeltas::left(2),
                )?;
                debug!(rights, lefts, "made room for child");
                Ok(store.insert_row(NewNode::last_child_of(&parent, label))?)
            }
        })?;
        info!(id = row.id, group = row.group_id, "created node");
        Ok(row)
    }

    /// Delete one node and its subtree. Returns the number of removed rows.
    pub fn delete_subtree(&self, id: NodeId) -> ApplicationResult<usize> {
        self.delete_subtrees(&[id])
    }

    /// Delete several subtrees of one group in one transaction.
    ///
    /// No target may lie inside another target. Targets are processed in
    /// ascending left order; each one's stored range is first corrected by
    /// the widths already removed.
    #[instrument(level = "debug", skip(self))]
    pub fn delete_subtrees(&self, ids: &[NodeId]) -> ApplicationResult<usize> {
        let store = self.store.as_ref();
        let removed = in_transaction(store, || {
            let mut seen = HashSet::new();
            let mut targets = Vec::new();
            for &id in ids {
                if seen.insert(id) {
                    targets.push(self.require(id)?);
                }
            }
            let Some(group) = targets.first().map(|t| t.group_id) else {
                return Ok(0);
            };
            if targets.iter().any(|t| t.group_id != group) {
                return Err(DomainError::InvalidBatch(
                    "targets belong to different groups".to_string(),
                )
                .into());
            }
            targets.sort_by_key(|t| t.left);
            for pair in targets.windows(2) {
                if pair[0].right > pair[1].left {
                    return Err(DomainError::InvalidBatch(format!(
                        "node {} lies inside node {}",
                        pair[1].id, pair[0].id
                    ))
                    .into());
                }
            }

            let mut removed = 0;
            for target in &targets {
                removed +=
                    store.delete_where(group, &Predicate::strictly_inside(target.left, target.right))?;
            }

            let mut subtracted = 0;
            for target in &targets {
                let right = target.right - subtracted;
                let width = target.width();
                store.bulk_update(
                    group,
                    &Predicate::compare(Column::Left, Cmp::Gt, right),
                    ColumnDeltas::left(-width),
                )?;
                store.bulk_update(
                    group,
                    &Predicate::compare(Column::Right, Cmp::Gt, right),
                    ColumnDeltas::right(-width),
                )?;
                removed += store.delete_rows(&[target.id])?;
                subtracted += width;
            }
            Ok(removed)
        })?;
        info!(removed, "deleted subtrees");
        Ok(removed)
    }

    /// Move `id` with its subtree to the slot between `prev` and `next`.
    ///
    /// A node whose left equals `prev` becomes the new parent (first child
    /// position); a node whose right equals `prev` becomes the previous
    /// sibling. `next` must be `prev + 1`.
    #[instrument(level = "debug", skip(self))]
    pub fn move_node(&self, id: NodeId, prev: i64, next: i64) -> ApplicationResult<NodeRow> {
        let store = self.store.as_ref();
        let moved = in_transaction(store, || {
            let node = self.require(id)?;
            let group = node.group_id;

            if prev >= next {
                return Err(DomainError::invalid_range(prev, next, "prev must be below next").into());
            }
            if next != prev + 1 {
                return Err(
                    DomainError::invalid_range(prev, next, "next must directly follow prev").into(),
                );
            }
            if node.left <= prev && prev < node.right {
                return Err(DomainError::invalid_range(
                    prev,
                    next,
                    "cannot move a node into its own subtree",
                )
                .into());
            }

            let (boundary, semantics) = self.resolve_boundary(&node, prev)?;
            let (new_parent, new_depth) = match semantics {
                Semantics::Parent => (boundary.id, boundary.depth + 1),
                Semantics::Sibling => {
                    if boundary.is_root() {
                        return Err(DomainError::invalid_range(
                            prev,
                            next,
                            "a root cannot have siblings",
                        )
                        .into());
                    }
                    (boundary.parent_id, boundary.depth)
                }
            };
            let depth_delta = new_depth - node.depth;

            let subtree: Vec<NodeId> = store
                .range_query(
                    group,
                    &Predicate::inside_or_equal(node.left, node.right),
                    NodeOrder::Left,
                )?
                .into_iter()
                .map(|row| row.id)
                .collect();
            let width = node.width();

            let offset = if prev > node.left {
                // moving right: close the gap behind the subtree
                let span = |column| Predicate::in_left_open(column, node.right, prev);
                store.bulk_update(group, &span(Column::Right), ColumnDeltas::right(-width))?;
                store.bulk_update(group, &span(Column::Left), ColumnDeltas::left(-width))?;
                prev - node.right
            } else {
                let span = |column| Predicate::in_right_open(column, next, node.left);
                store.bulk_update(group, &span(Column::Left), ColumnDeltas::left(width))?;
                store.bulk_update(group, &span(Column::Right), ColumnDeltas::right(width))?;
                next - node.left
            };
            let shifted = store.bulk_update(
                group,
                &Predicate::id_in(subtree),
                ColumnDeltas::shift(offset).with_depth(depth_delta),
            )?;
            debug!(shifted, offset, depth_delta, ?semantics, "moved subtree");

            store.reparent(group, &[node.id], new_parent)?;
            self.require(node.id)
        })?;
        info!(id = moved.id, parent = moved.parent_id, "moved node");
        Ok(moved)
    }

    fn resolve_boundary(&self, node: &NodeRow, prev: i64) -> ApplicationResult<(NodeRow, Semantics)> {
        let group = node.group_id;
        let mut matches = self.store.range_query(
            group,
            &Predicate::touches(prev),
            NodeOrder::Left,
        )?;
        match matches.len() {
            0 => Err(DomainError::BoundaryNotFound {
                group,
                boundary: prev,
            }
            .into()),
            1 => {
                let boundary = matches.remove(0);
                let semantics = if boundary.left == prev {
                    Semantics::Parent
                } else {
                    Semantics::Sibling
                };
                Ok((boundary, semantics))
            }
            _ => Err(DomainError::AmbiguousBoundary {
                group,
                boundary: prev,
                node_ids: matches.iter().map(|row| row.id).collect(),
            }
            .into()),
        }
    }

    /// Make `id` the next sibling of `target`.
    pub fn move_after(&self, id: NodeId, target: NodeId) -> ApplicationResult<NodeRow> {
        let target = self.require_same_group(id, target)?;
        self.move_node(id, target.right, target.right + 1)
    }

    /// Make `id` the previous sibling of `target`.
    pub fn move_before(&self, id: NodeId, target: NodeId) -> ApplicationResult<NodeRow> {
        let target = self.require_same_group(id, target)?;
        self.move_node(id, target.left - 1, target.left)
    }

    /// Make `id` the last child of `target`.
    pub fn move_into(&self, id: NodeId, target: NodeId) -> ApplicationResult<NodeRow> {
        let target = self.require_same_group(id, target)?;
        // a leaf has right - 1 == left, which selects the first-child slot
        let prev = target.right - 1;
        self.move_node(id, prev, prev + 1)
    }

    fn require_same_group(&self, id: NodeId, target: NodeId) -> ApplicationResult<NodeRow> {
        let node = self.require(id)?;
        let target = self.require(target)?;
        if node.group_id != target.group_id {
            return Err(DomainError::InvalidBatch(format!(
                "node {} and target {} belong to different groups",
                node.id, target.id
            ))
            .into());
        }
        Ok(target)
    }
}
