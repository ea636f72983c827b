//! Read-only tree queries

use std::sync::Arc;

use tracing::instrument;

use crate::application::cursor::NodeCursor;
use crate::application::ApplicationResult;
use crate::domain::{
    DomainError, GroupId, NestedSetNode, NodeId, NodeOrder, NodeRelation, NodeRow, Predicate,
    TreeArena,
};
use crate::infrastructure::traits::NodeStore;
use crate::infrastructure::InfraResult;

pub struct TreeQueries {
    store: Arc<dyn NodeStore>,
    page_size: usize,
}

impl TreeQueries {
    pub fn new(store: Arc<dyn NodeStore>, page_size: usize) -> Self {
        Self { store, page_size }
    }

    pub fn node(&self, id: NodeId) -> ApplicationResult<NodeRow> {
        self.store
            .find(id)?
            .ok_or_else(|| DomainError::NodeNotFound(id).into())
    }

    /// Rows related to `node`, ordered by left. `One` relations yield at most one row.
    #[instrument(level = "debug", skip(self, node), fields(node = node.id))]
    pub fn related(
        &self,
        node: &NodeRow,
        relation: &NodeRelation,
    ) -> ApplicationResult<Vec<NodeRow>> {
        let mut rows = self.store.range_query(
            node.group_id,
            &relation.predicate_for(node),
            NodeOrder::Left,
        )?;
        if !relation.is_many() {
            rows.truncate(1);
        }
        Ok(rows)
    }

    /// Levels below `node`; 0 for a leaf.
    pub fn count_depths(&self, node: &NodeRow) -> ApplicationResult<i64> {
        let deepest = self
            .store
            .range_query(
                node.group_id,
                &Predicate::strictly_inside(node.left(), node.right()),
                NodeOrder::Left,
            )?
            .iter()
            .map(|row| row.depth)
            .max();
        Ok(deepest.map_or(0, |depth| depth - node.depth()))
    }

    /// The tree `parent_id` implies for `group`.
    #[instrument(level = "debug", skip(self))]
    pub fn load_tree(&self, group: GroupId) -> ApplicationResult<TreeArena> {
        let rows = NodeCursor::new(self.store.as_ref(), group, NodeOrder::Left, self.page_size)
            .collect::<InfraResult<Vec<_>>>()?;
        Ok(TreeArena::from_rows(rows))
    }
}
