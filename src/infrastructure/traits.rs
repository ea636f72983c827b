//! Store boundary traits
//!
//! Services only talk to persistence through these traits, so the same
//! algorithms run against the in-memory store in tests and SQLite in the CLI.

use std::collections::BTreeMap;

use crate::domain::{
    ColumnDeltas, CursorKey, GroupId, InspectionId, InspectionRecord, NewInspection, NewNode,
    NodeId, NodeOrder, NodeRow, Placement, Predicate,
};
use crate::infrastructure::InfraResult;

/// Row-level access to one tree-capable entity.
///
/// At most one transaction is open at a time; `begin` while one is open is an
/// error. All group-scoped calls ignore rows of other groups.
pub trait NodeStore: Send + Sync {
    fn begin(&self) -> InfraResult<()>;
    fn commit(&self) -> InfraResult<()>;
    fn rollback(&self) -> InfraResult<()>;

    /// Entity tag recorded on inspections.
    fn entity(&self) -> &str;

    fn find(&self, id: NodeId) -> InfraResult<Option<NodeRow>>;

    /// Highest group id in use; 0 when the store is empty.
    fn max_group_id(&self) -> InfraResult<GroupId>;

    fn range_query(
        &self,
        group: GroupId,
        predicate: &Predicate,
        order: NodeOrder,
    ) -> InfraResult<Vec<NodeRow>>;

    fn count(&self, group: GroupId, predicate: &Predicate) -> InfraResult<usize>;

    /// Up to `limit` rows strictly after `after` in `(order column, id)` order.
    fn page(
        &self,
        group: GroupId,
        order: NodeOrder,
        after: Option<CursorKey>,
        limit: usize,
    ) -> InfraResult<Vec<NodeRow>>;

    /// Add `deltas` to every matching row in one statement.
    fn bulk_update(
        &self,
        group: GroupId,
        predicate: &Predicate,
        deltas: ColumnDeltas,
    ) -> InfraResult<usize>;

    /// Set left/right/depth of many rows keyed by id in one statement.
    fn case_update(
        &self,
        group: GroupId,
        placements: &BTreeMap<NodeId, Placement>,
    ) -> InfraResult<usize>;

    fn reparent(&self, group: GroupId, ids: &[NodeId], parent: NodeId) -> InfraResult<usize>;

    fn insert_row(&self, node: NewNode) -> InfraResult<NodeRow>;

    fn delete_rows(&self, ids: &[NodeId]) -> InfraResult<usize>;

    fn delete_where(&self, group: GroupId, predicate: &Predicate) -> InfraResult<usize>;
}

/// Append-only persistence of inspection records.
pub trait InspectionStore: Send + Sync {
    fn insert_inspection(&self, inspection: NewInspection) -> InfraResult<InspectionRecord>;

    fn latest_inspection(
        &self,
        entity: &str,
        group: GroupId,
    ) -> InfraResult<Option<InspectionRecord>>;

    fn inspection(&self, id: InspectionId) -> InfraResult<Option<InspectionRecord>>;

    /// Newest first.
    fn inspection_history(
        &self,
        entity: &str,
        group: GroupId,
    ) -> InfraResult<Vec<InspectionRecord>>;
}
