//! In-memory store with snapshot transactions

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, instrument, trace};

use crate::domain::{
    ColumnDeltas, CursorKey, GroupId, InspectionId, InspectionRecord, NewInspection, NewNode,
    NodeId, NodeOrder, NodeRow, Placement, Predicate,
};
use crate::infrastructure::traits::{InspectionStore, NodeStore};
use crate::infrastructure::{InfraError, InfraResult};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    nodes: BTreeMap<NodeId, NodeRow>,
    inspections: Vec<InspectionRecord>,
    last_node_id: NodeId,
    last_inspection_id: InspectionId,
}

#[derive(Debug, Default)]
struct Inner {
    state: MemoryState,
    snapshot: Option<MemoryState>,
}

/// Store keeping every row in a map; `rollback` restores the state taken at `begin`.
#[derive(Debug)]
pub struct MemoryStore {
    entity: String,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> InfraResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| InfraError::LockPoisoned(e.to_string()))
    }

    /// All rows of `group`, ordered by left.
    pub fn rows(&self, group: GroupId) -> InfraResult<Vec<NodeRow>> {
        self.range_query(group, &Predicate::All, NodeOrder::Left)
    }

    pub fn in_transaction(&self) -> bool {
        self.lock().map(|inner| inner.snapshot.is_some()).unwrap_or(false)
    }
}

fn sorted(mut rows: Vec<NodeRow>, order: NodeOrder) -> Vec<NodeRow> {
    rows.sort_by_key(|row| order.key_of(row));
    rows
}

fn matching<'a>(
    state: &'a mut MemoryState,
    group: GroupId,
    predicate: &'a Predicate,
) -> impl Iterator<Item = &'a mut NodeRow> + 'a {
    state
        .nodes
        .values_mut()
        .filter(move |row| row.group_id == group && predicate.matches(row))
}

impl NodeStore for MemoryStore {
    fn begin(&self) -> InfraResult<()> {
        let mut inner = self.lock()?;
        if inner.snapshot.is_some() {
            return Err(InfraError::Transaction(
                "a transaction is already open".to_string(),
            ));
        }
        inner.snapshot = Some(inner.state.clone());
        trace!("begin");
        Ok(())
    }

    fn commit(&self) -> InfraResult<()> {
        let mut inner = self.lock()?;
        if inner.snapshot.take().is_none() {
            return Err(InfraError::Transaction("commit without begin".to_string()));
        }
        trace!("commit");
        Ok(())
    }

    fn rollback(&self) -> InfraResult<()> {
        let mut inner = self.lock()?;
        match inner.snapshot.take() {
            Some(snapshot) => {
                inner.state = snapshot;
                trace!("rollback");
                Ok(())
            }
            None => Err(InfraError::Transaction(
                "rollback without begin".to_string(),
            )),
        }
    }

    fn entity(&self) -> &str {
        &self.entity
    }

    fn find(&self, id: NodeId) -> InfraResult<Option<NodeRow>> {
        Ok(self.lock()?.state.nodes.get(&id).cloned())
    }

    fn max_group_id(&self) -> InfraResult<GroupId> {
        let inner = self.lock()?;
        Ok(inner
            .state
            .nodes
            .values()
            .map(|row| row.group_id)
            .max()
            .unwrap_or(0))
    }

    fn range_query(
        &self,
        group: GroupId,
        predicate: &Predicate,
        order: NodeOrder,
    ) -> InfraResult<Vec<NodeRow>> {
        let inner = self.lock()?;
        let rows = inner
            .state
            .nodes
            .values()
            .filter(|row| row.group_id == group && predicate.matches(row))
            .cloned()
            .collect();
        Ok(sorted(rows, order))
    }

    fn count(&self, group: GroupId, predicate: &Predicate) -> InfraResult<usize> {
        let inner = self.lock()?;
        Ok(inner
            .state
            .nodes
            .values()
            .filter(|row| row.group_id == group && predicate.matches(row))
            .count())
    }

    fn page(
        &self,
        group: GroupId,
        order: NodeOrder,
        after: Option<CursorKey>,
        limit: usize,
    ) -> InfraResult<Vec<NodeRow>> {
        let rows = self.range_query(group, &Predicate::All, order)?;
        Ok(rows
            .into_iter()
            .filter(|row| after.map_or(true, |key| order.key_of(row) > key))
            .take(limit)
            .collect())
    }

    #[instrument(level = "trace", skip(self))]
    fn bulk_update(
        &self,
        group: GroupId,
        predicate: &Predicate,
        deltas: ColumnDeltas,
    ) -> InfraResult<usize> {
        let mut inner = self.lock()?;
        let mut affected = 0;
        for row in matching(&mut inner.state, group, predicate) {
            deltas.apply(row);
            affected += 1;
        }
        debug!(affected, "bulk update");
        Ok(affected)
    }

    fn case_update(
        &self,
        group: GroupId,
        placements: &BTreeMap<NodeId, Placement>,
    ) -> InfraResult<usize> {
        let mut inner = self.lock()?;
        let mut affected = 0;
        for (id, placement) in placements {
            if let Some(row) = inner.state.nodes.get_mut(id) {
                if row.group_id != group {
                    continue;
                }
                row.left = placement.left;
                row.right = placement.right;
                row.depth = placement.depth;
                affected += 1;
            }
        }
        debug!(affected, "case update");
        Ok(affected)
    }

    fn reparent(&self, group: GroupId, ids: &[NodeId], parent: NodeId) -> InfraResult<usize> {
        let mut inner = self.lock()?;
        let predicate = Predicate::id_in(ids.iter().copied());
        let mut affected = 0;
        for row in matching(&mut inner.state, group, &predicate) {
            row.parent_id = parent;
            affected += 1;
        }
        Ok(affected)
    }

    fn insert_row(&self, node: NewNode) -> InfraResult<NodeRow> {
        let mut inner = self.lock()?;
        inner.state.last_node_id += 1;
        let row = node.into_row(inner.state.last_node_id);
        inner.state.nodes.insert(row.id, row.clone());
        Ok(row)
    }

    fn delete_rows(&self, ids: &[NodeId]) -> InfraResult<usize> {
        let mut inner = self.lock()?;
        Ok(ids
            .iter()
            .filter(|id| inner.state.nodes.remove(*id).is_some())
            .count())
    }

    fn delete_where(&self, group: GroupId, predicate: &Predicate) -> InfraResult<usize> {
        let mut inner = self.lock()?;
        let before = inner.state.nodes.len();
        inner
            .state
            .nodes
            .retain(|_, row| !(row.group_id == group && predicate.matches(row)));
        Ok(before - inner.state.nodes.len())
    }
}

impl InspectionStore for MemoryStore {
    fn insert_inspection(&self, inspection: NewInspection) -> InfraResult<InspectionRecord> {
        let mut inner = self.lock()?;
        inner.state.last_inspection_id += 1;
        let record = inspection.into_record(inner.state.last_inspection_id, Utc::now());
        inner.state.inspections.push(record.clone());
        Ok(record)
    }

    fn latest_inspection(
        &self,
        entity: &str,
        group: GroupId,
    ) -> InfraResult<Option<InspectionRecord>> {
        Ok(self.inspection_history(entity, group)?.into_iter().next())
    }

    fn inspection(&self, id: InspectionId) -> InfraResult<Option<InspectionRecord>> {
        let inner = self.lock()?;
        Ok(inner
            .state
            .inspections
            .iter()
            .find(|record| record.id == id)
            .cloned())
    }

    fn inspection_history(
        &self,
        entity: &str,
        group: GroupId,
    ) -> InfraResult<Vec<InspectionRecord>> {
        let inner = self.lock()?;
        Ok(inner
            .state
            .inspections
            .iter()
            .rev()
            .filter(|record| record.entity == entity && record.group_id == group)
            .cloned()
            .collect())
    }
}
