//! Repair service
//!
//! Streams a group into the token codec, re-nests it, attaches everything
//! unresolved to the root and writes fresh left/right/depth values with one
//! keyed update. A new inspection linked to the triggering one follows.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::application::cursor::NodeCursor;
use crate::application::services::ConsistencyInspector;
use crate::application::transaction::in_transaction;
use crate::application::ApplicationResult;
use crate::config::RepairSettings;
use crate::domain::{
    Cmp, Column, DomainError, GroupId, InspectionRecord, NestedString, NewNode, NodeId, NodeOrder,
    NodeRow, Placement, Predicate, Token, WalkEvent, ROOT_SENTINEL,
};
use crate::infrastructure::traits::{InspectionStore, NodeStore};

/// Outcome of one repair run.
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub root_id: NodeId,
    /// Set when the group had no root and one was created
    pub backup_root: Option<NodeId>,
    /// Nodes reparented to the root
    pub reparented: Vec<NodeId>,
    /// Rows whose left/right/depth were rewritten
    pub updated: usize,
    /// Inspection taken after the commit
    pub inspection: InspectionRecord,
}

/// Service rebuilding the nested-set columns of a group from `parent_id`.
pub struct RepairEngine {
    nodes: Arc<dyn NodeStore>,
    inspections: Arc<dyn InspectionStore>,
    inspector: ConsistencyInspector,
    settings: RepairSettings,
}

impl RepairEngine {
    pub fn new(
        nodes: Arc<dyn NodeStore>,
        inspections: Arc<dyn InspectionStore>,
        inspector: ConsistencyInspector,
        settings: RepairSettings,
    ) -> Self {
        Self {
            nodes,
            inspections,
            inspector,
            settings,
        }
    }

    /// Repair `group` in one transaction, then inspect it again.
    #[instrument(level = "debug", skip(self))]
    pub fn repair(&self, group: GroupId) -> ApplicationResult<RepairOutcome> {
        let store = self.nodes.as_ref();
        let trigger = self
            .inspections
            .latest_inspection(store.entity(), group)?
            .map(|record| record.id);

        let (root_id, backup_root, reparented, updated) =
            in_transaction(store, || self.rebuild(group))?;
        info!(
            group,
            root_id,
            reparented = reparented.len(),
            updated,
            "repaired group"
        );

        let inspection = self.inspector.inspect_from(group, trigger)?;
        if inspection.is_broken {
            warn!(group, id = inspection.id, "group still broken after repair");
        }
        Ok(RepairOutcome {
            root_id,
            backup_root,
            reparented,
            updated,
            inspection,
        })
    }

    fn rebuild(
        &self,
        group: GroupId,
    ) -> ApplicationResult<(NodeId, Option<NodeId>, Vec<NodeId>, usize)> {
        let store = self.nodes.as_ref();

        // (1) + (2): stream by primary key into a flat token string
        let mut flat = NestedString::new();
        let mut roots: Vec<(i64, NodeId)> = Vec::new();
        for row in NodeCursor::new(store, group, NodeOrder::Id, self.settings.page_size) {
            let row = row?;
            if row.parent_id == ROOT_SENTINEL {
                roots.push((row.left, row.id));
            }
            flat.push_node(row.id, row.parent_id);
        }
        if flat.is_empty() {
            return Err(DomainError::BrokenRepairChain {
                group,
                reason: "group has no rows".to_string(),
            }
            .into());
        }
        roots.sort_unstable();
        if roots.len() > 1 && !self.settings.adopt_extra_roots {
            return Err(DomainError::DuplicateRoot {
                group,
                root_ids: roots.iter().map(|&(_, id)| id).collect(),
            }
            .into());
        }

        // (3)
        let mut nested = flat.nest_by_all_with_chunk(self.settings.chunk_size);

        // (4)
        let (root_id, backup_root) = match roots.first() {
            Some(&(_, id)) => (id, None),
            None => {
                let root = self.first_or_create_backup_root(group)?;
                nested.prepend(&Token::new(root.id, ROOT_SENTINEL).to_string());
                (root.id, Some(root.id))
            }
        };

        // (5)
        let reparented: Vec<NodeId> = nested
            .find_missing()
            .into_iter()
            .filter(|token| token.id != root_id)
            .map(|token| token.id)
            .collect();
        for &id in &reparented {
            if !nested.change_parent_and_nest(id, root_id) {
                return Err(DomainError::BrokenRepairChain {
                    group,
                    reason: format!("cannot attach node {id} to root {root_id}"),
                }
                .into());
            }
        }
        if !reparented.is_empty() {
            store.reparent(group, &reparented, root_id)?;
            debug!(count = reparented.len(), root_id, "reparented to root");
        }

        // (6)
        let mut placements: BTreeMap<NodeId, Placement> = BTreeMap::new();
        let visited = nested.walk(root_id, |event| match event {
            WalkEvent::Enter { id, left, depth } => {
                placements.insert(
                    id,
                    Placement {
                        left,
                        right: left + 1,
                        depth,
                    },
                );
            }
            WalkEvent::Leave { id, right } => {
                if let Some(placement) = placements.get_mut(&id) {
                    placement.right = right;
                }
            }
        });
        let expected = nested.node_count();
        if visited != expected {
            return Err(DomainError::BrokenRepairChain {
                group,
                reason: format!("walk reached {visited} of {expected} nodes"),
            }
            .into());
        }

        // (7)
        let updated = store.case_update(group, &placements)?;
        Ok((root_id, backup_root, reparented, updated))
    }

    /// First root of `group` by left, or a freshly inserted backup root.
    ///
    /// Runs in the caller's transaction.
    pub fn first_or_create_backup_root(&self, group: GroupId) -> ApplicationResult<NodeRow> {
        let store = self.nodes.as_ref();
        let roots = store.range_query(
            group,
            &Predicate::compare(Column::ParentId, Cmp::Eq, ROOT_SENTINEL),
            NodeOrder::Left,
        )?;
        if let Some(root) = roots.into_iter().next() {
            return Ok(root);
        }
        let root = store.insert_row(NewNode::backup_root(group))?;
        info!(group, id = root.id, "created backup root");
        Ok(root)
    }
}
