//! Consistency inspection service
//!
//! Rebuilds the tree implied by `parent_id` and compares the stored
//! left/right values with a fresh pre/post-order numbering. Defects are
//! reported as discrepancies; nothing is ever written to the node rows.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::application::cursor::NodeCursor;
use crate::application::transaction::in_transaction;
use crate::application::ApplicationResult;
use crate::config::InspectSettings;
use crate::domain::{
    Discrepancy, DomainError, GroupId, InspectionId, InspectionRecord, InspectionReport,
    NestedString, NewInspection, NodeId, NodeOrder, Predicate, TreeArena, WalkEvent,
    DEFAULT_CHUNK_SIZE,
};
use crate::infrastructure::traits::{InspectionStore, NodeStore};
use crate::infrastructure::InfraResult;

/// Service validating nested-set groups and recording the outcome.
pub struct ConsistencyInspector {
    nodes: Arc<dyn NodeStore>,
    inspections: Arc<dyn InspectionStore>,
    settings: InspectSettings,
}

impl ConsistencyInspector {
    pub fn new(
        nodes: Arc<dyn NodeStore>,
        inspections: Arc<dyn InspectionStore>,
        settings: InspectSettings,
    ) -> Self {
        Self {
            nodes,
            inspections,
            settings,
        }
    }

    /// Inspect `group` and persist a new inspection record.
    pub fn inspect(&self, group: GroupId) -> ApplicationResult<InspectionRecord> {
        self.inspect_from(group, None)
    }

    /// Inspect and link the record to the inspection it supersedes.
    #[instrument(level = "debug", skip(self))]
    pub fn inspect_from(
        &self,
        group: GroupId,
        from_inspection_id: Option<InspectionId>,
    ) -> ApplicationResult<InspectionRecord> {
        let store = self.nodes.as_ref();
        let record = in_transaction(store, || {
            let report = self.check(group)?;
            let inspection =
                NewInspection::from_report(store.entity(), group, report, from_inspection_id);
            Ok(self.inspections.insert_inspection(inspection)?)
        })?;
        info!(
            group,
            id = record.id,
            broken = record.is_broken,
            discrepancies = record.discrepancies.len(),
            "inspected group"
        );
        Ok(record)
    }

    /// Check `group` without persisting anything.
    ///
    /// Groups above the configured threshold go through the token codec so
    /// that no row objects are held; smaller ones use the arena.
    pub fn check(&self, group: GroupId) -> ApplicationResult<InspectionReport> {
        let rows = self.nodes.count(group, &Predicate::All)?;
        if rows > self.settings.codec_threshold {
            debug!(group, rows, "checking through codec");
            self.check_with_codec(group)
        } else {
            debug!(group, rows, "checking through arena");
            self.check_with_arena(group)
        }
    }

    fn cursor(&self, group: GroupId) -> NodeCursor<'_> {
        NodeCursor::new(
            self.nodes.as_ref(),
            group,
            NodeOrder::Left,
            self.settings.page_size,
        )
    }

    pub(crate) fn check_with_arena(&self, group: GroupId) -> ApplicationResult<InspectionReport> {
        let rows = self.cursor(group).collect::<InfraResult<Vec<_>>>()?;
        let tree = TreeArena::from_rows(rows);
        let mut report = InspectionReport::default();

        let Some(root) = tree.root() else {
            report.discrepancies.push(Discrepancy::no_root());
            return Ok(report);
        };
        let row_of = |idx| tree.get_node(idx).map(|node| &node.row);
        report.root_id = row_of(root).map(|row| row.id);

        for &extra in tree.extra_roots() {
            if let Some(row) = row_of(extra) {
                report.discrepancies.push(Discrepancy::duplicate_root(row.id));
            }
        }

        let mut unreachable: Vec<_> = tree
            .orphans()
            .iter()
            .copied()
            .chain(tree.cycle_tops())
            .filter_map(row_of)
            .collect();
        unreachable.sort_by_key(|row| (row.left, row.id));
        for row in unreachable {
            report.missing_ids.push(row.id);
            report
                .discrepancies
                .push(Discrepancy::missing_parent(row.id, row.parent_id));
        }

        let stored = |id| {
            tree.index_of(id)
                .and_then(row_of)
                .map(|row| (row.left, row.right))
        };
        tree.walk(root, |event| {
            if let Some(discrepancy) = compare(event, stored) {
                report.discrepancies.push(discrepancy);
            }
        });
        Ok(report)
    }

    pub(crate) fn check_with_codec(&self, group: GroupId) -> ApplicationResult<InspectionReport> {
        let mut flat = NestedString::new();
        for row in self.cursor(group) {
            let row = row?;
            flat.push_node(row.id, row.parent_id);
            flat.push_left_right(row.id, row.left, row.right);
        }
        let nested = flat.nest_by_all_with_chunk(DEFAULT_CHUNK_SIZE);
        let mut report = InspectionReport::default();

        let roots = nested.find_roots();
        let Some(root) = roots.first().copied() else {
            report.discrepancies.push(Discrepancy::no_root());
            return Ok(report);
        };
        report.root_id = Some(root.id);
        for extra in &roots[1..] {
            report.discrepancies.push(Discrepancy::duplicate_root(extra.id));
        }

        let root_value = nested.root_value();
        for token in nested
            .find_missing()
            .into_iter()
            .filter(|t| t.parent != root_value)
        {
            report.missing_ids.push(token.id);
            report
                .discrepancies
                .push(Discrepancy::missing_parent(token.id, token.parent));
        }

        let stored: HashMap<NodeId, (i64, i64)> = nested
            .left_rights()
            .map(|lr| (lr.id, (lr.left, lr.right)))
            .collect();
        nested.walk(root.id, |event| {
            if let Some(discrepancy) = compare(event, |id| stored.get(&id).copied()) {
                report.discrepancies.push(discrepancy);
            }
        });
        Ok(report)
    }

    /// Latest record of `group`.
    pub fn newest_inspection(&self, group: GroupId) -> ApplicationResult<InspectionRecord> {
        self.inspections
            .latest_inspection(self.nodes.entity(), group)?
            .ok_or_else(|| DomainError::NotInspected(group).into())
    }

    pub fn is_broken_set(&self, group: GroupId) -> ApplicationResult<bool> {
        Ok(self.newest_inspection(group)?.is_broken)
    }

    pub fn is_resolved(&self, group: GroupId) -> ApplicationResult<bool> {
        Ok(self.newest_inspection(group)?.is_resolved)
    }

    /// The record that triggered `record`, following `from_inspection_id`.
    pub fn superseded(
        &self,
        record: &InspectionRecord,
    ) -> ApplicationResult<Option<InspectionRecord>> {
        match record.from_inspection_id {
            Some(id) => Ok(self.inspections.inspection(id)?),
            None => Ok(None),
        }
    }

    /// All records of `group`, newest first.
    pub fn history(&self, group: GroupId) -> ApplicationResult<Vec<InspectionRecord>> {
        Ok(self
            .inspections
            .inspection_history(self.nodes.entity(), group)?)
    }
}

/// Compare one walk event with the stored value of its node.
fn compare(event: WalkEvent, stored: impl Fn(NodeId) -> Option<(i64, i64)>) -> Option<Discrepancy> {
    match event {
        WalkEvent::Enter { id, left, .. } => {
            let (observed, _) = stored(id)?;
            (observed != left).then(|| Discrepancy::wrong_left(id, observed, left))
        }
        WalkEvent::Leave { id, right } => {
            let (_, observed) = stored(id)?;
            (observed != right).then(|| Discrepancy::wrong_right(id, observed, right))
        }
    }
}
