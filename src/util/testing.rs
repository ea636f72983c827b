use std::collections::BTreeMap;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

use tracing::{debug, info};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use crate::domain::{
    ColumnDeltas, CursorKey, GroupId, InspectionId, InspectionRecord, NestedSetNode,
    NewInspection, NewNode, NodeId, NodeOrder, NodeRow, Placement, Predicate,
};
use crate::infrastructure::traits::{InspectionStore, NodeStore};
use crate::infrastructure::{InfraError, InfraResult};

static TEST_SETUP: Once = Once::new();

pub fn init_test_setup() {
    TEST_SETUP.call_once(|| {
        if env::var("RUST_LOG").is_err() {
            env::set_var("RUST_LOG", "debug");
        }
        // global logging subscriber, used by all tracing log macros
        setup_test_logging();
        info!("Test Setup complete");
    });
}

fn setup_test_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let subscriber = tracing_subscriber::registry().with(
        fmt::layer()
            .with_test_writer()
            .with_target(true)
            .with_thread_names(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(env_filter),
    );

    // Only set if we haven't already set a global subscriber
    if tracing::dispatcher::has_been_set() {
        debug!("Tracing subscriber already set");
    } else {
        subscriber.try_init().unwrap_or_else(|e| {
            eprintln!("Error: Failed to set up logging: {}", e);
        });
    }
}

/// Insert raw rows `(parent_id, left, right, depth)` into `group` as given.
///
/// On a fresh store the rows get ids `1..=n` in slice order, which lets tests
/// build deliberately broken groups.
pub fn seed_rows(
    store: &dyn NodeStore,
    group: GroupId,
    rows: &[(NodeId, i64, i64, i64)],
) -> InfraResult<Vec<NodeRow>> {
    rows.iter()
        .map(|&(parent_id, left, right, depth)| {
            store.insert_row(NewNode {
                parent_id,
                left,
                right,
                depth,
                group_id: group,
                label: None,
            })
        })
        .collect()
}

/// Panic unless `rows` (one group) form a valid nested set.
///
/// Checks edge order and width parity, the absence of partial overlaps,
/// exactly one root, and that `parent_id` and `depth` agree with the
/// enclosing ranges.
pub fn assert_nested_set_valid(rows: &[NodeRow]) {
    let roots: Vec<NodeId> = rows.iter().filter(|r| r.is_root()).map(|r| r.id).collect();
    assert_eq!(roots.len(), 1, "expected exactly one root, got {:?}", roots);

    for row in rows {
        assert!(row.left < row.right, "{}: left must be below right", row);
        assert_eq!((row.right - row.left) % 2, 1, "{}: width must be even", row);
    }

    for (i, row) in rows.iter().enumerate() {
        for other in &rows[i + 1..] {
            let disjoint = row.right < other.left || other.right < row.left;
            let nested = row.is_child_of(other) || other.is_child_of(row);
            assert!(
                disjoint || nested,
                "{} and {} overlap partially",
                row,
                other
            );
        }
    }

    for row in rows {
        let descendants = rows.iter().filter(|other| other.is_child_of(row)).count() as i64;
        assert_eq!(
            row.descendant_count(),
            descendants,
            "{}: descendant count",
            row
        );

        let ancestors: Vec<&NodeRow> = rows.iter().filter(|other| row.is_child_of(other)).collect();
        assert_eq!(row.depth, ancestors.len() as i64, "{}: depth", row);
        let closest = ancestors.iter().max_by_key(|a| a.left).map(|a| a.id);
        match closest {
            Some(parent) => assert_eq!(row.parent_id, parent, "{}: parent", row),
            None => assert!(row.is_root(), "{}: only the root may be top level", row),
        }
    }
}

/// Store call that [`FailingStore`] turns into an error once armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Commit,
    Reparent,
    CaseUpdate,
}

/// Wraps a store and fails one kind of call while armed.
pub struct FailingStore<S> {
    inner: S,
    point: FailPoint,
    armed: AtomicBool,
}

impl<S> FailingStore<S> {
    pub fn new(inner: S, point: FailPoint) -> Self {
        Self {
            inner,
            point,
            armed: AtomicBool::new(false),
        }
    }

    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn trip(&self, point: FailPoint) -> InfraResult<()> {
        if self.point == point && self.armed.load(Ordering::SeqCst) {
            return Err(InfraError::Transaction(format!("injected failure at {:?}", point)));
        }
        Ok(())
    }
}

impl<S: NodeStore> NodeStore for FailingStore<S> {
    fn begin(&self) -> InfraResult<()> {
        self.inner.begin()
    }

    fn commit(&self) -> InfraResult<()> {
        self.trip(FailPoint::Commit)?;
        self.inner.commit()
    }

    fn rollback(&self) -> InfraResult<()> {
        self.inner.rollback()
    }

    fn entity(&self) -> &str {
        self.inner.entity()
    }

    fn find(&self, id: NodeId) -> InfraResult<Option<NodeRow>> {
        self.inner.find(id)
    }

    fn max_group_id(&self) -> InfraResult<GroupId> {
        self.inner.max_group_id()
    }

    fn range_query(
        &self,
        group: GroupId,
        predicate: &Predicate,
        order: NodeOrder,
    ) -> InfraResult<Vec<NodeRow>> {
        self.inner.range_query(group, predicate, order)
    }

    fn count(&self, group: GroupId, predicate: &Predicate) -> InfraResult<usize> {
        self.inner.count(group, predicate)
    }

    fn page(
        &self,
        group: GroupId,
        order: NodeOrder,
        after: Option<CursorKey>,
        limit: usize,
    ) -> InfraResult<Vec<NodeRow>> {
        self.inner.page(group, order, after, limit)
    }

    fn bulk_update(
        &self,
        group: GroupId,
        predicate: &Predicate,
        deltas: ColumnDeltas,
    ) -> InfraResult<usize> {
        self.inner.bulk_update(group, predicate, deltas)
    }

    fn case_update(
        &self,
        group: GroupId,
        placements: &BTreeMap<NodeId, Placement>,
    ) -> InfraResult<usize> {
        self.trip(FailPoint::CaseUpdate)?;
        self.inner.case_update(group, placements)
    }

    fn reparent(&self, group: GroupId, ids: &[NodeId], parent: NodeId) -> InfraResult<usize> {
        self.trip(FailPoint::Reparent)?;
        self.inner.reparent(group, ids, parent)
    }

    fn insert_row(&self, node: NewNode) -> InfraResult<NodeRow> {
        self.inner.insert_row(node)
    }

    fn delete_rows(&self, ids: &[NodeId]) -> InfraResult<usize> {
        self.inner.delete_rows(ids)
    }

    fn delete_where(&self, group: GroupId, predicate: &Predicate) -> InfraResult<usize> {
        self.inner.delete_where(group, predicate)
    }
}

impl<S: InspectionStore> InspectionStore for FailingStore<S> {
    fn insert_inspection(&self, inspection: NewInspection) -> InfraResult<InspectionRecord> {
        self.inner.insert_inspection(inspection)
    }

    fn latest_inspection(
        &self,
        entity: &str,
        group: GroupId,
    ) -> InfraResult<Option<InspectionRecord>> {
        self.inner.latest_inspection(entity, group)
    }

    fn inspection(&self, id: InspectionId) -> InfraResult<Option<InspectionRecord>> {
        self.inner.inspection(id)
    }

    fn inspection_history(
        &self,
        entity: &str,
        group: GroupId,
    ) -> InfraResult<Vec<InspectionRecord>> {
        self.inner.inspection_history(entity, group)
    }
}
