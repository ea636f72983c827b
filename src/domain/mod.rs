//! Domain layer: nested-set model, codec and inspection records
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod arena;
pub mod codec;
pub mod error;
pub mod inspection;
pub mod node;
pub mod predicate;
pub mod relation;
pub mod walk;

pub use arena::{TreeArena, TreeNode, TreeNodeConvert};
pub use codec::{LeftRight, NestedString, Sign, Slot, Token, DEFAULT_CHUNK_SIZE};
pub use error::{DomainError, DomainResult, ErrorCategory};
pub use inspection::{
    Discrepancy, DiscrepancyKind, InspectionId, InspectionRecord, InspectionReport, NewInspection,
    INSPECTION_TABLE,
};
pub use node::{
    ensure_tree_capable, GroupId, NestedSetNode, NewNode, NodeId, NodeRow, Placement,
    BACKUP_ROOT_LABEL, REQUIRED_COLUMNS, ROOT_SENTINEL,
};
pub use predicate::{Cmp, Column, ColumnDeltas, CursorKey, NodeOrder, Predicate};
pub use relation::{Cardinality, NodeRelation, RelationKind};
pub use walk::WalkEvent;
