//! Domain-level errors (no external dependencies)

use thiserror::Error;

use crate::domain::node::{GroupId, NodeId};

/// Coarse classification of domain failures.
///
/// Mutations fail fast on `Validation` and `Structural` errors and roll back
/// their transaction; callers map categories to exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Structural,
    NotFound,
    Configuration,
}

/// Domain errors represent violations of the nested-set rules.
/// These are independent of infrastructure concerns.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid range: prev={prev}, next={next}: {reason}")]
    InvalidRange {
        prev: i64,
        next: i64,
        reason: String,
    },

    #[error("boundary not found: no node has left or right = {boundary} in group {group}")]
    BoundaryNotFound { group: GroupId, boundary: i64 },

    #[error("ambiguous boundary {boundary} in group {group}: matched nodes {node_ids:?}")]
    AmbiguousBoundary {
        group: GroupId,
        boundary: i64,
        node_ids: Vec<NodeId>,
    },

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    #[error("group {group} does not have a root")]
    NoRoot { group: GroupId },

    #[error("group {group} has more than one root: {root_ids:?}")]
    DuplicateRoot {
        group: GroupId,
        root_ids: Vec<NodeId>,
    },

    #[error("broken repair chain in group {group}: {reason}")]
    BrokenRepairChain { group: GroupId, reason: String },

    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("group {0} has not been inspected")]
    NotInspected(GroupId),

    #[error("entity '{entity}' is not tree-capable: {reason}")]
    NotTreeCapable { entity: String, reason: String },
}

impl DomainError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            DomainError::InvalidRange { .. }
            | DomainError::BoundaryNotFound { .. }
            | DomainError::AmbiguousBoundary { .. }
            | DomainError::InvalidToken(_)
            | DomainError::InvalidBatch(_) => ErrorCategory::Validation,
            DomainError::NoRoot { .. }
            | DomainError::DuplicateRoot { .. }
            | DomainError::BrokenRepairChain { .. } => ErrorCategory::Structural,
            DomainError::NodeNotFound(_) | DomainError::NotInspected(_) => {
                ErrorCategory::NotFound
            }
            DomainError::NotTreeCapable { .. } => ErrorCategory::Configuration,
        }
    }

    pub(crate) fn invalid_range(prev: i64, next: i64, reason: impl Into<String>) -> Self {
        DomainError::InvalidRange {
            prev,
            next,
            reason: reason.into(),
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
