//! Node rows and the nested-set accessor capability

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, DomainResult};

/// Primary key of a stored node.
pub type NodeId = i64;

/// Partition key: every group holds one independent tree.
pub type GroupId = i64;

/// `parent_id` value carried by the root of a group.
pub const ROOT_SENTINEL: NodeId = 0;

/// Label given to roots created by repair when a group has none.
pub const BACKUP_ROOT_LABEL: &str = "backup root";

/// Columns every tree-capable entity must provide.
pub const REQUIRED_COLUMNS: [&str; 6] = ["id", "parent_id", "lft", "rgt", "depth", "group_id"];

/// Accessor capability for anything encoded as a nested-set node.
///
/// Only the mutator and the repair engine write these fields; everything
/// else treats them as derived, read-only state.
pub trait NestedSetNode {
    fn id(&self) -> NodeId;
    fn group_id(&self) -> GroupId;

    fn parent_id(&self) -> NodeId;
    fn set_parent_id(&mut self, parent_id: NodeId);

    fn left(&self) -> i64;
    fn set_left(&mut self, value: i64);

    fn right(&self) -> i64;
    fn set_right(&mut self, value: i64);

    fn depth(&self) -> i64;
    fn set_depth(&mut self, value: i64);

    fn is_root(&self) -> bool {
        self.parent_id() == ROOT_SENTINEL
    }

    fn is_leaf(&self) -> bool {
        self.right() - self.left() == 1
    }

    /// Number of slots the node and its subtree occupy: `right - left + 1`.
    fn width(&self) -> i64 {
        self.right() - self.left() + 1
    }

    fn descendant_count(&self) -> i64 {
        (self.right() - self.left() - 1) / 2
    }

    /// True when `value` lies within `[left, right]`.
    fn spans(&self, value: i64) -> bool {
        value >= self.left() && value <= self.right()
    }

    fn is_child_of(&self, other: &Self) -> bool
    where
        Self: Sized,
    {
        self.group_id() == other.group_id()
            && self.left() > other.left()
            && self.right() < other.right()
    }

    fn is_parent_of(&self, other: &Self) -> bool
    where
        Self: Sized,
    {
        other.is_child_of(self)
    }

    fn is_closest_parent_of(&self, other: &Self) -> bool
    where
        Self: Sized,
    {
        self.id() == other.parent_id()
    }

    fn is_closest_child_of(&self, other: &Self) -> bool
    where
        Self: Sized,
    {
        self.parent_id() == other.id()
    }

    fn is_sibling_of(&self, other: &Self) -> bool
    where
        Self: Sized,
    {
        self.group_id() == other.group_id() && self.parent_id() == other.parent_id()
    }
}

/// One persisted row: `{id, parent_id, lft, rgt, depth, group_id}` plus a label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRow {
    pub id: NodeId,
    pub parent_id: NodeId,
    #[serde(rename = "lft")]
    pub left: i64,
    #[serde(rename = "rgt")]
    pub right: i64,
    pub depth: i64,
    pub group_id: GroupId,
    pub label: Option<String>,
}

impl NestedSetNode for NodeRow {
    fn id(&self) -> NodeId {
        self.id
    }

    fn group_id(&self) -> GroupId {
        self.group_id
    }

    fn parent_id(&self) -> NodeId {
        self.parent_id
    }

    fn set_parent_id(&mut self, parent_id: NodeId) {
        self.parent_id = parent_id;
    }

    fn left(&self) -> i64 {
        self.left
    }

    fn set_left(&mut self, value: i64) {
        self.left = value;
    }

    fn right(&self) -> i64 {
        self.right
    }

    fn set_right(&mut self, value: i64) {
        self.right = value;
    }

    fn depth(&self) -> i64 {
        self.depth
    }

    fn set_depth(&mut self, value: i64) {
        self.depth = value;
    }
}

impl fmt::Display for NodeRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{} #{} [{}, {}]", label, self.id, self.left, self.right),
            None => write!(f, "#{} [{}, {}]", self.id, self.left, self.right),
        }
    }
}

/// Attributes of a row about to be inserted; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNode {
    pub parent_id: NodeId,
    pub left: i64,
    pub right: i64,
    pub depth: i64,
    pub group_id: GroupId,
    pub label: Option<String>,
}

impl NewNode {
    /// A lone root `[1, 2]` at depth 0.
    pub fn root(group_id: GroupId, label: Option<String>) -> Self {
        Self {
            parent_id: ROOT_SENTINEL,
            left: 1,
            right: 2,
            depth: 0,
            group_id,
            label,
        }
    }

    /// A leaf occupying the slot right before `parent.right`.
    pub fn last_child_of(parent: &impl NestedSetNode, label: Option<String>) -> Self {
        Self {
            parent_id: parent.id(),
            left: parent.right(),
            right: parent.right() + 1,
            depth: parent.depth() + 1,
            group_id: parent.group_id(),
            label,
        }
    }

    pub fn backup_root(group_id: GroupId) -> Self {
        Self::root(group_id, Some(BACKUP_ROOT_LABEL.to_string()))
    }

    pub fn into_row(self, id: NodeId) -> NodeRow {
        NodeRow {
            id,
            parent_id: self.parent_id,
            left: self.left,
            right: self.right,
            depth: self.depth,
            group_id: self.group_id,
            label: self.label,
        }
    }
}

/// Target `left/right/depth` of one node in a keyed bulk update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub left: i64,
    pub right: i64,
    pub depth: i64,
}

/// Verify an entity name and its column list can host a nested set.
pub fn ensure_tree_capable(entity: &str, columns: &[String]) -> DomainResult<()> {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    let ident = IDENT.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

    if !ident.is_match(entity) {
        return Err(DomainError::NotTreeCapable {
            entity: entity.to_string(),
            reason: "name must be a plain SQL identifier".to_string(),
        });
    }

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|required| !columns.iter().any(|c| c.eq_ignore_ascii_case(required)))
        .collect();
    if !missing.is_empty() {
        return Err(DomainError::NotTreeCapable {
            entity: entity.to_string(),
            reason: format!("missing columns: {}", missing.join(", ")),
        });
    }
    Ok(())
}
