//! Node relations as data: which rows relate to a node and how many to expect

use crate::domain::node::{NestedSetNode, NodeRow};
use crate::domain::predicate::{Cmp, Column, Predicate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationKind {
    /// Descendants; `depth` limits how many levels below the node are included.
    Children { depth: Option<u32> },
    /// Ancestors, root first.
    Parents,
    PrevSibling,
    NextSibling,
    Custom(Predicate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRelation {
    pub kind: RelationKind,
    pub cardinality: Cardinality,
}

impl NodeRelation {
    pub fn children() -> Self {
        Self {
            kind: RelationKind::Children { depth: None },
            cardinality: Cardinality::Many,
        }
    }

    pub fn children_to_depth(depth: u32) -> Self {
        Self {
            kind: RelationKind::Children { depth: Some(depth) },
            cardinality: Cardinality::Many,
        }
    }

    pub fn parents() -> Self {
        Self {
            kind: RelationKind::Parents,
            cardinality: Cardinality::Many,
        }
    }

    pub fn prev_sibling() -> Self {
        Self {
            kind: RelationKind::PrevSibling,
            cardinality: Cardinality::One,
        }
    }

    pub fn next_sibling() -> Self {
        Self {
            kind: RelationKind::NextSibling,
            cardinality: Cardinality::One,
        }
    }

    pub fn custom(predicate: Predicate, cardinality: Cardinality) -> Self {
        Self {
            kind: RelationKind::Custom(predicate),
            cardinality,
        }
    }

    pub fn is_many(&self) -> bool {
        self.cardinality == Cardinality::Many
    }

    /// Predicate selecting the related rows of `node` within its group.
    pub fn predicate_for(&self, node: &NodeRow) -> Predicate {
        match &self.kind {
            RelationKind::Children { depth } => {
                let inside = Predicate::strictly_inside(node.left(), node.right());
                match depth {
                    Some(levels) => inside.and(Predicate::compare(
                        Column::Depth,
                        Cmp::Le,
                        node.depth() + i64::from(*levels),
                    )),
                    None => inside,
                }
            }
            RelationKind::Parents => Predicate::enclosing(node.left(), node.right()),
            RelationKind::PrevSibling => {
                Predicate::compare(Column::Right, Cmp::Eq, node.left() - 1)
            }
            RelationKind::NextSibling => {
                Predicate::compare(Column::Left, Cmp::Eq, node.right() + 1)
            }
            RelationKind::Custom(predicate) => predicate.clone(),
        }
    }
}
