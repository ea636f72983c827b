//! Row predicates and column deltas shared by every store implementation
//!
//! A `Predicate` is evaluated in memory by `MemoryStore` and rendered to SQL by
//! `SqliteStore`; both must agree on its meaning.

use std::fmt;

use crate::domain::node::{NodeId, NodeRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Id,
    ParentId,
    Left,
    Right,
    Depth,
}

impl Column {
    /// Persisted column name.
    pub fn name(self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::ParentId => "parent_id",
            Column::Left => "lft",
            Column::Right => "rgt",
            Column::Depth => "depth",
        }
    }

    pub fn value(self, row: &NodeRow) -> i64 {
        match self {
            Column::Id => row.id,
            Column::ParentId => row.parent_id,
            Column::Left => row.left,
            Column::Right => row.right,
            Column::Depth => row.depth,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Cmp {
    pub fn symbol(self) -> &'static str {
        match self {
            Cmp::Eq => "=",
            Cmp::Ne => "<>",
            Cmp::Lt => "<",
            Cmp::Le => "<=",
            Cmp::Gt => ">",
            Cmp::Ge => ">=",
        }
    }

    pub fn holds(self, lhs: i64, rhs: i64) -> bool {
        match self {
            Cmp::Eq => lhs == rhs,
            Cmp::Ne => lhs != rhs,
            Cmp::Lt => lhs < rhs,
            Cmp::Le => lhs <= rhs,
            Cmp::Gt => lhs > rhs,
            Cmp::Ge => lhs >= rhs,
        }
    }
}

/// Boolean expression over the tree columns of a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    All,
    Compare { column: Column, cmp: Cmp, value: i64 },
    IdIn(Vec<NodeId>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn compare(column: Column, cmp: Cmp, value: i64) -> Self {
        Predicate::Compare { column, cmp, value }
    }

    pub fn id_in(ids: impl IntoIterator<Item = NodeId>) -> Self {
        Predicate::IdIn(ids.into_iter().collect())
    }

    pub fn and(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::All, p) | (p, Predicate::All) => p,
            (Predicate::And(mut lhs), Predicate::And(rhs)) => {
                lhs.extend(rhs);
                Predicate::And(lhs)
            }
            (Predicate::And(mut lhs), p) => {
                lhs.push(p);
                Predicate::And(lhs)
            }
            (p, Predicate::And(mut rhs)) => {
                rhs.insert(0, p);
                Predicate::And(rhs)
            }
            (lhs, rhs) => Predicate::And(vec![lhs, rhs]),
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::Or(mut lhs), Predicate::Or(rhs)) => {
                lhs.extend(rhs);
                Predicate::Or(lhs)
            }
            (Predicate::Or(mut lhs), p) => {
                lhs.push(p);
                Predicate::Or(lhs)
            }
            (lhs, rhs) => Predicate::Or(vec![lhs, rhs]),
        }
    }

    pub fn negate(self) -> Self {
        match self {
            Predicate::Not(inner) => *inner,
            p => Predicate::Not(Box::new(p)),
        }
    }

    /// `left > left_bound AND right < right_bound`: strict descendants of a range.
    pub fn strictly_inside(left: i64, right: i64) -> Self {
        Predicate::compare(Column::Left, Cmp::Gt, left)
            .and(Predicate::compare(Column::Right, Cmp::Lt, right))
    }

    /// The node spanning `[left, right]` and all its descendants.
    pub fn inside_or_equal(left: i64, right: i64) -> Self {
        Predicate::compare(Column::Left, Cmp::Ge, left)
            .and(Predicate::compare(Column::Right, Cmp::Le, right))
    }

    /// Strict ancestors of a range.
    pub fn enclosing(left: i64, right: i64) -> Self {
        Predicate::compare(Column::Left, Cmp::Lt, left)
            .and(Predicate::compare(Column::Right, Cmp::Gt, right))
    }

    /// `column` within the half-open interval `(low, high]`.
    pub fn in_left_open(column: Column, low: i64, high: i64) -> Self {
        Predicate::compare(column, Cmp::Gt, low).and(Predicate::compare(column, Cmp::Le, high))
    }

    /// `column` within the half-open interval `[low, high)`.
    pub fn in_right_open(column: Column, low: i64, high: i64) -> Self {
        Predicate::compare(column, Cmp::Ge, low).and(Predicate::compare(column, Cmp::Lt, high))
    }

    /// Either edge of a node equals `boundary`.
    pub fn touches(boundary: i64) -> Self {
        Predicate::compare(Column::Right, Cmp::Eq, boundary)
            .or(Predicate::compare(Column::Left, Cmp::Eq, boundary))
    }

    pub fn matches(&self, row: &NodeRow) -> bool {
        match self {
            Predicate::All => true,
            Predicate::Compare { column, cmp, value } => cmp.holds(column.value(row), *value),
            Predicate::IdIn(ids) => ids.contains(&row.id),
            Predicate::And(parts) => parts.iter().all(|p| p.matches(row)),
            Predicate::Or(parts) => parts.iter().any(|p| p.matches(row)),
            Predicate::Not(inner) => !inner.matches(row),
        }
    }

    /// Render as a SQL boolean expression.
    ///
    /// Comparison values are bound through `params`; id lists are inlined as
    /// integer literals so large subtrees do not exhaust the bind limit.
    pub fn to_sql(&self, params: &mut Vec<i64>) -> String {
        match self {
            Predicate::All => "1 = 1".to_string(),
            Predicate::Compare { column, cmp, value } => {
                params.push(*value);
                format!("{} {} ?", column.name(), cmp.symbol())
            }
            Predicate::IdIn(ids) if ids.is_empty() => "1 = 0".to_string(),
            Predicate::IdIn(ids) => {
                let list: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
                format!("id IN ({})", list.join(", "))
            }
            Predicate::And(parts) if parts.is_empty() => "1 = 1".to_string(),
            Predicate::And(parts) => join_sql(parts, " AND ", params),
            Predicate::Or(parts) if parts.is_empty() => "1 = 0".to_string(),
            Predicate::Or(parts) => join_sql(parts, " OR ", params),
            Predicate::Not(inner) => format!("NOT ({})", inner.to_sql(params)),
        }
    }
}

fn join_sql(parts: &[Predicate], separator: &str, params: &mut Vec<i64>) -> String {
    let rendered: Vec<String> = parts
        .iter()
        .map(|p| format!("({})", p.to_sql(params)))
        .collect();
    rendered.join(separator)
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut params = Vec::new();
        let sql = self.to_sql(&mut params);
        write!(f, "{} {:?}", sql, params)
    }
}

/// Signed arithmetic applied to the tree columns of every matching row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnDeltas {
    pub left: i64,
    pub right: i64,
    pub depth: i64,
}

impl ColumnDeltas {
    pub fn left(delta: i64) -> Self {
        Self {
            left: delta,
            ..Self::default()
        }
    }

    pub fn right(delta: i64) -> Self {
        Self {
            right: delta,
            ..Self::default()
        }
    }

    /// Same delta on both edges: a rigid shift of a range.
    pub fn shift(delta: i64) -> Self {
        Self {
            left: delta,
            right: delta,
            depth: 0,
        }
    }

    pub fn with_depth(mut self, delta: i64) -> Self {
        self.depth = delta;
        self
    }

    pub fn is_zero(&self) -> bool {
        self.left == 0 && self.right == 0 && self.depth == 0
    }

    pub fn apply(&self, row: &mut NodeRow) {
        row.left += self.left;
        row.right += self.right;
        row.depth += self.depth;
    }
}

/// Ordering of rows returned by range queries and cursors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOrder {
    Id,
    Left,
}

impl NodeOrder {
    pub fn column(self) -> Column {
        match self {
            NodeOrder::Id => Column::Id,
            NodeOrder::Left => Column::Left,
        }
    }

    pub fn key_of(self, row: &NodeRow) -> CursorKey {
        CursorKey {
            value: self.column().value(row),
            id: row.id,
        }
    }
}

/// Keyset position of a cursor: the last `(order column, id)` pair seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CursorKey {
    pub value: i64,
    pub id: NodeId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::ROOT_SENTINEL;

    fn row(id: NodeId, left: i64, right: i64) -> NodeRow {
        NodeRow {
            id,
            parent_id: ROOT_SENTINEL,
            left,
            right,
            depth: 0,
            group_id: 1,
            label: None,
        }
    }

    #[test]
    fn given_range_predicates_when_matching_then_respects_bounds() {
        let inside = Predicate::strictly_inside(4, 7);
        assert!(inside.matches(&row(1, 5, 6)));
        assert!(!inside.matches(&row(2, 4, 7)));

        let half_open = Predicate::in_left_open(Column::Right, 3, 9);
        assert!(half_open.matches(&row(3, 8, 9)));
        assert!(!half_open.matches(&row(4, 2, 3)));
    }

    #[test]
    fn given_nested_predicate_when_rendering_then_binds_in_order() {
        let predicate = Predicate::touches(9).and(Predicate::id_in([4, 5]).negate());
        let mut params = Vec::new();
        let sql = predicate.to_sql(&mut params);
        assert_eq!(sql, "((rgt = ?) OR (lft = ?)) AND (NOT (id IN (4, 5)))");
        assert_eq!(params, vec![9, 9]);
    }

    #[test]
    fn given_all_when_and_combined_then_collapses() {
        let p = Predicate::All.and(Predicate::compare(Column::Depth, Cmp::Eq, 1));
        assert_eq!(p, Predicate::compare(Column::Depth, Cmp::Eq, 1));
    }

    #[test]
    fn given_empty_id_list_when_matching_then_matches_nothing() {
        let p = Predicate::id_in(Vec::<NodeId>::new());
        assert!(!p.matches(&row(1, 1, 2)));
        let mut params = Vec::new();
        assert_eq!(p.to_sql(&mut params), "1 = 0");
    }

    #[test]
    fn given_deltas_when_applied_then_shift_columns() {
        let mut r = row(1, 4, 7);
        ColumnDeltas::shift(-2).with_depth(1).apply(&mut r);
        assert_eq!((r.left, r.right, r.depth), (2, 5, 1));
    }
}
