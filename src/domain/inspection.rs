//! Inspection records: the persisted audit outcome of an inspection or repair

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::node::{GroupId, NodeId};

pub type InspectionId = i64;

/// Table holding inspection records.
pub const INSPECTION_TABLE: &str = "model_set_inspections";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscrepancyKind {
    DoesntHaveRoot,
    MissingParent,
    WrongLeft,
    WrongRight,
    DuplicateRoot,
}

impl DiscrepancyKind {
    pub fn code(self) -> &'static str {
        match self {
            DiscrepancyKind::DoesntHaveRoot => "DOESNT_HAVE_ROOT",
            DiscrepancyKind::MissingParent => "MISSING_PARENT",
            DiscrepancyKind::WrongLeft => "WRONG_LEFT",
            DiscrepancyKind::WrongRight => "WRONG_RIGHT",
            DiscrepancyKind::DuplicateRoot => "DUPLICATE_ROOT",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            DiscrepancyKind::DoesntHaveRoot => "Does not have root in set",
            DiscrepancyKind::MissingParent => "Missing parent",
            DiscrepancyKind::WrongLeft => "Incorrect Left",
            DiscrepancyKind::WrongRight => "Incorrect Right",
            DiscrepancyKind::DuplicateRoot => "More than one root in set",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        [
            DiscrepancyKind::DoesntHaveRoot,
            DiscrepancyKind::MissingParent,
            DiscrepancyKind::WrongLeft,
            DiscrepancyKind::WrongRight,
            DiscrepancyKind::DuplicateRoot,
        ]
        .into_iter()
        .find(|kind| kind.code() == code)
    }
}

/// One finding of an inspection.
///
/// For `MissingParent`, `observed` holds the declared parent id that resolves
/// to nothing and `expected` is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discrepancy {
    pub kind: DiscrepancyKind,
    pub node_id: Option<NodeId>,
    pub observed: Option<i64>,
    pub expected: Option<i64>,
}

impl Discrepancy {
    pub fn no_root() -> Self {
        Self {
            kind: DiscrepancyKind::DoesntHaveRoot,
            node_id: None,
            observed: None,
            expected: None,
        }
    }

    pub fn duplicate_root(node_id: NodeId) -> Self {
        Self {
            kind: DiscrepancyKind::DuplicateRoot,
            node_id: Some(node_id),
            observed: None,
            expected: None,
        }
    }

    pub fn missing_parent(node_id: NodeId, missing_parent_id: NodeId) -> Self {
        Self {
            kind: DiscrepancyKind::MissingParent,
            node_id: Some(node_id),
            observed: Some(missing_parent_id),
            expected: None,
        }
    }

    pub fn wrong_left(node_id: NodeId, observed: i64, expected: i64) -> Self {
        Self {
            kind: DiscrepancyKind::WrongLeft,
            node_id: Some(node_id),
            observed: Some(observed),
            expected: Some(expected),
        }
    }

    pub fn wrong_right(node_id: NodeId, observed: i64, expected: i64) -> Self {
        Self {
            kind: DiscrepancyKind::WrongRight,
            node_id: Some(node_id),
            observed: Some(observed),
            expected: Some(expected),
        }
    }

    pub fn to_entry(&self) -> ErrorEntry {
        let data = match self.kind {
            DiscrepancyKind::MissingParent => ErrorData {
                primary_id: self.node_id,
                missing_parent_id: self.observed,
                ..ErrorData::default()
            },
            _ => ErrorData {
                primary_id: self.node_id,
                current: self.observed,
                must_be: self.expected,
                ..ErrorData::default()
            },
        };
        ErrorEntry {
            message: self.kind.message().to_string(),
            code: self.kind.code().to_string(),
            data,
        }
    }

    pub fn from_entry(entry: &ErrorEntry) -> Option<Self> {
        let kind = DiscrepancyKind::from_code(&entry.code)?;
        let observed = match kind {
            DiscrepancyKind::MissingParent => entry.data.missing_parent_id,
            _ => entry.data.current,
        };
        Some(Self {
            kind,
            node_id: entry.data.primary_id,
            observed,
            expected: entry.data.must_be,
        })
    }
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.code())?;
        if let Some(id) = self.node_id {
            write!(f, " node {}", id)?;
        }
        match (self.kind, self.observed, self.expected) {
            (DiscrepancyKind::MissingParent, Some(parent), _) => {
                write!(f, ": parent {} does not exist", parent)
            }
            (_, Some(observed), Some(expected)) => {
                write!(f, ": is {}, must be {}", observed, expected)
            }
            _ => Ok(()),
        }
    }
}

/// Persisted shape of one discrepancy inside the `errors` JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub message: String,
    pub code: String,
    #[serde(default)]
    pub data: ErrorData,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_id: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub must_be: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_parent_id: Option<NodeId>,
}

/// Outcome of checking one group, before it is persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InspectionReport {
    pub root_id: Option<NodeId>,
    pub missing_ids: Vec<NodeId>,
    pub discrepancies: Vec<Discrepancy>,
}

impl InspectionReport {
    pub fn is_broken(&self) -> bool {
        !self.discrepancies.is_empty()
    }

    pub fn count_of(&self, kind: DiscrepancyKind) -> usize {
        self.discrepancies.iter().filter(|d| d.kind == kind).count()
    }
}

/// Inspection about to be persisted; the store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInspection {
    pub entity: String,
    pub group_id: GroupId,
    pub root_id: Option<NodeId>,
    pub missing_ids: Vec<NodeId>,
    pub discrepancies: Vec<Discrepancy>,
    pub description: Option<String>,
    pub from_inspection_id: Option<InspectionId>,
}

impl NewInspection {
    pub fn from_report(
        entity: &str,
        group_id: GroupId,
        report: InspectionReport,
        from_inspection_id: Option<InspectionId>,
    ) -> Self {
        let description = if report.is_broken() {
            format!("Has {} discrepancies", report.discrepancies.len())
        } else {
            "Model set is correct".to_string()
        };
        let description = match from_inspection_id {
            Some(id) => format!("{} (after repairing inspection #{})", description, id),
            None => description,
        };
        Self {
            entity: entity.to_string(),
            group_id,
            root_id: report.root_id,
            missing_ids: report.missing_ids,
            discrepancies: report.discrepancies,
            description: Some(description),
            from_inspection_id,
        }
    }

    pub fn is_broken(&self) -> bool {
        !self.discrepancies.is_empty()
    }

    pub fn into_record(self, id: InspectionId, created_at: DateTime<Utc>) -> InspectionRecord {
        let is_broken = self.is_broken();
        InspectionRecord {
            id,
            entity: self.entity,
            group_id: self.group_id,
            is_broken,
            root_id: self.root_id,
            missing_ids: self.missing_ids,
            discrepancies: self.discrepancies,
            is_resolved: !is_broken,
            description: self.description,
            from_inspection_id: self.from_inspection_id,
            created_at,
        }
    }
}

/// Immutable audit record; a newer record for the same group supersedes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectionRecord {
    pub id: InspectionId,
    pub entity: String,
    pub group_id: GroupId,
    pub is_broken: bool,
    pub root_id: Option<NodeId>,
    pub missing_ids: Vec<NodeId>,
    pub discrepancies: Vec<Discrepancy>,
    pub is_resolved: bool,
    pub description: Option<String>,
    pub from_inspection_id: Option<InspectionId>,
    pub created_at: DateTime<Utc>,
}

impl InspectionRecord {
    pub fn has_root(&self) -> bool {
        self.root_id.is_some()
    }

    pub fn count_of(&self, kind: DiscrepancyKind) -> usize {
        self.discrepancies.iter().filter(|d| d.kind == kind).count()
    }
}

/// `missing_ids` column format: `2,35,6,10`; `None` when empty.
pub fn missing_ids_to_csv(ids: &[NodeId]) -> Option<String> {
    if ids.is_empty() {
        return None;
    }
    let parts: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    Some(parts.join(","))
}

/// Inverse of [`missing_ids_to_csv`]; unparsable fragments are skipped.
pub fn missing_ids_from_csv(csv: Option<&str>) -> Vec<NodeId> {
    csv.map(|s| {
        s.split(',')
            .filter_map(|part| part.trim().parse::<NodeId>().ok())
            .collect()
    })
    .unwrap_or_default()
}

/// `errors` column format: JSON array of `{message, code, data}`; `None` when empty.
pub fn discrepancies_to_json(
    discrepancies: &[Discrepancy],
) -> Result<Option<String>, serde_json::Error> {
    if discrepancies.is_empty() {
        return Ok(None);
    }
    let entries: Vec<ErrorEntry> = discrepancies.iter().map(Discrepancy::to_entry).collect();
    serde_json::to_string(&entries).map(Some)
}

pub fn discrepancies_from_json(json: Option<&str>) -> Result<Vec<Discrepancy>, serde_json::Error> {
    let Some(json) = json else {
        return Ok(Vec::new());
    };
    let entries: Vec<ErrorEntry> = serde_json::from_str(json)?;
    Ok(entries.iter().filter_map(Discrepancy::from_entry).collect())
}
