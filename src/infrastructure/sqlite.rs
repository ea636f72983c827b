//! SQLite-backed store: every bulk operation is one SQL statement

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::{debug, instrument, trace};

use crate::domain::inspection::{
    discrepancies_from_json, discrepancies_to_json, missing_ids_from_csv, missing_ids_to_csv,
};
use crate::domain::{
    ensure_tree_capable, ColumnDeltas, CursorKey, GroupId, InspectionId, InspectionRecord,
    NewInspection, NewNode, NodeId, NodeOrder, NodeRow, Placement, Predicate, INSPECTION_TABLE,
    REQUIRED_COLUMNS,
};
use crate::infrastructure::traits::{InspectionStore, NodeStore};
use crate::infrastructure::{InfraError, InfraResult};

pub struct SqliteStore {
    conn: Mutex<Connection>,
    entity: String,
    /// Column list used by every row SELECT
    select_columns: String,
}

impl SqliteStore {
    /// Open (or create) the database file and prepare both tables.
    pub fn open(path: &Path, entity: &str) -> InfraResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| InfraError::io(format!("create {}", parent.display()), e))?;
        }
        Self::init(Connection::open(path)?, entity)
    }

    pub fn open_in_memory(entity: &str) -> InfraResult<Self> {
        Self::init(Connection::open_in_memory()?, entity)
    }

    #[instrument(level = "debug", skip(conn))]
    fn init(conn: Connection, entity: &str) -> InfraResult<Self> {
        let required: Vec<String> = REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect();
        // name check before it is spliced into any statement
        ensure_tree_capable(entity, &required)?;

        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {entity} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                parent_id INTEGER NOT NULL DEFAULT 0,
                lft INTEGER NOT NULL,
                rgt INTEGER NOT NULL,
                depth INTEGER NOT NULL DEFAULT 0,
                group_id INTEGER NOT NULL,
                label TEXT
            );
            "#
        ))?;

        let columns = table_columns(&conn, entity)?;
        ensure_tree_capable(entity, &columns)?;

        conn.execute_batch(&format!(
            r#"
            CREATE INDEX IF NOT EXISTS {entity}_group_lft ON {entity}(group_id, lft);
            CREATE INDEX IF NOT EXISTS {entity}_group_rgt ON {entity}(group_id, rgt);
            CREATE TABLE IF NOT EXISTS {INSPECTION_TABLE} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                class TEXT NOT NULL,
                group_id INTEGER NOT NULL,
                is_broken INTEGER NOT NULL DEFAULT 0,
                root_id INTEGER,
                missing_ids TEXT,
                errors TEXT,
                is_resolved INTEGER NOT NULL DEFAULT 0,
                description TEXT,
                from_inspection_id INTEGER,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS {INSPECTION_TABLE}_class_group
                ON {INSPECTION_TABLE}(class, group_id);
            "#
        ))?;

        let label = if columns.iter().any(|c| c.eq_ignore_ascii_case("label")) {
            "label"
        } else {
            "NULL AS label"
        };
        debug!(entity, ?columns, "store ready");

        Ok(Self {
            conn: Mutex::new(conn),
            entity: entity.to_string(),
            select_columns: format!("id, parent_id, lft, rgt, depth, group_id, {label}"),
        })
    }

    fn lock(&self) -> InfraResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| InfraError::LockPoisoned(e.to_string()))
    }

    fn select_rows(&self, where_sql: &str, params: Vec<i64>) -> InfraResult<Vec<NodeRow>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {}",
            self.select_columns, self.entity, where_sql
        );
        trace!(%sql, ?params, "select");
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(params), read_node_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn execute(&self, sql: &str, params: Vec<i64>) -> InfraResult<usize> {
        trace!(%sql, ?params, "execute");
        let conn = self.lock()?;
        Ok(conn.execute(sql, params_from_iter(params))?)
    }
}

fn table_columns(conn: &Connection, entity: &str) -> InfraResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({entity})"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    if columns.is_empty() {
        return Err(InfraError::Schema(format!("table '{entity}' not found")));
    }
    Ok(columns)
}

fn read_node_row(row: &rusqlite::Row<'_>) -> Result<NodeRow, rusqlite::Error> {
    Ok(NodeRow {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        left: row.get(2)?,
        right: row.get(3)?,
        depth: row.get(4)?,
        group_id: row.get(5)?,
        label: row.get(6)?,
    })
}

fn id_list(ids: impl IntoIterator<Item = NodeId>) -> String {
    ids.into_iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// `CASE id WHEN .. THEN .. END` for one column of a keyed update.
fn case_column(placements: &BTreeMap<NodeId, Placement>, value: fn(&Placement) -> i64) -> String {
    let arms: String = placements
        .iter()
        .map(|(id, p)| format!(" WHEN {} THEN {}", id, value(p)))
        .collect();
    format!("CASE id{} END", arms)
}

impl NodeStore for SqliteStore {
    fn begin(&self) -> InfraResult<()> {
        let conn = self.lock()?;
        if !conn.is_autocommit() {
            return Err(InfraError::Transaction(
                "a transaction is already open".to_string(),
            ));
        }
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit(&self) -> InfraResult<()> {
        let conn = self.lock()?;
        if conn.is_autocommit() {
            return Err(InfraError::Transaction("commit without begin".to_string()));
        }
        conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&self) -> InfraResult<()> {
        let conn = self.lock()?;
        if conn.is_autocommit() {
            return Err(InfraError::Transaction(
                "rollback without begin".to_string(),
            ));
        }
        conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn entity(&self) -> &str {
        &self.entity
    }

    fn find(&self, id: NodeId) -> InfraResult<Option<NodeRow>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?1",
            self.select_columns, self.entity
        );
        let conn = self.lock()?;
        Ok(conn.query_row(&sql, params![id], read_node_row).optional()?)
    }

    fn max_group_id(&self) -> InfraResult<GroupId> {
        let sql = format!("SELECT COALESCE(MAX(group_id), 0) FROM {}", self.entity);
        let conn = self.lock()?;
        Ok(conn.query_row(&sql, [], |row| row.get(0))?)
    }

    fn range_query(
        &self,
        group: GroupId,
        predicate: &Predicate,
        order: NodeOrder,
    ) -> InfraResult<Vec<NodeRow>> {
        let mut params = vec![group];
        let where_sql = format!(
            "group_id = ? AND ({}) ORDER BY {}, id",
            predicate.to_sql(&mut params),
            order.column().name()
        );
        self.select_rows(&where_sql, params)
    }

    fn count(&self, group: GroupId, predicate: &Predicate) -> InfraResult<usize> {
        let mut params = vec![group];
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE group_id = ? AND ({})",
            self.entity,
            predicate.to_sql(&mut params)
        );
        let conn = self.lock()?;
        let count: i64 = conn.query_row(&sql, params_from_iter(params), |row| row.get(0))?;
        Ok(count as usize)
    }

    fn page(
        &self,
        group: GroupId,
        order: NodeOrder,
        after: Option<CursorKey>,
        limit: usize,
    ) -> InfraResult<Vec<NodeRow>> {
        let column = order.column().name();
        let mut params = vec![group];
        let mut where_sql = "group_id = ?".to_string();
        if let Some(key) = after {
            where_sql.push_str(&format!(
                " AND ({column} > ? OR ({column} = ? AND id > ?))"
            ));
            params.extend([key.value, key.value, key.id]);
        }
        where_sql.push_str(&format!(" ORDER BY {column}, id LIMIT ?"));
        params.push(i64::try_from(limit).unwrap_or(i64::MAX));
        self.select_rows(&where_sql, params)
    }

    #[instrument(level = "trace", skip(self))]
    fn bulk_update(
        &self,
        group: GroupId,
        predicate: &Predicate,
        deltas: ColumnDeltas,
    ) -> InfraResult<usize> {
        if deltas.is_zero() {
            return Ok(0);
        }
        let mut params = vec![deltas.left, deltas.right, deltas.depth, group];
        let sql = format!(
            "UPDATE {} SET lft = lft + ?, rgt = rgt + ?, depth = depth + ? \
             WHERE group_id = ? AND ({})",
            self.entity,
            predicate.to_sql(&mut params)
        );
        let affected = self.execute(&sql, params)?;
        debug!(affected, "bulk update");
        Ok(affected)
    }

    fn case_update(
        &self,
        group: GroupId,
        placements: &BTreeMap<NodeId, Placement>,
    ) -> InfraResult<usize> {
        if placements.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "UPDATE {} SET lft = {}, rgt = {}, depth = {} WHERE group_id = ? AND id IN ({})",
            self.entity,
            case_column(placements, |p| p.left),
            case_column(placements, |p| p.right),
            case_column(placements, |p| p.depth),
            id_list(placements.keys().copied())
        );
        let affected = self.execute(&sql, vec![group])?;
        debug!(affected, "case update");
        Ok(affected)
    }

    fn reparent(&self, group: GroupId, ids: &[NodeId], parent: NodeId) -> InfraResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "UPDATE {} SET parent_id = ? WHERE group_id = ? AND id IN ({})",
            self.entity,
            id_list(ids.iter().copied())
        );
        self.execute(&sql, vec![parent, group])
    }

    fn insert_row(&self, node: NewNode) -> InfraResult<NodeRow> {
        let sql = format!(
            "INSERT INTO {} (parent_id, lft, rgt, depth, group_id, label) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            self.entity
        );
        let conn = self.lock()?;
        conn.execute(
            &sql,
            params![
                node.parent_id,
                node.left,
                node.right,
                node.depth,
                node.group_id,
                node.label
            ],
        )?;
        let id = conn.last_insert_rowid();
        Ok(node.into_row(id))
    }

    fn delete_rows(&self, ids: &[NodeId]) -> InfraResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM {} WHERE id IN ({})",
            self.entity,
            id_list(ids.iter().copied())
        );
        self.execute(&sql, Vec::new())
    }

    fn delete_where(&self, group: GroupId, predicate: &Predicate) -> InfraResult<usize> {
        let mut params = vec![group];
        let sql = format!(
            "DELETE FROM {} WHERE group_id = ? AND ({})",
            self.entity,
            predicate.to_sql(&mut params)
        );
        self.execute(&sql, params)
    }
}

const INSPECTION_COLUMNS: &str = "id, class, group_id, root_id, missing_ids, errors, \
                                  description, from_inspection_id, created_at";

struct RawInspection {
    id: InspectionId,
    class: String,
    group_id: GroupId,
    root_id: Option<NodeId>,
    missing_ids: Option<String>,
    errors: Option<String>,
    description: Option<String>,
    from_inspection_id: Option<InspectionId>,
    created_at: String,
}

fn read_raw_inspection(row: &rusqlite::Row<'_>) -> Result<RawInspection, rusqlite::Error> {
    Ok(RawInspection {
        id: row.get(0)?,
        class: row.get(1)?,
        group_id: row.get(2)?,
        root_id: row.get(3)?,
        missing_ids: row.get(4)?,
        errors: row.get(5)?,
        description: row.get(6)?,
        from_inspection_id: row.get(7)?,
        created_at: row.get(8)?,
    })
}

impl RawInspection {
    fn into_record(self) -> InfraResult<InspectionRecord> {
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| InfraError::Schema(format!("created_at '{}': {}", self.created_at, e)))?
            .with_timezone(&Utc);
        let inspection = NewInspection {
            entity: self.class,
            group_id: self.group_id,
            root_id: self.root_id,
            missing_ids: missing_ids_from_csv(self.missing_ids.as_deref()),
            discrepancies: discrepancies_from_json(self.errors.as_deref())?,
            description: self.description,
            from_inspection_id: self.from_inspection_id,
        };
        Ok(inspection.into_record(self.id, created_at))
    }
}

impl SqliteStore {
    fn select_inspections(
        &self,
        where_sql: &str,
        params: Vec<rusqlite::types::Value>,
    ) -> InfraResult<Vec<InspectionRecord>> {
        let sql = format!(
            "SELECT {INSPECTION_COLUMNS} FROM {INSPECTION_TABLE} WHERE {where_sql}"
        );
        let raw = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(params), read_raw_inspection)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        raw.into_iter().map(RawInspection::into_record).collect()
    }
}

impl InspectionStore for SqliteStore {
    fn insert_inspection(&self, inspection: NewInspection) -> InfraResult<InspectionRecord> {
        let errors = discrepancies_to_json(&inspection.discrepancies)?;
        let missing = missing_ids_to_csv(&inspection.missing_ids);
        let created_at = Utc::now();
        let is_broken = inspection.is_broken();
        let id = {
            let conn = self.lock()?;
            conn.execute(
                &format!(
                    "INSERT INTO {INSPECTION_TABLE} (class, group_id, is_broken, root_id, \
                     missing_ids, errors, is_resolved, description, from_inspection_id, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    inspection.entity,
                    inspection.group_id,
                    is_broken,
                    inspection.root_id,
                    missing,
                    errors,
                    !is_broken,
                    inspection.description,
                    inspection.from_inspection_id,
                    created_at.to_rfc3339()
                ],
            )?;
            conn.last_insert_rowid()
        };
        Ok(inspection.into_record(id, created_at))
    }

    fn latest_inspection(
        &self,
        entity: &str,
        group: GroupId,
    ) -> InfraResult<Option<InspectionRecord>> {
        Ok(self
            .select_inspections(
                "class = ? AND group_id = ? ORDER BY id DESC LIMIT 1",
                vec![entity.to_string().into(), group.into()],
            )?
            .into_iter()
            .next())
    }

    fn inspection(&self, id: InspectionId) -> InfraResult<Option<InspectionRecord>> {
        Ok(self
            .select_inspections("id = ?", vec![id.into()])?
            .into_iter()
            .next())
    }

    fn inspection_history(
        &self,
        entity: &str,
        group: GroupId,
    ) -> InfraResult<Vec<InspectionRecord>> {
        self.select_inspections(
            "class = ? AND group_id = ? ORDER BY id DESC",
            vec![entity.to_string().into(), group.into()],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Cmp, Column, DomainError};

    #[test]
    fn given_invalid_entity_name_when_opening_then_not_tree_capable() {
        let result = SqliteStore::open_in_memory("nodes; DROP TABLE x");
        assert!(matches!(
            result,
            Err(InfraError::Domain(DomainError::NotTreeCapable { .. }))
        ));
    }

    #[test]
    fn given_existing_table_without_tree_columns_when_opening_then_not_tree_capable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);")
            .unwrap();

        let result = SqliteStore::open(&path, "users");

        assert!(matches!(
            result,
            Err(InfraError::Domain(DomainError::NotTreeCapable { .. }))
        ));
    }

    #[test]
    fn given_rows_when_bulk_updating_then_only_matching_rows_shift() {
        let store = SqliteStore::open_in_memory("nodes").unwrap();
        store.insert_row(NewNode::root(1, None)).unwrap();
        let other = store.insert_row(NewNode::root(2, None)).unwrap();

        let affected = store
            .bulk_update(
                1,
                &Predicate::compare(Column::Right, Cmp::Ge, 2),
                ColumnDeltas::right(2),
            )
            .unwrap();

        assert_eq!(affected, 1);
        assert_eq!(store.find(1).unwrap().unwrap().right, 4);
        assert_eq!(store.find(other.id).unwrap().unwrap().right, 2);
    }

    #[test]
    fn given_placements_when_case_updating_then_rows_take_values() {
        let store = SqliteStore::open_in_memory("nodes").unwrap();
        let a = store.insert_row(NewNode::root(1, None)).unwrap();
        let b = store.insert_row(NewNode::root(1, None)).unwrap();
        let placements = BTreeMap::from([
            (a.id, Placement { left: 1, right: 4, depth: 0 }),
            (b.id, Placement { left: 2, right: 3, depth: 1 }),
        ]);

        assert_eq!(store.case_update(1, &placements).unwrap(), 2);

        let b = store.find(b.id).unwrap().unwrap();
        assert_eq!((b.left, b.right, b.depth), (2, 3, 1));
    }

    #[test]
    fn given_transaction_when_rolled_back_then_insert_discarded() {
        let store = SqliteStore::open_in_memory("nodes").unwrap();

        store.begin().unwrap();
        store.insert_row(NewNode::root(1, None)).unwrap();
        store.rollback().unwrap();

        assert_eq!(store.max_group_id().unwrap(), 0);
        assert!(store.commit().is_err());
    }
}
