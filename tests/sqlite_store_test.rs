//! Services running against a SQLite database file

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use nestset::config::Settings;
use nestset::domain::{DiscrepancyKind, GroupId, NodeOrder, NodeRow, Predicate};
use nestset::infrastructure::{ServiceContainer, SqliteStore};
use nestset::util::testing::{assert_nested_set_valid, init_test_setup, seed_rows};

fn open(path: &Path) -> ServiceContainer {
    init_test_setup();
    let settings = Settings {
        database: path.to_path_buf(),
        ..Settings::default()
    };
    let store = Arc::new(SqliteStore::open(path, &settings.entity).unwrap());
    ServiceContainer::with_store(settings, store)
}

fn rows(c: &ServiceContainer, group: GroupId) -> Vec<NodeRow> {
    c.nodes()
        .range_query(group, &Predicate::All, NodeOrder::Left)
        .unwrap()
}

#[test]
fn given_database_file_when_building_tree_then_rows_persist_across_opens() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("data").join("tree.db");

    // Act
    {
        let c = open(&db);
        let m = c.mutator();
        let r = m.create_node(None, Some("R".into())).unwrap();
        let a = m.create_node(Some(r.id), Some("A".into())).unwrap();
        let b = m.create_node(Some(r.id), Some("B".into())).unwrap();
        m.create_node(Some(b.id), Some("C".into())).unwrap();
        m.move_after(a.id, b.id).unwrap();
    }
    let c = ServiceContainer::new(Settings {
        database: db.clone(),
        ..Settings::default()
    })
    .unwrap();

    // Assert
    let stored = rows(&c, 1);
    assert_eq!(stored.len(), 4);
    assert_nested_set_valid(&stored);
    let labels: Vec<_> = stored.iter().filter_map(|r| r.label.clone()).collect();
    assert_eq!(labels, vec!["R", "B", "C", "A"]);
}

#[test]
fn given_broken_group_when_repairing_on_sqlite_then_inspections_are_linked() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let c = open(&temp.path().join("tree.db"));
    seed_rows(
        c.nodes().as_ref(),
        1,
        &[(0, 1, 6, 0), (1, 2, 3, 1), (99, 4, 5, 1)],
    )
    .unwrap();
    let first = c.inspector().inspect(1).unwrap();

    // Act
    let outcome = c.repair_engine().repair(1).unwrap();

    // Assert
    assert_eq!(first.count_of(DiscrepancyKind::MissingParent), 1);
    assert_eq!(first.missing_ids, vec![3]);
    assert_eq!(outcome.inspection.from_inspection_id, Some(first.id));
    assert!(!outcome.inspection.is_broken);
    assert_nested_set_valid(&rows(&c, 1));

    let history = c.inspector().history(1).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].id, first.id);
    assert_eq!(history[1].discrepancies, first.discrepancies);
    let superseded = c
        .inspector()
        .superseded(&outcome.inspection)
        .unwrap()
        .expect("linked record");
    assert_eq!(superseded.id, first.id);
    assert_eq!(superseded.missing_ids, vec![3]);
    assert!(c.inspector().superseded(&first).unwrap().is_none());
}

#[test]
fn given_nested_batch_on_sqlite_when_deleting_then_rolled_back() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let c = open(&temp.path().join("tree.db"));
    let m = c.mutator();
    let r = m.create_node(None, None).unwrap();
    let a = m.create_node(Some(r.id), None).unwrap();
    let b = m.create_node(Some(a.id), None).unwrap();
    let before = rows(&c, 1);

    // Act
    let result = m.delete_subtrees(&[a.id, b.id]);

    // Assert
    assert!(result.is_err());
    assert_eq!(rows(&c, 1), before);
    // the store accepts new work after the rollback
    m.delete_subtree(b.id).unwrap();
    assert_nested_set_valid(&rows(&c, 1));
}

#[test]
fn given_reader_holding_lock_when_commit_fails_then_next_write_succeeds() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("tree.db");
    let c = open(&db);
    let m = c.mutator();
    let root = m.create_node(None, None).unwrap();
    let reader = rusqlite::Connection::open(&db).unwrap();
    reader.execute_batch("BEGIN").unwrap();
    let seen: i64 = reader
        .query_row(
            &format!("SELECT COUNT(*) FROM {}", c.settings.entity),
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(seen, 1);

    // Act
    let blocked = m.create_node(Some(root.id), None);
    reader.execute_batch("COMMIT").unwrap();
    drop(reader);
    let second = m.create_node(Some(root.id), None);

    // Assert
    assert!(blocked.is_err());
    assert!(second.is_ok());
    let stored = rows(&c, 1);
    assert_eq!(stored.len(), 2);
    assert_nested_set_valid(&stored);
}
