//! Tests for ConsistencyInspector over seeded (possibly broken) groups

use rstest::rstest;

use nestset::application::ApplicationError;
use nestset::config::{InspectSettings, Settings};
use nestset::domain::{Discrepancy, DiscrepancyKind, DomainError, NodeId};
use nestset::infrastructure::ServiceContainer;
use nestset::util::testing::{init_test_setup, seed_rows};

/// `codec` forces the token-codec path by dropping the threshold to zero.
fn container(codec: bool) -> ServiceContainer {
    init_test_setup();
    let settings = Settings {
        inspect: InspectSettings {
            codec_threshold: if codec { 0 } else { 10_000 },
            ..InspectSettings::default()
        },
        ..Settings::default()
    };
    ServiceContainer::in_memory(settings)
}

fn seed(c: &ServiceContainer, rows: &[(NodeId, i64, i64, i64)]) {
    seed_rows(c.nodes().as_ref(), 1, rows).unwrap();
}

// ============================================================
// check paths
// ============================================================

#[rstest]
#[case::arena(false)]
#[case::codec(true)]
fn given_consistent_group_when_inspecting_then_not_broken(#[case] codec: bool) {
    // Arrange
    let c = container(codec);
    seed(&c, &[(0, 1, 8, 0), (1, 2, 5, 1), (2, 3, 4, 2), (1, 6, 7, 1)]);

    // Act
    let record = c.inspector().inspect(1).unwrap();

    // Assert
    assert!(!record.is_broken);
    assert!(record.is_resolved);
    assert_eq!(record.root_id, Some(1));
    assert!(record.discrepancies.is_empty());
    assert!(record.missing_ids.is_empty());
    assert_eq!(record.entity, "nodes");
}

#[rstest]
#[case::arena(false)]
#[case::codec(true)]
fn given_dangling_parent_when_inspecting_then_missing_parent_reported(#[case] codec: bool) {
    // Arrange: node 3 points at a parent that does not exist
    let c = container(codec);
    seed(&c, &[(0, 1, 6, 0), (1, 2, 3, 1), (99, 4, 5, 1)]);

    // Act
    let record = c.inspector().inspect(1).unwrap();

    // Assert
    assert!(record.is_broken);
    assert!(!record.is_resolved);
    assert_eq!(record.count_of(DiscrepancyKind::MissingParent), 1);
    assert!(record
        .discrepancies
        .contains(&Discrepancy::missing_parent(3, 99)));
    assert_eq!(record.missing_ids, vec![3]);
    // the root now only encloses node 2
    assert!(record
        .discrepancies
        .contains(&Discrepancy::wrong_right(1, 6, 4)));
}

#[rstest]
#[case::arena(false)]
#[case::codec(true)]
fn given_two_roots_when_inspecting_then_first_by_left_is_root(#[case] codec: bool) {
    // Arrange
    let c = container(codec);
    seed(&c, &[(0, 1, 4, 0), (1, 2, 3, 1), (0, 5, 6, 0)]);

    // Act
    let record = c.inspector().inspect(1).unwrap();

    // Assert
    assert_eq!(record.root_id, Some(1));
    assert_eq!(record.discrepancies, vec![Discrepancy::duplicate_root(3)]);
}

#[rstest]
#[case::arena(false)]
#[case::codec(true)]
fn given_shifted_values_when_inspecting_then_wrong_left_and_right(#[case] codec: bool) {
    // Arrange: node 2 is stored one slot too far right
    let c = container(codec);
    seed(&c, &[(0, 1, 6, 0), (1, 3, 4, 1), (1, 4, 5, 1)]);

    // Act
    let record = c.inspector().inspect(1).unwrap();

    // Assert
    assert!(record
        .discrepancies
        .contains(&Discrepancy::wrong_left(2, 3, 2)));
    assert!(record
        .discrepancies
        .contains(&Discrepancy::wrong_right(2, 4, 3)));
    assert_eq!(record.count_of(DiscrepancyKind::MissingParent), 0);
}

#[rstest]
#[case::arena(false)]
#[case::codec(true)]
fn given_group_without_rows_when_inspecting_then_no_root(#[case] codec: bool) {
    let c = container(codec);

    let record = c.inspector().inspect(7).unwrap();

    assert!(record.is_broken);
    assert!(!record.has_root());
    assert_eq!(record.discrepancies, vec![Discrepancy::no_root()]);
}

#[test]
fn given_parent_cycle_when_inspecting_then_one_member_reported_missing() {
    // Arrange: 2 and 3 point at each other
    let c = container(false);
    seed(&c, &[(0, 1, 6, 0), (3, 2, 5, 1), (2, 3, 4, 2)]);

    // Act
    let record = c.inspector().inspect(1).unwrap();

    // Assert
    assert!(record.is_broken);
    assert_eq!(record.count_of(DiscrepancyKind::MissingParent), 1);
    assert_eq!(record.missing_ids.len(), 1);
}

#[test]
fn given_same_group_when_checked_both_ways_then_reports_agree() {
    // Arrange
    let arena = container(false);
    let codec = container(true);
    let rows = [
        (0, 1, 12, 0),
        (1, 2, 7, 1),
        (2, 3, 4, 2),
        (2, 5, 6, 2),
        (42, 8, 9, 1),
        (1, 10, 11, 1),
    ];
    seed(&arena, &rows);
    seed(&codec, &rows);

    // Act
    let by_arena = arena.inspector().check(1).unwrap();
    let by_codec = codec.inspector().check(1).unwrap();

    // Assert
    assert_eq!(by_arena.root_id, by_codec.root_id);
    assert_eq!(by_arena.missing_ids, by_codec.missing_ids);
    let mut a = by_arena.discrepancies.clone();
    let mut b = by_codec.discrepancies.clone();
    a.sort_by_key(|d| (d.kind.code(), d.node_id));
    b.sort_by_key(|d| (d.kind.code(), d.node_id));
    assert_eq!(a, b);
}

#[test]
fn given_inspection_when_checking_rows_then_rows_untouched() {
    let c = container(false);
    seed(&c, &[(0, 1, 6, 0), (99, 2, 3, 1)]);
    let before = c.nodes().find(2).unwrap();

    c.inspector().inspect(1).unwrap();

    assert_eq!(c.nodes().find(2).unwrap(), before);
}

// ============================================================
// lookups
// ============================================================

#[test]
fn given_uninspected_group_when_reading_newest_then_not_inspected() {
    let c = container(false);

    let err = c.inspector().newest_inspection(5).unwrap_err();

    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::NotInspected(5))
    ));
    assert!(c.inspector().is_broken_set(5).is_err());
}

#[test]
fn given_inspections_when_reading_history_then_newest_first() {
    // Arrange
    let c = container(false);
    seed(&c, &[(0, 1, 4, 0), (1, 2, 3, 1)]);
    let inspector = c.inspector();
    let first = inspector.inspect(1).unwrap();
    let second = inspector.inspect(1).unwrap();

    // Act
    let history = inspector.history(1).unwrap();

    // Assert
    assert_eq!(
        history.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![second.id, first.id]
    );
    assert_eq!(inspector.newest_inspection(1).unwrap().id, second.id);
    assert!(!inspector.is_broken_set(1).unwrap());
    assert!(inspector.is_resolved(1).unwrap());
}

#[test]
fn given_broken_group_when_inspected_then_flags_reflect_newest_record() {
    let c = container(false);
    seed(&c, &[(0, 1, 4, 0), (99, 2, 3, 1)]);

    c.inspector().inspect(1).unwrap();

    assert!(c.inspector().is_broken_set(1).unwrap());
    assert!(!c.inspector().is_resolved(1).unwrap());
    assert!(c.inspector().history(2).unwrap().is_empty());
}

#[test]
fn given_linked_inspection_when_following_link_then_trigger_is_returned() {
    // Arrange
    let c = container(false);
    seed(&c, &[(0, 1, 4, 0), (99, 2, 3, 1)]);
    let inspector = c.inspector();
    let trigger = inspector.inspect(1).unwrap();
    let follow_up = inspector.inspect_from(1, Some(trigger.id)).unwrap();

    // Act
    let linked = inspector.superseded(&follow_up).unwrap();

    // Assert
    let linked = linked.expect("linked record");
    assert_eq!(linked.id, trigger.id);
    assert_eq!(linked.discrepancies, trigger.discrepancies);
    assert!(inspector.superseded(&trigger).unwrap().is_none());
}
