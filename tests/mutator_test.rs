//! Tests for TreeMutator: create, delete and move with bulk range shifts

use rstest::rstest;

use nestset::application::ApplicationError;
use nestset::config::Settings;
use nestset::domain::{
    ColumnDeltas, DomainError, GroupId, NestedSetNode, NodeId, NodeOrder, NodeRow, Predicate,
};
use nestset::infrastructure::ServiceContainer;
use nestset::util::testing::{assert_nested_set_valid, init_test_setup};

fn container() -> ServiceContainer {
    init_test_setup();
    ServiceContainer::in_memory(Settings::default())
}

fn rows(c: &ServiceContainer, group: GroupId) -> Vec<NodeRow> {
    c.nodes()
        .range_query(group, &Predicate::All, NodeOrder::Left)
        .unwrap()
}

fn node(c: &ServiceContainer, id: NodeId) -> NodeRow {
    c.nodes().find(id).unwrap().expect("node exists")
}

fn span(c: &ServiceContainer, id: NodeId) -> (i64, i64) {
    let row = node(c, id);
    (row.left, row.right)
}

fn assert_clean(c: &ServiceContainer, group: GroupId) {
    assert_nested_set_valid(&rows(c, group));
    let record = c.inspector().inspect(group).unwrap();
    assert!(
        !record.is_broken,
        "unexpected discrepancies: {:?}",
        record.discrepancies
    );
}

/// R[1,10] with A[2,3], B[4,7]{C[5,6]}, D[8,9]; returns (R, A, B, C, D).
fn scenario_b(c: &ServiceContainer) -> (NodeId, NodeId, NodeId, NodeId, NodeId) {
    let m = c.mutator();
    let r = m.create_node(None, Some("R".into())).unwrap().id;
    let a = m.create_node(Some(r), Some("A".into())).unwrap().id;
    let b = m.create_node(Some(r), Some("B".into())).unwrap().id;
    let cc = m.create_node(Some(b), Some("C".into())).unwrap().id;
    let d = m.create_node(Some(r), Some("D".into())).unwrap().id;
    (r, a, b, cc, d)
}

// ============================================================
// create
// ============================================================

#[test]
fn given_empty_store_when_creating_roots_then_each_gets_new_group() {
    // Arrange
    let c = container();

    // Act
    let first = c.mutator().create_node(None, None).unwrap();
    let second = c.mutator().create_node(None, None).unwrap();

    // Assert
    assert_eq!((first.left, first.right, first.depth), (1, 2, 0));
    assert_eq!(first.group_id, 1);
    assert_eq!(second.group_id, 2);
    assert!(first.label.is_none());
}

#[test]
fn given_root_when_creating_child_and_grandchild_then_ranges_grow() {
    // Arrange
    let c = container();
    let m = c.mutator();
    let r = m.create_node(None, Some("R".into())).unwrap();

    // Act
    let child = m.create_node(Some(r.id), Some("C".into())).unwrap();

    // Assert
    assert_eq!(span(&c, r.id), (1, 4));
    assert_eq!((child.left, child.right, child.depth), (2, 3, 1));

    // Act
    let grandchild = m.create_node(Some(child.id), Some("G".into())).unwrap();

    // Assert
    assert_eq!(span(&c, child.id), (2, 5));
    assert_eq!((grandchild.left, grandchild.right, grandchild.depth), (3, 4, 2));
    assert_eq!(span(&c, r.id), (1, 6));
    assert_clean(&c, r.group_id);
}

#[test]
fn given_parent_when_creating_child_then_parent_right_grows_by_two() {
    // Arrange
    let c = container();
    let (r, _, b, _, d) = scenario_b(&c);
    let before = node(&c, b).right;

    // Act
    c.mutator().create_node(Some(b), None).unwrap();

    // Assert
    assert_eq!(node(&c, b).right, before + 2);
    assert_eq!(span(&c, d), (10, 11));
    assert_eq!(span(&c, r), (1, 12));
    assert_clean(&c, 1);
}

#[test]
fn given_unknown_parent_when_creating_then_not_found() {
    let c = container();

    let err = c.mutator().create_node(Some(42), None).unwrap_err();

    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::NodeNotFound(42))
    ));
    assert_eq!(c.nodes().max_group_id().unwrap(), 0);
}

// ============================================================
// delete
// ============================================================

#[test]
fn given_inner_node_when_deleting_subtree_then_rest_closes_gap() {
    // Arrange
    let c = container();
    let (r, a, b, cc, d) = scenario_b(&c);

    // Act
    let removed = c.mutator().delete_subtree(b).unwrap();

    // Assert
    assert_eq!(removed, 2);
    assert_eq!(span(&c, r), (1, 6));
    assert_eq!(span(&c, a), (2, 3));
    assert_eq!(span(&c, d), (4, 5));
    assert!(c.nodes().find(cc).unwrap().is_none());
    assert_clean(&c, 1);
}

#[test]
fn given_disjoint_targets_when_deleting_batch_then_widths_accumulate() {
    // Arrange
    let c = container();
    let (r, a, b, cc, d) = scenario_b(&c);

    // Act
    let removed = c.mutator().delete_subtrees(&[d, a]).unwrap();

    // Assert
    assert_eq!(removed, 2);
    assert_eq!(span(&c, r), (1, 6));
    assert_eq!(span(&c, b), (2, 5));
    assert_eq!(span(&c, cc), (3, 4));
    assert_clean(&c, 1);
}

#[test]
fn given_subtree_when_deleting_then_count_drops_by_half_width() {
    // Arrange
    let c = container();
    let (_, _, b, _, _) = scenario_b(&c);
    let target = node(&c, b);
    let before = rows(&c, 1).len() as i64;

    // Act
    c.mutator().delete_subtree(b).unwrap();

    // Assert
    assert_eq!(rows(&c, 1).len() as i64, before - target.width() / 2);
}

#[test]
fn given_nested_targets_when_deleting_batch_then_invalid_batch_and_nothing_changes() {
    // Arrange
    let c = container();
    let (_, _, b, cc, _) = scenario_b(&c);
    let before = rows(&c, 1);

    // Act
    let err = c.mutator().delete_subtrees(&[b, cc]).unwrap_err();

    // Assert
    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::InvalidBatch(_))
    ));
    assert_eq!(rows(&c, 1), before);
}

#[test]
fn given_targets_in_two_groups_when_deleting_batch_then_invalid_batch() {
    let c = container();
    let (_, a, _, _, _) = scenario_b(&c);
    let other = c.mutator().create_node(None, None).unwrap();

    let err = c.mutator().delete_subtrees(&[a, other.id]).unwrap_err();

    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::InvalidBatch(_))
    ));
}

// ============================================================
// move
// ============================================================

#[test]
fn given_first_child_when_moving_after_last_sibling_then_shifts_right() {
    // Arrange
    let c = container();
    let (r, a, b, cc, d) = scenario_b(&c);

    // Act
    let moved = c.mutator().move_node(a, 9, 10).unwrap();

    // Assert
    assert_eq!((moved.left, moved.right), (8, 9));
    assert_eq!(moved.parent_id, r);
    assert_eq!(span(&c, b), (2, 5));
    assert_eq!(span(&c, cc), (3, 4));
    assert_eq!(span(&c, d), (6, 7));
    assert_eq!(span(&c, r), (1, 10));
    assert_clean(&c, 1);
}

#[test]
fn given_last_child_when_moving_to_first_child_slot_then_shifts_left() {
    // Arrange
    let c = container();
    let (r, a, b, _, d) = scenario_b(&c);

    // Act
    let moved = c.mutator().move_node(d, 1, 2).unwrap();

    // Assert
    assert_eq!((moved.left, moved.right, moved.depth), (2, 3, 1));
    assert_eq!(moved.parent_id, r);
    assert_eq!(span(&c, a), (4, 5));
    assert_eq!(span(&c, b), (6, 9));
    assert_clean(&c, 1);
}

#[test]
fn given_leaf_when_moving_into_another_node_then_depth_follows_new_parent() {
    // Arrange
    let c = container();
    let (_, a, b, cc, d) = scenario_b(&c);

    // Act: first child of D (parent semantics, D.left = 8)
    let moved = c.mutator().move_node(a, 8, 9).unwrap();

    // Assert
    let parent = node(&c, d);
    assert_eq!(moved.parent_id, d);
    assert_eq!(moved.depth, parent.depth + 1);
    assert_eq!((parent.left, parent.right), (6, 9));
    assert_eq!((moved.left, moved.right), (7, 8));
    assert_eq!(span(&c, b), (2, 5));
    assert_eq!(span(&c, cc), (3, 4));
    assert_clean(&c, 1);
}

#[test]
fn given_grandchild_when_moving_after_its_parent_then_becomes_sibling() {
    // Arrange
    let c = container();
    let (r, _, b, cc, _) = scenario_b(&c);

    // Act: sibling semantics after B (B.right = 7)
    let moved = c.mutator().move_node(cc, 7, 8).unwrap();

    // Assert
    let sibling = node(&c, b);
    assert_eq!(moved.parent_id, r);
    assert_eq!(moved.depth, sibling.depth);
    assert_eq!((sibling.left, sibling.right), (4, 5));
    assert_eq!((moved.left, moved.right), (6, 7));
    assert_clean(&c, 1);
}

#[test]
fn given_subtree_when_moving_into_leaf_then_whole_subtree_moves() {
    // Arrange
    let c = container();
    let (_, a, b, cc, d) = scenario_b(&c);

    // Act
    let moved = c.mutator().move_into(b, a).unwrap();

    // Assert
    assert_eq!(moved.parent_id, a);
    assert_eq!(moved.depth, 2);
    assert_eq!(node(&c, cc).depth, 3);
    assert_eq!(span(&c, a), (2, 7));
    assert_eq!(span(&c, b), (3, 6));
    assert_eq!(span(&c, d), (8, 9));
    assert_clean(&c, 1);
}

#[rstest]
#[case::after("after")]
#[case::before("before")]
#[case::into("into")]
fn given_move_helper_when_moving_then_tree_stays_valid(#[case] helper: &str) {
    // Arrange
    let c = container();
    let (_, a, b, _, d) = scenario_b(&c);
    let m = c.mutator();

    // Act
    let moved = match helper {
        "after" => m.move_after(a, d).unwrap(),
        "before" => m.move_before(d, a).unwrap(),
        _ => m.move_into(d, b).unwrap(),
    };

    // Assert
    assert_clean(&c, 1);
    match helper {
        "after" => assert_eq!(node(&c, d).right + 1, moved.left),
        "before" => assert_eq!(moved.right + 1, node(&c, a).left),
        _ => {
            let parent = node(&c, b);
            assert_eq!(moved.parent_id, b);
            assert_eq!(moved.right + 1, parent.right);
        }
    }
}

#[rstest]
#[case::reversed(5, 4)]
#[case::equal(5, 5)]
#[case::gap(3, 8)]
#[case::into_own_subtree(4, 5)]
#[case::own_inner_slot(5, 6)]
fn given_bad_boundaries_when_moving_b_then_invalid_range(#[case] prev: i64, #[case] next: i64) {
    // Arrange
    let c = container();
    let (_, _, b, _, _) = scenario_b(&c);
    let before = rows(&c, 1);

    // Act
    let err = c.mutator().move_node(b, prev, next).unwrap_err();

    // Assert
    assert!(
        matches!(err, ApplicationError::Domain(DomainError::InvalidRange { .. })),
        "got {err:?}"
    );
    assert_eq!(rows(&c, 1), before);
}

#[test]
fn given_boundary_outside_group_when_moving_then_boundary_not_found() {
    let c = container();
    let (_, a, _, _, _) = scenario_b(&c);

    let err = c.mutator().move_node(a, 40, 41).unwrap_err();

    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::BoundaryNotFound { boundary: 40, .. })
    ));
}

#[test]
fn given_root_right_as_boundary_when_moving_then_rejected() {
    let c = container();
    let (_, a, _, _, _) = scenario_b(&c);

    let err = c.mutator().move_node(a, 10, 11).unwrap_err();

    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::InvalidRange { .. })
    ));
}

#[test]
fn given_corrupt_group_with_shared_value_when_moving_then_ambiguous_boundary() {
    // Arrange: D's left was corrupted to equal B's right
    let c = container();
    let (_, a, _, _, d) = scenario_b(&c);
    c.nodes()
        .bulk_update(
            1,
            &Predicate::id_in([d]),
            ColumnDeltas::left(-1),
        )
        .unwrap();

    // Act
    let err = c.mutator().move_node(a, 7, 8).unwrap_err();

    // Assert
    match err {
        ApplicationError::Domain(DomainError::AmbiguousBoundary { node_ids, .. }) => {
            assert_eq!(node_ids.len(), 2);
        }
        other => panic!("expected ambiguous boundary, got {other:?}"),
    }
}

#[test]
fn given_nodes_in_different_groups_when_moving_after_then_rejected() {
    let c = container();
    let (_, a, _, _, _) = scenario_b(&c);
    let other = c.mutator().create_node(None, None).unwrap();
    let child = c.mutator().create_node(Some(other.id), None).unwrap();

    let err = c.mutator().move_after(a, child.id).unwrap_err();

    assert!(matches!(err, ApplicationError::Domain(_)));
    assert_clean(&c, 1);
}

#[test]
fn given_sequence_of_mutations_when_inspecting_then_always_clean() {
    // Arrange
    let c = container();
    let m = c.mutator();
    let root = m.create_node(None, None).unwrap();
    let mut ids = vec![root.id];
    for i in 0..12 {
        let parent = ids[i / 2];
        ids.push(m.create_node(Some(parent), None).unwrap().id);
    }

    // Act + Assert
    m.move_into(ids[3], ids[10]).unwrap();
    assert_clean(&c, root.group_id);
    m.move_before(ids[12], ids[1]).unwrap();
    assert_clean(&c, root.group_id);
    m.move_after(ids[2], ids[12]).unwrap();
    assert_clean(&c, root.group_id);
    m.delete_subtrees(&[ids[5], ids[12]]).unwrap();
    assert_clean(&c, root.group_id);
}
