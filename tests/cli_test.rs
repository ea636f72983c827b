//! CLI parsing and command dispatch against an in-memory store

use clap::Parser;
use rstest::rstest;
use tempfile::TempDir;

use nestset::cli::commands::{dispatch, execute_command};
use nestset::cli::{Cli, Commands};
use nestset::config::Settings;
use nestset::domain::{NodeOrder, Predicate};
use nestset::exitcode;
use nestset::infrastructure::ServiceContainer;
use nestset::util::testing::{init_test_setup, seed_rows};

fn container() -> ServiceContainer {
    init_test_setup();
    ServiceContainer::in_memory(Settings::default())
}

fn command(args: &[&str]) -> Commands {
    let argv = std::iter::once("nestset").chain(args.iter().copied());
    Cli::try_parse_from(argv)
        .expect("valid arguments")
        .command
        .expect("subcommand")
}

// ============================================================
// parsing
// ============================================================

#[test]
fn given_move_with_negative_boundary_when_parsing_then_accepted() {
    let parsed = command(&["move", "3", "--prev", "-1", "--next", "0"]);

    assert!(matches!(
        parsed,
        Commands::Move {
            id: 3,
            prev: -1,
            next: 0
        }
    ));
}

#[test]
fn given_delete_without_ids_when_parsing_then_error() {
    assert!(Cli::try_parse_from(["nestset", "delete"]).is_err());
}

#[test]
fn given_repeated_debug_flag_when_parsing_then_counted() {
    let cli = Cli::try_parse_from(["nestset", "-dd", "tree", "1"]).unwrap();

    assert_eq!(cli.debug, 2);
}

// ============================================================
// dispatch
// ============================================================

#[test]
fn given_commands_when_dispatched_then_tree_is_built_and_reorganized() {
    // Arrange
    let c = container();

    // Act
    dispatch(&c, &command(&["create", "--label", "R"])).unwrap();
    dispatch(&c, &command(&["create", "--parent", "1", "--label", "A"])).unwrap();
    dispatch(&c, &command(&["create", "--parent", "1", "--label", "B"])).unwrap();
    dispatch(&c, &command(&["move-before", "3", "2"])).unwrap();
    dispatch(&c, &command(&["tree", "1"])).unwrap();

    // Assert
    let labels: Vec<_> = c
        .nodes()
        .range_query(1, &Predicate::All, NodeOrder::Left)
        .unwrap()
        .into_iter()
        .filter_map(|r| r.label)
        .collect();
    assert_eq!(labels, vec!["R", "B", "A"]);
}

#[test]
fn given_broken_group_when_inspecting_with_repair_then_group_fixed() {
    // Arrange
    let c = container();
    seed_rows(c.nodes().as_ref(), 1, &[(0, 1, 6, 0), (1, 2, 3, 1), (99, 4, 5, 1)]).unwrap();

    // Act
    dispatch(&c, &command(&["inspect", "1", "--repair"])).unwrap();
    dispatch(&c, &command(&["history", "1"])).unwrap();

    // Assert
    let history = c.inspector().history(1).unwrap();
    assert_eq!(history.len(), 2);
    assert!(!history[0].is_broken);
    assert_eq!(history[0].from_inspection_id, Some(history[1].id));
}

#[rstest]
#[case::unknown_node(&["delete", "42"], exitcode::NOINPUT)]
#[case::bad_range(&["move", "1", "--prev", "5", "--next", "3"], exitcode::DATAERR)]
#[case::empty_group(&["repair", "9"], exitcode::SOFTWARE)]
fn given_failing_command_when_dispatched_then_exit_code_follows_error(
    #[case] args: &[&str],
    #[case] expected: i32,
) {
    // Arrange
    let c = container();
    dispatch(&c, &command(&["create"])).unwrap();

    // Act
    let err = dispatch(&c, &command(args)).unwrap_err();

    // Assert
    assert_eq!(err.exit_code(), expected);
}

#[test]
fn given_no_subcommand_when_executing_then_usage_error() {
    let cli = Cli::try_parse_from(["nestset"]).unwrap();

    let err = execute_command(&cli).unwrap_err();

    assert_eq!(err.exit_code(), exitcode::USAGE);
}

#[test]
fn given_database_flag_when_executing_then_file_created() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("cli.db");
    let config = temp.path().join("nestset.toml");
    std::fs::write(&config, "").unwrap();
    let db_arg = db.to_string_lossy().to_string();
    let config_arg = config.to_string_lossy().to_string();
    let cli = Cli::try_parse_from([
        "nestset",
        "--config",
        config_arg.as_str(),
        "--database",
        db_arg.as_str(),
        "create",
        "--label",
        "root",
    ])
    .unwrap();

    // Act
    execute_command(&cli).unwrap();

    // Assert
    assert!(db.exists());
}
