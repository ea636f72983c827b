//! Command dispatch: one function per subcommand

use std::io;

use clap::CommandFactory;
use clap_complete::generate;
use tracing::{debug, instrument};

use crate::cli::args::{Cli, Commands, ConfigCommands};
use crate::cli::output;
use crate::cli::{CliError, CliResult};
use crate::config::{global_config_path, local_config_path, Settings};
use crate::domain::{GroupId, NodeId, NodeRow, TreeNodeConvert};
use crate::infrastructure::ServiceContainer;

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    let Some(command) = &cli.command else {
        return Err(CliError::Usage(
            "no command given, see `nestset --help`".to_string(),
        ));
    };
    match command {
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
        Commands::Config { command } => config_command(cli, command),
        other => {
            let container = ServiceContainer::new(load_settings(cli)?)?;
            dispatch(&container, other)
        }
    }
}

fn load_settings(cli: &Cli) -> CliResult<Settings> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(database) = &cli.database {
        settings.database = database.clone();
    }
    debug!(database = %settings.database.display(), entity = %settings.entity, "settings");
    Ok(settings)
}

/// Run a store-backed command against `container`.
pub fn dispatch(container: &ServiceContainer, command: &Commands) -> CliResult<()> {
    match command {
        Commands::Create { parent, label } => create(container, *parent, label.clone()),
        Commands::Delete { ids } => delete(container, ids),
        Commands::Move { id, prev, next } => {
            let row = container.mutator().move_node(*id, *prev, *next)?;
            moved(&row)
        }
        Commands::MoveAfter { id, target } => {
            let row = container.mutator().move_after(*id, *target)?;
            moved(&row)
        }
        Commands::MoveBefore { id, target } => {
            let row = container.mutator().move_before(*id, *target)?;
            moved(&row)
        }
        Commands::MoveInto { id, target } => {
            let row = container.mutator().move_into(*id, *target)?;
            moved(&row)
        }
        Commands::Inspect { group, repair } => inspect(container, *group, *repair),
        Commands::Repair { group } => repair(container, *group),
        Commands::History { group } => history(container, *group),
        Commands::Tree { group } => tree(container, *group),
        Commands::Config { .. } | Commands::Completion { .. } => Err(CliError::InvalidArgs(
            "command does not use the store".to_string(),
        )),
    }
}

#[instrument(level = "debug", skip(container))]
fn create(
    container: &ServiceContainer,
    parent: Option<NodeId>,
    label: Option<String>,
) -> CliResult<()> {
    let row = container.mutator().create_node(parent, label)?;
    output::node("Created", &row);
    Ok(())
}

#[instrument(level = "debug", skip(container))]
fn delete(container: &ServiceContainer, ids: &[NodeId]) -> CliResult<()> {
    let removed = container.mutator().delete_subtrees(ids)?;
    output::action("Deleted", &format!("{} rows", removed));
    Ok(())
}

fn moved(row: &NodeRow) -> CliResult<()> {
    output::node("Moved", row);
    Ok(())
}

#[instrument(level = "debug", skip(container))]
fn inspect(container: &ServiceContainer, group: GroupId, repair_if_broken: bool) -> CliResult<()> {
    let record = container.inspector().inspect(group)?;
    output::inspection(&record);
    if record.is_broken && repair_if_broken {
        return repair(container, group);
    }
    Ok(())
}

#[instrument(level = "debug", skip(container))]
fn repair(container: &ServiceContainer, group: GroupId) -> CliResult<()> {
    let outcome = container.repair_engine().repair(group)?;
    if let Some(id) = outcome.backup_root {
        output::warning(&format!("group {} had no root, created backup root {}", group, id));
    }
    output::action(
        "Repaired",
        &format!(
            "group {}: {} rows renumbered, {} reparented to root {}",
            group,
            outcome.updated,
            outcome.reparented.len(),
            outcome.root_id
        ),
    );
    output::inspection(&outcome.inspection);
    if let Some(previous) = container.inspector().superseded(&outcome.inspection)? {
        output::detail(&format!(
            "supersedes inspection #{} ({} discrepancies)",
            previous.id,
            previous.discrepancies.len()
        ));
    }
    Ok(())
}

fn history(container: &ServiceContainer, group: GroupId) -> CliResult<()> {
    let records = container.inspector().history(group)?;
    if records.is_empty() {
        output::warning(&format!("group {} has not been inspected", group));
        return Ok(());
    }
    for record in &records {
        output::history_line(record);
    }
    Ok(())
}

fn tree(container: &ServiceContainer, group: GroupId) -> CliResult<()> {
    let arena = container.queries().load_tree(group)?;
    output::info(&arena.to_tree_string());
    for &idx in arena.extra_roots().iter().chain(arena.orphans()) {
        output::info(&arena.subtree_string(idx));
    }
    Ok(())
}

fn config_command(cli: &Cli, command: &ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Show => {
            let settings = load_settings(cli)?;
            output::info(&settings.to_toml()?);
        }
        ConfigCommands::Path => {
            match global_config_path() {
                Some(path) => output::detail(&format!("global: {}", path.display())),
                None => output::detail(&"global: (no config directory)"),
            }
            let local = cli
                .config
                .clone()
                .unwrap_or_else(|| local_config_path(std::path::Path::new(".")));
            output::detail(&format!("local:  {}", local.display()));
        }
        ConfigCommands::Template => output::info(&Settings::template()),
    }
    Ok(())
}
