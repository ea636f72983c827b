//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueHint};

/// Nested-set tree store: create, move and delete nodes, inspect and repair groups
#[derive(Parser, Debug)]
#[command(name = "nestset")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Debug output, repeat for more (-d info, -dd debug, -ddd trace)
    #[arg(short = 'd', long = "debug", action = ArgAction::Count, global = true)]
    pub debug: u8,

    /// Local config file (default: ./.nestset.toml)
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// SQLite database file, overrides the configured one
    #[arg(long, global = true, env = "NESTSET_DATABASE", value_hint = ValueHint::FilePath)]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a root in a new group, or the last child of a parent
    Create {
        /// Parent node id
        #[arg(short, long)]
        parent: Option<i64>,
        /// Row label
        #[arg(short, long)]
        label: Option<String>,
    },

    /// Delete nodes with their subtrees
    Delete {
        /// Node ids (one group, none inside another)
        #[arg(required = true)]
        ids: Vec<i64>,
    },

    /// Move a node to the slot between two boundaries
    Move {
        id: i64,
        /// Left or right value the node is placed after
        #[arg(long, allow_negative_numbers = true)]
        prev: i64,
        /// Slot directly following prev
        #[arg(long, allow_negative_numbers = true)]
        next: i64,
    },

    /// Make a node the next sibling of TARGET
    #[command(name = "move-after")]
    MoveAfter { id: i64, target: i64 },

    /// Make a node the previous sibling of TARGET
    #[command(name = "move-before")]
    MoveBefore { id: i64, target: i64 },

    /// Make a node the last child of TARGET
    #[command(name = "move-into")]
    MoveInto { id: i64, target: i64 },

    /// Check a group and record the outcome
    Inspect {
        group: i64,
        /// Repair the group when the inspection finds it broken
        #[arg(long)]
        repair: bool,
    },

    /// Rebuild left/right/depth of a group from parent ids
    Repair { group: i64 },

    /// List inspections of a group, newest first
    History { group: i64 },

    /// Print a group as a tree
    Tree { group: i64 },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show,

    /// Show config paths
    Path,

    /// Print a config template
    Template,
}
