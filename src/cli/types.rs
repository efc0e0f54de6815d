//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::domain::models::ScopeKind;

#[derive(Parser)]
#[command(name = "overwatch")]
#[command(about = "Overwatch - scope metrics and anomaly inspection", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Config file to load instead of .overwatch/config.yaml
    #[arg(short, long, global = true, env = "OVERWATCH_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect persisted scope snapshots
    #[command(subcommand)]
    Scopes(ScopesCommands),

    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum ScopesCommands {
    /// List scopes in the snapshot
    List {
        /// Filter by kind (task, phase, prd, prd_set)
        #[arg(short, long)]
        kind: Option<ScopeKind>,

        /// Snapshot file (defaults to persistence.snapshot_path)
        #[arg(short, long)]
        snapshot: Option<PathBuf>,

        /// Maximum number of scopes to display
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Show details for a specific scope
    Show {
        /// Scope kind
        kind: ScopeKind,

        /// Scope ID
        id: String,

        /// Snapshot file (defaults to persistence.snapshot_path)
        #[arg(short, long)]
        snapshot: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Load and validate the configuration
    Validate,
}
