//! CLI subcommand argument definitions and implementations.
pub mod review;
pub mod run;
pub mod scout;

use clap::Args;

/// Arguments for the `run` subcommand.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Run a single scout immediately and exit, instead of starting the
    /// scheduler daemon.
    #[arg(long)]
    pub once: Option<String>,
}

/// Arguments for the `review` subcommand.
#[derive(Debug, Args)]
pub struct ReviewArgs;

/// The `scout` subcommand family: CRUD over scout definitions.
#[derive(Debug, clap::Subcommand)]
pub enum ScoutCommand {
    /// Create a new scout from a JSON definition file.
    Create(ScoutCreateArgs),
    /// List scouts.
    List(ScoutListArgs),
    /// Disable a scout (the scheduler stops dispatching it on next rescan).
    Disable(ScoutIdArgs),
    /// Enable a previously disabled scout.
    Enable(ScoutIdArgs),
}

#[derive(Debug, Args)]
pub struct ScoutCreateArgs {
    /// Path to a JSON file describing the scout (see README for the schema).
    pub definition_path: String,
}

#[derive(Debug, Args)]
pub struct ScoutListArgs {
    /// Include disabled scouts.
    #[arg(long)]
    pub all: bool,
}

#[derive(Debug, Args)]
pub struct ScoutIdArgs {
    pub id: i64,
}
