//! Scout Engine CLI.
//!
//! Entry point for the `scoutd` binary. Parses CLI arguments, initializes
//! logging, and dispatches to subcommand handlers.
mod commands;

use clap::Parser;
use scout_core::config::{expand_tilde, Config};
use scout_core::logging::ScoutLogLayer;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry};

/// Content-discovery and draft-generation daemon
#[derive(Parser)]
#[command(name = "scoutd")]
#[command(version)]
#[command(about = "Scout Engine: content-discovery and draft-generation daemon")]
struct Cli {
    /// Path to config.toml ($SCOUTD_CONFIG, else ~/.scoutd/config.toml)
    #[arg(short = 'c', long, global = true)]
    config: Option<String>,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Start the scheduler daemon: dispatches every enabled scout on its
    /// cron schedule and keeps the Review Bus polling alongside it.
    Run(commands::RunArgs),
    /// Manage scout definitions.
    #[command(subcommand)]
    Scout(commands::ScoutCommand),
    /// Interactively review pending drafts in the terminal.
    Review(commands::ReviewArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .map(|p| expand_tilde(&p))
        .unwrap_or_else(scout_core::config::resolve_config_path);
    let config = Config::load(&config_path).map_err(|e| {
        anyhow::anyhow!(
            "failed to load configuration from {}: {e}",
            config_path.display()
        )
    })?;
    config
        .validate()
        .map_err(|errors| anyhow::anyhow!("invalid configuration: {errors:?}"))?;

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("scout_cli=debug,scout_core=debug,info")
    } else if cli.quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_new(&config.logging.filter).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let log_dir = expand_tilde(&config.logging.log_dir);
    std::fs::create_dir_all(&log_dir).ok();
    let app_log = tracing_appender::rolling::daily(&log_dir, "scoutd.log");
    let (app_log_writer, _app_log_guard) = tracing_appender::non_blocking(app_log);

    let scout_log_dir = expand_tilde(&config.logging.scout_log_dir);
    scout_core::logging::cleanup_old_scout_logs(&scout_log_dir, config.logging.retention_days).ok();

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(app_log_writer.and(std::io::stdout))
        .with_target(cli.verbose)
        .compact();

    Registry::default()
        .with(filter)
        .with(fmt_layer)
        .with(ScoutLogLayer::new(scout_log_dir))
        .init();

    match cli.command {
        Commands::Run(args) => commands::run::execute(&config, args).await,
        Commands::Scout(cmd) => commands::scout::execute(&config, cmd).await,
        Commands::Review(args) => commands::review::execute(&config, args).await,
    }
}
