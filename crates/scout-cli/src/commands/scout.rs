//! Implementation of the `scoutd scout` subcommand family: thin CRUD over
//! scout definitions. No interactive wizard — a scout is authored as a
//! JSON file and loaded with `scout create <path>`.

use serde::Deserialize;

use scout_core::config::Config;
use scout_core::storage::{self, scouts};

use super::{ScoutCommand, ScoutCreateArgs, ScoutIdArgs, ScoutListArgs};

/// The on-disk shape of a scout definition file passed to `scout create`.
#[derive(Debug, Deserialize)]
struct ScoutDefinition {
    name: String,
    kind: String,
    intent: String,
    config: serde_json::Value,
    prompt_template: String,
    platform: String,
    schedule_cron: String,
    #[serde(default)]
    llm_provider: Option<String>,
    #[serde(default)]
    llm_model: Option<String>,
}

pub async fn execute(config: &Config, cmd: ScoutCommand) -> anyhow::Result<()> {
    let pool = storage::init_db(&config.storage.db_path, config.storage.max_connections)
        .await
        .map_err(|e| anyhow::anyhow!("database initialization failed: {e}"))?;

    match cmd {
        ScoutCommand::Create(args) => create(&pool, args).await,
        ScoutCommand::List(args) => list(&pool, args).await,
        ScoutCommand::Disable(args) => set_enabled(&pool, args, false).await,
        ScoutCommand::Enable(args) => set_enabled(&pool, args, true).await,
    }
}

async fn create(pool: &scout_core::storage::DbPool, args: ScoutCreateArgs) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(&args.definition_path).map_err(|e| {
        anyhow::anyhow!("reading {}: {e}", args.definition_path)
    })?;
    let def: ScoutDefinition = serde_json::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("parsing {}: {e}", args.definition_path))?;

    let new = scouts::NewScout {
        name: def.name,
        kind: def.kind,
        intent: def.intent,
        config_json: def.config.to_string(),
        prompt_template: def.prompt_template,
        platform: def.platform,
        schedule_cron: def.schedule_cron,
        llm_provider: def.llm_provider,
        llm_model: def.llm_model,
    };
    let created = scouts::create(pool, &new).await?;
    println!("created scout '{}' (id {})", created.name, created.id);
    Ok(())
}

async fn list(pool: &scout_core::storage::DbPool, args: ScoutListArgs) -> anyhow::Result<()> {
    let all = scouts::list(pool, !args.all).await?;
    if all.is_empty() {
        println!("no scouts defined");
        return Ok(());
    }
    for scout in all {
        let status = if scout.enabled { "enabled" } else { "disabled" };
        println!(
            "{:<4} {:<24} {:<10} {:<9} {:<20} {}",
            scout.id, scout.name, scout.kind, status, scout.schedule_cron, scout.platform
        );
    }
    Ok(())
}

async fn set_enabled(
    pool: &scout_core::storage::DbPool,
    args: ScoutIdArgs,
    enabled: bool,
) -> anyhow::Result<()> {
    scouts::set_enabled(pool, args.id, enabled).await?;
    println!(
        "scout {} {}",
        args.id,
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}
