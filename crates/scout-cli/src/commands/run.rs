//! Implementation of the `scoutd run` command.
//!
//! Starts the scheduler daemon: initializes storage, the default LLM
//! provider, the dedup store, the Executor and Review Bus, and the PID
//! lock, then runs the cron loop until a shutdown signal arrives. With
//! `--once <name>` it instead triggers a single scout run and exits.

use scout_core::config::{expand_tilde, Config};
use scout_core::dedup::DedupStore;
use scout_core::llm::factory::create_provider;
use scout_core::review::{NotifyOnlyPublisher, ReviewBus};
use scout_core::scheduler::{PidLock, Scheduler};
use scout_core::storage::{self, scouts};
use scout_core::workflow::Executor;

use super::RunArgs;

/// Execute the `scoutd run` command.
///
/// Startup sequence:
/// 1. Initialize the database.
/// 2. Create the default LLM provider.
/// 3. Build the dedup store, Executor, and Review Bus.
/// 4. `--once <name>`: trigger that scout and exit.
/// 5. Otherwise, acquire the PID lock and run the scheduler until shutdown.
pub async fn execute(config: &Config, args: RunArgs) -> anyhow::Result<()> {
    let pool = storage::init_db(&config.storage.db_path, config.storage.max_connections)
        .await
        .map_err(|e| anyhow::anyhow!("database initialization failed: {e}"))?;
    tracing::info!("database initialized");

    let llm = create_provider(&config.llm)
        .map_err(|e| anyhow::anyhow!("LLM provider creation failed: {e}"))?;
    tracing::info!(provider = llm.name(), "LLM provider initialized");

    let dedup = DedupStore::new(pool.clone(), config.dedup.semantic_enabled);
    let executor = Executor::new(
        pool.clone(),
        dedup.clone(),
        llm,
        config.search.endpoint.clone(),
        config.dedup.retrieved_item_threshold,
        config.dedup.draft_threshold,
    );

    // The Review Bus owns its own provider instance since Executor's and
    // the bus's LLM calls run independently (refinement can happen while
    // a scout run is in flight).
    let review_llm = create_provider(&config.llm)
        .map_err(|e| anyhow::anyhow!("LLM provider creation failed: {e}"))?;
    let review_bus = ReviewBus::new(
        pool.clone(),
        vec![Box::new(NotifyOnlyPublisher)],
        review_llm,
        None,
        dedup,
    );

    if let Some(name) = args.once {
        let scout = scouts::get_by_name(&pool, &name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("no scout named '{name}'"))?;
        let cancel = tokio_util::sync::CancellationToken::new();
        let outcome = executor.run(&scout, None, &cancel).await?;
        tracing::info!(scout = %name, ?outcome, "scout run complete");
        scouts::record_run(&pool, scout.id, outcome_status(&outcome)).await?;
        return Ok(());
    }

    let pid_path = expand_tilde(&config.scheduler.pid_file);
    let lock = PidLock::acquire(&pid_path)
        .map_err(|e| anyhow::anyhow!("failed to acquire scheduler lock: {e}"))?;
    tracing::info!(pid_file = %pid_path.display(), "scheduler lock acquired");

    let scheduler = Scheduler::new(
        pool,
        executor,
        review_bus,
        std::time::Duration::from_secs(config.scheduler.rescan_interval_secs),
    );
    let cancel = scheduler.cancel_token();

    let run_handle = tokio::spawn(scheduler.run());
    wait_for_shutdown_signal().await;
    cancel.cancel();
    run_handle
        .await
        .map_err(|e| anyhow::anyhow!("scheduler task panicked: {e}"))??;

    drop(lock);
    Ok(())
}

fn outcome_status(outcome: &scout_core::workflow::RunOutcome) -> &'static str {
    use scout_core::workflow::RunOutcome;
    match outcome {
        RunOutcome::Drafted { .. } => "drafted",
        RunOutcome::Empty => "empty",
        RunOutcome::StructuredOutputFailed => "structured_output_failed",
    }
}

/// Waits for Ctrl+C or, on Unix, SIGTERM.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler, using Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("received Ctrl+C"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received Ctrl+C");
    }
}
