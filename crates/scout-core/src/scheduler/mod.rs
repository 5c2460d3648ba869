//! The Scheduler: cron-driven dispatch over the `scouts` table, run
//! non-overlap, and the daemon's single-instance PID lock (spec §4.F,
//! §5). Also keeps the Review Bus's poll cycle alive on the same loop —
//! spec §5 describes both as "running on the same scheduler".
//!
//! Grounded in shape on `tuitbot-cli`'s `commands/tick.rs` (the `fs2`
//! exclusive-lock pattern) and `tuitbot-core`'s automation loops
//! (per-unit dispatch, cooperative cancellation), generalized from a
//! one-shot external-cron tick into a long-running in-process cron
//! daemon since a Scout Engine has many independently-scheduled scouts
//! rather than one fixed automation cadence.
//!
//! Standard five-field cron (`min hour dom month dow`) is accepted at the
//! API boundary and translated to the six-field form the `cron` crate
//! parses: a leading `0` seconds field is prepended, and the day-of-week
//! field is remapped from the Unix convention (0 = Sunday .. 6 = Saturday)
//! to the crate's (1 = Sunday .. 7 = Saturday). Non-numeric tokens (names,
//! `*`, `?`, and step divisors) pass through unchanged.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use fs2::FileExt;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{SchedulerError, WorkflowError};
use crate::review::ReviewBus;
use crate::storage::scouts::{self, Scout};
use crate::storage::DbPool;
use crate::workflow::{Executor, RunOutcome};

/// How often the Review Bus surfaces newly-pending drafts while the
/// scheduler is running (spec §5).
const REVIEW_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// An exclusive, OS-released lock on a PID file. Guarantees at most one
/// scheduler instance runs at a time; a crashed instance's lock is
/// reclaimed automatically the next time a scheduler starts, since the
/// OS drops the `flock` the moment the holding process exits — no
/// liveness probing of the recorded PID is needed.
#[derive(Debug)]
pub struct PidLock {
    file: std::fs::File,
    path: PathBuf,
}

impl PidLock {
    /// Acquires the lock at `path`, creating the file and its parent
    /// directory if needed. Fails with [`SchedulerError::AlreadyRunning`]
    /// naming the PID recorded by the current holder.
    pub fn acquire(path: &Path) -> Result<PidLock, SchedulerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SchedulerError::LockFile {
                message: format!("creating {}: {e}", parent.display()),
            })?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| SchedulerError::LockFile {
                message: format!("opening {}: {e}", path.display()),
            })?;

        if file.try_lock_exclusive().is_err() {
            let pid = std::fs::read_to_string(path)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0);
            return Err(SchedulerError::AlreadyRunning { pid });
        }

        use std::io::{Seek, SeekFrom, Write};
        let mut file = file;
        file.set_len(0).and_then(|_| file.seek(SeekFrom::Start(0)))
            .and_then(|_| file.write_all(std::process::id().to_string().as_bytes()))
            .map_err(|e| SchedulerError::LockFile {
                message: format!("writing {}: {e}", path.display()),
            })?;

        Ok(PidLock {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Parses a standard five-field cron expression into a [`cron::Schedule`].
fn parse_cron(expr: &str) -> Result<Schedule, SchedulerError> {
    let quartz = to_quartz_expression(expr);
    Schedule::from_str(&quartz).map_err(|source| SchedulerError::InvalidCron {
        expr: expr.to_string(),
        source,
    })
}

fn to_quartz_expression(standard_cron: &str) -> String {
    let fields: Vec<&str> = standard_cron.split_whitespace().collect();
    let [minute, hour, dom, month, dow] = match <[&str; 5]>::try_from(fields) {
        Ok(f) => f,
        // Malformed field count: pass through with a seconds field prepended
        // and let `Schedule::from_str` produce the parse error.
        Err(_) => return format!("0 {standard_cron}"),
    };
    format!("0 {minute} {hour} {dom} {month} {}", remap_day_of_week(dow))
}

fn remap_day_of_week(field: &str) -> String {
    field.split(',').map(remap_dow_token).collect::<Vec<_>>().join(",")
}

fn remap_dow_token(token: &str) -> String {
    match token.split_once('/') {
        Some((range, step)) => format!("{}/{step}", remap_dow_range(range)),
        None => remap_dow_range(token),
    }
}

fn remap_dow_range(range: &str) -> String {
    match range.split_once('-') {
        Some((start, end)) => format!("{}-{}", remap_dow_digit(start), remap_dow_digit(end)),
        None => remap_dow_digit(range),
    }
}

fn remap_dow_digit(value: &str) -> String {
    match value.parse::<u32>() {
        Ok(d) => ((d % 7) + 1).to_string(),
        Err(_) => value.to_string(),
    }
}

struct ScoutJob {
    schedule_cron: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Drives every enabled scout on its own cron schedule, keeping them from
/// overlapping their own runs, and keeps the Review Bus's poll cycle
/// alive alongside them (spec §5).
pub struct Scheduler {
    pool: DbPool,
    executor: Arc<Executor>,
    review_bus: Arc<ReviewBus>,
    rescan_interval: Duration,
    jobs: AsyncMutex<HashMap<i64, ScoutJob>>,
    locks: AsyncMutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        pool: DbPool,
        executor: Executor,
        review_bus: ReviewBus,
        rescan_interval: Duration,
    ) -> Arc<Scheduler> {
        Arc::new(Scheduler {
            pool,
            executor: Arc::new(executor),
            review_bus: Arc::new(review_bus),
            rescan_interval,
            jobs: AsyncMutex::new(HashMap::new()),
            locks: AsyncMutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        })
    }

    /// A token the caller can cancel to stop [`Scheduler::run`] from
    /// outside (e.g. on SIGTERM in the CLI's `run` command).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs until cancelled: rescans the scouts table on `rescan_interval`,
    /// spawning, restarting, or tearing down per-scout jobs as rows
    /// change, and polls the Review Bus every [`REVIEW_POLL_INTERVAL`].
    pub async fn run(self: Arc<Self>) -> Result<(), SchedulerError> {
        self.rescan().await?;

        let mut rescan_tick = tokio::time::interval(self.rescan_interval);
        let mut review_tick = tokio::time::interval(REVIEW_POLL_INTERVAL);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.stop_all_jobs().await;
                    return Ok(());
                }
                _ = rescan_tick.tick() => {
                    if let Err(e) = self.rescan().await {
                        tracing::warn!(error = %e, "scheduler rescan failed");
                    }
                }
                _ = review_tick.tick() => {
                    if let Err(e) = self.review_bus.poll().await {
                        tracing::warn!(error = %e, "review bus poll failed");
                    }
                }
            }
        }
    }

    /// Runs one scout immediately, outside its cron schedule, honoring the
    /// same per-scout non-overlap lock as the timer-driven path. Used by
    /// the CLI's ad-hoc `scout run` command.
    pub async fn trigger_now(
        &self,
        scout_id: i64,
        overlay: Option<Value>,
    ) -> Result<RunOutcome, WorkflowError> {
        let scout = scouts::get_by_id(&self.pool, scout_id)
            .await?
            .ok_or_else(|| WorkflowError::InvalidConfig(format!("scout {scout_id} not found")))?;

        let lock = self.get_or_create_lock(scout_id).await;
        let _permit = lock.lock().await;
        let cancel = CancellationToken::new();
        self.executor.run(&scout, overlay, &cancel).await
    }

    async fn rescan(&self) -> Result<(), SchedulerError> {
        let live = scouts::list(&self.pool, true).await?;
        let live_ids: HashSet<i64> = live.iter().map(|s| s.id).collect();

        let mut jobs = self.jobs.lock().await;

        let stale: Vec<i64> = jobs
            .keys()
            .copied()
            .filter(|id| !live_ids.contains(id))
            .collect();
        for id in stale {
            if let Some(job) = jobs.remove(&id) {
                job.cancel.cancel();
            }
        }

        for scout in live {
            let needs_spawn = match jobs.get(&scout.id) {
                Some(job) => job.schedule_cron != scout.schedule_cron,
                None => true,
            };
            if !needs_spawn {
                continue;
            }
            if let Some(old) = jobs.remove(&scout.id) {
                old.cancel.cancel();
            }
            match self.spawn_job(scout.clone()).await {
                Ok(job) => {
                    jobs.insert(scout.id, job);
                }
                Err(e) => tracing::warn!(
                    scout = %scout.name,
                    error = %e,
                    "failed to schedule scout, leaving unscheduled until next rescan"
                ),
            }
        }

        Ok(())
    }

    async fn spawn_job(&self, scout: Scout) -> Result<ScoutJob, SchedulerError> {
        let schedule = parse_cron(&scout.schedule_cron)?;
        let scout_lock = self.get_or_create_lock(scout.id).await;
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let pool = self.pool.clone();
        let executor = self.executor.clone();
        let scout_id = scout.id;

        let handle = tokio::spawn(async move {
            loop {
                let Some(next_fire) = schedule.upcoming(Utc).next() else {
                    return;
                };
                let sleep_for = (next_fire - Utc::now()).to_std().unwrap_or(Duration::ZERO);

                tokio::select! {
                    _ = task_cancel.cancelled() => return,
                    _ = tokio::time::sleep(sleep_for) => {}
                }

                let _permit = scout_lock.lock().await;
                let current = match scouts::get_by_id(&pool, scout_id).await {
                    Ok(Some(s)) if s.enabled => s,
                    Ok(Some(_)) => continue,
                    Ok(None) => return,
                    Err(e) => {
                        tracing::warn!(scout_id, error = %e, "failed to load scout before run");
                        continue;
                    }
                };

                match executor.run(&current, None, &task_cancel).await {
                    Ok(outcome) => {
                        tracing::info!(scout = %current.name, ?outcome, "scheduled scout run completed")
                    }
                    Err(e) => {
                        tracing::warn!(scout = %current.name, error = %e, "scheduled scout run failed")
                    }
                }
            }
        });

        Ok(ScoutJob {
            schedule_cron: scout.schedule_cron,
            cancel,
            handle,
        })
    }

    async fn stop_all_jobs(&self) {
        let mut jobs = self.jobs.lock().await;
        for (_, job) in jobs.drain() {
            job.cancel.cancel();
        }
    }

    async fn get_or_create_lock(&self, scout_id: i64) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(scout_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quartz_conversion_prepends_seconds_field() {
        assert_eq!(to_quartz_expression("30 9 * * *"), "0 30 9 * * *");
    }

    #[test]
    fn quartz_conversion_remaps_single_day_of_week() {
        // Unix Monday (1) becomes the crate's Monday (2).
        assert_eq!(to_quartz_expression("0 9 * * 1"), "0 0 9 * * 2");
        // Unix Sunday (0) becomes the crate's Sunday (1).
        assert_eq!(to_quartz_expression("0 9 * * 0"), "0 0 9 * * 1");
    }

    #[test]
    fn quartz_conversion_remaps_day_of_week_ranges_and_lists() {
        assert_eq!(to_quartz_expression("0 9 * * 1-5"), "0 0 9 * * 2-6");
        assert_eq!(to_quartz_expression("0 9 * * 0,6"), "0 0 9 * * 1,7");
    }

    #[test]
    fn quartz_conversion_leaves_names_and_wildcards_untouched() {
        assert_eq!(to_quartz_expression("0 9 * * MON-FRI"), "0 0 9 * * MON-FRI");
        assert_eq!(to_quartz_expression("0 9 * * *"), "0 0 9 * * *");
    }

    #[test]
    fn parse_cron_rejects_garbage_expression() {
        let err = parse_cron("not a cron expression").unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidCron { .. }));
    }

    #[test]
    fn parse_cron_accepts_standard_five_field_expression() {
        assert!(parse_cron("*/15 * * * *").is_ok());
    }

    #[test]
    fn pid_lock_refuses_concurrent_acquire_and_releases_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scheduler.lock");

        let first = PidLock::acquire(&path).unwrap();
        let err = PidLock::acquire(&path).unwrap_err();
        assert!(matches!(err, SchedulerError::AlreadyRunning { .. }));

        drop(first);
        assert!(PidLock::acquire(&path).is_ok());
    }

    #[tokio::test]
    async fn trigger_now_errors_on_unknown_scout() {
        use crate::dedup::DedupStore;
        use crate::error::LlmError;
        use crate::llm::{GenerationParams, LlmProvider, LlmResponse, Message};
        use crate::review::NotifyOnlyPublisher;
        use crate::storage::init_test_db;
        use async_trait::async_trait;

        struct FakeLlm;
        #[async_trait]
        impl LlmProvider for FakeLlm {
            fn name(&self) -> &'static str {
                "fake"
            }
            async fn complete(
                &self,
                _system_prompt: &str,
                _messages: &[Message],
                _params: &GenerationParams,
            ) -> Result<LlmResponse, LlmError> {
                Ok(LlmResponse {
                    text: String::new(),
                    usage: Default::default(),
                })
            }
            async fn health_check(&self) -> Result<(), LlmError> {
                Ok(())
            }
        }

        let pool = init_test_db().await.unwrap();
        let executor = Executor::new(
            pool.clone(),
            DedupStore::new(pool.clone(), false),
            Box::new(FakeLlm),
            "https://example.invalid/search",
            0.85,
            0.95,
        );
        let review_bus = ReviewBus::new(
            pool.clone(),
            vec![Box::new(NotifyOnlyPublisher)],
            Box::new(FakeLlm),
            None,
            DedupStore::new(pool.clone(), false),
        );
        let scheduler = Scheduler::new(pool, executor, review_bus, Duration::from_secs(3600));

        let err = scheduler.trigger_now(999, None).await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidConfig(_)));
    }
}
