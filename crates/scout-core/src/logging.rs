//! Per-run scout log files: a `tracing_subscriber::Layer` that mirrors
//! `ScoutManager.run_scout`'s file-handler attach/detach in
//! `original_source/.../core/scouts.py` — a file is opened when a
//! `scout_run` span starts, every event inside that span (and its
//! children) is appended to it, and it is closed when the span ends.
//! Retention cleanup removes per-run files older than `retention_days`,
//! the Rust equivalent of that same module's log-rotation pass.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use chrono::Utc;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::Subscriber;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// The span name [`ScoutLogLayer`] watches for. Matches the span
/// `Executor::run` opens via `#[tracing::instrument(name = "scout_run", ...)]`.
pub const SCOUT_SPAN_NAME: &str = "scout_run";
/// The span field carrying the scout's name.
const SCOUT_NAME_FIELD: &str = "scout";

/// Appends every event inside a `scout_run` span to
/// `<scout_log_dir>/<scout-name>/<timestamp>.log`, opened on span entry and
/// closed when the span ends.
pub struct ScoutLogLayer {
    scout_log_dir: PathBuf,
    files: Mutex<HashMap<Id, File>>,
}

impl ScoutLogLayer {
    pub fn new(scout_log_dir: impl Into<PathBuf>) -> Self {
        ScoutLogLayer {
            scout_log_dir: scout_log_dir.into(),
            files: Mutex::new(HashMap::new()),
        }
    }
}

#[derive(Default)]
struct ScoutNameVisitor(Option<String>);

impl Visit for ScoutNameVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == SCOUT_NAME_FIELD {
            self.0 = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == SCOUT_NAME_FIELD && self.0.is_none() {
            self.0 = Some(format!("{value:?}").trim_matches('"').to_string());
        }
    }
}

impl<S> Layer<S> for ScoutLogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, _ctx: Context<'_, S>) {
        if attrs.metadata().name() != SCOUT_SPAN_NAME {
            return;
        }
        let mut visitor = ScoutNameVisitor::default();
        attrs.record(&mut visitor);
        let Some(name) = visitor.0 else { return };

        let dir = self.scout_log_dir.join(sanitize_for_path(&name));
        if fs::create_dir_all(&dir).is_err() {
            return;
        }
        let path = dir.join(format!("{}.log", Utc::now().format("%Y%m%d_%H%M%S")));
        if let Ok(file) = File::create(&path) {
            self.files.lock().unwrap().insert(id.clone(), file);
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let Some(scope) = ctx.event_scope(event) else {
            return;
        };
        let mut files = self.files.lock().unwrap();
        for span in scope {
            if let Some(file) = files.get_mut(&span.id()) {
                let mut visitor = EventMessageVisitor::default();
                event.record(&mut visitor);
                let _ = writeln!(
                    file,
                    "{} {} {}",
                    Utc::now().to_rfc3339(),
                    event.metadata().level(),
                    visitor.0
                );
            }
        }
    }

    fn on_close(&self, id: Id, _ctx: Context<'_, S>) {
        self.files.lock().unwrap().remove(&id);
    }
}

#[derive(Default)]
struct EventMessageVisitor(String);

impl Visit for EventMessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.0 = value.to_string();
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

fn sanitize_for_path(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Deletes per-run scout log files under `scout_log_dir` whose modification
/// time is older than `retention_days`. Best-effort: I/O errors on
/// individual entries are skipped rather than aborting the whole pass.
pub fn cleanup_old_scout_logs(scout_log_dir: &Path, retention_days: u32) -> std::io::Result<()> {
    let cutoff = SystemTime::now()
        .checked_sub(std::time::Duration::from_secs(u64::from(retention_days) * 86_400))
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let Ok(scout_dirs) = fs::read_dir(scout_log_dir) else {
        return Ok(());
    };

    for scout_dir in scout_dirs.flatten() {
        let Ok(entries) = fs::read_dir(scout_dir.path()) else {
            continue;
        };
        for entry in entries.flatten() {
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if let Ok(modified) = metadata.modified() {
                if modified < cutoff {
                    let _ = fs::remove_file(entry.path());
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn sanitize_for_path_replaces_unsafe_characters() {
        assert_eq!(sanitize_for_path("my/scout name"), "my_scout_name");
    }

    #[test]
    fn cleanup_removes_only_stale_files() {
        let root = tempfile::tempdir().unwrap();
        let scout_dir = root.path().join("weekly-digest");
        fs::create_dir_all(&scout_dir).unwrap();

        let stale = scout_dir.join("20200101_000000.log");
        let fresh = scout_dir.join("20990101_000000.log");
        fs::write(&stale, "old").unwrap();
        fs::write(&fresh, "new").unwrap();

        let old_time = SystemTime::now() - Duration::from_secs(400 * 86_400);
        let stale_file = File::open(&stale).unwrap();
        stale_file.set_modified(old_time).unwrap();

        cleanup_old_scout_logs(root.path(), 30).unwrap();

        assert!(!stale.exists());
        assert!(fresh.exists());
    }
}
