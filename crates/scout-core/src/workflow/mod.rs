//! Scout Executor: the end-to-end run of one scout (spec §4.E). Assembles
//! the run config, fetches candidates from the scout's source, filters
//! through dedup, retries with per-kind perturbation on an empty result,
//! then either formats a scouting report or writes a generated post and
//! enqueues it as a Draft. Grounded in shape on `tuitbot_core::workflow`
//! (the "Layer rules" restricting this module to storage+LLM access, never
//! scheduler/review) and in substance on
//! `original_source/.../core/scouts.py::run_scout`.

pub mod perturb;
pub mod runtime;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::dedup::DedupStore;
use crate::error::{AdapterError, WorkflowError};
use crate::llm::LlmProvider;
use crate::source::arxiv::{date_filter_to_days, double_days_back, ArxivAdapter};
use crate::source::http::HttpAdapter;
use crate::source::reddit::{RedditAdapter, RedditSort};
use crate::source::rss::RssAdapter;
use crate::source::search::{perturbed_query, SearchAdapter};
use crate::source::{Item, SourceAdapter};
use crate::storage::drafts::{self, NewDraft};
use crate::storage::scouts::{self, Scout};
use crate::storage::DbPool;

pub use runtime::AgentRuntime;

/// The default retry budget when a scout's config omits `max_retries` (spec §6).
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// One item the model proposes, conforming to the structured-output schema
/// in spec §4.D: `{title, url, summary, sources, image_path?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoutItem {
    pub title: String,
    pub url: Option<String>,
    pub summary: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub image_path: Option<String>,
}

/// Scout-kind-specific configuration fields (spec §6). Unknown/irrelevant
/// fields for a given `kind` are simply ignored.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ScoutConfig {
    #[serde(default)]
    pub feeds: Vec<String>,
    #[serde(default)]
    pub subreddits: Vec<String>,
    #[serde(default)]
    pub reddit_sort: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub date_filter: Option<String>,
    #[serde(default)]
    pub days_back: Option<u32>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub image_generation: bool,
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Ids of sub-scouts this meta-scout treats as callable tools (spec §9's
    /// sub-executor-as-tool re-architecture note). One level deep only — a
    /// meta-scout's sub-scouts are run as ordinary (non-meta) scouts.
    #[serde(default)]
    pub meta_scouts: Vec<i64>,
}

/// What one Executor run produced.
#[derive(Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// A Draft was enqueued for review.
    Drafted { draft_id: i64 },
    /// The run produced no surviving items after retries; no Draft was emitted.
    Empty,
    /// The model's output failed to parse as the declared schema. Not retried.
    StructuredOutputFailed,
}

/// The Scout Executor. Single-threaded per scout; the Scheduler enforces
/// non-overlap (spec §4.E closing paragraph, §5).
pub struct Executor {
    pool: DbPool,
    dedup: DedupStore,
    runtime: AgentRuntime,
    rss: RssAdapter,
    reddit: RedditAdapter,
    arxiv: ArxivAdapter,
    http: HttpAdapter,
    search: SearchAdapter,
    retrieved_item_threshold: f32,
    draft_threshold: f32,
}

impl Executor {
    pub fn new(
        pool: DbPool,
        dedup: DedupStore,
        llm: Box<dyn LlmProvider>,
        search_endpoint: impl Into<String>,
        retrieved_item_threshold: f32,
        draft_threshold: f32,
    ) -> Self {
        Executor {
            rss: RssAdapter::new(pool.clone()),
            reddit: RedditAdapter::new(),
            arxiv: ArxivAdapter::new(),
            http: HttpAdapter::new(),
            search: SearchAdapter::new(search_endpoint),
            pool,
            dedup,
            runtime: AgentRuntime::new(llm),
            retrieved_item_threshold,
            draft_threshold,
        }
    }

    /// Runs one scout to completion, honoring cooperative cancellation
    /// checked between each major step (spec §5). The `scout_run` span this
    /// opens is what [`crate::logging::ScoutLogLayer`] keys its per-run log
    /// file on, mirroring `ScoutManager.run_scout`'s file-handler
    /// attach/detach around one run.
    #[tracing::instrument(name = "scout_run", skip_all, fields(scout = %scout.name))]
    pub async fn run(
        &self,
        scout: &Scout,
        overlay: Option<Value>,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, WorkflowError> {
        // Step 1: assemble run configuration by merging persisted config with the overlay.
        let mut config: ScoutConfig = serde_json::from_str(&scout.config_json)
            .map_err(|e| WorkflowError::InvalidConfig(format!("scout config: {e}")))?;
        if let Some(overlay) = overlay {
            merge_overlay(&mut config, overlay);
        }

        let max_retries = config.max_retries.unwrap_or(DEFAULT_MAX_RETRIES);

        // Steps 2-6: bind the source, fetch, dedup-filter, retry with
        // per-kind perturbation on an empty result.
        let (surviving, last_goal) = self.gather(scout, &config, max_retries, cancel).await?;

        if cancel.is_cancelled() {
            return Err(WorkflowError::Cancelled);
        }

        if surviving.is_empty() {
            scouts::record_run(&self.pool, scout.id, "empty").await?;
            return Ok(RunOutcome::Empty);
        }

        // Step 7: ask the runtime to produce structured items from the survivors.
        let catalogue = format!("Available tools: {}", scout.kind);
        let proposed = match self
            .runtime
            .propose_items(&last_goal, &catalogue, &surviving, surviving.len())
            .await
        {
            Ok(items) => items,
            Err(AdapterError::StructuredOutputFailure { .. }) => {
                scouts::record_run(&self.pool, scout.id, "structured_output_failed").await?;
                return Ok(RunOutcome::StructuredOutputFailed);
            }
            Err(e) => return Err(WorkflowError::Adapter(e)),
        };

        if proposed.is_empty() {
            scouts::record_run(&self.pool, scout.id, "empty").await?;
            return Ok(RunOutcome::Empty);
        }

        // Step 8: branch on intent.
        let draft_id = if scout.intent == "scouting" {
            self.emit_scouting_report(scout, &proposed).await?
        } else {
            self.emit_generation_draft(scout, &proposed, cancel).await?
        };

        // Step 9: record the run outcome.
        scouts::record_run(&self.pool, scout.id, "success").await?;

        Ok(RunOutcome::Drafted { draft_id })
    }

    /// Steps 2-6: fetches raw candidates for `scout.kind`, filters each
    /// through dedup, and retries with per-kind perturbation until either
    /// something survives or the retry budget / perturbation support is
    /// exhausted. Returns the survivors plus the goal text used on the
    /// final attempt (fed into structured-output synthesis).
    async fn gather(
        &self,
        scout: &Scout,
        config: &ScoutConfig,
        max_retries: u32,
        cancel: &CancellationToken,
    ) -> Result<(Vec<Item>, String), WorkflowError> {
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(WorkflowError::Cancelled);
            }

            let goal = synthesize_goal(scout, config, attempt);
            let raw = self.fetch_raw(scout, config, attempt).await;

            let raw = match raw {
                Ok(items) => items,
                Err(e) if e.suppresses_retry() => return Err(WorkflowError::Adapter(e)),
                Err(_) => Vec::new(),
            };

            let mut survivors = Vec::new();
            for item in raw {
                let text = item.dedup_text();
                let is_dup = self
                    .dedup
                    .is_similar(&text, self.retrieved_item_threshold, Some(scout.id))
                    .await?;
                if !is_dup {
                    self.dedup.add(&text, "retrieved", Some(scout.id)).await?;
                    survivors.push(item);
                }
            }

            if !survivors.is_empty() {
                return Ok((survivors, goal));
            }

            if attempt >= max_retries || !perturb::has_perturbation(&scout.kind) {
                return Ok((Vec::new(), goal));
            }
            attempt += 1;
        }
    }

    /// Fetches raw candidates for one attempt. `meta` scouts run their
    /// declared sub-scouts (as ordinary, non-meta scouts) and aggregate the
    /// items each one gathers, rather than calling a `SourceAdapter`.
    async fn fetch_raw(
        &self,
        scout: &Scout,
        config: &ScoutConfig,
        attempt: u32,
    ) -> Result<Vec<Item>, AdapterError> {
        match scout.kind.as_str() {
            "meta" => self.fetch_meta(config, attempt).await,
            "rss" => {
                let limit = 10 * (attempt as usize + 1);
                let cfg = json!({ "feeds": config.feeds, "scout_id": scout.id });
                self.rss.fetch(&cfg, limit).await
            }
            "reddit" => {
                let base_sort = config
                    .reddit_sort
                    .as_deref()
                    .and_then(RedditSort::parse)
                    .unwrap_or(RedditSort::Hot);
                let sort = base_sort.rotated(attempt);
                let cfg = json!({
                    "subreddits": config.subreddits,
                    "reddit_sort": sort.as_str(),
                });
                self.reddit.fetch(&cfg, 10).await
            }
            "arxiv" => {
                let base_days = config
                    .date_filter
                    .as_deref()
                    .map(date_filter_to_days)
                    .or(config.days_back)
                    .unwrap_or(7);
                let days = (0..attempt).fold(base_days, |d, _| double_days_back(d));
                let cfg = json!({
                    "query": config.query.clone().unwrap_or_default(),
                    "days_back": days,
                });
                self.arxiv.fetch(&cfg, 10).await
            }
            "search" => {
                let base_query = config.query.clone().unwrap_or_default();
                let query = if attempt == 0 {
                    base_query
                } else {
                    perturbed_query(&base_query, attempt - 1)
                };
                let cfg = json!({ "query": query });
                self.search.fetch(&cfg, 10).await
            }
            "http" => {
                let cfg = json!({ "url": config.url.clone().unwrap_or_default() });
                self.http.fetch(&cfg, 1).await
            }
            other => Err(AdapterError::ConfigurationMissing {
                field: format!("unknown scout kind '{other}'"),
            }),
        }
    }

    /// Runs each declared sub-scout as a one-shot, non-retrying fetch and
    /// aggregates what survives dedup, emitting no draft of its own.
    async fn fetch_meta(&self, config: &ScoutConfig, attempt: u32) -> Result<Vec<Item>, AdapterError> {
        let mut aggregated = Vec::new();
        for sub_id in &config.meta_scouts {
            let Some(sub_scout) = scouts::get_by_id(&self.pool, *sub_id)
                .await
                .map_err(|e| AdapterError::TransientNetwork {
                    message: format!("loading meta sub-scout {sub_id}: {e}"),
                })?
            else {
                continue;
            };
            let sub_config: ScoutConfig =
                serde_json::from_str(&sub_scout.config_json).unwrap_or_default();
            let mut items = Box::pin(self.fetch_raw(&sub_scout, &sub_config, attempt)).await?;
            aggregated.append(&mut items);
        }
        Ok(aggregated)
    }

    /// Formats surviving items as a human-readable report and emits a
    /// single Draft with platform = notify-only.
    async fn emit_scouting_report(
        &self,
        scout: &Scout,
        items: &[ScoutItem],
    ) -> Result<i64, WorkflowError> {
        let mut body = String::from("Scouting report:\n\n");
        for item in items {
            body.push_str(&format!("- {}: {}\n", item.title, item.summary));
            if let Some(url) = &item.url {
                body.push_str(&format!("  {url}\n"));
            }
        }

        let draft = drafts::enqueue(
            &self.pool,
            &NewDraft {
                scout_id: scout.id,
                title: format!("{} — scouting report", scout.name),
                body,
                url: None,
                summary: None,
                sources_json: "[]".to_string(),
                image_path: None,
                platform: "notify-only".to_string(),
            },
        )
        .await?;

        Ok(draft.id)
    }

    /// Picks the best surviving item, writes a platform-specific post, and
    /// records it as a generated fingerprint (tighter dedup threshold than
    /// retrieved items, spec §4.C).
    async fn emit_generation_draft(
        &self,
        scout: &Scout,
        items: &[ScoutItem],
        cancel: &CancellationToken,
    ) -> Result<i64, WorkflowError> {
        if cancel.is_cancelled() {
            return Err(WorkflowError::Cancelled);
        }

        let chosen_index = self.runtime.select_best(items).await.unwrap_or(0);
        let chosen = items
            .get(chosen_index)
            .or_else(|| items.first())
            .ok_or_else(|| {
                WorkflowError::InvalidConfig("no items survived to draft from".to_string())
            })?;

        let platform = first_platform(scout);
        let body = self
            .runtime
            .write_post(&scout.prompt_template, chosen, &platform)
            .await?;

        let is_dup = self
            .dedup
            .is_similar(&body, self.draft_threshold, Some(scout.id))
            .await?;
        if !is_dup {
            self.dedup.add(&body, "generated", Some(scout.id)).await?;
        }

        let draft = drafts::enqueue(
            &self.pool,
            &NewDraft {
                scout_id: scout.id,
                title: chosen.title.clone(),
                body,
                url: chosen.url.clone(),
                summary: Some(chosen.summary.clone()),
                sources_json: serde_json::to_string(&chosen.sources).unwrap_or_default(),
                image_path: chosen.image_path.clone(),
                platform,
            },
        )
        .await?;

        Ok(draft.id)
    }
}

fn first_platform(scout: &Scout) -> String {
    scout
        .platform
        .split(',')
        .next()
        .unwrap_or("notify-only")
        .trim()
        .to_string()
}

/// Merges a per-call config overlay over the persisted config. Only
/// overlay fields that are present take effect (spec §4.A: ad-hoc runs may
/// override a scout's query without persisting the change).
fn merge_overlay(config: &mut ScoutConfig, overlay: Value) {
    if let Some(query) = overlay.get("query").and_then(|v| v.as_str()) {
        config.query = Some(query.to_string());
    }
    if let Some(limit) = overlay.get("max_retries").and_then(|v| v.as_u64()) {
        config.max_retries = Some(limit as u32);
    }
}

/// Step 3: synthesises the natural-language goal for this attempt, per the
/// per-kind rules in spec §4.E.3 and the retry hints in §4.E.6.
fn synthesize_goal(scout: &Scout, config: &ScoutConfig, attempt: u32) -> String {
    let mut goal = match scout.kind.as_str() {
        "arxiv" => {
            let base_days = config
                .date_filter
                .as_deref()
                .map(date_filter_to_days)
                .or(config.days_back)
                .unwrap_or(7);
            let days = (0..attempt).fold(base_days, |d, _| double_days_back(d));
            format!(
                "Find recent ArXiv papers about '{}' from the last {days} days.",
                config.query.clone().unwrap_or_default()
            )
        }
        "rss" => format!(
            "Enumerate the configured feeds ({}), then read each for candidate items.",
            config.feeds.join(", ")
        ),
        "reddit" => {
            let base_sort = config
                .reddit_sort
                .as_deref()
                .and_then(RedditSort::parse)
                .unwrap_or(RedditSort::Hot);
            let sort = base_sort.rotated(attempt);
            format!(
                "Scan r/{} sorted by {} ({}).",
                config.subreddits.join(", r/"),
                sort.as_str(),
                sort.retry_hint()
            )
        }
        "http" => format!("Read {}.", config.url.clone().unwrap_or_default()),
        "search" => {
            let base_query = config.query.clone().unwrap_or_default();
            if attempt == 0 {
                format!("Search for '{base_query}'.")
            } else {
                format!(
                    "Search for '{}'.",
                    perturbed_query(&base_query, attempt - 1)
                )
            }
        }
        "meta" => "Aggregate candidates from this meta-scout's sub-scouts.".to_string(),
        _ => "Find relevant candidate items.".to_string(),
    };

    goal.push_str(&format!("\n\nYOUR GOAL: {}", scout.prompt_template));
    goal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_scout(kind: &str, intent: &str, platform: &str) -> Scout {
        Scout {
            id: 1,
            name: "s".to_string(),
            kind: kind.to_string(),
            intent: intent.to_string(),
            config_json: "{}".to_string(),
            prompt_template: "Pick the best post.".to_string(),
            platform: platform.to_string(),
            schedule_cron: "0 * * * *".to_string(),
            llm_provider: None,
            llm_model: None,
            enabled: true,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            last_run_at: None,
            last_run_status: None,
        }
    }

    #[test]
    fn synthesize_goal_reflects_rotated_reddit_sort_on_retry() {
        let scout = sample_scout("reddit", "generation", "twitter");
        let config = ScoutConfig {
            subreddits: vec!["rust".to_string()],
            reddit_sort: Some("hot".to_string()),
            ..Default::default()
        };

        let goal_attempt_0 = synthesize_goal(&scout, &config, 0);
        assert!(goal_attempt_0.contains("hot"));

        let goal_attempt_1 = synthesize_goal(&scout, &config, 1);
        assert!(goal_attempt_1.contains("new"));
        assert!(goal_attempt_1.contains("most recent"));
    }

    #[test]
    fn synthesize_goal_doubles_arxiv_window_each_attempt() {
        let scout = sample_scout("arxiv", "scouting", "notify-only");
        let config = ScoutConfig {
            query: Some("llms".to_string()),
            date_filter: Some("week".to_string()),
            ..Default::default()
        };

        assert!(synthesize_goal(&scout, &config, 0).contains("last 7 days"));
        assert!(synthesize_goal(&scout, &config, 1).contains("last 14 days"));
    }

    #[test]
    fn first_platform_takes_first_of_comma_separated_list() {
        let scout = sample_scout("rss", "generation", "twitter, mastodon");
        assert_eq!(first_platform(&scout), "twitter");
    }

    #[test]
    fn merge_overlay_only_overrides_present_fields() {
        let mut config = ScoutConfig {
            query: Some("original".to_string()),
            max_retries: Some(2),
            ..Default::default()
        };
        merge_overlay(&mut config, json!({ "query": "overridden" }));
        assert_eq!(config.query.as_deref(), Some("overridden"));
        assert_eq!(config.max_retries, Some(2));
    }
}
