//! Review Bus: the passive state machine over the `drafts` table (spec
//! §4.G). Grounded in shape on `tuitbot_core`'s approval-queue status
//! transitions and `tuitbot-cli`'s `commands/approve.rs` terminal loop,
//! generalized into `HumanChannel`/`Publisher` capability traits so the
//! state machine itself stays surface-agnostic — the CLI's `review`
//! subcommand is the only thing that knows about a terminal.
//!
//! Layer rule: this module only touches storage, the Agent Runtime's
//! underlying [`LlmProvider`], and the capability traits below. It never
//! calls into [`crate::workflow`] or [`crate::scheduler`].

use async_trait::async_trait;

use crate::dedup::DedupStore;
use crate::error::ReviewError;
use crate::feedback::calibrate;
use crate::llm::{GenerationParams, LlmProvider, Message, Role};
use crate::storage::drafts::{self, Draft, DraftStatus};
use crate::storage::feedback;
use crate::storage::scouts;
use crate::storage::DbPool;

/// A surface that can show a human a newly-surfaced draft. The bus calls
/// this once per draft on every `poll()`, after the draft has already
/// flipped to `reviewing` — the notification is advisory, not part of the
/// state machine itself.
#[async_trait]
pub trait HumanChannel: Send + Sync {
    async fn notify_pending(&self, draft: &Draft) -> Result<(), ReviewError>;
}

/// A platform-specific publisher (spec §6's external Publisher contract).
/// `authenticate` and `publish` report auth and rate-limit failures as
/// distinguishable (typed) [`ReviewError`] variants so the bus can tell
/// callers precisely what went wrong. Returns the publisher's external id
/// on success, or `None` for notify-only platforms that have nothing to
/// report back.
#[async_trait]
pub trait Publisher: Send + Sync {
    fn platform(&self) -> &str;
    async fn authenticate(&self) -> Result<bool, ReviewError>;
    async fn publish(&self, draft: &Draft) -> Result<Option<String>, ReviewError>;
}

/// The sentinel publisher for scouting-intent drafts: never actually posts
/// anywhere, so approval always succeeds with a null external id (spec §8
/// scenario S5).
pub struct NotifyOnlyPublisher;

#[async_trait]
impl Publisher for NotifyOnlyPublisher {
    fn platform(&self) -> &str {
        "notify-only"
    }

    async fn authenticate(&self) -> Result<bool, ReviewError> {
        Ok(true)
    }

    async fn publish(&self, _draft: &Draft) -> Result<Option<String>, ReviewError> {
        Ok(None)
    }
}

/// Drives the `pending_review -> reviewing -> posted|rejected` state
/// machine. Shares the persistence store with the Scheduler but holds no
/// in-memory state of its own (spec §4.G closing line) beyond the
/// publishers it was constructed with.
pub struct ReviewBus {
    pool: DbPool,
    publishers: Vec<Box<dyn Publisher>>,
    llm: Box<dyn LlmProvider>,
    channel: Option<Box<dyn HumanChannel>>,
    dedup: DedupStore,
}

impl ReviewBus {
    /// `dedup` should be the same store the Executor uses for this scout's
    /// runs, so a refinement's fingerprint is visible to future dedup
    /// checks against the same semantic backend.
    pub fn new(
        pool: DbPool,
        publishers: Vec<Box<dyn Publisher>>,
        llm: Box<dyn LlmProvider>,
        channel: Option<Box<dyn HumanChannel>>,
        dedup: DedupStore,
    ) -> Self {
        ReviewBus {
            pool,
            publishers,
            llm,
            channel,
            dedup,
        }
    }

    /// Selects every Draft in `pending_review`, in insertion order, and
    /// atomically flips each to `reviewing`. Idempotent: a Draft already in
    /// `reviewing` is never re-surfaced. Notifies the attached channel, if
    /// any, for each draft actually claimed.
    pub async fn poll(&self) -> Result<Vec<Draft>, ReviewError> {
        let candidates = drafts::list_pending(&self.pool).await?;
        let mut surfaced = Vec::with_capacity(candidates.len());

        for draft in candidates {
            if !drafts::claim_for_review(&self.pool, draft.id).await? {
                continue;
            }
            let reviewing = drafts::get_by_id(&self.pool, draft.id)
                .await?
                .unwrap_or(draft);

            if let Some(channel) = &self.channel {
                channel.notify_pending(&reviewing).await?;
            }
            surfaced.push(reviewing);
        }

        Ok(surfaced)
    }

    /// Approves a `reviewing` draft: publishes it via the matching
    /// Publisher and, on success, sets status=posted, posted-at=now,
    /// external-id=publisher-returned. On publish failure the draft is
    /// left in `reviewing` and the error surfaced (spec §4.G, §8 property
    /// 8: a publish failure never flips a draft to `posted`).
    pub async fn approve(&self, draft_id: i64) -> Result<Draft, ReviewError> {
        let draft = self.require_reviewing(draft_id).await?;

        let publisher = self
            .publishers
            .iter()
            .find(|p| p.platform() == draft.platform)
            .ok_or_else(|| ReviewError::NoPublisher {
                platform: draft.platform.clone(),
            })?;

        if !publisher.authenticate().await? {
            return Err(ReviewError::AuthFailed {
                message: format!("publisher '{}' rejected credentials", draft.platform),
            });
        }

        let external_id = publisher.publish(&draft).await?;

        if !drafts::mark_posted(&self.pool, draft_id, external_id.as_deref()).await? {
            return Err(ReviewError::InvalidState {
                draft_id,
                expected: "reviewing".to_string(),
            });
        }

        feedback::record(&self.pool, draft.scout_id, Some(draft_id), "approve", None).await?;

        self.fetch(draft_id).await
    }

    /// Rejects a `reviewing` draft; terminal. Records the reviewer's note
    /// as feedback.
    pub async fn reject(&self, draft_id: i64, note: Option<&str>) -> Result<Draft, ReviewError> {
        let draft = self.require_reviewing(draft_id).await?;

        if !drafts::reject(&self.pool, draft_id, note).await? {
            return Err(ReviewError::InvalidState {
                draft_id,
                expected: "reviewing".to_string(),
            });
        }

        feedback::record(&self.pool, draft.scout_id, Some(draft_id), "reject", note).await?;
        self.calibrate_from_feedback(draft.scout_id, note.unwrap_or("rejected with no note"))
            .await?;

        self.fetch(draft_id).await
    }

    /// Rewrites a `reviewing` draft's content given free-text human
    /// feedback, re-surfacing it (it remains `reviewing`). Records the
    /// feedback as `Feedback(action=refinement)` — the raw material the
    /// calibration loop later reduces over (spec §4.H).
    pub async fn refine(&self, draft_id: i64, feedback_text: &str) -> Result<Draft, ReviewError> {
        let draft = self.require_reviewing(draft_id).await?;

        let prompt = format!(
            "Original post:\n{}\n\nHuman feedback: {}\n\nRewrite the post to address the \
             feedback while staying true to its original intent. Return only the rewritten \
             text, no commentary.",
            draft.body, feedback_text
        );
        let response = self
            .llm
            .complete(
                "You rewrite drafted social posts to incorporate reviewer feedback.",
                &[Message {
                    role: Role::User,
                    content: prompt,
                }],
                &GenerationParams::default(),
            )
            .await?;

        let new_body = response.text.trim().to_string();
        drafts::update_body(&self.pool, draft_id, &new_body).await?;
        self.dedup
            .add(&new_body, "generated", Some(draft.scout_id))
            .await?;
        feedback::record(
            &self.pool,
            draft.scout_id,
            Some(draft_id),
            "refinement",
            Some(feedback_text),
        )
        .await?;
        self.calibrate_from_feedback(draft.scout_id, feedback_text).await?;

        self.fetch(draft_id).await
    }

    /// Rewrites the scout's prompt template in response to one piece of
    /// human feedback, unconditionally — there is no accumulation gate,
    /// matching `apply_calibration_feedback`'s fire-every-time behavior.
    async fn calibrate_from_feedback(
        &self,
        scout_id: i64,
        feedback_text: &str,
    ) -> Result<(), ReviewError> {
        let scout = scouts::get_by_id(&self.pool, scout_id)
            .await?
            .ok_or_else(|| ReviewError::InvalidState {
                draft_id: scout_id,
                expected: "scout to exist".to_string(),
            })?;
        calibrate(&self.pool, self.llm.as_ref(), &scout, feedback_text).await?;
        Ok(())
    }

    async fn require_reviewing(&self, draft_id: i64) -> Result<Draft, ReviewError> {
        let draft = self.fetch(draft_id).await?;
        if draft.status() != Some(DraftStatus::Reviewing) {
            return Err(ReviewError::InvalidState {
                draft_id,
                expected: "reviewing".to_string(),
            });
        }
        Ok(draft)
    }

    async fn fetch(&self, draft_id: i64) -> Result<Draft, ReviewError> {
        drafts::get_by_id(&self.pool, draft_id)
            .await?
            .ok_or_else(|| ReviewError::InvalidState {
                draft_id,
                expected: "reviewing".to_string(),
            })
    }
}
