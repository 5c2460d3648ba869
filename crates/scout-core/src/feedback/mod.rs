//! Feedback and calibration: feedback is pure journalling (spec §4.H), kept
//! in [`crate::storage::feedback`]; this module is the meta-loop one layer
//! up, mirrored by the doc comment on
//! [`crate::storage::calibrations::record`]. Every reject or refinement asks
//! the LLM to rewrite the scout's user-editable prompt template to
//! incorporate that one piece of critique, keeping the core goal intact. On
//! rewrite failure the old instruction is retained silently — the
//! calibration attempt is still journalled, just marked unapplied.
//!
//! Grounded on `original_source/.../core/scouts.py::apply_calibration_feedback`,
//! which fires unconditionally on every single feedback submission (no
//! accumulation, no threshold) and falls back to the existing instruction on
//! any failure. Grounded in Rust idiom on
//! `crate::workflow::runtime::AgentRuntime`'s plain `LlmProvider::complete`
//! calls (this module needs no structured-output contract, just prose).

use crate::error::ReviewError;
use crate::llm::{GenerationParams, LlmProvider, Message, Role};
use crate::storage::calibrations::{self, Calibration};
use crate::storage::scouts::{self, Scout};
use crate::storage::{feedback as feedback_storage, DbPool};

const CALIBRATION_SYSTEM_PROMPT: &str = "You rewrite a content-scout's instruction text given \
human review feedback on its output. Keep the core goal intact. Return only the new \
instruction text, no commentary, no markdown.";

/// Records one piece of human review feedback against a scout. Thin
/// wrapper over the storage layer kept here so callers reach for this
/// module, not [`crate::storage::feedback`] directly, when journalling
/// feedback that also drives calibration.
pub async fn record(
    pool: &DbPool,
    scout_id: i64,
    draft_id: Option<i64>,
    action: &str,
    note: Option<&str>,
) -> Result<(), ReviewError> {
    feedback_storage::record(pool, scout_id, draft_id, action, note).await?;
    Ok(())
}

/// Rewrites `scout`'s prompt template in response to one piece of human
/// feedback. Called unconditionally from `review::reject`/`review::refine`
/// per feedback event — there is no gate or accumulation count, matching
/// `apply_calibration_feedback`'s behavior in the original.
pub async fn calibrate(
    pool: &DbPool,
    llm: &dyn LlmProvider,
    scout: &Scout,
    feedback_text: &str,
) -> Result<Calibration, ReviewError> {
    let prompt = format!(
        "Current instruction:\n{}\n\nHuman feedback:\n{}\n\nRewrite the instruction.",
        scout.prompt_template, feedback_text
    );

    let calibration = match llm
        .complete(
            CALIBRATION_SYSTEM_PROMPT,
            &[Message {
                role: Role::User,
                content: prompt,
            }],
            &GenerationParams::default(),
        )
        .await
    {
        Ok(response) if !response.text.trim().is_empty() => {
            let new_prompt = response.text.trim().to_string();
            scouts::update_prompt_template(pool, scout.id, &new_prompt).await?;
            calibrations::record(pool, scout.id, &scout.prompt_template, &new_prompt, 1, true)
                .await?
        }
        Ok(_) => {
            // Empty rewrite: keep the old instruction, journal the failed attempt.
            calibrations::record(
                pool,
                scout.id,
                &scout.prompt_template,
                &scout.prompt_template,
                1,
                false,
            )
            .await?
        }
        Err(_) => {
            calibrations::record(
                pool,
                scout.id,
                &scout.prompt_template,
                &scout.prompt_template,
                1,
                false,
            )
            .await?
        }
    };

    Ok(calibration)
}
