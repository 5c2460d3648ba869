//! Implementation of the `scoutd review` command.
//!
//! Terminal-backed stand-in for the human channel of the review bus (spec
//! §4.G/§6): lists pending drafts one at a time and lets the operator
//! approve, reject, refine, skip, or quit. Modeled on `tuitbot-cli`'s
//! `commands/approve.rs` read loop, extended to the Review Bus's four
//! operations instead of just approve/reject.

use std::io::{self, BufRead, Write};

use scout_core::config::Config;
use scout_core::dedup::DedupStore;
use scout_core::llm::factory::create_provider;
use scout_core::review::{NotifyOnlyPublisher, ReviewBus};
use scout_core::storage;

use super::ReviewArgs;

pub async fn execute(config: &Config, _args: ReviewArgs) -> anyhow::Result<()> {
    let pool = storage::init_db(&config.storage.db_path, config.storage.max_connections)
        .await
        .map_err(|e| anyhow::anyhow!("database initialization failed: {e}"))?;

    let llm = create_provider(&config.llm)
        .map_err(|e| anyhow::anyhow!("LLM provider creation failed: {e}"))?;
    let dedup = DedupStore::new(pool.clone(), config.dedup.semantic_enabled);
    let bus = ReviewBus::new(pool, vec![Box::new(NotifyOnlyPublisher)], llm, None, dedup);

    let pending = bus.poll().await?;
    if pending.is_empty() {
        eprintln!("no pending drafts to review.");
        return Ok(());
    }
    eprintln!("{} pending draft(s) to review.\n", pending.len());

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let mut approved = 0u32;
    let mut rejected = 0u32;
    let mut refined = 0u32;

    for (i, draft) in pending.iter().enumerate() {
        eprintln!("--- Draft {}/{} ---", i + 1, pending.len());
        eprintln!("  Platform: {}", draft.platform);
        eprintln!("  Title:    {}", draft.title);
        if let Some(url) = &draft.url {
            eprintln!("  URL:      {url}");
        }
        eprintln!("  Created:  {}", draft.created_at);
        eprintln!();
        eprintln!("  Body:");
        for line in draft.body.lines() {
            eprintln!("    {line}");
        }
        eprintln!();
        eprint!("  [a]pprove / [r]eject / [f]refine / [s]kip / [q]uit > ");
        io::stderr().flush()?;

        let mut input = String::new();
        reader.read_line(&mut input)?;
        let choice = input.trim().to_lowercase();

        match choice.as_str() {
            "a" | "approve" => match bus.approve(draft.id).await {
                Ok(_) => {
                    eprintln!("  -> approved\n");
                    approved += 1;
                }
                Err(e) => eprintln!("  -> approval failed: {e}\n"),
            },
            "r" | "reject" => {
                eprint!("  reason (optional) > ");
                io::stderr().flush()?;
                let mut note = String::new();
                reader.read_line(&mut note)?;
                let note = note.trim();
                let note = if note.is_empty() { None } else { Some(note) };
                bus.reject(draft.id, note).await?;
                eprintln!("  -> rejected\n");
                rejected += 1;
            }
            "f" | "refine" => {
                eprint!("  feedback > ");
                io::stderr().flush()?;
                let mut feedback = String::new();
                reader.read_line(&mut feedback)?;
                let feedback = feedback.trim();
                if feedback.is_empty() {
                    eprintln!("  -> skipped refinement, no feedback given\n");
                } else {
                    let refined_draft = bus.refine(draft.id, feedback).await?;
                    eprintln!("  -> refined:\n");
                    for line in refined_draft.body.lines() {
                        eprintln!("    {line}");
                    }
                    eprintln!();
                    refined += 1;
                }
            }
            "q" | "quit" => {
                eprintln!("  -> quitting review\n");
                break;
            }
            _ => eprintln!("  -> skipped\n"),
        }
    }

    eprintln!(
        "review complete: {approved} approved, {rejected} rejected, {refined} refined."
    );
    Ok(())
}
