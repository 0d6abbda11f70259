//! History summarization.
//!
//! When the conversation outgrows its verbatim window, the oldest span of
//! turns is compressed into a single recap turn by a (possibly different,
//! faster) model. The flow is snapshot → request → optimistic commit: the
//! span is captured under the history lock, the model call runs without it,
//! and the commit re-validates against the store generation. A commit that
//! loses the race is retried exactly once with a fresh snapshot; any other
//! failure abandons this trigger point and leaves history untouched.

use std::fmt::Write as _;
use std::sync::Mutex;

use crate::client::Transport;
use crate::error::{Error, Result};
use crate::history::{HistoryStore, SummarySnapshot};
use crate::observability::{
    SUMMARIZE_APPLIED, SUMMARIZE_ATTEMPTS, SUMMARIZE_CONFLICTS, SUMMARIZE_FAILURES,
};
use crate::types::{ChatRequest, WireMessage};

/// Builds the recap instruction sent to the summary model.
pub(crate) fn build_summary_prompt(snapshot: &SummarySnapshot) -> String {
    let mut transcript = String::new();
    for turn in &snapshot.span {
        let _ = writeln!(transcript, "{}: {}", turn.role, turn.content);
    }
    let previous = snapshot.previous_summary.as_deref().unwrap_or("(none)");
    format!(
        "Summarize this conversation, incorporating the previous summary if provided.\n\
         \n\
         Previous summary: {previous}\n\
         \n\
         Recent conversation:\n\
         {transcript}\n\
         Create a concise summary (2-3 sentences) that:\n\
         - Incorporates key points from the previous summary\n\
         - Adds important new topics and conclusions\n\
         - Maintains context needed for future messages\n\
         \n\
         Summary:"
    )
}

fn lock(store: &Mutex<HistoryStore>) -> std::sync::MutexGuard<'_, HistoryStore> {
    store
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

async fn attempt(
    transport: &dyn Transport,
    store: &Mutex<HistoryStore>,
    model: &str,
    max_turns: usize,
) -> Result<bool> {
    let Some(snapshot) = lock(store).summary_snapshot(max_turns) else {
        return Ok(false);
    };
    let prompt = build_summary_prompt(&snapshot);
    let request = ChatRequest::new(model, vec![WireMessage::user(prompt)]);
    let text = transport.complete(request).await?;
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::invalid_turn("summary model returned an empty recap"));
    }
    lock(store).replace_prefix_with_summary(text, snapshot.through_sequence, snapshot.generation)?;
    SUMMARIZE_APPLIED.click();
    Ok(true)
}

/// Runs one summarization cycle against the store.
///
/// Returns `Ok(true)` when a summary turn was applied, `Ok(false)` when the
/// history no longer needed compacting. The caller owns the pending-summary
/// flag; this function only does the work.
pub async fn run(
    transport: &dyn Transport,
    store: &Mutex<HistoryStore>,
    model: &str,
    max_turns: usize,
) -> Result<bool> {
    SUMMARIZE_ATTEMPTS.click();
    match attempt(transport, store, model, max_turns).await {
        Err(e) if e.is_concurrent_mutation() => {
            SUMMARIZE_CONFLICTS.click();
            match attempt(transport, store, model, max_turns).await {
                Ok(applied) => Ok(applied),
                Err(e) => {
                    SUMMARIZE_FAILURES.click();
                    Err(e)
                }
            }
        }
        Err(e) => {
            SUMMARIZE_FAILURES.click();
            Err(e)
        }
        Ok(applied) => Ok(applied),
    }
}
