//! Conversation history storage.
//!
//! The [`HistoryStore`] holds the ordered, append-only sequence of turns for
//! one session and implements the bounded-retention rules: the request
//! context is capped at a configurable number of recent exchange pairs, and
//! older turns are compacted into a single summary turn.
//!
//! Mutations bump a generation counter. Summarization runs against a
//! [`SummarySnapshot`] and commits with an optimistic check against that
//! counter, so a history that moved underneath an in-flight summarization
//! fails with `ConcurrentMutation` instead of losing turns.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The role of a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Session-level instructions; synthesized into the context, never stored.
    System,
    /// A user message.
    User,
    /// A model response.
    Assistant,
    /// A synthetic recap of compacted older turns.
    Summary,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Summary => "summary",
        };
        write!(f, "{s}")
    }
}

/// One message in the conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Who produced the turn.
    pub role: Role,
    /// The turn text. Immutable once stored.
    pub content: String,
    /// Reasoning text captured separately from the answer, if the model
    /// exposed a thinking phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    /// True for assistant turns committed after a user interrupt.
    #[serde(default)]
    pub partial: bool,
    /// Monotonically increasing position, assigned at append time.
    pub sequence: u64,
}

/// A consistent view of the span eligible for summarization.
#[derive(Clone, Debug)]
pub struct SummarySnapshot {
    /// Content of the summary turn being replaced, if one exists.
    pub previous_summary: Option<String>,
    /// The turns to compress, oldest first.
    pub span: Vec<Turn>,
    /// Sequence of the last turn in the span.
    pub through_sequence: u64,
    /// Store generation at snapshot time.
    pub generation: u64,
}

/// Ordered, append-only storage for one session's conversation turns.
#[derive(Debug, Default)]
pub struct HistoryStore {
    turns: Vec<Turn>,
    next_sequence: u64,
    generation: u64,
}

impl HistoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a user turn and returns its sequence.
    pub fn append_user(&mut self, content: impl Into<String>) -> Result<u64> {
        self.push(Role::User, content.into(), None, false)
    }

    /// Appends an assistant turn and returns its sequence.
    ///
    /// `partial` marks a turn committed after the stream was cancelled.
    pub fn append_assistant(
        &mut self,
        content: impl Into<String>,
        thinking: Option<String>,
        partial: bool,
    ) -> Result<u64> {
        self.push(Role::Assistant, content.into(), thinking, partial)
    }

    fn push(
        &mut self,
        role: Role,
        content: String,
        thinking: Option<String>,
        partial: bool,
    ) -> Result<u64> {
        match role {
            Role::User | Role::Assistant => {}
            Role::Summary => {
                return Err(Error::invalid_turn(
                    "summary turns are inserted by summarization, not appended",
                ));
            }
            Role::System => {
                return Err(Error::invalid_turn(
                    "the system prompt is session state, not a history turn",
                ));
            }
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.turns.push(Turn {
            role,
            content,
            thinking,
            partial,
            sequence,
        });
        self.generation += 1;
        Ok(sequence)
    }

    /// Returns the stored turns, oldest first.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Returns the number of stored turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Returns true if no turns are stored.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Returns the current generation counter.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Removes all turns, including the summary. The session-level system
    /// prompt is unaffected.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.generation += 1;
    }

    /// Index of the first non-summary turn: 1 when a summary is present.
    fn first_non_summary_index(&self) -> usize {
        usize::from(matches!(self.turns.first(), Some(t) if t.role == Role::Summary))
    }

    /// Number of complete exchange pairs, counted by assistant turns.
    fn pair_count(&self) -> usize {
        self.turns
            .iter()
            .filter(|t| t.role == Role::Assistant)
            .count()
    }

    /// Index where the verbatim window of the most recent `max_turns`
    /// exchange pairs begins.
    fn window_start(&self, max_turns: usize) -> usize {
        let first = self.first_non_summary_index();
        let mut pairs = 0usize;
        for i in (first..self.turns.len()).rev() {
            if self.turns[i].role == Role::Assistant {
                pairs += 1;
                if pairs == max_turns {
                    if i > first && self.turns[i - 1].role == Role::User {
                        return i - 1;
                    }
                    return i;
                }
            }
        }
        first
    }

    /// Assembles the read-only context for an outgoing request: the system
    /// turn (if any), the summary turn (if present), and the most recent
    /// `max_turns` exchange pairs plus the trailing turns of the in-flight
    /// exchange. Does not mutate storage.
    pub fn context_for_request(&self, system_prompt: Option<&str>, max_turns: usize) -> Vec<Turn> {
        let mut context = Vec::new();
        if let Some(prompt) = system_prompt {
            context.push(Turn {
                role: Role::System,
                content: prompt.to_string(),
                thinking: None,
                partial: false,
                sequence: 0,
            });
        }
        if let Some(first) = self.turns.first()
            && first.role == Role::Summary
        {
            context.push(first.clone());
        }
        let start = self.window_start(max_turns);
        context.extend(self.turns[start..].iter().cloned());
        context
    }

    /// True when the number of non-summary exchange pairs exceeds `max_turns`.
    pub fn needs_summarization(&self, max_turns: usize) -> bool {
        self.pair_count() > max_turns
    }

    /// Takes a consistent view of the oldest over-threshold span, or `None`
    /// when nothing needs compacting.
    pub fn summary_snapshot(&self, max_turns: usize) -> Option<SummarySnapshot> {
        if !self.needs_summarization(max_turns) {
            return None;
        }
        let first = self.first_non_summary_index();
        let start = self.window_start(max_turns);
        if start <= first {
            return None;
        }
        let span: Vec<Turn> = self.turns[first..start].to_vec();
        let through_sequence = span.last()?.sequence;
        Some(SummarySnapshot {
            previous_summary: (first == 1).then(|| self.turns[0].content.clone()),
            span,
            through_sequence,
            generation: self.generation,
        })
    }

    /// Atomically replaces the oldest prefix with a single summary turn.
    ///
    /// Removes the leading summary turn, if present (its content has been
    /// folded into `summary_text`), and every non-summary turn with
    /// `sequence <= through_sequence`; inserts one fresh summary turn at the
    /// front of the removed region. Fails with `ConcurrentMutation` when the
    /// store changed since the snapshot that computed `through_sequence`,
    /// leaving history untouched.
    pub fn replace_prefix_with_summary(
        &mut self,
        summary_text: impl Into<String>,
        through_sequence: u64,
        expected_generation: u64,
    ) -> Result<()> {
        if self.generation != expected_generation {
            return Err(Error::concurrent_mutation(
                "history changed since the summarization snapshot was taken",
            ));
        }
        let first = self.first_non_summary_index();
        let mut end = first;
        while end < self.turns.len() && self.turns[end].sequence <= through_sequence {
            end += 1;
        }
        if end == first {
            return Err(Error::concurrent_mutation(
                "summarization snapshot no longer matches history",
            ));
        }
        let summary = Turn {
            role: Role::Summary,
            content: summary_text.into(),
            thinking: None,
            partial: false,
            sequence: through_sequence,
        };
        self.turns.splice(0..end, std::iter::once(summary));
        self.generation += 1;
        Ok(())
    }

    /// Returns a copy of the stored turns for persistence.
    pub fn export_history(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    /// Replaces the stored turns with an imported sequence.
    ///
    /// Validates what summarization and append maintain: a summary turn may
    /// only sit first, system turns are never stored, and sequences strictly
    /// increase.
    pub fn import_history(&mut self, turns: Vec<Turn>) -> Result<()> {
        for (i, turn) in turns.iter().enumerate() {
            match turn.role {
                Role::User | Role::Assistant => {}
                Role::Summary if i == 0 => {}
                Role::Summary => {
                    return Err(Error::invalid_turn(
                        "a summary turn may only appear first in imported history",
                    ));
                }
                Role::System => {
                    return Err(Error::invalid_turn(
                        "system turns do not belong in imported history",
                    ));
                }
            }
            if i > 0 && turn.sequence <= turns[i - 1].sequence {
                return Err(Error::invalid_turn(
                    "imported history sequences must strictly increase",
                ));
            }
        }
        self.next_sequence = turns.last().map(|t| t.sequence + 1).unwrap_or(0);
        self.turns = turns;
        self.generation += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_exchanges(n: usize) -> HistoryStore {
        let mut store = HistoryStore::new();
        for i in 0..n {
            store.append_user(format!("question {i}")).unwrap();
            store
                .append_assistant(format!("answer {i}"), None, false)
                .unwrap();
        }
        store
    }

    fn pair_count_of(turns: &[Turn]) -> usize {
        turns.iter().filter(|t| t.role == Role::Assistant).count()
    }

    #[test]
    fn sequences_are_monotonic() {
        let store = store_with_exchanges(3);
        let seqs: Vec<u64> = store.turns().iter().map(|t| t.sequence).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn append_rejects_summary_and_system() {
        let mut store = HistoryStore::new();
        let err = store
            .push(Role::Summary, "recap".to_string(), None, false)
            .unwrap_err();
        assert!(err.is_invalid_turn());
        let err = store
            .push(Role::System, "be brief".to_string(), None, false)
            .unwrap_err();
        assert!(err.is_invalid_turn());
        assert!(store.is_empty());
    }

    #[test]
    fn context_is_bounded() {
        let store = store_with_exchanges(5);
        let context = store.context_for_request(Some("be brief"), 2);
        assert!(pair_count_of(&context) <= 2);
        assert_eq!(context[0].role, Role::System);
        // Two pairs, no summary yet.
        assert_eq!(context.len(), 5);
        assert_eq!(context[1].content, "question 3");
        assert_eq!(context.last().unwrap().content, "answer 4");
    }

    #[test]
    fn context_includes_trailing_user_turn() {
        let mut store = store_with_exchanges(3);
        store.append_user("pending question").unwrap();
        let context = store.context_for_request(None, 2);
        assert_eq!(context.last().unwrap().content, "pending question");
        assert!(pair_count_of(&context) <= 2);
    }

    #[test]
    fn needs_summarization_threshold() {
        let store = store_with_exchanges(2);
        assert!(!store.needs_summarization(2));
        let store = store_with_exchanges(3);
        assert!(store.needs_summarization(2));
    }

    #[test]
    fn summarization_replaces_oldest_prefix() {
        let mut store = store_with_exchanges(3);
        let snapshot = store.summary_snapshot(2).unwrap();
        assert_eq!(snapshot.span.len(), 2);
        assert_eq!(snapshot.span[0].content, "question 0");
        assert!(snapshot.previous_summary.is_none());

        store
            .replace_prefix_with_summary("recap", snapshot.through_sequence, snapshot.generation)
            .unwrap();

        let turns = store.turns();
        assert_eq!(turns[0].role, Role::Summary);
        assert_eq!(turns[0].content, "recap");
        assert_eq!(pair_count_of(turns), 2);
        assert_eq!(turns[1].content, "question 1");
        assert_eq!(turns.last().unwrap().content, "answer 2");
        // Idempotent in effect: nothing left over threshold.
        assert!(!store.needs_summarization(2));
        assert!(store.summary_snapshot(2).is_none());
    }

    #[test]
    fn context_bound_holds_with_summary_and_system() {
        let mut store = store_with_exchanges(3);
        let snapshot = store.summary_snapshot(2).unwrap();
        store
            .replace_prefix_with_summary("recap", snapshot.through_sequence, snapshot.generation)
            .unwrap();
        store.append_user("pending").unwrap();

        let context = store.context_for_request(Some("be brief"), 2);
        let systems = context.iter().filter(|t| t.role == Role::System).count();
        let summaries = context.iter().filter(|t| t.role == Role::Summary).count();
        assert_eq!(systems, 1);
        assert_eq!(summaries, 1);
        assert!(pair_count_of(&context) <= 2);
        assert_eq!(context[0].role, Role::System);
        assert_eq!(context[1].role, Role::Summary);
        assert_eq!(context.last().unwrap().content, "pending");
    }

    #[test]
    fn second_summarization_subsumes_the_first() {
        let mut store = store_with_exchanges(3);
        let snapshot = store.summary_snapshot(2).unwrap();
        store
            .replace_prefix_with_summary("recap one", snapshot.through_sequence, snapshot.generation)
            .unwrap();

        store.append_user("question 3").unwrap();
        store.append_assistant("answer 3", None, false).unwrap();
        assert!(store.needs_summarization(2));

        let snapshot = store.summary_snapshot(2).unwrap();
        assert_eq!(snapshot.previous_summary.as_deref(), Some("recap one"));
        store
            .replace_prefix_with_summary("recap two", snapshot.through_sequence, snapshot.generation)
            .unwrap();

        let summaries = store
            .turns()
            .iter()
            .filter(|t| t.role == Role::Summary)
            .count();
        assert_eq!(summaries, 1);
        assert_eq!(store.turns()[0].content, "recap two");
        assert_eq!(pair_count_of(store.turns()), 2);
    }

    #[test]
    fn stale_snapshot_fails_and_leaves_history() {
        let mut store = store_with_exchanges(3);
        let snapshot = store.summary_snapshot(2).unwrap();
        // Concurrent mutation between snapshot and commit.
        store.append_user("interleaved").unwrap();
        let before: Vec<Turn> = store.turns().to_vec();

        let err = store
            .replace_prefix_with_summary("recap", snapshot.through_sequence, snapshot.generation)
            .unwrap_err();
        assert!(err.is_concurrent_mutation());
        assert_eq!(store.turns(), before.as_slice());
    }

    #[test]
    fn clear_removes_everything() {
        let mut store = store_with_exchanges(3);
        let snapshot = store.summary_snapshot(2).unwrap();
        store
            .replace_prefix_with_summary("recap", snapshot.through_sequence, snapshot.generation)
            .unwrap();
        store.clear();
        assert!(store.is_empty());
        // Sequences keep increasing after a clear.
        let seq = store.append_user("fresh").unwrap();
        assert!(seq > snapshot.through_sequence);
    }

    #[test]
    fn partial_turns_close_their_pair() {
        let mut store = HistoryStore::new();
        store.append_user("q").unwrap();
        store
            .append_assistant("partial answer", None, true)
            .unwrap();
        assert_eq!(pair_count_of(store.turns()), 1);
        assert!(store.turns()[1].partial);
    }

    #[test]
    fn import_validates_placement_and_sequences() {
        let mut store = HistoryStore::new();
        let good = vec![
            Turn {
                role: Role::Summary,
                content: "recap".to_string(),
                thinking: None,
                partial: false,
                sequence: 3,
            },
            Turn {
                role: Role::User,
                content: "q".to_string(),
                thinking: None,
                partial: false,
                sequence: 4,
            },
            Turn {
                role: Role::Assistant,
                content: "a".to_string(),
                thinking: Some("hmm".to_string()),
                partial: false,
                sequence: 5,
            },
        ];
        store.import_history(good.clone()).unwrap();
        assert_eq!(store.export_history(), good);
        assert_eq!(store.append_user("next").unwrap(), 6);

        let mut bad = good.clone();
        bad.swap(0, 1);
        assert!(store.import_history(bad).unwrap_err().is_invalid_turn());

        let mut bad = good;
        bad[2].sequence = 4;
        assert!(store.import_history(bad).unwrap_err().is_invalid_turn());
    }
}
