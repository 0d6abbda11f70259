//! Stream coordination for one in-flight chat completion.
//!
//! The [`StreamCoordinator`] drives a single streaming request: it pulls
//! deltas off the transport, demultiplexes thinking from answer text,
//! forwards each delta to the renderer as it arrives, and commits the
//! resulting assistant turn into the history store when the stream reaches a
//! terminal phase.
//!
//! Cancellation is cooperative. The [`CancelToken`] is a shared flag checked
//! between delta deliveries; once observed, the delta stream is dropped,
//! which closes the underlying connection, and whatever text accumulated is
//! committed as a partial turn.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;

use crate::client::Transport;
use crate::error::Error;
use crate::history::HistoryStore;
use crate::observability::{
    STREAM_DELTAS, STREAM_ERRORS, TURNS_CANCELLED, TURNS_COMPLETED, TURNS_ERRORED,
};
use crate::render::Renderer;
use crate::types::{ChatRequest, StreamDelta};

/// Out-of-band cancellation signal for an in-flight stream.
///
/// Cloned into the Ctrl+C handler and checked by the coordinator between
/// delta deliveries.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a new, unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of the stream this token is attached to.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns true once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Clears the token for reuse with the next stream.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// The phase of an in-flight request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamPhase {
    /// Receiving reasoning deltas.
    Thinking,
    /// Receiving answer deltas.
    Answering,
    /// The stream ended normally.
    Done,
    /// The user interrupted the stream.
    Cancelled,
    /// The transport failed mid-stream.
    Errored,
}

impl StreamPhase {
    /// Returns true for the terminal phases.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamPhase::Done | StreamPhase::Cancelled | StreamPhase::Errored
        )
    }
}

/// Accumulating state for one in-flight request.
///
/// Owned exclusively by the coordinator and destroyed when the request
/// reaches a terminal phase.
#[derive(Debug)]
struct StreamState {
    phase: StreamPhase,
    buffer_thinking: String,
    buffer_answer: String,
}

impl StreamState {
    fn new() -> Self {
        Self {
            phase: StreamPhase::Answering,
            buffer_thinking: String::new(),
            buffer_answer: String::new(),
        }
    }

    fn on_thinking(&mut self, text: &str) {
        if self.buffer_answer.is_empty() {
            self.phase = StreamPhase::Thinking;
        }
        self.buffer_thinking.push_str(text);
    }

    fn on_answer(&mut self, text: &str) {
        self.phase = StreamPhase::Answering;
        self.buffer_answer.push_str(text);
    }
}

/// The result of driving one stream to a terminal phase.
#[derive(Clone, Debug)]
pub struct StreamOutcome {
    /// The terminal phase the stream reached.
    pub phase: StreamPhase,
    /// Accumulated thinking text.
    pub thinking: String,
    /// Accumulated answer text.
    pub answer: String,
    /// The transport error, when `phase` is [`StreamPhase::Errored`].
    pub error: Option<Error>,
}

/// Drives one streaming request from dispatch to terminal phase.
pub struct StreamCoordinator {
    cancel: CancelToken,
}

impl StreamCoordinator {
    /// Creates a coordinator observing the given cancellation token.
    pub fn new(cancel: CancelToken) -> Self {
        Self { cancel }
    }

    /// Runs one streaming request to completion.
    ///
    /// Each delta is forwarded to the renderer as soon as the transport
    /// delivers it. At a terminal phase the assistant turn is committed:
    ///
    /// - done: full turn with content and thinking text;
    /// - cancelled: whatever accumulated, tagged partial;
    /// - errored: nothing is committed and the buffers are discarded, the
    ///   preceding user turn stays in history so the user may retry.
    pub async fn run(
        self,
        transport: &dyn Transport,
        request: ChatRequest,
        store: &Mutex<HistoryStore>,
        renderer: &mut dyn Renderer,
    ) -> StreamOutcome {
        let mut state = StreamState::new();
        let mut error = None;

        let mut deltas = match transport.stream(request).await {
            Ok(deltas) => deltas,
            Err(e) => {
                TURNS_ERRORED.click();
                renderer.error(&e.to_string());
                return StreamOutcome {
                    phase: StreamPhase::Errored,
                    thinking: String::new(),
                    answer: String::new(),
                    error: Some(e),
                };
            }
        };

        loop {
            if self.cancel.is_cancelled() {
                state.phase = StreamPhase::Cancelled;
                break;
            }
            match deltas.next().await {
                Some(Ok(StreamDelta::Thinking(text))) => {
                    STREAM_DELTAS.click();
                    state.on_thinking(&text);
                    renderer.append_thinking(&text);
                }
                Some(Ok(StreamDelta::Answer(text))) => {
                    STREAM_DELTAS.click();
                    state.on_answer(&text);
                    renderer.append_answer(&text);
                }
                Some(Ok(StreamDelta::End)) | None => {
                    state.phase = StreamPhase::Done;
                    break;
                }
                Some(Err(e)) => {
                    STREAM_ERRORS.click();
                    state.phase = StreamPhase::Errored;
                    error = Some(e);
                    break;
                }
            }
        }
        // Dropping the delta stream closes the transport connection.
        drop(deltas);

        let StreamState {
            phase,
            buffer_thinking,
            buffer_answer,
        } = state;
        let thinking = (!buffer_thinking.is_empty()).then_some(buffer_thinking);

        let commit = match phase {
            StreamPhase::Done => {
                TURNS_COMPLETED.click();
                renderer.turn_complete();
                Some(false)
            }
            StreamPhase::Cancelled => {
                TURNS_CANCELLED.click();
                renderer.interrupted();
                Some(true)
            }
            StreamPhase::Errored => {
                TURNS_ERRORED.click();
                if let Some(e) = &error {
                    renderer.error(&e.to_string());
                }
                None
            }
            StreamPhase::Thinking | StreamPhase::Answering => None,
        };
        if let Some(partial) = commit {
            let append = store
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .append_assistant(buffer_answer.clone(), thinking.clone(), partial);
            if let Err(e) = append {
                renderer.error(&e.to_string());
            }
        }

        StreamOutcome {
            phase,
            thinking: thinking.unwrap_or_default(),
            answer: buffer_answer,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use futures::stream;

    use super::*;
    use crate::error::Result;

    /// Renderer that records display events for assertions.
    #[derive(Default)]
    struct RecordingRenderer {
        events: Vec<String>,
    }

    impl Renderer for RecordingRenderer {
        fn append_thinking(&mut self, text: &str) {
            self.events.push(format!("thinking:{text}"));
        }
        fn append_answer(&mut self, text: &str) {
            self.events.push(format!("answer:{text}"));
        }
        fn turn_complete(&mut self) {
            self.events.push("complete".to_string());
        }
        fn notice(&mut self, text: &str) {
            self.events.push(format!("notice:{text}"));
        }
        fn error(&mut self, text: &str) {
            self.events.push(format!("error:{text}"));
        }
        fn interrupted(&mut self) {
            self.events.push("interrupted".to_string());
        }
    }

    /// Transport that replays a canned delta sequence and can trip a cancel
    /// token after a given number of deltas.
    struct ScriptedTransport {
        deltas: Vec<Result<StreamDelta>>,
        cancel_after: Option<(usize, CancelToken)>,
    }

    impl ScriptedTransport {
        fn new(deltas: Vec<Result<StreamDelta>>) -> Self {
            Self {
                deltas,
                cancel_after: None,
            }
        }

        fn cancel_after(mut self, count: usize, token: CancelToken) -> Self {
            self.cancel_after = Some((count, token));
            self
        }
    }

    #[async_trait::async_trait]
    impl Transport for ScriptedTransport {
        async fn complete(&self, _request: ChatRequest) -> Result<String> {
            Err(Error::streaming("not scripted", None))
        }

        async fn stream(&self, _request: ChatRequest) -> Result<crate::client::DeltaStream> {
            let cancel_after = self.cancel_after.clone();
            let delivered = Arc::new(AtomicUsize::new(0));
            let deltas = self.deltas.clone();
            let stream = stream::iter(deltas).inspect(move |_| {
                let n = delivered.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some((count, token)) = &cancel_after
                    && n >= *count
                {
                    token.cancel();
                }
            });
            Ok(Box::pin(stream))
        }

        async fn list_models(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    fn store_with_user_turn() -> Mutex<HistoryStore> {
        let mut store = HistoryStore::new();
        store.append_user("question").unwrap();
        Mutex::new(store)
    }

    fn request() -> ChatRequest {
        ChatRequest::new_streaming("test-model", Vec::new())
    }

    #[tokio::test]
    async fn done_commits_full_turn() {
        let transport = ScriptedTransport::new(vec![
            Ok(StreamDelta::Thinking("let me see. ".to_string())),
            Ok(StreamDelta::Answer("Hel".to_string())),
            Ok(StreamDelta::Answer("lo".to_string())),
            Ok(StreamDelta::End),
        ]);
        let store = store_with_user_turn();
        let mut renderer = RecordingRenderer::default();

        let outcome = StreamCoordinator::new(CancelToken::new())
            .run(&transport, request(), &store, &mut renderer)
            .await;

        assert_eq!(outcome.phase, StreamPhase::Done);
        assert_eq!(outcome.answer, "Hello");
        assert_eq!(outcome.thinking, "let me see. ");

        let store = store.lock().unwrap();
        let last = store.turns().last().unwrap();
        assert_eq!(last.content, "Hello");
        assert_eq!(last.thinking.as_deref(), Some("let me see. "));
        assert!(!last.partial);
        assert_eq!(renderer.events.last().unwrap(), "complete");
    }

    #[tokio::test]
    async fn deltas_forwarded_in_arrival_order() {
        let transport = ScriptedTransport::new(vec![
            Ok(StreamDelta::Thinking("a".to_string())),
            Ok(StreamDelta::Answer("b".to_string())),
            Ok(StreamDelta::End),
        ]);
        let store = store_with_user_turn();
        let mut renderer = RecordingRenderer::default();

        StreamCoordinator::new(CancelToken::new())
            .run(&transport, request(), &store, &mut renderer)
            .await;

        assert_eq!(renderer.events, vec!["thinking:a", "answer:b", "complete"]);
    }

    #[tokio::test]
    async fn missing_end_marker_still_completes() {
        let transport =
            ScriptedTransport::new(vec![Ok(StreamDelta::Answer("hi".to_string()))]);
        let store = store_with_user_turn();
        let mut renderer = RecordingRenderer::default();

        let outcome = StreamCoordinator::new(CancelToken::new())
            .run(&transport, request(), &store, &mut renderer)
            .await;

        assert_eq!(outcome.phase, StreamPhase::Done);
        assert_eq!(store.lock().unwrap().turns().last().unwrap().content, "hi");
    }

    #[tokio::test]
    async fn cancel_commits_partial_turn() {
        let token = CancelToken::new();
        let transport = ScriptedTransport::new(vec![
            Ok(StreamDelta::Answer("partial ".to_string())),
            Ok(StreamDelta::Answer("answer".to_string())),
            Ok(StreamDelta::Answer(" never seen".to_string())),
            Ok(StreamDelta::End),
        ])
        .cancel_after(2, token.clone());
        let store = store_with_user_turn();
        let mut renderer = RecordingRenderer::default();

        let outcome = StreamCoordinator::new(token)
            .run(&transport, request(), &store, &mut renderer)
            .await;

        assert_eq!(outcome.phase, StreamPhase::Cancelled);
        let store = store.lock().unwrap();
        let last = store.turns().last().unwrap();
        assert!(last.partial);
        assert_eq!(last.content, "partial answer");
        assert_eq!(renderer.events.last().unwrap(), "interrupted");
    }

    #[tokio::test]
    async fn cancel_before_first_delta_commits_empty_partial() {
        let token = CancelToken::new();
        token.cancel();
        let transport = ScriptedTransport::new(vec![
            Ok(StreamDelta::Answer("never seen".to_string())),
            Ok(StreamDelta::End),
        ]);
        let store = store_with_user_turn();
        let mut renderer = RecordingRenderer::default();

        let outcome = StreamCoordinator::new(token)
            .run(&transport, request(), &store, &mut renderer)
            .await;

        assert_eq!(outcome.phase, StreamPhase::Cancelled);
        let store = store.lock().unwrap();
        let last = store.turns().last().unwrap();
        assert!(last.partial);
        assert!(last.content.is_empty());
    }

    #[tokio::test]
    async fn error_mid_thinking_discards_buffers() {
        let transport = ScriptedTransport::new(vec![
            Ok(StreamDelta::Thinking("half a thought".to_string())),
            Err(Error::streaming("connection reset", None)),
        ]);
        let store = store_with_user_turn();
        let mut renderer = RecordingRenderer::default();

        let outcome = StreamCoordinator::new(CancelToken::new())
            .run(&transport, request(), &store, &mut renderer)
            .await;

        assert_eq!(outcome.phase, StreamPhase::Errored);
        assert!(outcome.error.is_some());

        // No assistant turn committed; the user turn stays last for retry.
        let store = store.lock().unwrap();
        let last = store.turns().last().unwrap();
        assert_eq!(last.role, crate::history::Role::User);
        assert_eq!(last.content, "question");
        assert!(
            renderer
                .events
                .last()
                .unwrap()
                .starts_with("error:Streaming error")
        );
    }

    #[tokio::test]
    async fn phase_starts_with_first_delta_kind() {
        // Thinking first
        let transport = ScriptedTransport::new(vec![
            Ok(StreamDelta::Thinking("t".to_string())),
            Ok(StreamDelta::End),
        ]);
        let store = store_with_user_turn();
        let mut renderer = RecordingRenderer::default();
        let outcome = StreamCoordinator::new(CancelToken::new())
            .run(&transport, request(), &store, &mut renderer)
            .await;
        assert_eq!(outcome.thinking, "t");
        assert!(outcome.answer.is_empty());

        // Answer directly
        let transport = ScriptedTransport::new(vec![
            Ok(StreamDelta::Answer("a".to_string())),
            Ok(StreamDelta::End),
        ]);
        let store = store_with_user_turn();
        let outcome = StreamCoordinator::new(CancelToken::new())
            .run(&transport, request(), &store, &mut renderer)
            .await;
        assert!(outcome.thinking.is_empty());
        assert_eq!(outcome.answer, "a");
    }

    #[test]
    fn cancel_token_round_trip() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
        token.reset();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn terminal_phases() {
        assert!(StreamPhase::Done.is_terminal());
        assert!(StreamPhase::Cancelled.is_terminal());
        assert!(StreamPhase::Errored.is_terminal());
        assert!(!StreamPhase::Thinking.is_terminal());
        assert!(!StreamPhase::Answering.is_terminal());
    }
}
