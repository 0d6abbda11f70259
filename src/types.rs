//! Wire types for the OpenAI-compatible chat completion API.
//!
//! Requests and responses here mirror the subset of the wire format the
//! client actually touches: chat completions (streaming and not), streamed
//! chunk deltas, and the model listing. Everything else the protocol can
//! carry is ignored by serde.

use serde::{Deserialize, Serialize};

use crate::history::{Role, Turn};

/// One message in an outgoing chat completion request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Wire role: "system", "user", or "assistant".
    pub role: String,
    /// Message text.
    pub content: String,
}

impl WireMessage {
    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

impl From<&Turn> for WireMessage {
    /// Encodes a history turn for the wire.
    ///
    /// Summary turns travel as a system message carrying the recap, the way
    /// the request context folds compressed history back into the prompt.
    /// Assistant thinking text is display-only and never sent back.
    fn from(turn: &Turn) -> Self {
        match turn.role {
            Role::System => WireMessage::system(turn.content.clone()),
            Role::User => WireMessage::user(turn.content.clone()),
            Role::Assistant => WireMessage::assistant(turn.content.clone()),
            Role::Summary => WireMessage::system(format!(
                "Previous conversation summary: {}",
                turn.content
            )),
        }
    }
}

/// A chat completion request body.
#[derive(Clone, Debug, Serialize)]
pub struct ChatRequest {
    /// Model identifier.
    pub model: String,
    /// Ordered conversation context.
    pub messages: Vec<WireMessage>,
    /// Whether the response should be streamed.
    pub stream: bool,
}

impl ChatRequest {
    /// Creates a non-streaming request.
    pub fn new(model: impl Into<String>, messages: Vec<WireMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: false,
        }
    }

    /// Creates a streaming request.
    pub fn new_streaming(model: impl Into<String>, messages: Vec<WireMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: true,
        }
    }
}

/// One incremental fragment of streamed model output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamDelta {
    /// Reasoning text streamed before the final answer.
    Thinking(String),
    /// Answer text.
    Answer(String),
    /// Explicit end-of-stream signal.
    End,
}

/// The message object inside a non-streaming completion choice.
#[derive(Debug, Deserialize)]
pub struct CompletionMessage {
    /// Message text; absent for refusals and tool-only responses.
    pub content: Option<String>,
}

/// One choice in a non-streaming chat completion response.
#[derive(Debug, Deserialize)]
pub struct CompletionChoice {
    /// The completed message.
    pub message: CompletionMessage,
}

/// A non-streaming chat completion response.
#[derive(Debug, Deserialize)]
pub struct ChatCompletion {
    /// Response choices; the client reads the first.
    pub choices: Vec<CompletionChoice>,
}

/// The delta object inside a streamed chunk choice.
#[derive(Debug, Default, Deserialize)]
pub struct ChunkDelta {
    /// Answer text fragment.
    pub content: Option<String>,
    /// Reasoning text fragment, for endpoints that expose a thinking phase.
    pub reasoning_content: Option<String>,
}

/// One choice in a streamed chat completion chunk.
#[derive(Debug, Deserialize)]
pub struct ChunkChoice {
    /// Incremental delta.
    #[serde(default)]
    pub delta: ChunkDelta,
    /// Populated on the final content chunk.
    pub finish_reason: Option<String>,
}

/// A streamed chat completion chunk.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionChunk {
    /// Chunk choices; empty for usage-only trailer chunks.
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

/// One entry in the model listing.
#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    /// Model identifier.
    pub id: String,
}

/// The `/models` listing response.
#[derive(Debug, Deserialize)]
pub struct ModelList {
    /// Available models, in endpoint order.
    pub data: Vec<ModelInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_messages_in_order() {
        let request = ChatRequest::new_streaming(
            "test-model",
            vec![
                WireMessage::system("be brief"),
                WireMessage::user("hi"),
                WireMessage::assistant("hello"),
            ],
        );
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "test-model");
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][2]["content"], "hello");
    }

    #[test]
    fn chunk_parses_reasoning_and_content() {
        let raw = r#"{"id":"c1","object":"chat.completion.chunk","choices":[{"index":0,"delta":{"reasoning_content":"hmm"},"finish_reason":null}]}"#;
        let chunk: ChatCompletionChunk = serde_json::from_str(raw).unwrap();
        assert_eq!(chunk.choices[0].delta.reasoning_content.as_deref(), Some("hmm"));
        assert!(chunk.choices[0].delta.content.is_none());

        let raw = r#"{"choices":[{"index":0,"delta":{"content":"hi"},"finish_reason":"stop"}]}"#;
        let chunk: ChatCompletionChunk = serde_json::from_str(raw).unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("hi"));
        assert_eq!(chunk.choices[0].finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn usage_trailer_chunk_has_no_choices() {
        let raw = r#"{"choices":[],"usage":{"total_tokens":12}}"#;
        let chunk: ChatCompletionChunk = serde_json::from_str(raw).unwrap();
        assert!(chunk.choices.is_empty());
    }

    #[test]
    fn model_list_parses_ids() {
        let raw = r#"{"object":"list","data":[{"id":"a","object":"model"},{"id":"b","object":"model"}]}"#;
        let list: ModelList = serde_json::from_str(raw).unwrap();
        let ids: Vec<&str> = list.data.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn summary_turn_encodes_as_system_recap() {
        let turn = Turn {
            role: Role::Summary,
            content: "we discussed geese".to_string(),
            thinking: None,
            partial: false,
            sequence: 7,
        };
        let wire = WireMessage::from(&turn);
        assert_eq!(wire.role, "system");
        assert!(wire.content.contains("Previous conversation summary"));
        assert!(wire.content.contains("geese"));
    }
}
