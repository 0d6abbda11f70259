// Public modules
pub mod chat;
pub mod client;
pub mod client_logger;
pub mod error;
pub mod history;
pub mod observability;
pub mod render;
pub mod sse;
pub mod stream;
pub mod summarize;
pub mod types;

// Re-exports
pub use chat::{ChatArgs, ChatCommand, ChatConfig, ChatSession, LineEditMode};
pub use client::{ChatClient, DeltaStream, Transport};
pub use client_logger::ClientLogger;
pub use error::{Error, Result};
pub use history::{HistoryStore, Role, SummarySnapshot, Turn};
pub use render::{PlainTextRenderer, Renderer};
pub use stream::{CancelToken, StreamCoordinator, StreamOutcome, StreamPhase};
pub use types::{ChatRequest, StreamDelta, WireMessage};
