//! Logging trait for transport client operations.
//!
//! This module provides the [`ClientLogger`] trait that allows users to
//! capture and log all API interactions passing through the
//! [`ChatClient`](crate::client::ChatClient).

use crate::types::{ChatRequest, StreamDelta};

/// A trait for logging transport client operations.
///
/// Implement this trait to capture and record API interactions, including
/// outgoing requests, individual streaming deltas, and completed
/// non-streaming responses.
///
/// # Example
///
/// ```rust,ignore
/// use confab::{ChatRequest, ClientLogger, StreamDelta};
/// use std::sync::Mutex;
///
/// struct FileLogger {
///     file: Mutex<std::fs::File>,
/// }
///
/// impl ClientLogger for FileLogger {
///     fn log_request(&self, request: &ChatRequest) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "Request: {}", serde_json::to_string(request).unwrap()).unwrap();
///     }
///
///     fn log_stream_delta(&self, delta: &StreamDelta) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "Delta: {delta:?}").unwrap();
///     }
///
///     fn log_completion(&self, text: &str) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "Completion: {text}").unwrap();
///     }
/// }
/// ```
pub trait ClientLogger: Send + Sync {
    /// Log an outgoing chat completion request.
    ///
    /// This method is called once per request, for both streaming and
    /// non-streaming calls, before the request is sent.
    fn log_request(&self, request: &ChatRequest);

    /// Log an individual streaming delta.
    ///
    /// This method is called for each [`StreamDelta`] decoded from a
    /// streaming response.
    fn log_stream_delta(&self, delta: &StreamDelta);

    /// Log the text of a completed non-streaming response.
    fn log_completion(&self, text: &str);
}
