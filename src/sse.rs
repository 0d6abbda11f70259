//! Server-Sent Events (SSE) processing for streaming responses.
//!
//! This module parses the byte stream of a streaming chat completion into
//! [`StreamDelta`] values. OpenAI-compatible endpoints frame each chunk as a
//! `data:` line terminated by a blank line, with a literal `data: [DONE]`
//! marker at the end of the stream.

use std::collections::VecDeque;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::error::{Error, Result};
use crate::types::{ChatCompletionChunk, StreamDelta};

/// Process a stream of bytes into a stream of chunk deltas.
///
/// Handles SSE framing, buffering across chunk boundaries, the `[DONE]`
/// marker, and error conditions. One SSE event can carry both reasoning and
/// answer text; deltas are queued and yielded one at a time in arrival order.
pub fn process_sse<S>(byte_stream: S) -> impl Stream<Item = Result<StreamDelta>>
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Unpin + 'static,
{
    // Convert reqwest errors to our error type
    let stream = byte_stream.map(|result| {
        result
            .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });

    // Use a state machine to process the SSE stream
    let buffer = String::new();
    let pending: VecDeque<StreamDelta> = VecDeque::new();

    stream::unfold(
        (stream, buffer, pending),
        move |(mut stream, mut buffer, mut pending)| async move {
            loop {
                // Drain deltas decoded from an earlier event first
                if let Some(delta) = pending.pop_front() {
                    return Some((Ok(delta), (stream, buffer, pending)));
                }

                // Then check if we have a complete event in the buffer
                if let Some((block, remaining)) = take_event_block(&buffer) {
                    buffer = remaining;
                    match parse_event_block(&block) {
                        Ok(deltas) => {
                            pending.extend(deltas);
                            continue;
                        }
                        Err(e) => return Some((Err(e), (stream, buffer, pending))),
                    }
                }

                // Read more data
                match stream.next().await {
                    Some(Ok(bytes)) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => buffer.push_str(&text),
                        Err(e) => {
                            return Some((
                                Err(Error::encoding(
                                    format!("Invalid UTF-8 in stream: {e}"),
                                    Some(Box::new(e)),
                                )),
                                (stream, buffer, pending),
                            ));
                        }
                    },
                    Some(Err(e)) => {
                        return Some((Err(e), (stream, buffer, pending)));
                    }
                    None => {
                        // End of stream: parse any unterminated trailing event
                        if !buffer.trim().is_empty() {
                            let block = std::mem::take(&mut buffer);
                            match parse_event_block(&block) {
                                Ok(deltas) => {
                                    pending.extend(deltas);
                                    if let Some(delta) = pending.pop_front() {
                                        return Some((Ok(delta), (stream, buffer, pending)));
                                    }
                                }
                                Err(e) => return Some((Err(e), (stream, buffer, pending))),
                            }
                        }
                        return None;
                    }
                }
            }
        },
    )
}

/// Split one complete event block off the front of the buffer.
///
/// Events are delimited by a blank line.
fn take_event_block(buffer: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = buffer.splitn(2, "\n\n").collect();
    if parts.len() != 2 {
        return None;
    }
    Some((parts[0].to_string(), parts[1].to_string()))
}

/// Decode one SSE event block into zero or more deltas.
///
/// `event:` lines and comments are ignored; `data:` lines carry either the
/// `[DONE]` marker or a chat completion chunk. A chunk may yield a thinking
/// delta, an answer delta, both, or nothing (role-only and usage trailers).
fn parse_event_block(block: &str) -> Result<Vec<StreamDelta>> {
    let mut data = String::new();
    for line in block.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.trim_start());
        }
    }
    if data.is_empty() {
        return Ok(Vec::new());
    }
    if data == "[DONE]" {
        return Ok(vec![StreamDelta::End]);
    }

    let chunk: ChatCompletionChunk = serde_json::from_str(&data)
        .map_err(|e| Error::serialization(format!("Failed to parse chunk JSON: {e}"), Some(Box::new(e))))?;

    let mut deltas = Vec::new();
    for choice in &chunk.choices {
        if let Some(thinking) = &choice.delta.reasoning_content
            && !thinking.is_empty()
        {
            deltas.push(StreamDelta::Thinking(thinking.clone()));
        }
        if let Some(content) = &choice.delta.content
            && !content.is_empty()
        {
            deltas.push(StreamDelta::Answer(content.clone()));
        }
        match choice.finish_reason.as_deref() {
            None | Some("") => {}
            Some("stop") => deltas.push(StreamDelta::End),
            Some(reason) => {
                return Err(Error::streaming(
                    format!("Generation stopped ({reason})"),
                    None,
                ));
            }
        }
    }
    Ok(deltas)
}
