//! Output rendering for streamed chat responses.
//!
//! This module provides the renderer trait the session engine emits display
//! events through, plus a plain-text implementation that styles thinking
//! output with ANSI escapes and degrades to bracketed markers when colors
//! are disabled.

use std::io::{self, Stdout, Write};

/// ANSI escape code for dim text (used for thinking output).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for italic text (used for thinking output).
const ANSI_ITALIC: &str = "\x1b[3m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// Trait for rendering streaming output.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
/// - Capturing renderers in tests
pub trait Renderer: Send {
    /// Print a chunk of thinking text.
    ///
    /// Thinking output is displayed differently (dim/italic) to distinguish
    /// it from the final answer.
    fn append_thinking(&mut self, text: &str);

    /// Print a chunk of answer text.
    ///
    /// This is called incrementally as tokens are streamed from the API.
    fn append_answer(&mut self, text: &str);

    /// Called when a response is complete.
    ///
    /// Used to ensure proper newlines and cleanup after streaming.
    fn turn_complete(&mut self);

    /// Print an informational message.
    fn notice(&mut self, text: &str);

    /// Print an error message.
    fn error(&mut self, text: &str);

    /// Called when the stream is interrupted by the user.
    fn interrupted(&mut self) {
        self.notice("[interrupted]");
    }
}

/// Plain text renderer with optional ANSI styling.
///
/// Outputs text directly to stdout with optional ANSI escape codes for
/// styling thinking output.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
    in_thinking: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
            in_thinking: false,
        }
    }

    /// Flushes stdout to ensure immediate display of streamed content.
    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    fn reset_thinking(&mut self) {
        if self.in_thinking {
            if self.use_color {
                print!("{ANSI_RESET}");
            } else {
                println!();
            }
            self.in_thinking = false;
        }
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn append_thinking(&mut self, text: &str) {
        if !self.in_thinking {
            if self.use_color {
                print!("{ANSI_DIM}{ANSI_ITALIC}");
            } else {
                print!("[thinking] ");
            }
            self.in_thinking = true;
        }
        print!("{text}");
        self.flush();
    }

    fn append_answer(&mut self, text: &str) {
        self.reset_thinking();
        print!("{text}");
        self.flush();
    }

    fn turn_complete(&mut self) {
        self.reset_thinking();
        println!();
        self.flush();
    }

    fn notice(&mut self, text: &str) {
        self.reset_thinking();
        println!("{text}");
        self.flush();
    }

    fn error(&mut self, text: &str) {
        self.reset_thinking();
        eprintln!("\nError: {text}");
    }

    fn interrupted(&mut self) {
        self.reset_thinking();
        println!("\n[interrupted]");
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renderer_default_has_color() {
        let renderer = PlainTextRenderer::new();
        assert!(renderer.use_color);
    }

    #[test]
    fn renderer_without_color() {
        let renderer = PlainTextRenderer::with_color(false);
        assert!(!renderer.use_color);
    }
}
