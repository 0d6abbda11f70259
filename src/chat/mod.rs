//! Chat application module for interactive conversations.
//!
//! This module provides a streaming REPL chat interface built on top of the
//! confab client library. It supports:
//!
//! - Streaming responses with real-time token display
//! - ANSI-styled output for thinking text
//! - Slash commands for session control, with precedence rules over an
//!   active stream
//! - Bounded history with transparent summarization of older turns
//!
//! # Architecture
//!
//! The module is organized into several components:
//!
//! - [`config`]: CLI argument parsing, config-file loading, and paths
//! - [`session`]: Core chat session management and API interaction
//! - [`commands`]: Slash command parsing, classification, and handling

mod commands;
mod config;
mod session;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{ChatCommand, CommandClass, classify, help_text, parse_command};
pub use config::{
    ChatArgs, ChatConfig, FileConfig, LineEditMode, config_file_path, session_file_path,
};
pub use session::ChatSession;
