//! Slash command parsing for the chat application.
//!
//! This module handles parsing of special commands that start with `/`,
//! allowing users to control the chat session without sending messages to
//! the API, and classifies each command for the precedence rule applied
//! while a stream is active: destructive commands are rejected, `/help`
//! runs immediately, and everything else queues until the stream reaches a
//! terminal phase.

use crate::chat::config::LineEditMode;

/// A parsed chat command.
///
/// These commands control the chat session and are not sent to the API.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// List the models the endpoint serves.
    Models,

    /// Switch the active model.
    Model(String),

    /// Show the current system prompt.
    ShowSystem,

    /// Set the system prompt.
    SetSystem(String),

    /// Clear the system prompt.
    ClearSystem,

    /// Set how many recent exchange pairs stay verbatim before
    /// summarization kicks in.
    HistoryLimit(i64),

    /// Print the conversation history.
    ShowHistory,

    /// Clear the conversation history.
    ClearHistory,

    /// Show or switch the line-editing mode.
    /// `None` shows the current mode.
    EditMode(Option<LineEditMode>),

    /// Save the session to a file (default path when `None`).
    SaveSession(Option<String>),

    /// Load a saved session (default path when `None`).
    LoadSession(Option<String>),

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// How a command interacts with an active stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandClass {
    /// Safe to execute while a stream is running.
    Immediate,
    /// Queued and executed once the stream reaches a terminal phase.
    Deferred,
    /// Rejected while a stream is running; retry after it completes or
    /// after an explicit cancel.
    Destructive,
}

/// Classifies a command for the stream-precedence rule.
pub fn classify(command: &ChatCommand) -> CommandClass {
    match command {
        ChatCommand::Help | ChatCommand::Invalid(_) => CommandClass::Immediate,
        ChatCommand::ClearHistory | ChatCommand::LoadSession(_) | ChatCommand::Quit => {
            CommandClass::Destructive
        }
        _ => CommandClass::Deferred,
    }
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it
/// should be treated as a regular message.
///
/// # Examples
///
/// ```
/// # use confab::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/model qwen3-30b").is_some());
/// assert!(parse_command("Hello there!").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();

    if !input.starts_with('/') {
        return None;
    }

    let mut parts = input[1..].splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "models" => ChatCommand::Models,
        "model" => match argument {
            Some(model) => ChatCommand::Model(model.to_string()),
            None => ChatCommand::Invalid("/model requires a model name".to_string()),
        },
        "system" => match argument {
            Some(arg) if arg.eq_ignore_ascii_case("clear") => ChatCommand::ClearSystem,
            Some(arg) => ChatCommand::SetSystem(arg.to_string()),
            None => ChatCommand::ShowSystem,
        },
        "history_limit" => match argument {
            Some(arg) => match arg.parse::<i64>() {
                Ok(value) => ChatCommand::HistoryLimit(value),
                Err(_) => {
                    ChatCommand::Invalid("/history_limit expects an integer".to_string())
                }
            },
            None => ChatCommand::Invalid("/history_limit requires a value".to_string()),
        },
        "show_history" => ChatCommand::ShowHistory,
        "clear_history" => ChatCommand::ClearHistory,
        "edit_mode" => match argument {
            Some(arg) => match arg.parse::<LineEditMode>() {
                Ok(mode) => ChatCommand::EditMode(Some(mode)),
                Err(_) => {
                    ChatCommand::Invalid("/edit_mode expects 'vi' or 'emacs'".to_string())
                }
            },
            None => ChatCommand::EditMode(None),
        },
        "save" => ChatCommand::SaveSession(argument.map(|s| s.to_string())),
        "load" => ChatCommand::LoadSession(argument.map(|s| s.to_string())),
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("Unknown command: /{}", command)),
    };

    Some(result)
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /models                List models the endpoint serves (* = active)
  /model <name>          Switch the active model
  /system [prompt]       Show or set the system prompt (use 'clear' to unset)
  /history_limit <n>     Exchange pairs kept verbatim before summarization
  /show_history          Print the conversation history
  /clear_history         Clear the conversation history
  /edit_mode [vi|emacs]  Show or switch the line-editing mode
  /save [file]           Save the session (defaults to the data directory)
  /load [file]           Load a saved session
  /help                  Show this help message
  /quit                  Exit the chat"#
}
