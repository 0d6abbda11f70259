//! Interactive chat for OpenAI-compatible endpoints.
//!
//! This binary provides a streaming REPL that talks to any endpoint
//! exposing an OpenAI-compatible chat completion API (llama.cpp, vLLM,
//! Ollama, the hosted providers).
//!
//! # Usage
//!
//! ```bash
//! # Basic usage with the config file from ~/.config/confab/config.yaml
//! confab
//!
//! # Point at a local endpoint and model
//! confab --base-url http://localhost:11434/v1/ --model qwen3-30b
//!
//! # Set a system prompt
//! confab --system "You are a helpful coding assistant"
//!
//! # Disable colors (useful for piping output)
//! confab --no-color
//! ```
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/models` - List models the endpoint serves
//! - `/model <name>` - Switch the active model
//! - `/system [prompt]` - Show or set the system prompt
//! - `/history_limit <n>` - Bound the verbatim history window
//! - `/quit` - Exit the application
//!
//! Ctrl+C interrupts a streaming response; the partial answer is kept in
//! history. Ctrl+D exits.

use std::sync::Arc;

use arrrg::CommandLine;
use rustyline::Editor;
use rustyline::config::{Config as LineConfig, EditMode};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;

use confab::chat::{
    ChatArgs, ChatConfig, ChatSession, LineEditMode, PlainTextRenderer, parse_command,
    session_file_path,
};
use confab::{CancelToken, ChatClient, Renderer};

fn build_editor(mode: LineEditMode) -> rustyline::Result<Editor<(), DefaultHistory>> {
    let edit_mode = match mode {
        LineEditMode::Emacs => EditMode::Emacs,
        LineEditMode::Vi => EditMode::Vi,
    };
    let config = LineConfig::builder().edit_mode(edit_mode).build();
    Editor::with_config(config)
}

/// Main entry point for the confab application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("confab [OPTIONS]");
    let config = ChatConfig::resolve(args)?;
    let use_color = config.use_color;

    let client = ChatClient::with_options(
        config.base_url.clone(),
        config.api_key.clone(),
        Some(std::time::Duration::from_secs(config.timeout_secs)),
    )?;
    let mut session = ChatSession::new(Arc::new(client), config);
    let mut renderer = PlainTextRenderer::with_color(use_color);

    // Flag for interrupt handling during streaming
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        handler_token.cancel();
    })?;

    if session.config().continue_last_session {
        let path = session_file_path();
        if path.exists() {
            match session.load_session_from(&path) {
                Ok(()) => println!("Restored previous session ({} turns)", session.turn_count()),
                Err(err) => eprintln!("Could not restore previous session: {err}"),
            }
        }
    }

    println!("confab (model: {})", session.model());
    println!("Type /help for commands, /quit to exit\n");

    let mut edit_mode = session.edit_mode();
    let mut rl = build_editor(edit_mode)?;

    loop {
        session.reap_summary_task(&mut renderer).await;

        if session.edit_mode() != edit_mode {
            edit_mode = session.edit_mode();
            rl = build_editor(edit_mode)?;
        }

        // Reset interrupt flag before each input
        cancel.reset();

        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                // Check for slash commands
                if let Some(cmd) = parse_command(line) {
                    if let Err(e) = session.submit(cmd, &mut renderer).await {
                        renderer.error(&e.to_string());
                    }
                    if session.should_quit() {
                        println!("Goodbye!");
                        break;
                    }
                    continue;
                }

                // Regular message - send to the endpoint
                println!("Assistant:");
                if let Err(e) = session
                    .send_streaming(line, &mut renderer, cancel.clone())
                    .await
                {
                    renderer.error(&e.to_string());
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at the prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                if session.config().continue_last_session
                    && let Err(err) = session.save_session_to(session_file_path())
                {
                    eprintln!("Failed to save session: {err}");
                }
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.error(&format!("Input error: {err}"));
                break;
            }
        }
    }

    Ok(())
}
