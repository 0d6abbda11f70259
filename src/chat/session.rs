//! Core chat session management.
//!
//! The [`ChatSession`] owns the conversation state for one session: the
//! history store, the resolved configuration, the pending-summarization
//! flag, and the deferred-command queue. It routes free text through the
//! stream coordinator, routes slash commands through the precedence gate,
//! and triggers summarization after completed exchanges.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::{from_reader, to_writer_pretty};
use time::OffsetDateTime;
use tokio::task::JoinHandle;

use crate::chat::commands::{ChatCommand, CommandClass, classify, help_text};
use crate::chat::config::{ChatConfig, LineEditMode, session_file_path};
use crate::client::Transport;
use crate::error::{Error, Result};
use crate::history::{HistoryStore, Turn};
use crate::render::Renderer;
use crate::stream::{CancelToken, StreamCoordinator, StreamPhase};
use crate::summarize;
use crate::types::{ChatRequest, WireMessage};

/// A chat session that manages conversation state and API interactions.
///
/// The session maintains bounded history, handles streaming responses, and
/// applies the command-over-stream precedence rules.
pub struct ChatSession {
    client: Arc<dyn Transport>,
    config: ChatConfig,
    store: Arc<Mutex<HistoryStore>>,
    stream_active: Arc<AtomicBool>,
    pending_summary: Arc<AtomicBool>,
    summary_task: Option<JoinHandle<Result<bool>>>,
    known_models: Option<Vec<String>>,
    queued: VecDeque<ChatCommand>,
    should_quit: bool,
}

impl ChatSession {
    /// Creates a new chat session with the given transport and configuration.
    pub fn new(client: Arc<dyn Transport>, config: ChatConfig) -> Self {
        Self {
            client,
            config,
            store: Arc::new(Mutex::new(HistoryStore::new())),
            stream_active: Arc::new(AtomicBool::new(false)),
            pending_summary: Arc::new(AtomicBool::new(false)),
            summary_task: None,
            known_models: None,
            queued: VecDeque::new(),
            should_quit: false,
        }
    }

    fn lock_store(&self) -> MutexGuard<'_, HistoryStore> {
        self.store
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Returns the resolved configuration.
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Returns the active model.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Returns the current line-editing mode.
    pub fn edit_mode(&self) -> LineEditMode {
        self.config.edit_mode
    }

    /// Returns true once `/quit` has been executed.
    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Returns true while a stream is being driven.
    pub fn stream_active(&self) -> bool {
        self.stream_active.load(Ordering::SeqCst)
    }

    /// Returns the number of turns in the conversation.
    pub fn turn_count(&self) -> usize {
        self.lock_store().len()
    }

    /// Returns the current system prompt, if any.
    pub fn system_prompt(&self) -> Option<&str> {
        self.config.system_prompt.as_deref()
    }

    /// Sets or clears the system prompt.
    pub fn set_system_prompt(&mut self, prompt: Option<String>) {
        self.config.system_prompt = prompt;
    }

    /// Sets the verbatim history limit.
    ///
    /// Fails with `InvalidArgument` for non-positive input. Does not
    /// retroactively summarize; the next completed exchange re-evaluates
    /// overflow against the new limit.
    pub fn set_history_limit(&mut self, limit: i64) -> Result<()> {
        if limit < 1 {
            return Err(Error::invalid_argument(
                "history limit must be a positive integer",
                Some("history_limit".to_string()),
            ));
        }
        self.config.history_limit = limit as usize;
        Ok(())
    }

    /// Returns the model listing, fetched lazily on first use and cached.
    pub async fn known_models(&mut self) -> Result<&[String]> {
        if self.known_models.is_none() {
            self.known_models = Some(self.client.list_models().await?);
        }
        Ok(self.known_models.as_deref().unwrap_or_default())
    }

    /// Refreshes the cached model listing.
    pub async fn refresh_models(&mut self) -> Result<&[String]> {
        self.known_models = Some(self.client.list_models().await?);
        Ok(self.known_models.as_deref().unwrap_or_default())
    }

    /// Switches the active model after validating the name against the
    /// model listing. Unknown names fail with `UnknownModel` and leave the
    /// active model unchanged.
    pub async fn set_model(&mut self, name: &str) -> Result<()> {
        let models = self.known_models().await?;
        if !models.iter().any(|m| m == name) {
            return Err(Error::unknown_model(name));
        }
        self.config.model = name.to_string();
        Ok(())
    }

    /// Clears the conversation history, summary included. The system prompt
    /// is session-level state and survives.
    pub fn clear_history(&mut self) {
        self.lock_store().clear();
    }

    /// Returns a copy of the stored turns for persistence.
    pub fn export_history(&self) -> Vec<Turn> {
        self.lock_store().export_history()
    }

    /// Replaces the conversation history with an imported sequence.
    pub fn import_history(&mut self, turns: Vec<Turn>) -> Result<()> {
        self.lock_store().import_history(turns)
    }

    /// Sends a user message and streams the response.
    ///
    /// This method:
    /// 1. Appends the user turn to history
    /// 2. Assembles the bounded request context
    /// 3. Drives the stream coordinator, rendering deltas as they arrive
    /// 4. Drains commands deferred while the stream was active
    /// 5. On a completed exchange, evaluates summarization and auto-saves
    ///
    /// A second concurrent stream is rejected with `StreamBusy` before any
    /// state changes. Mid-stream transport failures are surfaced to the
    /// renderer by the coordinator and leave the user turn in place for
    /// retry; they are not returned as errors here.
    pub async fn send_streaming(
        &mut self,
        user_input: &str,
        renderer: &mut dyn Renderer,
        cancel: CancelToken,
    ) -> Result<()> {
        if self.stream_active.swap(true, Ordering::SeqCst) {
            return Err(Error::stream_busy(
                "a response is already streaming; cancel it first",
            ));
        }

        let request = {
            let mut store = self.lock_store();
            if let Err(e) = store.append_user(user_input) {
                self.stream_active.store(false, Ordering::SeqCst);
                return Err(e);
            }
            let context = store.context_for_request(
                self.config.system_prompt.as_deref(),
                self.config.history_limit,
            );
            let messages: Vec<WireMessage> = context.iter().map(WireMessage::from).collect();
            ChatRequest::new_streaming(self.config.model.clone(), messages)
        };

        let outcome = StreamCoordinator::new(cancel)
            .run(self.client.as_ref(), request, &self.store, renderer)
            .await;
        self.stream_active.store(false, Ordering::SeqCst);

        self.drain_deferred(renderer).await;

        match outcome.phase {
            StreamPhase::Done => {
                self.auto_save(renderer);
                self.maybe_spawn_summarization();
                Ok(())
            }
            StreamPhase::Cancelled => {
                // An interrupted exchange: keep the partial turn, skip the
                // summarization evaluation until the next completed one.
                self.auto_save(renderer);
                Ok(())
            }
            // Errored: the coordinator surfaced the failure and committed
            // nothing; the user turn stays in history for retry.
            _ => Ok(()),
        }
    }

    /// Submits a command through the stream-precedence gate.
    ///
    /// While a stream is active: `/help` and parse errors execute
    /// immediately, destructive commands are rejected with `StreamBusy`,
    /// and everything else is queued until the stream reaches a terminal
    /// phase. With no stream active the command executes directly.
    pub async fn submit(
        &mut self,
        command: ChatCommand,
        renderer: &mut dyn Renderer,
    ) -> Result<()> {
        if self.stream_active() {
            match classify(&command) {
                CommandClass::Immediate => self.execute(command, renderer).await,
                CommandClass::Deferred => {
                    self.queued.push_back(command);
                    renderer.notice("Command queued until the current response completes.");
                    Ok(())
                }
                CommandClass::Destructive => Err(Error::stream_busy(
                    "retry after the response completes or cancel it first",
                )),
            }
        } else {
            self.execute(command, renderer).await
        }
    }

    /// Executes commands deferred while a stream was active, in submission
    /// order.
    async fn drain_deferred(&mut self, renderer: &mut dyn Renderer) {
        while let Some(command) = self.queued.pop_front() {
            if let Err(e) = self.execute(command, renderer).await {
                renderer.error(&e.to_string());
            }
        }
    }

    async fn execute(&mut self, command: ChatCommand, renderer: &mut dyn Renderer) -> Result<()> {
        match command {
            ChatCommand::Models => {
                let active = self.config.model.clone();
                let models = self.refresh_models().await?;
                for model in models {
                    if *model == active {
                        renderer.notice(&format!("* {model}"));
                    } else {
                        renderer.notice(&format!("  {model}"));
                    }
                }
            }
            ChatCommand::Model(name) => {
                self.set_model(&name).await?;
                renderer.notice(&format!("Model changed to: {name}"));
            }
            ChatCommand::ShowSystem => match self.system_prompt() {
                Some(prompt) => renderer.notice(&format!("System prompt: {prompt}")),
                None => renderer.notice("System prompt: (none)"),
            },
            ChatCommand::SetSystem(prompt) => {
                self.set_system_prompt(Some(prompt.clone()));
                renderer.notice(&format!("System prompt set to: {prompt}"));
            }
            ChatCommand::ClearSystem => {
                self.set_system_prompt(None);
                renderer.notice("System prompt cleared.");
            }
            ChatCommand::HistoryLimit(limit) => {
                self.set_history_limit(limit)?;
                renderer.notice(&format!("History limit set to {limit} exchange pairs."));
            }
            ChatCommand::ShowHistory => {
                let turns = self.export_history();
                if turns.is_empty() {
                    renderer.notice("Conversation history is empty.");
                } else {
                    renderer.notice("Conversation history:");
                    for turn in &turns {
                        if turn.partial {
                            renderer.notice(&format!("{} (partial): {}", turn.role, turn.content));
                        } else {
                            renderer.notice(&format!("{}: {}", turn.role, turn.content));
                        }
                    }
                }
            }
            ChatCommand::ClearHistory => {
                self.clear_history();
                renderer.notice("Conversation cleared.");
            }
            ChatCommand::EditMode(None) => {
                renderer.notice(&format!("Current editing mode: {}", self.config.edit_mode));
            }
            ChatCommand::EditMode(Some(mode)) => {
                self.config.edit_mode = mode;
                renderer.notice(&format!("Editing mode set to {mode}."));
            }
            ChatCommand::SaveSession(path) => {
                let path = path.map(std::path::PathBuf::from).unwrap_or_else(session_file_path);
                self.save_session_to(&path)?;
                renderer.notice(&format!("Session saved to {}", path.display()));
            }
            ChatCommand::LoadSession(path) => {
                let path = path.map(std::path::PathBuf::from).unwrap_or_else(session_file_path);
                self.load_session_from(&path)?;
                renderer.notice(&format!(
                    "Session loaded from {} ({} turns)",
                    path.display(),
                    self.turn_count()
                ));
            }
            ChatCommand::Help => {
                for line in help_text().lines() {
                    renderer.notice(line);
                }
            }
            ChatCommand::Quit => {
                if self.config.continue_last_session {
                    self.auto_save(renderer);
                }
                self.should_quit = true;
            }
            ChatCommand::Invalid(message) => {
                renderer.error(&message);
            }
        }
        Ok(())
    }

    /// Spawns a summarization task when the history is over threshold and
    /// none is pending. At most one summarization is in flight per session.
    fn maybe_spawn_summarization(&mut self) {
        let max_turns = self.config.history_limit;
        if !self.lock_store().needs_summarization(max_turns) {
            return;
        }
        if self.pending_summary.swap(true, Ordering::SeqCst) {
            return;
        }
        let client = Arc::clone(&self.client);
        let store = Arc::clone(&self.store);
        let pending = Arc::clone(&self.pending_summary);
        let model = self.config.summary_model_or_active().to_string();
        self.summary_task = Some(tokio::spawn(async move {
            let result = summarize::run(client.as_ref(), store.as_ref(), &model, max_turns).await;
            pending.store(false, Ordering::SeqCst);
            result
        }));
    }

    /// Reports a finished summarization task's failure, if any, without
    /// blocking on one that is still running.
    pub async fn reap_summary_task(&mut self, renderer: &mut dyn Renderer) {
        if self.summary_task.as_ref().is_none_or(|h| !h.is_finished()) {
            return;
        }
        if let Some(handle) = self.summary_task.take() {
            match handle.await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => renderer.notice(&format!(
                    "History summarization failed ({e}); will retry after the next exchange."
                )),
                Err(_) => renderer.notice("History summarization task failed unexpectedly."),
            }
        }
    }

    /// Waits for the outstanding summarization task, if any.
    ///
    /// Returns `Ok(true)` when a summary was applied.
    pub async fn wait_for_summary(&mut self) -> Result<bool> {
        match self.summary_task.take() {
            Some(handle) => handle
                .await
                .map_err(|e| Error::streaming(format!("summarization task panicked: {e}"), None))?,
            None => Ok(false),
        }
    }

    /// Saves the session to the specified path.
    pub fn save_session_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .map_err(|err| Error::io("failed to create session directory", err))?;
        }
        let session = SessionFile::new(self.config.system_prompt.clone(), self.export_history());
        let file =
            File::create(path).map_err(|err| Error::io("failed to create session file", err))?;
        let writer = BufWriter::new(file);
        to_writer_pretty(writer, &session)
            .map_err(|err| Error::serialization("failed to serialize session", Some(Box::new(err))))
    }

    /// Loads a session from disk, replacing the current conversation
    /// history and system prompt.
    pub fn load_session_from<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let file =
            File::open(path.as_ref()).map_err(|err| Error::io("failed to open session file", err))?;
        let reader = BufReader::new(file);
        let session: SessionFile = from_reader(reader)
            .map_err(|err| Error::serialization("failed to parse session file", Some(Box::new(err))))?;
        self.import_history(session.turns)?;
        if session.system_prompt.is_some() {
            self.config.system_prompt = session.system_prompt;
        }
        Ok(())
    }

    fn auto_save(&mut self, renderer: &mut dyn Renderer) {
        if !self.config.continue_last_session {
            return;
        }
        if let Err(e) = self.save_session_to(session_file_path()) {
            renderer.notice(&format!("Failed to save session: {e}"));
        }
    }
}

#[derive(Serialize, Deserialize)]
struct SessionFile {
    version: u8,
    #[serde(with = "time::serde::rfc3339")]
    saved_at: OffsetDateTime,
    system_prompt: Option<String>,
    turns: Vec<Turn>,
}

impl SessionFile {
    fn new(system_prompt: Option<String>, turns: Vec<Turn>) -> Self {
        Self {
            version: 1,
            saved_at: OffsetDateTime::now_utc(),
            system_prompt,
            turns,
        }
    }
}
