//! Configuration for the chat application.
//!
//! Configuration is resolved in three layers: built-in defaults, a YAML
//! config file from the XDG config directory, and command-line arguments
//! parsed via `arrrg`. Later layers win. The session file location follows
//! the XDG data directory the same way.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use arrrg_derive::CommandLine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default endpoint when neither config file nor arguments name one.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/v1/";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default number of exchange pairs kept verbatim before summarization.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Default transport timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Line-editing mode for the terminal prompt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEditMode {
    /// Emacs-style key bindings (the default).
    #[default]
    Emacs,
    /// Vi-style modal editing.
    Vi,
}

impl fmt::Display for LineEditMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineEditMode::Emacs => write!(f, "emacs"),
            LineEditMode::Vi => write!(f, "vi"),
        }
    }
}

impl FromStr for LineEditMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "emacs" => Ok(LineEditMode::Emacs),
            "vi" | "vim" => Ok(LineEditMode::Vi),
            _ => Err(Error::invalid_argument(
                "edit mode must be 'vi' or 'emacs'",
                Some("edit_mode".to_string()),
            )),
        }
    }
}

/// Command-line arguments for the confab binary.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Path to the configuration file.
    #[arrrg(optional, "Path to the configuration file", "PATH")]
    pub config: Option<String>,

    /// Base URL of the endpoint.
    #[arrrg(optional, "Base URL of the OpenAI-compatible endpoint", "URL")]
    pub base_url: Option<String>,

    /// Model to use for chat.
    #[arrrg(optional, "Model to use", "MODEL")]
    pub model: Option<String>,

    /// Model used for history summarization.
    #[arrrg(optional, "Model for history summarization", "MODEL")]
    pub summary_model: Option<String>,

    /// System prompt to set context for the conversation.
    #[arrrg(optional, "System prompt for the conversation", "PROMPT")]
    pub system: Option<String>,

    /// Exchange pairs kept verbatim before summarization.
    #[arrrg(optional, "Exchange pairs kept verbatim (default: 20)", "N")]
    pub history_limit: Option<u32>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,

    /// Start with a fresh conversation instead of restoring the saved one.
    #[arrrg(flag, "Start fresh instead of restoring the saved session")]
    pub fresh: bool,
}

/// Config-file contents. Every field is optional; absent fields fall back
/// to the defaults.
#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct FileConfig {
    /// Base URL of the endpoint.
    pub base_url: Option<String>,
    /// API key sent as a bearer token.
    pub api_key: Option<String>,
    /// Model identifier.
    pub model: Option<String>,
    /// Model used for summarization.
    pub summary_model: Option<String>,
    /// System prompt.
    pub system_prompt: Option<String>,
    /// Exchange pairs kept verbatim.
    pub history_limit: Option<u32>,
    /// Transport timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Line-editing mode.
    pub edit_mode: Option<LineEditMode>,
    /// Whether to restore the saved session on startup.
    pub continue_last_session: Option<bool>,
}

impl FileConfig {
    /// Loads a config file from the given path.
    pub fn load(path: &Path) -> Result<FileConfig> {
        let raw = fs::read_to_string(path).map_err(|err| {
            Error::io(format!("failed to read config file {}", path.display()), err)
        })?;
        let config = serde_yaml::from_str(&raw)?;
        Ok(config)
    }
}

/// Resolved configuration for a chat session.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Base URL of the OpenAI-compatible endpoint.
    pub base_url: String,

    /// Optional API key sent as a bearer token.
    pub api_key: Option<String>,

    /// The active model, mutable at runtime via `/model`.
    pub model: String,

    /// Model used for summarization; the active model when unset.
    pub summary_model: Option<String>,

    /// Optional system prompt to set conversation context.
    pub system_prompt: Option<String>,

    /// Number of recent exchange pairs kept verbatim before summarization.
    pub history_limit: usize,

    /// Transport timeout in seconds.
    pub timeout_secs: u64,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// Line-editing mode for the prompt.
    pub edit_mode: LineEditMode,

    /// Whether to restore the saved session on startup and save on exit.
    pub continue_last_session: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            summary_model: None,
            system_prompt: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            use_color: true,
            edit_mode: LineEditMode::Emacs,
            continue_last_session: true,
        }
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the summarization model.
    pub fn with_summary_model(mut self, model: impl Into<String>) -> Self {
        self.summary_model = Some(model.into());
        self
    }

    /// Sets the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Sets the verbatim history limit.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// The model summarization requests should use.
    pub fn summary_model_or_active(&self) -> &str {
        self.summary_model.as_deref().unwrap_or(&self.model)
    }

    /// Applies a config file over this configuration.
    fn apply_file(&mut self, file: FileConfig) {
        if let Some(base_url) = file.base_url {
            self.base_url = base_url;
        }
        if let Some(api_key) = file.api_key {
            self.api_key = Some(api_key);
        }
        if let Some(model) = file.model {
            self.model = model;
        }
        if let Some(summary_model) = file.summary_model {
            self.summary_model = Some(summary_model);
        }
        if let Some(system_prompt) = file.system_prompt {
            self.system_prompt = Some(system_prompt);
        }
        if let Some(history_limit) = file.history_limit {
            self.history_limit = history_limit as usize;
        }
        if let Some(timeout_secs) = file.timeout_secs {
            self.timeout_secs = timeout_secs;
        }
        if let Some(edit_mode) = file.edit_mode {
            self.edit_mode = edit_mode;
        }
        if let Some(continue_last_session) = file.continue_last_session {
            self.continue_last_session = continue_last_session;
        }
    }

    /// Applies command-line arguments over this configuration.
    fn apply_args(&mut self, args: ChatArgs) {
        if let Some(base_url) = args.base_url {
            self.base_url = base_url;
        }
        if let Some(model) = args.model {
            self.model = model;
        }
        if let Some(summary_model) = args.summary_model {
            self.summary_model = Some(summary_model);
        }
        if let Some(system) = args.system {
            self.system_prompt = Some(system);
        }
        if let Some(history_limit) = args.history_limit {
            self.history_limit = history_limit as usize;
        }
        if args.no_color {
            self.use_color = false;
        }
        if args.fresh {
            self.continue_last_session = false;
        }
    }

    /// Resolves the full configuration: defaults, then the config file
    /// (`--config` path, or the default location if it exists), then
    /// command-line arguments.
    pub fn resolve(args: ChatArgs) -> Result<ChatConfig> {
        let mut config = ChatConfig::new();
        match &args.config {
            Some(path) => {
                config.apply_file(FileConfig::load(Path::new(path))?);
            }
            None => {
                let path = config_file_path();
                if path.exists() {
                    config.apply_file(FileConfig::load(&path)?);
                }
            }
        }
        config.apply_args(args);
        if config.history_limit == 0 {
            return Err(Error::invalid_argument(
                "history limit must be a positive integer",
                Some("history_limit".to_string()),
            ));
        }
        Ok(config)
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn xdg_dir(env_var: &str, fallback: &[&str]) -> PathBuf {
    if let Ok(dir) = env::var(env_var)
        && !dir.is_empty()
    {
        return PathBuf::from(dir);
    }
    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let mut path = PathBuf::from(home);
    for part in fallback {
        path.push(part);
    }
    path
}

/// Default config file location: `$XDG_CONFIG_HOME/confab/config.yaml`.
pub fn config_file_path() -> PathBuf {
    xdg_dir("XDG_CONFIG_HOME", &[".config"])
        .join("confab")
        .join("config.yaml")
}

/// Default session file location: `$XDG_DATA_HOME/confab/session.json`.
pub fn session_file_path() -> PathBuf {
    xdg_dir("XDG_DATA_HOME", &[".local", "share"])
        .join("confab")
        .join("session.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ChatConfig::new();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert!(config.api_key.is_none());
        assert!(config.summary_model.is_none());
        assert!(config.system_prompt.is_none());
        assert_eq!(config.history_limit, DEFAULT_HISTORY_LIMIT);
        assert_eq!(config.timeout_secs, 60);
        assert!(config.use_color);
        assert_eq!(config.edit_mode, LineEditMode::Emacs);
        assert!(config.continue_last_session);
    }

    #[test]
    fn summary_model_falls_back_to_active() {
        let config = ChatConfig::new().with_model("big-model");
        assert_eq!(config.summary_model_or_active(), "big-model");
        let config = config.with_summary_model("small-model");
        assert_eq!(config.summary_model_or_active(), "small-model");
    }

    #[test]
    fn file_config_parses_yaml() {
        let raw = r#"
base_url: "http://localhost:11434/v1/"
model: qwen3-30b
summary_model: qwen3-4b
history_limit: 8
edit_mode: vi
continue_last_session: false
"#;
        let file: FileConfig = serde_yaml::from_str(raw).unwrap();
        assert_eq!(file.base_url.as_deref(), Some("http://localhost:11434/v1/"));
        assert_eq!(file.model.as_deref(), Some("qwen3-30b"));
        assert_eq!(file.summary_model.as_deref(), Some("qwen3-4b"));
        assert_eq!(file.history_limit, Some(8));
        assert_eq!(file.edit_mode, Some(LineEditMode::Vi));
        assert_eq!(file.continue_last_session, Some(false));
        assert!(file.api_key.is_none());
    }

    #[test]
    fn args_override_file() {
        let mut config = ChatConfig::new();
        config.apply_file(FileConfig {
            model: Some("from-file".to_string()),
            history_limit: Some(4),
            ..FileConfig::default()
        });
        config.apply_args(ChatArgs {
            model: Some("from-args".to_string()),
            no_color: true,
            fresh: true,
            ..ChatArgs::default()
        });
        assert_eq!(config.model, "from-args");
        assert_eq!(config.history_limit, 4);
        assert!(!config.use_color);
        assert!(!config.continue_last_session);
    }

    #[test]
    fn zero_history_limit_is_rejected() {
        let err = ChatConfig::resolve(ChatArgs {
            history_limit: Some(0),
            ..ChatArgs::default()
        })
        .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn edit_mode_from_str() {
        assert_eq!("vi".parse::<LineEditMode>().unwrap(), LineEditMode::Vi);
        assert_eq!("Emacs".parse::<LineEditMode>().unwrap(), LineEditMode::Emacs);
        assert!("nano".parse::<LineEditMode>().is_err());
    }

    #[test]
    fn xdg_paths_end_with_app_files() {
        assert!(config_file_path().ends_with("confab/config.yaml"));
        assert!(session_file_path().ends_with("confab/session.json"));
    }
}
