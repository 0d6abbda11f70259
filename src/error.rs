//! Error types for confab.
//!
//! This module defines the error type shared by the session engine and the
//! transport client. Session-level kinds (`InvalidTurn`, `ConcurrentMutation`,
//! `UnknownModel`, `InvalidArgument`, `StreamBusy`) surface to the user as
//! notices; transport-level kinds are grouped by [`Error::is_transport_failure`].

use std::error;
use std::fmt;
use std::io;
use std::str::Utf8Error;
use std::sync::Arc;

/// The main error type for confab.
#[derive(Clone, Debug)]
pub enum Error {
    /// A turn was rejected by the history store.
    InvalidTurn {
        /// Human-readable error message.
        message: String,
    },

    /// The history store changed since the snapshot backing this operation.
    ConcurrentMutation {
        /// Human-readable error message.
        message: String,
    },

    /// A model name that the endpoint does not serve.
    UnknownModel {
        /// The rejected model name.
        model: String,
    },

    /// A command argument failed validation.
    InvalidArgument {
        /// Human-readable error message.
        message: String,
        /// Parameter that caused the error.
        param: Option<String>,
    },

    /// An operation conflicted with an in-flight stream.
    StreamBusy {
        /// Human-readable error message.
        message: String,
    },

    /// A generic API error occurred.
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Error type string from the API.
        error_type: Option<String>,
        /// Human-readable error message.
        message: String,
    },

    /// Authentication error.
    Authentication {
        /// Human-readable error message.
        message: String,
    },

    /// Rate limit exceeded.
    RateLimit {
        /// Human-readable error message.
        message: String,
        /// Time to wait before retrying, in seconds.
        retry_after: Option<u64>,
    },

    /// API timeout error.
    Timeout {
        /// Human-readable error message.
        message: String,
        /// Duration of the timeout in seconds.
        duration: Option<f64>,
    },

    /// Connection error.
    Connection {
        /// Human-readable error message.
        message: String,
        /// Underlying cause.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// HTTP client error.
    HttpClient {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// A streaming error occurred.
    Streaming {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// Error during JSON or YAML serialization or deserialization.
    Serialization {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// Encoding/decoding error.
    Encoding {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// I/O error.
    Io {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Arc<io::Error>,
    },

    /// A URL parsing or manipulation error.
    Url {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<url::ParseError>,
    },
}

impl Error {
    /// Creates a new invalid turn error.
    pub fn invalid_turn(message: impl Into<String>) -> Self {
        Error::InvalidTurn {
            message: message.into(),
        }
    }

    /// Creates a new concurrent mutation error.
    pub fn concurrent_mutation(message: impl Into<String>) -> Self {
        Error::ConcurrentMutation {
            message: message.into(),
        }
    }

    /// Creates a new unknown model error.
    pub fn unknown_model(model: impl Into<String>) -> Self {
        Error::UnknownModel {
            model: model.into(),
        }
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(message: impl Into<String>, param: Option<String>) -> Self {
        Error::InvalidArgument {
            message: message.into(),
            param,
        }
    }

    /// Creates a new stream busy error.
    pub fn stream_busy(message: impl Into<String>) -> Self {
        Error::StreamBusy {
            message: message.into(),
        }
    }

    /// Creates a new API error.
    pub fn api(status_code: u16, error_type: Option<String>, message: String) -> Self {
        Error::Api {
            status_code,
            error_type,
            message,
        }
    }

    /// Creates a new authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Error::Authentication {
            message: message.into(),
        }
    }

    /// Creates a new rate limit error.
    pub fn rate_limit(message: impl Into<String>, retry_after: Option<u64>) -> Self {
        Error::RateLimit {
            message: message.into(),
            retry_after,
        }
    }

    /// Creates a new timeout error.
    pub fn timeout(message: impl Into<String>, duration: Option<f64>) -> Self {
        Error::Timeout {
            message: message.into(),
            duration,
        }
    }

    /// Creates a new connection error.
    pub fn connection(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Connection {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new HTTP client error.
    pub fn http_client(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::HttpClient {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new streaming error.
    pub fn streaming(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Streaming {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new serialization error.
    pub fn serialization(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Serialization {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new encoding error.
    pub fn encoding(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Encoding {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new I/O error.
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            message: message.into(),
            source: Arc::new(source),
        }
    }

    /// Creates a new URL error.
    pub fn url(message: impl Into<String>, source: Option<url::ParseError>) -> Self {
        Error::Url {
            message: message.into(),
            source,
        }
    }

    /// Returns true if this error is an invalid turn error.
    pub fn is_invalid_turn(&self) -> bool {
        matches!(self, Error::InvalidTurn { .. })
    }

    /// Returns true if this error is a concurrent mutation error.
    pub fn is_concurrent_mutation(&self) -> bool {
        matches!(self, Error::ConcurrentMutation { .. })
    }

    /// Returns true if this error is an unknown model error.
    pub fn is_unknown_model(&self) -> bool {
        matches!(self, Error::UnknownModel { .. })
    }

    /// Returns true if this error is an invalid argument error.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidArgument { .. })
    }

    /// Returns true if this error is a stream busy error.
    pub fn is_stream_busy(&self) -> bool {
        matches!(self, Error::StreamBusy { .. })
    }

    /// Returns true if this error originated in the transport layer.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            Error::Api { .. }
                | Error::Authentication { .. }
                | Error::RateLimit { .. }
                | Error::Timeout { .. }
                | Error::Connection { .. }
                | Error::HttpClient { .. }
                | Error::Streaming { .. }
                | Error::Encoding { .. }
        )
    }

    /// Returns the status code associated with this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Api { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidTurn { message } => {
                write!(f, "Invalid turn: {message}")
            }
            Error::ConcurrentMutation { message } => {
                write!(f, "Concurrent mutation: {message}")
            }
            Error::UnknownModel { model } => {
                write!(f, "Unknown model: {model}")
            }
            Error::InvalidArgument { message, param } => {
                if let Some(param) = param {
                    write!(f, "Invalid argument: {message} (parameter: {param})")
                } else {
                    write!(f, "Invalid argument: {message}")
                }
            }
            Error::StreamBusy { message } => {
                write!(f, "Stream in progress: {message}")
            }
            Error::Api {
                message,
                error_type,
                ..
            } => {
                if let Some(error_type) = error_type {
                    write!(f, "{error_type}: {message}")
                } else {
                    write!(f, "API error: {message}")
                }
            }
            Error::Authentication { message } => {
                write!(f, "Authentication error: {message}")
            }
            Error::RateLimit {
                message,
                retry_after,
            } => {
                if let Some(retry_after) = retry_after {
                    write!(
                        f,
                        "Rate limit exceeded: {message} (retry after {retry_after} seconds)"
                    )
                } else {
                    write!(f, "Rate limit exceeded: {message}")
                }
            }
            Error::Timeout { message, duration } => {
                if let Some(duration) = duration {
                    write!(f, "Timeout error: {message} ({duration} seconds)")
                } else {
                    write!(f, "Timeout error: {message}")
                }
            }
            Error::Connection { message, .. } => {
                write!(f, "Connection error: {message}")
            }
            Error::HttpClient { message, .. } => {
                write!(f, "HTTP client error: {message}")
            }
            Error::Streaming { message, .. } => {
                write!(f, "Streaming error: {message}")
            }
            Error::Serialization { message, .. } => {
                write!(f, "Serialization error: {message}")
            }
            Error::Encoding { message, .. } => {
                write!(f, "Encoding error: {message}")
            }
            Error::Io { message, .. } => {
                write!(f, "I/O error: {message}")
            }
            Error::Url { message, .. } => {
                write!(f, "URL error: {message}")
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Connection { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            Error::HttpClient { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            Error::Streaming { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            Error::Serialization { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            Error::Encoding { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            Error::Io { source, .. } => Some(source),
            Error::Url { source, .. } => {
                source.as_ref().map(|e| e as &(dyn error::Error + 'static))
            }
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::io(err.to_string(), err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization(format!("JSON error: {err}"), Some(Box::new(err)))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::serialization(format!("YAML error: {err}"), Some(Box::new(err)))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::url(format!("URL parse error: {err}"), Some(err))
    }
}

impl From<Utf8Error> for Error {
    fn from(err: Utf8Error) -> Self {
        Error::encoding(format!("UTF-8 error: {err}"), Some(Box::new(err)))
    }
}

/// A specialized Result type for confab operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_kinds_are_not_transport_failures() {
        assert!(!Error::invalid_turn("x").is_transport_failure());
        assert!(!Error::concurrent_mutation("x").is_transport_failure());
        assert!(!Error::unknown_model("m").is_transport_failure());
        assert!(!Error::invalid_argument("x", None).is_transport_failure());
        assert!(!Error::stream_busy("x").is_transport_failure());
    }

    #[test]
    fn transport_kinds_are_grouped() {
        assert!(Error::api(500, None, "boom".to_string()).is_transport_failure());
        assert!(Error::connection("refused", None).is_transport_failure());
        assert!(Error::timeout("slow", Some(60.0)).is_transport_failure());
        assert!(Error::streaming("cut", None).is_transport_failure());
    }

    #[test]
    fn display_includes_param() {
        let err = Error::invalid_argument("must be positive", Some("history_limit".to_string()));
        assert!(err.to_string().contains("history_limit"));
    }

    #[test]
    fn unknown_model_displays_name() {
        let err = Error::unknown_model("gpt-nonexistent");
        assert_eq!(err.to_string(), "Unknown model: gpt-nonexistent");
    }
}
