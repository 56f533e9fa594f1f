//! Error Types
//!
//! Failures that can leave the engine's collaborators. Everything here is
//! recoverable from the controller's point of view: no variant is allowed to
//! take down the presentation loop.
//!
//! Unknown directive ids are deliberately absent. Dropping them is a defined
//! degradation handled by [`crate::catalog::AssetCatalog::resolve`], not a
//! fault.

use std::path::PathBuf;

use thiserror::Error;

use crate::messages::ConversationState;

/// Failures reported by a chat backend or the stream adapter
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Timeout, connection reset, rate limiting or a 5xx from the server.
    /// Retried by the adapter until its attempt budget runs out.
    #[error("transient backend failure: {0}")]
    Transient(String),

    /// Credential rejected (401/403)
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Malformed request, unknown model, or blocked prompt
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Every retry hit a transient failure
    #[error("backend unavailable after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made, including the first
        attempts: u32,
        /// The last transient failure seen
        last: String,
    },

    /// The connection broke after text had already been delivered.
    /// Not retried: a new attempt would replay text that is already on screen.
    #[error("stream interrupted mid-response: {0}")]
    Interrupted(String),
}

impl BackendError {
    /// Whether the adapter may retry this failure
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Whether this is an authentication or invalid-request failure
    #[must_use]
    pub fn is_fatal_request(&self) -> bool {
        matches!(self, Self::Authentication(_) | Self::InvalidRequest(_))
    }

    /// Classify an HTTP error status
    #[must_use]
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = format!("HTTP {status}: {}", body.trim());
        match status {
            401 | 403 => Self::Authentication(detail),
            408 | 429 | 500..=599 => Self::Transient(detail),
            _ => Self::InvalidRequest(detail),
        }
    }

    /// Classify a transport-level reqwest failure
    #[must_use]
    pub fn from_transport(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Transient(format!("request timed out: {error}"))
        } else if error.is_connect() || error.is_request() || error.is_body() {
            Self::Transient(format!("connection failed: {error}"))
        } else if let Some(status) = error.status() {
            Self::from_status(status.as_u16(), &error.to_string())
        } else {
            Self::Transient(error.to_string())
        }
    }
}

/// History store failures
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Could not write or flush the history file
    #[error("failed to write history at {path}: {source}")]
    Write {
        /// History file path
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Could not read the history file
    #[error("failed to read history at {path}: {source}")]
    Read {
        /// History file path
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// A record in the history file is not valid JSON
    #[error("corrupt history record at {path}:{line}: {source}")]
    Corrupt {
        /// History file path
        path: PathBuf,
        /// 1-based line number of the bad record
        line: usize,
        /// Parse error
        source: serde_json::Error,
    },

    /// Record could not be serialized
    #[error("failed to encode history record: {0}")]
    Encode(#[from] serde_json::Error),

    /// Store refused the write (used by non-file stores)
    #[error("history store unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned by the controller's input handlers
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ControllerError {
    /// The verb is not accepted in the current state
    #[error("{verb} rejected while {state:?}")]
    InputRejected {
        /// The refused verb
        verb: &'static str,
        /// State at the time of the call
        state: ConversationState,
    },

    /// Submitted text was empty after cleanup
    #[error("nothing to send")]
    EmptyInput,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            BackendError::from_status(401, "bad key"),
            BackendError::Authentication(_)
        ));
        assert!(matches!(
            BackendError::from_status(403, ""),
            BackendError::Authentication(_)
        ));
        assert!(BackendError::from_status(429, "slow down").is_transient());
        assert!(BackendError::from_status(503, "").is_transient());
        assert!(BackendError::from_status(400, "bad").is_fatal_request());
        assert!(BackendError::from_status(404, "no model").is_fatal_request());
    }

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(BackendError::Transient("reset".into()).is_transient());
        assert!(!BackendError::Interrupted("reset".into()).is_transient());
        assert!(!BackendError::RetriesExhausted {
            attempts: 3,
            last: "reset".into()
        }
        .is_transient());
        assert!(!BackendError::Authentication("nope".into()).is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = BackendError::RetriesExhausted {
            attempts: 3,
            last: "timeout".into(),
        };
        assert_eq!(
            err.to_string(),
            "backend unavailable after 3 attempts: timeout"
        );

        let err = ControllerError::InputRejected {
            verb: "submit",
            state: ConversationState::Revealing,
        };
        assert_eq!(err.to_string(), "submit rejected while Revealing");
    }
}
