//! Error types for runtime API operations.

use thiserror::Error;

/// Result type alias for runtime API operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while talking to the container runtime.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The runtime socket could not be reached.
    #[error("failed to connect to container runtime at {socket}: {source}")]
    Connect {
        /// Socket path that was dialled.
        socket: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// HTTP protocol failure (handshake, request, body read).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The runtime answered with a non-success status.
    #[error("runtime returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the error body.
        message: String,
    },

    /// The addressed object does not exist (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// The object already exists or is in a conflicting state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A progress stream (pull, build) reported a failure in-band.
    #[error("stream reported error: {0}")]
    Stream(String),

    /// The operation was cancelled before completing.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Maps a non-success status and its body to an error.
    ///
    /// The runtime reports failures as `{"message": "..."}`; anything else
    /// is carried through verbatim.
    #[must_use]
    pub fn from_status(status: u16, body: &[u8]) -> Self {
        let message = serde_json::from_slice::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string());

        match status {
            404 => Self::NotFound(message),
            409 => Self::Conflict(message),
            _ => Self::Api { status, message },
        }
    }

    /// Returns true if this is a not found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if this is a conflict error.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns true if the operation was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}
