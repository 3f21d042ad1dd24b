//! Error types for fixture orchestration.
//!
//! The variants follow the phase an error belongs to: setup errors abort a
//! scenario before any step runs, step errors fail the current step and
//! carry the command's logs, teardown errors are only ever logged.

use std::time::Duration;
use ta_engine::EngineError;
use thiserror::Error;

/// Result type alias for fixture operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Errors that can occur while orchestrating fixtures.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Sandbox, network, image or registry setup failed.
    #[error("provisioning {stage} failed: {message}")]
    Provision {
        /// Setup stage that failed.
        stage: &'static str,
        /// Failure description.
        message: String,
    },

    /// Certificate generation or persistence failed.
    #[error("certificate generation failed: {0}")]
    CertGen(String),

    /// The command container exited non-zero.
    #[error("command exited with status {exit_code}, logs:\n{logs}")]
    CommandFailed {
        /// Exit status of the container.
        exit_code: i64,
        /// Combined stdout and stderr.
        logs: String,
    },

    /// The command container did not finish in time.
    #[error("command did not finish within {after:?}, logs:\n{logs}")]
    Timeout {
        /// Bound that was exceeded.
        after: Duration,
        /// Output captured before the container was removed.
        logs: String,
    },

    /// Waiting on the container failed at the runtime level.
    #[error("waiting for container failed: {0}")]
    Wait(String),

    /// One or more cleanup steps failed.
    #[error("teardown incomplete: {0}")]
    Teardown(String),

    /// A scenario assertion did not hold.
    #[error("{0}")]
    Assertion(String),

    /// Runtime API error.
    #[error("container runtime error: {0}")]
    Engine(#[from] EngineError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// Creates a provisioning error for a setup stage.
    #[must_use]
    pub fn provision(stage: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Provision {
            stage,
            message: err.to_string(),
        }
    }

    /// Creates an assertion error.
    #[must_use]
    pub fn assertion(msg: impl Into<String>) -> Self {
        Self::Assertion(msg.into())
    }

    /// Returns true if the error happened before any step could run.
    #[must_use]
    pub const fn is_setup_fault(&self) -> bool {
        matches!(self, Self::Provision { .. } | Self::CertGen(_) | Self::Config(_))
    }

    /// Returns true if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns the captured container logs, if the error carries any.
    #[must_use]
    pub fn logs(&self) -> Option<&str> {
        match self {
            Self::CommandFailed { logs, .. } | Self::Timeout { logs, .. } => Some(logs),
            _ => None,
        }
    }
}
