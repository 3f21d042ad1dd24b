//! Best-effort teardown policy.
//!
//! Teardown runs after a scenario's verdict is already known. Every step is
//! attempted regardless of earlier failures; failures are logged and
//! recorded, never propagated on their own, so a cleanup problem cannot hide
//! the assertion failure that triggered it.

use std::fmt::Display;
use tracing::warn;

use crate::error::{HarnessError, Result};

/// Outcome of one cleanup step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownStep {
    /// Step description.
    pub step: String,
    /// Failure message, `None` when the step succeeded.
    pub failure: Option<String>,
}

/// Record of a teardown run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    steps: Vec<TeardownStep>,
}

impl TeardownReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the result of a cleanup step, logging a failure.
    ///
    /// Returns the success value so later steps can use it.
    pub fn attempt<T, E: Display>(
        &mut self,
        step: impl Into<String>,
        result: std::result::Result<T, E>,
    ) -> Option<T> {
        let step = step.into();
        match result {
            Ok(value) => {
                self.steps.push(TeardownStep {
                    step,
                    failure: None,
                });
                Some(value)
            }
            Err(e) => {
                warn!(step = %step, error = %e, "teardown step failed");
                self.steps.push(TeardownStep {
                    step,
                    failure: Some(e.to_string()),
                });
                None
            }
        }
    }

    /// Appends the steps of another report.
    pub fn absorb(&mut self, other: Self) {
        self.steps.extend(other.steps);
    }

    /// Returns every recorded step.
    #[must_use]
    pub fn steps(&self) -> &[TeardownStep] {
        &self.steps
    }

    /// Returns the failed steps.
    pub fn failures(&self) -> impl Iterator<Item = &TeardownStep> {
        self.steps.iter().filter(|s| s.failure.is_some())
    }

    /// Returns true if every step succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Folds failures into a single error for callers that want one.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Teardown` listing every failed step.
    pub fn into_result(self) -> Result<()> {
        if self.is_clean() {
            return Ok(());
        }
        let summary = self
            .failures()
            .map(|s| format!("{}: {}", s.step, s.failure.as_deref().unwrap_or_default()))
            .collect::<Vec<_>>()
            .join("; ");
        Err(HarnessError::Teardown(summary))
    }
}
