//! End-to-end acceptance scenarios for the trusted-artifacts CLI.
//!
//! The scenarios in `tests/` drive the real CLI image against a real
//! container runtime. They are ignored by default; run them with
//!
//! ```text
//! cargo test -p ta-acceptance -- --ignored
//! ```
//!
//! Configuration comes from `acceptance.toml` in this directory and `TA_*`
//! variables; `TA_IMAGE__CONTEXT_DIR` points at the CLI's build context.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use ta_fixture::{logging, Config, Scenario, Suite};

/// Variable enabling debug logging of the harness itself.
pub const HARNESS_DEBUG_ENV: &str = "TA_HARNESS_DEBUG";

/// What an acceptance run needs from the host.
#[derive(Debug, Clone)]
pub struct ResourceCheck {
    /// Runtime socket path.
    pub socket: PathBuf,
    /// The runtime socket exists.
    pub socket_exists: bool,
    /// Dockerfile of the CLI build context.
    pub dockerfile: PathBuf,
    /// The Dockerfile exists.
    pub dockerfile_exists: bool,
}

impl ResourceCheck {
    /// Inspects the host for the resources `config` refers to.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let socket = config.engine_client().socket_path().to_path_buf();
        let dockerfile = config.image.context_dir.join(&config.image.dockerfile);
        Self {
            socket_exists: socket.exists(),
            dockerfile_exists: dockerfile.is_file(),
            socket,
            dockerfile,
        }
    }

    /// Returns true if every resource is present.
    #[must_use]
    pub fn all_ready(&self) -> bool {
        self.socket_exists && self.dockerfile_exists
    }

    /// Describes the missing resources.
    #[must_use]
    pub fn missing(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if !self.socket_exists {
            missing.push(format!("runtime socket {}", self.socket.display()));
        }
        if !self.dockerfile_exists {
            missing.push(format!("build context {}", self.dockerfile.display()));
        }
        missing
    }
}

/// Returns the shared suite, or `None` when the host lacks resources.
///
/// # Errors
///
/// Returns an error if configuration is malformed or suite setup fails.
pub async fn suite() -> Result<Option<Arc<Suite>>> {
    logging::init(std::env::var_os(HARNESS_DEBUG_ENV).is_some());

    let config = Config::load().context("loading acceptance configuration")?;
    let check = ResourceCheck::new(&config);
    if !check.all_ready() {
        eprintln!("Skipping test: missing resources: {:?}", check.missing());
        return Ok(None);
    }

    let suite = Suite::shared(config).await.context("preparing suite")?;
    Ok(Some(suite))
}

/// Tears the scenario down and returns its verdict.
///
/// Teardown problems are logged by the fixture and never replace the
/// verdict.
///
/// # Errors
///
/// Returns the verdict's error.
pub async fn finish(mut scenario: Scenario, verdict: ta_fixture::Result<()>) -> Result<()> {
    let id = scenario.id().to_string();
    let report = scenario.teardown().await;
    if !report.is_clean() {
        tracing::warn!(scenario = %id, failures = report.failures().count(), "teardown incomplete");
    }
    verdict.with_context(|| format!("scenario {id}"))
}
