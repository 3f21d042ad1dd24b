//! One-shot command containers.
//!
//! Every invocation walks the same lifecycle:
//!
//! ```text
//! Created -> Started -> Waiting -> Succeeded | CommandFailed | TimedOut | WaitError
//!    \          \            \                        |
//!     +----------+------------+------------------> Removed
//! ```
//!
//! The container is force-removed on every path before [`ContainerRunner::run`]
//! returns. If the future is dropped mid-flight, a guard schedules the
//! removal on the runtime instead.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use ta_engine::{
    CancellationToken, ContainerCreateRequest, ContainerWaitResponse, EngineClient, HostConfig,
};
use tracing::{debug, info, warn};

use crate::error::HarnessError;

/// Label marking every container the harness creates.
pub const FIXTURE_LABEL: &str = "ta.fixture";

/// Label carrying the owning scenario id.
pub const SCENARIO_LABEL: &str = "ta.scenario";

/// Returns the labels attached to containers owned by `scenario_id`.
#[must_use]
pub fn fixture_labels(scenario_id: &str) -> HashMap<String, String> {
    HashMap::from([
        (FIXTURE_LABEL.to_string(), "true".to_string()),
        (SCENARIO_LABEL.to_string(), scenario_id.to_string()),
    ])
}

/// Merges ambient variables with fixture variables.
///
/// Ambient variables come first; fixture variables are appended so the
/// fixture wins when the runtime resolves duplicates.
#[must_use]
pub fn compose_env(ambient: &[String], fixture: &[String]) -> Vec<String> {
    ambient.iter().chain(fixture).cloned().collect()
}

/// Everything needed to create one command container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    pub cmd: Vec<String>,
    pub env: Vec<String>,
    pub binds: Vec<String>,
    pub network: Option<String>,
    pub user: Option<String>,
    pub tty: bool,
    pub name: Option<String>,
    pub labels: HashMap<String, String>,
}

impl ContainerSpec {
    /// Creates a spec running `cmd` in `image` with a TTY attached.
    ///
    /// The TTY keeps stdout and stderr in one unframed stream.
    pub fn new(image: impl Into<String>, cmd: Vec<String>) -> Self {
        Self {
            image: image.into(),
            cmd,
            env: Vec::new(),
            binds: Vec::new(),
            network: None,
            user: None,
            tty: true,
            name: None,
            labels: HashMap::new(),
        }
    }

    #[must_use]
    pub fn env(mut self, env: Vec<String>) -> Self {
        self.env = env;
        self
    }

    #[must_use]
    pub fn binds(mut self, binds: Vec<String>) -> Self {
        self.binds = binds;
        self
    }

    #[must_use]
    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn labels(mut self, labels: HashMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    fn to_request(&self) -> ContainerCreateRequest {
        ContainerCreateRequest {
            image: self.image.clone(),
            cmd: self.cmd.clone(),
            env: self.env.clone(),
            user: self.user.clone(),
            tty: self.tty,
            labels: self.labels.clone(),
            host_config: Some(HostConfig {
                binds: Some(self.binds.clone()),
                network_mode: self.network.clone(),
                ..HostConfig::default()
            }),
            ..ContainerCreateRequest::default()
        }
    }
}

/// Lifecycle states of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Created,
    Started,
    Waiting,
    Succeeded,
    CommandFailed,
    TimedOut,
    WaitError,
    Removed,
}

/// Result of one invocation.
#[derive(Debug, Default)]
pub struct WaitOutcome {
    /// Exit status, when the container finished.
    pub exit_code: Option<i64>,
    /// Combined stdout and stderr; empty if the command never ran.
    pub logs: String,
    /// Failure, if any.
    pub error: Option<HarnessError>,
    /// States visited, in order.
    pub history: Vec<RunState>,
}

impl WaitOutcome {
    fn enter(&mut self, state: RunState) {
        debug!(?state, "container state");
        self.history.push(state);
    }

    fn fail(&mut self, state: RunState, error: HarnessError) {
        self.enter(state);
        self.error = Some(error);
    }

    /// Returns true if the command exited zero.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.exit_code == Some(0)
    }

    /// Returns true if the container was removed.
    #[must_use]
    pub fn removed(&self) -> bool {
        self.history.last() == Some(&RunState::Removed)
    }

    /// Converts a failed outcome into its error.
    ///
    /// # Errors
    ///
    /// Returns the recorded failure.
    pub fn into_result(mut self) -> crate::error::Result<Self> {
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }
}

/// Runs one-shot containers with a bounded wait.
#[derive(Debug, Clone)]
pub struct ContainerRunner {
    client: Arc<EngineClient>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl ContainerRunner {
    /// Creates a runner.
    #[must_use]
    pub fn new(client: Arc<EngineClient>, timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            client,
            timeout,
            cancel,
        }
    }

    /// Runs `spec` to completion and removes its container.
    pub async fn run(&self, spec: &ContainerSpec) -> WaitOutcome {
        let mut outcome = WaitOutcome::default();

        let id = match self
            .client
            .container_create(spec.name.as_deref(), &spec.to_request())
            .await
        {
            Ok(id) => id,
            Err(e) => {
                outcome.error = Some(HarnessError::Engine(e));
                return outcome;
            }
        };
        outcome.enter(RunState::Created);

        let guard = RemovalGuard::new(Arc::clone(&self.client), id.clone());

        self.start_and_wait(&id, &mut outcome).await;

        match self.client.container_remove(&id, true).await {
            Ok(()) => {
                guard.disarm();
                outcome.enter(RunState::Removed);
            }
            Err(e) if e.is_not_found() => {
                guard.disarm();
                outcome.enter(RunState::Removed);
            }
            // Dropping the armed guard retries in the background.
            Err(e) => warn!(%id, error = %e, "failed to remove container"),
        }

        outcome
    }

    async fn start_and_wait(&self, id: &str, outcome: &mut WaitOutcome) {
        if let Err(e) = self.client.container_start(id).await {
            outcome.error = Some(HarnessError::Engine(e));
            return;
        }
        outcome.enter(RunState::Started);

        outcome.enter(RunState::Waiting);
        let wait = tokio::time::timeout(self.timeout, self.client.container_wait(id, &self.cancel));

        match wait.await {
            Err(_) => {
                let logs = self.logs(id).await;
                outcome.logs.clone_from(&logs);
                outcome.fail(
                    RunState::TimedOut,
                    HarnessError::Timeout {
                        after: self.timeout,
                        logs,
                    },
                );
            }
            Ok(Err(e)) => outcome.fail(RunState::WaitError, HarnessError::Wait(e.to_string())),
            Ok(Ok(ContainerWaitResponse {
                error: Some(err), ..
            })) if !err.message.is_empty() => {
                outcome.fail(RunState::WaitError, HarnessError::Wait(err.message));
            }
            Ok(Ok(response)) => {
                let logs = self.logs(id).await;
                outcome.exit_code = Some(response.status_code);
                outcome.logs.clone_from(&logs);
                if response.status_code == 0 {
                    info!(%id, "command succeeded");
                    outcome.enter(RunState::Succeeded);
                } else {
                    info!(%id, exit_code = response.status_code, "command failed");
                    outcome.fail(
                        RunState::CommandFailed,
                        HarnessError::CommandFailed {
                            exit_code: response.status_code,
                            logs,
                        },
                    );
                }
            }
        }
    }

    async fn logs(&self, id: &str) -> String {
        self.client
            .container_logs(id)
            .await
            .unwrap_or_else(|e| format!("cannot get logs for container {id}: {e}"))
    }
}

/// Schedules a forced removal if dropped while armed.
struct RemovalGuard {
    client: Arc<EngineClient>,
    id: Option<String>,
}

impl RemovalGuard {
    fn new(client: Arc<EngineClient>, id: String) -> Self {
        Self {
            client,
            id: Some(id),
        }
    }

    fn disarm(mut self) {
        self.id = None;
    }
}

impl Drop for RemovalGuard {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(%id, "no runtime to remove container on");
            return;
        };
        let client = Arc::clone(&self.client);
        handle.spawn(async move {
            if let Err(e) = client.container_remove(&id, true).await {
                if !e.is_not_found() {
                    warn!(%id, error = %e, "deferred container removal failed");
                }
            }
        });
    }
}
