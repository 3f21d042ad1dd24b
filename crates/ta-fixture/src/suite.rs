//! Suite-level shared state.
//!
//! The engine client, the shared network and the CLI image are set up once
//! per process and shared by every scenario. Concurrent first use waits on a
//! single initialisation; a failed initialisation leaves the cell empty so
//! the next caller retries.

use std::collections::HashMap;
use std::sync::Arc;
use ta_engine::{CancellationToken, EngineClient};
use tokio::sync::OnceCell;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::error::{HarnessError, Result};
use crate::image::ImageBuilder;
use crate::network::ensure_network;
use crate::runner::{FIXTURE_LABEL, SCENARIO_LABEL};
use crate::scenario::Scenario;

static SHARED: OnceCell<Arc<Suite>> = OnceCell::const_new();

/// Build argument carrying the target architecture.
pub const TARGET_ARCH_ARG: &str = "TARGETARCH";

/// Resources shared by every scenario of a run.
#[derive(Debug)]
pub struct Suite {
    config: Config,
    client: Arc<EngineClient>,
    cancel: CancellationToken,
}

impl Suite {
    /// Creates a suite handle without touching the runtime.
    #[must_use]
    pub fn connect(config: Config) -> Self {
        let client = Arc::new(config.engine_client());
        Self {
            config,
            client,
            cancel: CancellationToken::new(),
        }
    }

    /// Creates a suite and provisions the network and image.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Provision` if the runtime is unreachable or
    /// provisioning fails.
    pub async fn prepare(config: Config) -> Result<Self> {
        let suite = Self::connect(config);
        suite.provision().await?;
        Ok(suite)
    }

    /// Returns the process-wide suite, preparing it on first use.
    ///
    /// `config` is only used by the call that performs the initialisation.
    ///
    /// # Errors
    ///
    /// Returns the initialisation error to the caller that ran it.
    pub async fn shared(config: Config) -> Result<Arc<Self>> {
        SHARED
            .get_or_try_init(|| async move { Self::prepare(config).await.map(Arc::new) })
            .await
            .cloned()
    }

    #[instrument(skip(self))]
    async fn provision(&self) -> Result<()> {
        self.client
            .ping()
            .await
            .map_err(|e| HarnessError::provision("engine", e))?;

        ensure_network(&self.client, &self.config.network.name).await?;

        let image = &self.config.image;
        let build_args = HashMap::from([(TARGET_ARCH_ARG.to_string(), image.target_arch.clone())]);
        ImageBuilder::new(Arc::clone(&self.client))
            .build(&image.context_dir, &image.dockerfile, &image.tag, build_args, &self.cancel)
            .await?;

        info!(network = %self.config.network.name, image = %image.tag, "suite prepared");
        Ok(())
    }

    /// Starts a new scenario.
    ///
    /// # Errors
    ///
    /// Returns a setup error if the sandbox, certificate or registry cannot
    /// be provisioned.
    pub async fn scenario(self: &Arc<Self>) -> Result<Scenario> {
        Scenario::start(Arc::clone(self)).await
    }

    /// Force-removes containers left behind by the harness.
    ///
    /// Restricted to one scenario when `scenario_id` is given. Returns the
    /// number of containers removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the containers cannot be listed.
    pub async fn sweep(&self, scenario_id: Option<&str>) -> Result<usize> {
        let mut labels = vec![format!("{FIXTURE_LABEL}=true")];
        if let Some(id) = scenario_id {
            labels.push(format!("{SCENARIO_LABEL}={id}"));
        }

        let mut removed = 0;
        for container in self.client.container_list(&labels).await? {
            match self.client.container_remove(&container.id, true).await {
                Ok(()) => removed += 1,
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(id = %container.id, error = %e, "failed to sweep container"),
            }
        }
        info!(removed, "sweep complete");
        Ok(removed)
    }

    /// Aborts in-flight pulls, builds and waits.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn client(&self) -> &Arc<EngineClient> {
        &self.client
    }

    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}
