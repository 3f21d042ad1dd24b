//! Ephemeral TLS registry fixture.
//!
//! Each scenario runs its own registry container under a unique name that
//! doubles as its hostname on the shared network. The registry listens on
//! TLS with the scenario's certificate; its storage lives in a host
//! directory next to the sandbox, so stopping the fixture removes every
//! byte it wrote.

use std::collections::HashMap;
use std::fs::DirBuilder;
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use ta_engine::{
    CancellationToken, ContainerCreateRequest, EmptyObject, EngineClient, HostConfig, PortBinding,
};
use tracing::{debug, info, instrument};

use crate::config::RegistryConfig;
use crate::error::{HarnessError, Result};
use crate::runner::fixture_labels;
use crate::sandbox::bind_host_path;
use crate::teardown::TeardownReport;

/// Security option disabling label confinement for shared bind mounts.
pub const LABEL_DISABLE: &str = "label:disable";

/// Parameters for one registry launch.
#[derive(Debug, Clone)]
pub struct RegistryLaunch {
    /// Owning scenario.
    pub scenario_id: String,
    /// Container name and hostname.
    pub hostname: String,
    /// Binds the certificate files are reachable through.
    pub binds: Vec<String>,
    /// Host directory backing registry storage; created by `start`.
    pub storage_dir: PathBuf,
    /// Certificate path inside the container.
    pub cert_path: PathBuf,
    /// Key path inside the container.
    pub key_path: PathBuf,
}

/// A running registry, owned by one scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryHandle {
    pub container_id: String,
    pub network: String,
    pub hostname: String,
    /// Host port the registry port is published on.
    pub host_port: u16,
    pub port: u16,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    /// Every bind the container was created with, storage included.
    pub binds: Vec<String>,
}

impl RegistryHandle {
    /// Returns the store coordinate as seen from the shared network.
    #[must_use]
    pub fn store_location(&self, repository: &str) -> String {
        format!("{}:{}/{repository}", self.hostname, self.port)
    }
}

/// Starts and stops registry containers.
#[derive(Debug, Clone)]
pub struct RegistryFixture {
    client: Arc<EngineClient>,
    config: RegistryConfig,
    network: String,
}

impl RegistryFixture {
    /// Creates a fixture attaching registries to `network`.
    #[must_use]
    pub fn new(client: Arc<EngineClient>, config: RegistryConfig, network: impl Into<String>) -> Self {
        Self {
            client,
            config,
            network: network.into(),
        }
    }

    /// Starts a registry and returns once the container is running.
    ///
    /// Readiness is not awaited; the first client request either succeeds or
    /// fails with a connection error. On failure nothing is left behind.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Provision` if any step fails.
    #[instrument(skip_all, fields(hostname = %launch.hostname))]
    pub async fn start(&self, launch: RegistryLaunch, cancel: &CancellationToken) -> Result<RegistryHandle> {
        self.ensure_image(cancel).await?;

        DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(&launch.storage_dir)
            .map_err(|e| {
                HarnessError::provision(
                    "registry",
                    format!("creating storage {}: {e}", launch.storage_dir.display()),
                )
            })?;

        let mut binds = launch.binds.clone();
        binds.push(format!(
            "{}:{}:Z",
            launch.storage_dir.display(),
            self.config.storage_path
        ));

        let request = self.create_request(&launch, binds.clone());
        let id = match self.client.container_create(Some(&launch.hostname), &request).await {
            Ok(id) => id,
            Err(e) => {
                let _ = remove_host_dir(&launch.storage_dir);
                return Err(HarnessError::provision("registry", e));
            }
        };

        let host_port = match self.start_and_locate(&id).await {
            Ok(port) => port,
            Err(e) => {
                let _ = self.client.container_remove(&id, true).await;
                let _ = remove_host_dir(&launch.storage_dir);
                return Err(e);
            }
        };

        info!(%id, host_port, "registry started");
        Ok(RegistryHandle {
            container_id: id,
            network: self.network.clone(),
            hostname: launch.hostname,
            host_port,
            port: self.config.port,
            cert_path: launch.cert_path,
            key_path: launch.key_path,
            binds,
        })
    }

    async fn ensure_image(&self, cancel: &CancellationToken) -> Result<()> {
        let present = self
            .client
            .image_exists(&self.config.image)
            .await
            .map_err(|e| HarnessError::provision("registry", e))?;
        if present {
            return Ok(());
        }

        info!(image = %self.config.image, "pulling registry image");
        self.client
            .image_pull(&self.config.image, cancel)
            .await
            .map_err(|e| HarnessError::provision("registry", e))?;
        Ok(())
    }

    fn create_request(&self, launch: &RegistryLaunch, binds: Vec<String>) -> ContainerCreateRequest {
        let container_port = self.config.container_port();
        ContainerCreateRequest {
            image: self.config.image.clone(),
            hostname: Some(launch.hostname.clone()),
            env: vec![
                format!("REGISTRY_HTTP_ADDR=0.0.0.0:{}", self.config.port),
                format!("REGISTRY_HTTP_TLS_CERTIFICATE={}", launch.cert_path.display()),
                format!("REGISTRY_HTTP_TLS_KEY={}", launch.key_path.display()),
            ],
            user: Some(nix::unistd::getuid().to_string()),
            exposed_ports: HashMap::from([(container_port.clone(), EmptyObject {})]),
            labels: fixture_labels(&launch.scenario_id),
            host_config: Some(HostConfig {
                binds: Some(binds),
                // Empty host port: the runtime picks a free one.
                port_bindings: Some(HashMap::from([(
                    container_port,
                    vec![PortBinding {
                        host_ip: "127.0.0.1".to_string(),
                        host_port: String::new(),
                    }],
                )])),
                network_mode: Some(self.network.clone()),
                security_opt: Some(vec![LABEL_DISABLE.to_string()]),
                privileged: false,
            }),
            ..ContainerCreateRequest::default()
        }
    }

    async fn start_and_locate(&self, id: &str) -> Result<u16> {
        self.client
            .container_start(id)
            .await
            .map_err(|e| HarnessError::provision("registry", e))?;

        let inspect = self
            .client
            .container_inspect(id)
            .await
            .map_err(|e| HarnessError::provision("registry", e))?;

        inspect
            .host_port(&self.config.container_port())
            .ok_or_else(|| HarnessError::provision("registry", "registry port was not published"))
    }

    /// Stops a registry: recovers its binds, force-removes it, then deletes
    /// the host side of every bind.
    ///
    /// Best-effort; the report lists what failed. If inspection fails, the
    /// binds recorded at start are used.
    #[instrument(skip_all, fields(id = %handle.container_id))]
    pub async fn stop(&self, handle: &RegistryHandle) -> TeardownReport {
        let mut report = TeardownReport::new();

        let inspected = report.attempt(
            "inspect registry",
            self.client.container_inspect(&handle.container_id).await,
        );
        let binds = inspected.map_or_else(|| handle.binds.clone(), |i| i.binds().to_vec());

        let removed = match self.client.container_remove(&handle.container_id, true).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        };
        report.attempt("remove registry container", removed);

        for bind in &binds {
            let host = bind_host_path(bind);
            report.attempt(format!("remove {host}"), remove_host_dir(Path::new(host)));
        }

        debug!(clean = report.is_clean(), "registry stopped");
        report
    }
}

fn remove_host_dir(path: &Path) -> io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
