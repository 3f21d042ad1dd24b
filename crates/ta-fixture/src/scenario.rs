//! Scenario lifecycle and steps.
//!
//! A scenario owns a sandbox and a registry. Steps run strictly in order;
//! each command step runs one container, records its logs, and fails with
//! those logs when the command does.

use serde::Deserialize;
use std::net::SocketAddr;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::assertions;
use crate::certs;
use crate::error::{HarnessError, Result};
use crate::registry::{RegistryFixture, RegistryHandle, RegistryLaunch};
use crate::runner::{compose_env, fixture_labels, ContainerRunner, ContainerSpec};
use crate::sandbox::{Layout, MountView, Sandbox};
use crate::suite::Suite;
use crate::teardown::TeardownReport;

/// Registry storage directory inside the sandbox root.
pub const REGISTRY_STORAGE_DIR: &str = "registry";

/// Content of the file written by the dummy artifact step.
pub const DUMMY_CONTENT: &str = "dummy file";

/// Result name of the dummy artifact.
pub const DUMMY_RESULT: &str = "DUMMY";

/// Source path of the dummy artifact. Never created, so the artifact is the
/// empty one.
pub const DUMMY_PATH: &str = "dummy";

#[derive(Debug, Deserialize)]
struct Catalog {
    #[serde(default)]
    repositories: Vec<String>,
}

/// One isolated test scenario.
#[derive(Debug)]
pub struct Scenario {
    id: String,
    suite: Arc<Suite>,
    sandbox: Sandbox,
    mount: MountView,
    registry: Option<RegistryHandle>,
    env: Vec<String>,
    last_logs: String,
    torn_down: bool,
}

impl Scenario {
    /// Provisions a sandbox, its certificate and its registry.
    ///
    /// Anything already provisioned is cleaned up if a later stage fails.
    ///
    /// # Errors
    ///
    /// Returns a setup error; no step may run afterwards.
    #[instrument(skip_all)]
    pub async fn start(suite: Arc<Suite>) -> Result<Self> {
        let config = suite.config();
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(8);

        let sandbox = Sandbox::create(&config.temp_root())?;
        let mount = sandbox.project_mount(&config.runner.mount_point);
        let hostname = format!("{}-{id}", config.registry.host_prefix);

        if let Err(e) = certs::issue(&hostname, &sandbox.domain_cert(), &sandbox.domain_key()) {
            let _ = sandbox.teardown();
            return Err(e);
        }

        let launch = RegistryLaunch {
            scenario_id: id.clone(),
            hostname,
            binds: vec![sandbox.bind(&config.runner.mount_point)],
            storage_dir: sandbox.root().join(REGISTRY_STORAGE_DIR),
            cert_path: mount.domain_cert(),
            key_path: mount.domain_key(),
        };
        let registry = match Self::registry_fixture(&suite)
            .start(launch, suite.cancellation())
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                let _ = sandbox.teardown();
                return Err(e);
            }
        };

        info!(scenario = %id, root = %sandbox.root().display(), "scenario started");
        Ok(Self {
            id,
            suite,
            sandbox,
            mount,
            registry: Some(registry),
            env: Vec::new(),
            last_logs: String::new(),
            torn_down: false,
        })
    }

    fn registry_fixture(suite: &Suite) -> RegistryFixture {
        let config = suite.config();
        RegistryFixture::new(
            Arc::clone(suite.client()),
            config.registry.clone(),
            config.network.name.clone(),
        )
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    #[must_use]
    pub fn registry(&self) -> Option<&RegistryHandle> {
        self.registry.as_ref()
    }

    /// Logs of the most recent command.
    #[must_use]
    pub fn last_logs(&self) -> &str {
        &self.last_logs
    }

    /// Ambient variables passed to every command.
    #[must_use]
    pub fn env(&self) -> &[String] {
        &self.env
    }

    /// Returns the registry store coordinate, e.g. `host:5000/trusted-artifacts`.
    ///
    /// # Errors
    ///
    /// Returns an error after teardown.
    pub fn store_location(&self) -> Result<String> {
        let registry = self.live_registry()?;
        Ok(registry.store_location(&self.suite.config().registry.repository))
    }

    fn live_registry(&self) -> Result<&RegistryHandle> {
        self.registry
            .as_ref()
            .ok_or_else(|| HarnessError::provision("registry", "registry already stopped"))
    }

    // -------------------------------------------------------------------------
    // Fixtures
    // -------------------------------------------------------------------------

    /// Writes a read-only source file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be written.
    pub fn write_source_file(&self, name: &str, content: &str) -> Result<()> {
        write_read_only(&self.sandbox.source_dir().join(name), content.as_bytes())
    }

    /// Writes source files at relative paths, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a directory or file cannot be written.
    pub fn write_files(&self, files: &[(&str, &str)]) -> Result<()> {
        let source = self.sandbox.source_dir();
        let mut dirs = std::fs::DirBuilder::new();
        dirs.recursive(true).mode(0o700);

        for (path, content) in files {
            let target = source.join(path);
            if let Some(parent) = target.parent() {
                dirs.create(parent)?;
            }
            write_read_only(&target, content.as_bytes())?;
        }
        Ok(())
    }

    /// Switches the CLI into debug mode for subsequent commands.
    pub fn enable_debug(&mut self) {
        let debug = self.suite.config().runner.debug_env.clone();
        if !self.env.contains(&debug) {
            self.env.push(debug);
        }
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    /// Runs an arbitrary CLI invocation with the scenario's binds and
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns `CommandFailed`, `Timeout` or `Wait` errors from the runner.
    #[instrument(skip(self), fields(scenario = %self.id))]
    pub async fn run_cli(&mut self, args: Vec<String>) -> Result<()> {
        let config = self.suite.config();
        let ca = format!("{}={}", config.runner.ca_env, self.mount.domain_cert().display());

        let spec = ContainerSpec::new(config.image.tag.clone(), args)
            .env(compose_env(&self.env, &[ca]))
            .binds(vec![self.sandbox.bind(&config.runner.mount_point)])
            .network(config.network.name.clone())
            .user(nix::unistd::getuid().to_string())
            .name(format!("{}-{}", config.runner.container_prefix, self.id))
            .labels(fixture_labels(&self.id));

        let runner = ContainerRunner::new(
            Arc::clone(self.suite.client()),
            config.runner.wait_timeout(),
            self.suite.cancellation().clone(),
        );
        let outcome = runner.run(&spec).await;
        self.last_logs.clone_from(&outcome.logs);
        outcome.into_result().map(|_| ())
    }

    /// Creates artifact `result` from `path` under `source/`, storing it in
    /// the scenario registry.
    ///
    /// # Errors
    ///
    /// Returns the command's error.
    pub async fn create_artifact(&mut self, result: &str, path: &str) -> Result<()> {
        let store = self.store_location()?;
        self.create_with_store(result, path, store).await
    }

    /// Creates artifact `result` from `path`, storing it in the sandbox's
    /// `artifacts/` directory.
    ///
    /// # Errors
    ///
    /// Returns the command's error.
    pub async fn create_artifact_local(&mut self, result: &str, path: &str) -> Result<()> {
        let store = self.mount.artifacts_dir().display().to_string();
        self.create_with_store(result, path, store).await
    }

    async fn create_with_store(&mut self, result: &str, path: &str, store: String) -> Result<()> {
        let pair = format!(
            "{}={}",
            self.mount.results_dir().join(result).display(),
            self.mount.source_dir().join(path).display()
        );
        debug!(result, path, %store, "creating artifact");
        self.run_cli(vec!["create".to_string(), "--store".to_string(), store, pair])
            .await
    }

    /// Restores artifact `result` into `restored/`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the result file is missing, or the command's
    /// error.
    pub async fn use_artifact(&mut self, result: &str) -> Result<()> {
        let reference = self.result_reference(result)?;
        let pair = format!("{reference}={}", self.mount.restored_dir().display());
        debug!(result, %reference, "using artifact");
        self.run_cli(vec!["use".to_string(), pair]).await
    }

    /// Reads the reference `create` wrote for `result`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read.
    pub fn result_reference(&self, result: &str) -> Result<String> {
        let raw = std::fs::read_to_string(self.sandbox.results_dir().join(result))?;
        Ok(raw.trim().to_string())
    }

    /// Restores `result` and checks each listed file's content exactly.
    ///
    /// # Errors
    ///
    /// Returns the command's error or an assertion error.
    pub async fn artifact_contains(&mut self, result: &str, files: &[(&str, &str)]) -> Result<()> {
        self.use_artifact(result).await?;
        let restored = self.sandbox.restored_dir();
        for (path, expected) in files {
            let actual = std::fs::read(restored.join(path))?;
            assertions::bytes_match(&format!("file {path:?}"), expected.as_bytes(), &actual)?;
        }
        Ok(())
    }

    /// Writes `dummy.txt` at the source root and creates [`DUMMY_RESULT`]
    /// from the missing [`DUMMY_PATH`].
    ///
    /// The file sits beside the packaged path, not under it, so the result
    /// is the cheap empty artifact.
    ///
    /// # Errors
    ///
    /// Returns an I/O error or the command's error.
    pub async fn create_dummy_artifact(&mut self) -> Result<()> {
        self.write_files(&[("dummy.txt", DUMMY_CONTENT)])?;
        self.create_artifact(DUMMY_RESULT, DUMMY_PATH).await
    }

    // -------------------------------------------------------------------------
    // Assertions
    // -------------------------------------------------------------------------

    /// Checks that the restored copy of `name` is byte-identical to its source.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if either file is missing, or an assertion error
    /// with a line diff.
    pub fn restored_file_matches_source(&self, name: &str) -> Result<()> {
        let source = std::fs::read(self.sandbox.source_dir().join(name))?;
        let restored = std::fs::read(self.sandbox.restored_dir().join(name))?;
        assertions::bytes_match("source file and restored file", &source, &restored)
    }

    /// Checks that nothing was restored.
    ///
    /// # Errors
    ///
    /// Returns an assertion error listing restored entries.
    pub fn no_restored_files(&self) -> Result<()> {
        assertions::dir_is_empty(&self.sandbox.restored_dir())
    }

    /// Checks the last logs for every whitespace-separated word.
    ///
    /// # Errors
    ///
    /// Returns an assertion error carrying the logs.
    pub fn logs_contain_words(&self, words: &str) -> Result<()> {
        assertions::logs_contain_words(&self.last_logs, words)
    }

    /// Checks the last logs for a verbatim line.
    ///
    /// # Errors
    ///
    /// Returns an assertion error carrying the logs.
    pub fn logs_contain_line(&self, line: &str) -> Result<()> {
        assertions::logs_contain_line(&self.last_logs, line)
    }

    /// Lists repositories in the scenario registry.
    ///
    /// Queried from the host over TLS, trusting only the scenario
    /// certificate, with the registry hostname pinned to the published port.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Provision` if the registry is unreachable.
    pub async fn registry_catalog(&self) -> Result<Vec<String>> {
        let registry = self.live_registry()?;
        let pem = std::fs::read(self.sandbox.domain_cert())?;
        let cert = reqwest::Certificate::from_pem(&pem)
            .map_err(|e| HarnessError::CertGen(e.to_string()))?;

        let client = reqwest::Client::builder()
            .add_root_certificate(cert)
            .resolve(&registry.hostname, SocketAddr::from(([127, 0, 0, 1], registry.host_port)))
            .no_proxy()
            .build()
            .map_err(|e| HarnessError::provision("registry", e))?;

        let url = format!("https://{}:{}/v2/_catalog", registry.hostname, registry.host_port);
        let catalog: Catalog = client
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| HarnessError::provision("registry", e))?
            .json()
            .await
            .map_err(|e| HarnessError::provision("registry", e))?;

        Ok(catalog.repositories)
    }

    /// Checks that no artifact reached the registry.
    ///
    /// # Errors
    ///
    /// Returns an assertion error listing what was pushed.
    pub async fn artifact_creation_skipped(&self) -> Result<()> {
        let catalog = self.registry_catalog().await?;
        if catalog.is_empty() {
            Ok(())
        } else {
            Err(HarnessError::assertion(format!(
                "expected no artifacts created in the registry, found: {catalog:?}"
            )))
        }
    }

    // -------------------------------------------------------------------------
    // Teardown
    // -------------------------------------------------------------------------

    /// Stops the registry and removes the sandbox.
    ///
    /// Best-effort and idempotent; the report is informational and must not
    /// replace the scenario's verdict. With `sandbox.keep` set, nothing is
    /// removed: the sandbox stays on disk and the registry keeps running.
    #[instrument(skip(self), fields(scenario = %self.id))]
    pub async fn teardown(&mut self) -> TeardownReport {
        let mut report = TeardownReport::new();
        if self.torn_down {
            return report;
        }
        self.torn_down = true;

        if self.suite.config().sandbox.keep {
            info!(root = %self.sandbox.root().display(), "keeping scenario resources");
            return report;
        }

        if let Some(registry) = self.registry.take() {
            report.absorb(Self::registry_fixture(&self.suite).stop(&registry).await);
        }
        report.attempt("remove sandbox", self.sandbox.teardown());

        info!(clean = report.is_clean(), "scenario torn down");
        report
    }
}

impl Drop for Scenario {
    fn drop(&mut self) {
        if self.torn_down || self.suite.config().sandbox.keep {
            return;
        }
        warn!(scenario = %self.id, "scenario dropped without teardown");

        let registry = self.registry.take();
        let sandbox = self.sandbox.clone();
        let fixture = Self::registry_fixture(&self.suite);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Some(registry) = registry {
                        fixture.stop(&registry).await;
                    }
                    let _ = sandbox.teardown();
                });
            }
            Err(_) => {
                let _ = sandbox.teardown();
            }
        }
    }
}

fn write_read_only(path: &Path, content: &[u8]) -> Result<()> {
    use std::io::Write;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o400)
        .open(path)?;
    file.write_all(content)?;
    Ok(())
}

