//! Harness configuration.
//!
//! Configuration is loaded from multiple sources with the following priority:
//!
//! 1. Environment variables (`TA_*`, nested keys separated by `__`)
//! 2. Configuration file (`acceptance.toml` in the working directory)
//! 3. Default values
//!
//! ## Example Configuration File
//!
//! ```toml
//! [image]
//! tag = "local-build-trusted-artifacts:acceptance"
//! context_dir = ".."
//! dockerfile = "Containerfile"
//!
//! [network]
//! name = "trusted-artifacts-network"
//!
//! [registry]
//! image = "docker.io/library/registry:2.8.3"
//! port = 5000
//!
//! [runner]
//! mount_point = "/data"
//! wait_timeout_secs = 60
//!
//! [sandbox]
//! keep = false
//! ```
//!
//! `TA_RUNNER__WAIT_TIMEOUT_SECS=120` overrides the wait timeout.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use ta_engine::EngineClient;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "acceptance.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "TA_";

/// Harness configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Container runtime connection.
    pub engine: EngineConfig,
    /// Image embedding the CLI under test.
    pub image: ImageConfig,
    /// Shared network.
    pub network: NetworkConfig,
    /// Registry fixture.
    pub registry: RegistryConfig,
    /// One-shot command containers.
    pub runner: RunnerConfig,
    /// Per-scenario sandboxes.
    pub sandbox: SandboxConfig,
}

impl Config {
    /// Loads configuration from the default file and environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a source is present but malformed.
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(CONFIG_FILE)
    }

    /// Loads configuration from a specific file and the environment.
    ///
    /// A missing file is not an error; its layer is simply empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Self::figment(path.as_ref()).extract()
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Returns a client for the configured runtime socket.
    #[must_use]
    pub fn engine_client(&self) -> EngineClient {
        match &self.engine.socket {
            Some(socket) => EngineClient::new(socket),
            None => EngineClient::from_env(),
        }
    }

    /// Returns the base directory sandboxes are created under.
    #[must_use]
    pub fn temp_root(&self) -> PathBuf {
        self.sandbox
            .temp_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

/// Container runtime connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Socket path; `DOCKER_HOST` or the default socket when unset.
    pub socket: Option<PathBuf>,
}

/// Image embedding the CLI under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Tag the image is built under.
    pub tag: String,
    /// Build context directory.
    pub context_dir: PathBuf,
    /// Dockerfile name relative to the context.
    pub dockerfile: String,
    /// Value of the `TARGETARCH` build argument.
    pub target_arch: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            tag: "local-build-trusted-artifacts:acceptance".to_string(),
            context_dir: PathBuf::from(".."),
            dockerfile: "Containerfile".to_string(),
            target_arch: host_target_arch().to_string(),
        }
    }
}

/// Shared network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Network name.
    pub name: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: "trusted-artifacts-network".to_string(),
        }
    }
}

/// Registry fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registry image, pulled when missing.
    pub image: String,
    /// Hostname prefix; the scenario id is appended.
    pub host_prefix: String,
    /// Port the registry listens on inside the network.
    pub port: u16,
    /// Repository artifacts are pushed to.
    pub repository: String,
    /// Storage path inside the registry container.
    pub storage_path: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            image: "docker.io/library/registry:2.8.3".to_string(),
            host_prefix: "trusted-artifacts-registry".to_string(),
            port: 5000,
            repository: "trusted-artifacts".to_string(),
            storage_path: "/var/lib/registry".to_string(),
        }
    }
}

impl RegistryConfig {
    /// Returns the container port key, e.g. `5000/tcp`.
    #[must_use]
    pub fn container_port(&self) -> String {
        format!("{}/tcp", self.port)
    }
}

/// One-shot command containers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Container name prefix; the scenario id is appended.
    pub container_prefix: String,
    /// Where the sandbox root is mounted inside containers.
    pub mount_point: PathBuf,
    /// Bound on how long a command may run.
    pub wait_timeout_secs: u64,
    /// Variable naming the CA bundle for TLS-verifying registry clients.
    pub ca_env: String,
    /// Assignment that switches the CLI into debug mode.
    pub debug_env: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            container_prefix: "trusted-artifacts".to_string(),
            mount_point: PathBuf::from("/data"),
            wait_timeout_secs: 60,
            ca_env: "CA_FILE".to_string(),
            debug_env: "DEBUG=1".to_string(),
        }
    }
}

impl RunnerConfig {
    /// Returns the wait timeout.
    #[must_use]
    pub const fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }
}

/// Per-scenario sandboxes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Base directory; the system temp dir when unset.
    pub temp_root: Option<PathBuf>,
    /// Leave each scenario's sandbox and its running registry container
    /// behind for debugging. The registry keeps its published host port
    /// until `ta-fixture sweep` removes it.
    pub keep: bool,
}

/// Maps the host architecture to the naming used by image platforms.
#[must_use]
pub fn host_target_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "arm" => "arm",
        "powerpc64" => "ppc64le",
        "s390x" => "s390x",
        other => other,
    }
}
