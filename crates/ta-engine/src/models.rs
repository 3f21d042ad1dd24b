//! Runtime API wire types.
//!
//! Only the fields the harness reads or writes are modelled; unknown fields
//! in responses are ignored.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// Containers
// =============================================================================

/// Create container request.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerCreateRequest {
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cmd: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub tty: bool,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub exposed_ports: HashMap<String, EmptyObject>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_config: Option<HostConfig>,
}

/// Serializes as `{}`; used for port sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyObject {}

/// Host configuration for a container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binds: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_bindings: Option<HashMap<String, Vec<PortBinding>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_opt: Option<Vec<String>>,
    #[serde(default)]
    pub privileged: bool,
}

/// Port binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortBinding {
    #[serde(default)]
    pub host_ip: String,
    #[serde(default)]
    pub host_port: String,
}

/// Create container response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerCreateResponse {
    pub id: String,
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
}

/// Container wait response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerWaitResponse {
    pub status_code: i64,
    #[serde(default)]
    pub error: Option<WaitErrorBody>,
}

/// Error reported by the wait endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WaitErrorBody {
    #[serde(default)]
    pub message: String,
}

/// Container inspect response (simplified).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerInspect {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub host_config: Option<HostConfig>,
    #[serde(default)]
    pub network_settings: Option<NetworkSettings>,
}

impl ContainerInspect {
    /// Returns the bind specs the container was created with.
    #[must_use]
    pub fn binds(&self) -> &[String] {
        self.host_config
            .as_ref()
            .and_then(|h| h.binds.as_deref())
            .unwrap_or_default()
    }

    /// Returns the host port published for `container_port` (e.g. `5000/tcp`).
    #[must_use]
    pub fn host_port(&self, container_port: &str) -> Option<u16> {
        self.network_settings
            .as_ref()?
            .ports
            .get(container_port)?
            .as_ref()?
            .iter()
            .find_map(|b| b.host_port.parse().ok())
    }
}

/// Network settings of an inspected container.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkSettings {
    #[serde(default)]
    pub ports: HashMap<String, Option<Vec<PortBinding>>>,
}

/// Container summary from list containers.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    pub id: String,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

// =============================================================================
// Images
// =============================================================================

/// Image summary.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageSummary {
    pub id: String,
    #[serde(default)]
    pub repo_tags: Option<Vec<String>>,
}

impl ImageSummary {
    /// Returns true if any tag of this image names the same image as
    /// `reference`, ignoring the implicit Docker Hub prefix.
    #[must_use]
    pub fn has_tag(&self, reference: &str) -> bool {
        let wanted = short_reference(reference);
        self.repo_tags
            .as_deref()
            .unwrap_or_default()
            .iter()
            .any(|t| short_reference(t) == wanted)
    }
}

/// Strips the Docker Hub prefixes the runtime omits when it reports tags.
///
/// `docker.io/library/registry:2` and `registry:2` are the same image, as
/// are `docker.io/acme/tool:1` and `acme/tool:1`.
#[must_use]
pub fn short_reference(reference: &str) -> &str {
    reference
        .strip_prefix("docker.io/library/")
        .or_else(|| reference.strip_prefix("docker.io/"))
        .unwrap_or(reference)
}

/// Options for an image build.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Dockerfile path relative to the context root.
    pub dockerfile: String,
    /// Tags applied to the resulting image.
    pub tags: Vec<String>,
    /// Build-time arguments.
    pub build_args: HashMap<String, String>,
}

/// One message of a pull or build progress stream.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressMessage {
    #[serde(default)]
    pub stream: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_detail: Option<ErrorDetail>,
    #[serde(default)]
    pub aux: Option<serde_json::Value>,
}

impl ProgressMessage {
    /// Returns the in-band error, if the message reports one.
    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        self.error
            .as_deref()
            .or_else(|| self.error_detail.as_ref().map(|d| d.message.as_str()))
            .filter(|m| !m.is_empty())
    }
}

/// Error detail attached to a progress message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub message: String,
}

// =============================================================================
// Networks
// =============================================================================

/// Network summary.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub driver: String,
}

/// Create network request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkCreateRequest {
    pub name: String,
    pub driver: String,
    pub scope: String,
    pub check_duplicate: bool,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

impl NetworkCreateRequest {
    /// Creates a request for a local bridge network.
    #[must_use]
    pub fn bridge(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: "bridge".to_string(),
            scope: "local".to_string(),
            check_duplicate: true,
            labels: HashMap::new(),
        }
    }
}

/// Create network response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkCreateResponse {
    pub id: String,
}
