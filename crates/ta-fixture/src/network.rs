//! Shared network provisioning.

use ta_engine::{EngineClient, NetworkCreateRequest};
use tracing::{debug, info};

use crate::error::{HarnessError, Result};

/// How [`ensure_network`] reached its end state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensured {
    /// A network with the name already existed.
    Existing,
    /// The network was created by this call.
    Created,
    /// Another caller created it between our lookup and our create.
    CreatedConcurrently,
}

/// Ensures a local bridge network called `name` exists.
///
/// Only an exact name match counts as existing; the runtime's name filter
/// also returns substring matches. A duplicate-name rejection on create
/// means a concurrent caller won the race, which is the desired end state.
///
/// # Errors
///
/// Returns `HarnessError::Provision` if the networks cannot be listed or
/// created.
pub async fn ensure_network(client: &EngineClient, name: &str) -> Result<Ensured> {
    let networks = client
        .network_list(Some(name))
        .await
        .map_err(|e| HarnessError::provision("network", e))?;

    if networks.iter().any(|n| n.name == name) {
        debug!(network = name, "network already exists");
        return Ok(Ensured::Existing);
    }

    match client.network_create(&NetworkCreateRequest::bridge(name)).await {
        Ok(id) => {
            info!(network = name, %id, "network created");
            Ok(Ensured::Created)
        }
        Err(e) if e.is_conflict() => {
            debug!(network = name, "network created concurrently");
            Ok(Ensured::CreatedConcurrently)
        }
        Err(e) => Err(HarnessError::provision("network", e)),
    }
}
