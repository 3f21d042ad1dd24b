//! Network operations.

use std::collections::HashMap;
use tracing::instrument;

use crate::client::EngineClient;
use crate::error::Result;
use crate::models::{NetworkCreateRequest, NetworkCreateResponse, NetworkSummary};

impl EngineClient {
    /// Lists networks whose name matches `name`.
    ///
    /// The runtime's name filter is a substring match; callers that need an
    /// exact match compare `NetworkSummary::name` themselves.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot list networks.
    pub async fn network_list(&self, name: Option<&str>) -> Result<Vec<NetworkSummary>> {
        let path = match name {
            Some(name) => {
                let filters = HashMap::from([("name", [name])]);
                let encoded = serde_json::to_string(&filters)?;
                format!("/networks?filters={}", urlencoding::encode(&encoded))
            }
            None => "/networks".to_string(),
        };
        self.get_json(&path).await
    }

    /// Creates a network.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Conflict` if a network with the name exists.
    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn network_create(&self, request: &NetworkCreateRequest) -> Result<String> {
        let response: NetworkCreateResponse = self.post_json("/networks/create", request).await?;
        Ok(response.id)
    }
}
