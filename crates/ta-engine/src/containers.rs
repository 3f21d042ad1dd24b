//! Container operations.

use hyper::Method;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::client::{EngineClient, Payload};
use crate::error::{EngineError, Result};
use crate::models::{
    ContainerCreateRequest, ContainerCreateResponse, ContainerInspect, ContainerSummary,
    ContainerWaitResponse,
};
use crate::stream::demux_logs;

impl EngineClient {
    /// Creates a container, optionally under a fixed name.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Conflict` if the name is taken.
    #[instrument(skip(self, request), fields(image = %request.image))]
    pub async fn container_create(
        &self,
        name: Option<&str>,
        request: &ContainerCreateRequest,
    ) -> Result<String> {
        let path = match name {
            Some(name) => format!("/containers/create?name={}", urlencoding::encode(name)),
            None => "/containers/create".to_string(),
        };

        let response: ContainerCreateResponse = self.post_json(&path, request).await?;
        for warning in response.warnings.iter().flatten() {
            tracing::warn!(id = %response.id, "container create warning: {}", warning);
        }
        debug!(id = %response.id, "container created");
        Ok(response.id)
    }

    /// Starts a created container.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime refuses to start the container.
    #[instrument(skip(self))]
    pub async fn container_start(&self, id: &str) -> Result<()> {
        let path = format!("/containers/{id}/start");
        self.call(Method::POST, &path, Payload::Empty).await?;
        Ok(())
    }

    /// Blocks until the container is no longer running.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Cancelled` if `cancel` fires first.
    #[instrument(skip(self, cancel))]
    pub async fn container_wait(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<ContainerWaitResponse> {
        let path = format!("/containers/{id}/wait?condition=not-running");
        let request = self.call(Method::POST, &path, Payload::Empty);

        tokio::select! {
            biased;

            () = cancel.cancelled() => Err(EngineError::Cancelled(format!("wait for container {id}"))),
            body = request => Ok(serde_json::from_slice(&body?)?),
        }
    }

    /// Returns the combined stdout and stderr of a container.
    ///
    /// # Errors
    ///
    /// Returns an error if the logs cannot be fetched.
    #[instrument(skip(self))]
    pub async fn container_logs(&self, id: &str) -> Result<String> {
        let path = format!("/containers/{id}/logs?stdout=1&stderr=1");
        let raw = self.call(Method::GET, &path, Payload::Empty).await?;
        Ok(demux_logs(&raw))
    }

    /// Inspects a container.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` if the container does not exist.
    #[instrument(skip(self))]
    pub async fn container_inspect(&self, id: &str) -> Result<ContainerInspect> {
        self.get_json(&format!("/containers/{id}/json")).await
    }

    /// Removes a container, killing it first when `force` is set.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` if the container is already gone.
    #[instrument(skip(self))]
    pub async fn container_remove(&self, id: &str, force: bool) -> Result<()> {
        let path = format!("/containers/{id}?force={force}&v=true");
        self.call(Method::DELETE, &path, Payload::Empty).await?;
        debug!("container removed");
        Ok(())
    }

    /// Lists all containers (running or not) carrying the given labels.
    ///
    /// Labels are given as `key` or `key=value` filters.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot list containers.
    pub async fn container_list(&self, labels: &[String]) -> Result<Vec<ContainerSummary>> {
        let mut path = "/containers/json?all=true".to_string();
        if !labels.is_empty() {
            let filters: HashMap<&str, &[String]> = HashMap::from([("label", labels)]);
            let encoded = serde_json::to_string(&filters)?;
            path.push_str("&filters=");
            path.push_str(&urlencoding::encode(&encoded));
        }
        self.get_json(&path).await
    }
}
