//! Runtime client transport.
//!
//! Speaks the container runtime's HTTP API over its Unix domain socket. Every
//! request opens a fresh HTTP/1.1 connection; the handle itself carries no
//! connection state, so it can be shared freely across scenarios.

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::net::UnixStream;
use tracing::{debug, trace};

use crate::error::{EngineError, Result};

/// Default socket path for the container runtime.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/docker.sock";

/// API version prefix applied to every request path.
pub const API_VERSION: &str = "/v1.43";

/// Request payload.
pub(crate) enum Payload {
    /// No body.
    Empty,
    /// Serialized JSON document.
    Json(Vec<u8>),
    /// Uncompressed tar archive (build context).
    Tar(Bytes),
}

impl Payload {
    /// Serializes a value into a JSON payload.
    pub(crate) fn json<B: Serialize>(body: &B) -> Result<Self> {
        Ok(Self::Json(serde_json::to_vec(body)?))
    }
}

/// Client handle for the container runtime API.
#[derive(Debug, Clone)]
pub struct EngineClient {
    socket_path: PathBuf,
}

impl EngineClient {
    /// Creates a client for the runtime listening on `socket_path`.
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    /// Creates a client from `DOCKER_HOST`, falling back to the default socket.
    #[must_use]
    pub fn from_env() -> Self {
        let host = std::env::var("DOCKER_HOST").ok();
        Self::new(socket_from_docker_host(host.as_deref()))
    }

    /// Returns the socket path.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Pings the runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime is unreachable or unhealthy.
    pub async fn ping(&self) -> Result<()> {
        self.call(Method::GET, "/_ping", Payload::Empty).await?;
        Ok(())
    }

    /// Performs a GET request and decodes the JSON response.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let body = self.call(Method::GET, path, Payload::Empty).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Performs a POST request with a JSON body and decodes the JSON response.
    pub(crate) async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let body = self.call(Method::POST, path, Payload::json(body)?).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Performs a request and collects the whole response body.
    pub(crate) async fn call(&self, method: Method, path: &str, payload: Payload) -> Result<Bytes> {
        let response = self.send(method, path, payload).await?;
        collect(response).await
    }

    /// Performs a request and returns the response with its body unread.
    ///
    /// Non-success statuses are turned into errors here, so callers only
    /// ever stream bodies of successful responses.
    pub(crate) async fn send(
        &self,
        method: Method,
        path: &str,
        payload: Payload,
    ) -> Result<Response<Incoming>> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|source| EngineError::Connect {
                socket: self.socket_path.display().to_string(),
                source,
            })?;

        let io = TokioIo::new(stream);

        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| EngineError::Http(format!("handshake failed: {e}")))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("runtime connection closed: {}", e);
            }
        });

        let uri = format!("http://localhost{API_VERSION}{path}");
        trace!(%method, %uri, "runtime request");

        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Host", "localhost");

        let request = match payload {
            Payload::Empty => builder.body(Full::new(Bytes::new())),
            Payload::Json(body) => builder
                .header("Content-Type", "application/json")
                .header("Content-Length", body.len())
                .body(Full::new(Bytes::from(body))),
            Payload::Tar(body) => builder
                .header("Content-Type", "application/x-tar")
                .header("Content-Length", body.len())
                .body(Full::new(body)),
        }
        .map_err(|e| EngineError::Http(format!("failed to build request: {e}")))?;

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| EngineError::Http(format!("failed to send request: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = collect(response).await?;
            return Err(EngineError::from_status(status.as_u16(), &body));
        }

        Ok(response)
    }
}

impl Default for EngineClient {
    fn default() -> Self {
        Self::new(DEFAULT_SOCKET_PATH)
    }
}

/// Reads a whole response body.
async fn collect(response: Response<Incoming>) -> Result<Bytes> {
    Ok(response
        .into_body()
        .collect()
        .await
        .map_err(|e| EngineError::Http(format!("failed to read response: {e}")))?
        .to_bytes())
}

/// Resolves the socket path from a `DOCKER_HOST` value.
///
/// Only `unix://` hosts are supported; anything else falls back to the
/// default socket.
#[must_use]
pub fn socket_from_docker_host(host: Option<&str>) -> PathBuf {
    match host.and_then(|h| h.strip_prefix("unix://")) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from(DEFAULT_SOCKET_PATH),
    }
}
