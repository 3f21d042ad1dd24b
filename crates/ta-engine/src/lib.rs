//! # ta-engine
//!
//! Typed client for the container runtime API used by the acceptance
//! harness.
//!
//! The client speaks HTTP/1.1 over the runtime's Unix domain socket and
//! covers the handful of endpoints the harness needs:
//!
//! - Images: list, pull, build
//! - Networks: list, create
//! - Containers: create, start, wait, logs, inspect, remove, list
//!
//! Pull and build responses are progress streams that report failures
//! in-band; the client drains them completely and surfaces those failures
//! as [`EngineError::Stream`].

#![warn(clippy::all)]

pub mod client;
mod containers;
pub mod error;
mod images;
pub mod models;
mod networks;
pub mod stream;

pub use client::{EngineClient, API_VERSION, DEFAULT_SOCKET_PATH};
pub use error::{EngineError, Result};
pub use models::{
    BuildOptions, ContainerCreateRequest, ContainerInspect, ContainerSummary,
    ContainerWaitResponse, EmptyObject, HostConfig, ImageSummary, NetworkCreateRequest,
    NetworkSummary, PortBinding,
};
pub use stream::StreamSummary;
pub use tokio_util::sync::CancellationToken;
