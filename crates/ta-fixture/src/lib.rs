//! # ta-fixture
//!
//! Fixture and container-lifecycle orchestration for the trusted-artifacts
//! acceptance tests.
//!
//! The CLI under test runs inside throwaway containers. This crate provides
//! everything around those runs:
//!
//! - [`Suite`]: once per process, ensures the shared network and builds the
//!   image embedding the CLI
//! - [`Scenario`]: per test, a private [`Sandbox`], a TLS certificate and an
//!   ephemeral registry, plus the steps that drive the CLI
//! - [`ContainerRunner`]: one-shot command containers with a bounded wait
//!   and unconditional removal
//! - [`TeardownReport`]: best-effort cleanup that never masks a verdict
//!
//! ## Example
//!
//! ```ignore
//! use ta_fixture::{Config, Suite};
//!
//! let suite = Suite::shared(Config::load()?).await?;
//! let mut scenario = suite.scenario().await?;
//!
//! let verdict = async {
//!     scenario.write_source_file("hello.txt", "hello\n")?;
//!     scenario.create_artifact("hello", "hello.txt").await?;
//!     scenario.use_artifact("hello").await?;
//!     scenario.restored_file_matches_source("hello.txt")
//! }
//! .await;
//!
//! scenario.teardown().await;
//! verdict?;
//! ```

#![warn(clippy::all)]

pub mod assertions;
pub mod certs;
pub mod config;
pub mod error;
pub mod image;
pub mod logging;
pub mod network;
pub mod registry;
pub mod runner;
pub mod sandbox;
pub mod scenario;
pub mod suite;
pub mod teardown;

pub use config::Config;
pub use error::{HarnessError, Result};
pub use image::ImageBuilder;
pub use network::{ensure_network, Ensured};
pub use registry::{RegistryFixture, RegistryHandle, RegistryLaunch};
pub use runner::{ContainerRunner, ContainerSpec, RunState, WaitOutcome};
pub use sandbox::{Layout, MountView, Sandbox};
pub use scenario::Scenario;
pub use suite::Suite;
pub use teardown::{TeardownReport, TeardownStep};
