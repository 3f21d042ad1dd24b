//! Building the image that embeds the CLI under test.
//!
//! Builds are expensive; a suite builds once and every scenario reuses the
//! tag. Rebuilding under the same tag replaces the previous image.

use bytes::Bytes;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use ta_engine::{BuildOptions, CancellationToken, EngineClient, StreamSummary};
use tracing::info;

use crate::error::{HarnessError, Result};

/// Builds images from a local context directory.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    client: Arc<EngineClient>,
}

impl ImageBuilder {
    /// Creates a builder on the shared client.
    #[must_use]
    pub fn new(client: Arc<EngineClient>) -> Self {
        Self { client }
    }

    /// Archives `context_dir` and builds it as `tag`.
    ///
    /// Returns once the build stream has been read to its end; build step
    /// failures reported inside the stream are errors.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Provision` if archiving or building fails.
    pub async fn build(
        &self,
        context_dir: &Path,
        dockerfile: &str,
        tag: &str,
        build_args: HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<StreamSummary> {
        let context_dir = context_dir
            .canonicalize()
            .map_err(|e| HarnessError::provision("image", format!("resolving build context {}: {e}", context_dir.display())))?;

        info!(context = %context_dir.display(), tag, "archiving build context");
        let context = archive_context(context_dir).await?;

        let options = BuildOptions {
            dockerfile: dockerfile.to_string(),
            tags: vec![tag.to_string()],
            build_args,
        };

        let summary = self
            .client
            .image_build(context, &options, cancel)
            .await
            .map_err(|e| HarnessError::provision("image", e))?;

        info!(tag, image_id = ?summary.image_id, "image built");
        Ok(summary)
    }
}

/// Packs a directory into an uncompressed tar archive.
///
/// Entries are stored relative to the directory; symlinks are archived as
/// links, not followed.
///
/// # Errors
///
/// Returns `HarnessError::Provision` if the directory cannot be read.
pub async fn archive_context(dir: PathBuf) -> Result<Bytes> {
    tokio::task::spawn_blocking(move || -> std::io::Result<Vec<u8>> {
        let mut builder = tar::Builder::new(Vec::new());
        builder.follow_symlinks(false);
        builder.append_dir_all(".", &dir)?;
        builder.into_inner()
    })
    .await
    .map_err(|e| HarnessError::provision("image", format!("archive task failed: {e}")))?
    .map(Bytes::from)
    .map_err(|e| HarnessError::provision("image", format!("archiving build context: {e}")))
}
