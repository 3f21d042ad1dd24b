//! Image operations.

use bytes::Bytes;
use hyper::Method;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::client::{EngineClient, Payload};
use crate::error::Result;
use crate::models::{BuildOptions, ImageSummary};
use crate::stream::{drain_progress, StreamSummary};

impl EngineClient {
    /// Lists local images.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot list images.
    pub async fn image_list(&self) -> Result<Vec<ImageSummary>> {
        self.get_json("/images/json").await
    }

    /// Checks whether an image with this tag exists locally.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot list images.
    pub async fn image_exists(&self, reference: &str) -> Result<bool> {
        Ok(self.image_list().await?.iter().any(|i| i.has_tag(reference)))
    }

    /// Pulls an image and waits for the pull to finish.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Stream` if the pull fails part-way, or
    /// `EngineError::Cancelled` if `cancel` fires.
    #[instrument(skip(self, cancel))]
    pub async fn image_pull(
        &self,
        reference: &str,
        cancel: &CancellationToken,
    ) -> Result<StreamSummary> {
        let (image, tag) = split_reference(reference);
        let mut path = format!("/images/create?fromImage={}", urlencoding::encode(image));
        if let Some(tag) = tag {
            path.push_str("&tag=");
            path.push_str(&urlencoding::encode(tag));
        }

        info!("pulling image");
        let response = self.send(Method::POST, &path, Payload::Empty).await?;
        drain_progress(response, cancel, "image pull").await
    }

    /// Builds an image from an uncompressed tar build context.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Stream` if any build step fails, or
    /// `EngineError::Cancelled` if `cancel` fires.
    #[instrument(skip(self, context, cancel), fields(tags = ?options.tags))]
    pub async fn image_build(
        &self,
        context: Bytes,
        options: &BuildOptions,
        cancel: &CancellationToken,
    ) -> Result<StreamSummary> {
        let path = build_path(options)?;
        info!(context_bytes = context.len(), "building image");
        let response = self.send(Method::POST, &path, Payload::Tar(context)).await?;
        drain_progress(response, cancel, "image build").await
    }
}

fn build_path(options: &BuildOptions) -> Result<String> {
    let mut path = String::from("/build?rm=1&forcerm=1");
    if !options.dockerfile.is_empty() {
        path.push_str("&dockerfile=");
        path.push_str(&urlencoding::encode(&options.dockerfile));
    }
    for tag in &options.tags {
        path.push_str("&t=");
        path.push_str(&urlencoding::encode(tag));
    }
    if !options.build_args.is_empty() {
        let args = serde_json::to_string(&options.build_args)?;
        path.push_str("&buildargs=");
        path.push_str(&urlencoding::encode(&args));
    }
    Ok(path)
}

/// Splits `name[:tag]`, leaving registry ports and digests alone.
fn split_reference(reference: &str) -> (&str, Option<&str>) {
    if reference.contains('@') {
        return (reference, None);
    }
    match reference.rfind(':') {
        Some(idx) if !reference[idx + 1..].contains('/') => {
            (&reference[..idx], Some(&reference[idx + 1..]))
        }
        _ => (reference, None),
    }
}
