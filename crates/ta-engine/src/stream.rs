//! Response stream handling.
//!
//! Pull and build report progress as newline-delimited JSON; a failure is
//! reported in-band, so the HTTP status alone says nothing about success.
//! Container logs come either raw (TTY) or multiplexed in 8-byte framed
//! chunks.

use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::Response;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{EngineError, Result};
use crate::models::ProgressMessage;

/// Summary of a fully drained progress stream.
#[derive(Debug, Clone, Default)]
pub struct StreamSummary {
    /// Number of messages decoded.
    pub messages: usize,
    /// Last `status` or `stream` text seen.
    pub last_status: Option<String>,
    /// Image id announced through an `aux` message, if any.
    pub image_id: Option<String>,
}

/// Incrementally decodes newline-delimited progress messages.
#[derive(Debug, Default)]
pub struct ProgressDecoder {
    buffer: Vec<u8>,
    summary: StreamSummary,
}

impl ProgressDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk of the body.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Stream` as soon as a complete message reports
    /// a failure.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(chunk);
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.decode_line(&line)?;
        }
        Ok(())
    }

    /// Flushes any trailing message without a newline and returns the summary.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Stream` if the trailing message reports a failure.
    pub fn finish(mut self) -> Result<StreamSummary> {
        let rest = std::mem::take(&mut self.buffer);
        self.decode_line(&rest)?;
        Ok(self.summary)
    }

    fn decode_line(&mut self, line: &[u8]) -> Result<()> {
        let line = trim_ascii(line);
        if line.is_empty() {
            return Ok(());
        }

        // Non-JSON noise is tolerated; only decoded messages can carry errors.
        let Ok(message) = serde_json::from_slice::<ProgressMessage>(line) else {
            trace!(line = %String::from_utf8_lossy(line), "skipping undecodable progress line");
            return Ok(());
        };

        self.summary.messages += 1;

        if let Some(failure) = message.failure() {
            return Err(EngineError::Stream(failure.trim().to_string()));
        }

        if let Some(text) = message.status.as_deref().or(message.stream.as_deref()) {
            let text = text.trim();
            if !text.is_empty() {
                trace!(progress = %text);
                self.summary.last_status = Some(text.to_string());
            }
        }

        if let Some(id) = message
            .aux
            .as_ref()
            .and_then(|a| a.get("ID"))
            .and_then(|v| v.as_str())
        {
            self.summary.image_id = Some(id.to_string());
        }

        Ok(())
    }
}

/// Reads a progress stream to its end.
///
/// Draining is the completion signal for pull and build. The read is
/// abandoned with `EngineError::Cancelled` once `cancel` fires.
pub(crate) async fn drain_progress(
    response: Response<Incoming>,
    cancel: &CancellationToken,
    operation: &str,
) -> Result<StreamSummary> {
    let mut body = response.into_body();
    let mut decoder = ProgressDecoder::new();

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(operation, "progress stream cancelled");
                return Err(EngineError::Cancelled(operation.to_string()));
            }

            frame = body.frame() => {
                match frame {
                    Some(Ok(frame)) => {
                        if let Some(data) = frame.data_ref() {
                            decoder.feed(data)?;
                        }
                    }
                    Some(Err(e)) => {
                        return Err(EngineError::Http(format!("{operation} stream failed: {e}")));
                    }
                    None => break,
                }
            }
        }
    }

    let summary = decoder.finish()?;
    debug!(operation, messages = summary.messages, "progress stream drained");
    Ok(summary)
}

/// Turns a logs response body into text.
///
/// Containers without a TTY get their output multiplexed into frames:
/// `[stream_type (1 byte)][padding (3 bytes)][size (4 bytes BE)][data]`.
/// Raw TTY output is returned as-is.
#[must_use]
pub fn demux_logs(raw: &[u8]) -> String {
    if !looks_multiplexed(raw) {
        return String::from_utf8_lossy(raw).into_owned();
    }

    let mut out = Vec::with_capacity(raw.len());
    let mut rest = raw;
    while let Some((_, content)) = extract_log_frame(rest) {
        out.extend_from_slice(content);
        rest = &rest[8 + content.len()..];
    }
    // A truncated trailing frame is kept verbatim rather than dropped.
    out.extend_from_slice(rest);
    String::from_utf8_lossy(&out).into_owned()
}

fn looks_multiplexed(raw: &[u8]) -> bool {
    raw.len() >= 8 && raw[0] <= 2 && raw[1..4] == [0, 0, 0] && extract_log_frame(raw).is_some()
}

/// Extracts a single log frame from a buffer.
///
/// Returns (stream_type, content) if a complete frame is available.
fn extract_log_frame(buffer: &[u8]) -> Option<(u8, &[u8])> {
    if buffer.len() < 8 {
        return None;
    }

    let stream_type = buffer[0];
    let size = u32::from_be_bytes([buffer[4], buffer[5], buffer[6], buffer[7]]) as usize;

    let frame_end = 8 + size;
    if buffer.len() < frame_end {
        return None;
    }

    Some((stream_type, &buffer[8..frame_end]))
}

fn trim_ascii(mut bytes: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = bytes {
        if first.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    while let [rest @ .., last] = bytes {
        if last.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    bytes
}
