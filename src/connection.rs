//! Per-connection read loop.
//!
//! Reads frames, decodes each into a batch and feeds the items to the
//! [`Pipeline`] strictly in arrival order. Any frame or decode error ends
//! the loop: the stream has no resynchronisation marker, so reading past a
//! bad frame would only produce garbage.

use thiserror::Error;
use tokio::io::AsyncRead;

use crate::{
    decode::{DecodeError, decode_batch},
    frame::{FrameError, FrameReader},
    pipeline::Pipeline,
};

/// Why a connection loop stopped early.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The frame reader failed.
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// A payload could not be decoded into a batch.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl ConnectionError {
    /// Short label used for logs and the connection error metric.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Frame(e) => e.error_type(),
            Self::Decode(DecodeError::Shape { .. }) => "shape",
            Self::Decode(_) => "decode",
        }
    }
}

/// Summary of a connection that closed cleanly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Frames read and decoded.
    pub frames: u64,
    /// Items handed to the pipeline.
    pub items: u64,
}

/// Drive `stream` until the peer closes it or an error occurs.
///
/// Returns `Ok` when the peer closes the stream on a frame boundary, or
/// when the decoder runs out of input cleanly.
///
/// # Errors
///
/// Returns a [`ConnectionError`] for oversized frames, bad payload markers,
/// truncated or failed reads, idle timeouts, undecodable payloads and
/// payloads whose top level is not a sequence.
pub async fn handle_connection<R>(
    stream: R,
    pipeline: &Pipeline,
) -> Result<ConnectionStats, ConnectionError>
where
    R: AsyncRead + Unpin,
{
    let mut reader = FrameReader::new(stream, pipeline.config().frame_limits());
    let mut stats = ConnectionStats::default();
    while let Some(frame) = reader.next_frame().await? {
        let items = match decode_batch(pipeline.decoder(), frame.payload()) {
            Ok(items) => items,
            Err(DecodeError::EndOfInput) => {
                tracing::debug!("nothing more to decode, closing connection");
                break;
            }
            Err(e) => return Err(e.into()),
        };
        tracing::trace!(items = items.len(), "decoded batch");
        stats.frames += 1;
        stats.items += items.len() as u64;
        pipeline.process_batch(&items);
    }
    Ok(stats)
}
