//! Length-prefixed frame extraction for pickle streams.
//!
//! Each frame on the wire is a 4-byte big-endian payload length followed by
//! exactly that many payload bytes. The payload is a pickle that must open
//! with `PROTO <version> EMPTY_LIST`; the reader checks those three bytes
//! before it commits to buffering the body so that obviously foreign
//! streams are rejected without a large allocation.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

pub mod error;

pub use error::{EofError, FrameError};

/// Size of the big-endian length prefix.
pub const LENGTH_HEADER_SIZE: usize = 4;

/// Largest payload accepted by default (500 MiB).
pub const MAX_FRAME_LENGTH: usize = 500 * 1024 * 1024;

/// Default capacity of the scratch buffer used while reading a payload.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Number of payload bytes inspected by the prefix check.
pub const PAYLOAD_MARKER_LEN: usize = 3;

const PICKLE_PROTO: u8 = 0x80;
const PICKLE_EMPTY_LIST: u8 = b']';

/// Return `true` when `prefix` matches `0x80 <any> ']'`.
///
/// # Examples
///
/// ```
/// use pickle_ingest::frame::has_payload_marker;
///
/// assert!(has_payload_marker(&[0x80, 0x02, b']']));
/// assert!(!has_payload_marker(&[0x80, 0x02, b'(']));
/// assert!(!has_payload_marker(&[0x80, 0x02]));
/// ```
#[must_use]
pub fn has_payload_marker(prefix: &[u8]) -> bool {
    matches!(prefix, [PICKLE_PROTO, _, PICKLE_EMPTY_LIST, ..])
}

#[expect(
    clippy::big_endian_bytes,
    reason = "Pickle frames carry a network-order length prefix."
)]
fn read_length(bytes: [u8; LENGTH_HEADER_SIZE]) -> u32 { u32::from_be_bytes(bytes) }

/// Limits applied by a [`FrameReader`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameLimits {
    /// Maximum payload length accepted.
    pub max_frame_length: usize,
    /// Capacity of the scratch buffer used to read payloads.
    pub chunk_size: usize,
    /// Optional idle timeout applied to every read from the transport.
    pub read_timeout: Option<Duration>,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_frame_length: MAX_FRAME_LENGTH,
            chunk_size: DEFAULT_CHUNK_SIZE,
            read_timeout: None,
        }
    }
}

/// A single payload extracted from the stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    payload: Bytes,
}

impl Frame {
    /// Payload bytes, without the length prefix.
    #[must_use]
    pub fn payload(&self) -> &[u8] { &self.payload }

    /// Consume the frame and return its payload.
    #[must_use]
    pub fn into_payload(self) -> Bytes { self.payload }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize { self.payload.len() }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.payload.is_empty() }
}

/// Reads successive frames from an async byte stream.
///
/// The transport is wrapped in a [`BufReader`] of [`FrameLimits::chunk_size`]
/// bytes so that header and prefix reads do not each cost a syscall. The
/// prefix peek is served from a separate read-ahead buffer of at most three
/// bytes. Payload bytes are pulled through a scratch chunk of at most
/// `chunk_size` bytes which is allocated per frame and reused for every read
/// inside it.
pub struct FrameReader<R> {
    inner: BufReader<R>,
    pending: BytesMut,
    limits: FrameLimits,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Wrap `inner` with the given limits.
    pub fn new(inner: R, limits: FrameLimits) -> Self {
        let limits = FrameLimits {
            chunk_size: limits.chunk_size.max(1),
            ..limits
        };
        Self {
            inner: BufReader::with_capacity(limits.chunk_size, inner),
            pending: BytesMut::with_capacity(LENGTH_HEADER_SIZE),
            limits,
        }
    }

    /// Limits in effect for this reader.
    #[must_use]
    pub fn limits(&self) -> &FrameLimits { &self.limits }

    /// Consume the reader and return the underlying stream.
    pub fn into_inner(self) -> R { self.inner.into_inner() }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` when the peer closes the stream on a frame
    /// boundary.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] if the header announces an oversized
    /// payload, the payload marker does not match, the stream ends part way
    /// through a frame, the read timeout elapses or the transport fails.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        tracing::trace!("detecting payload length");
        if !self.fill(LENGTH_HEADER_SIZE).await? {
            if self.pending.is_empty() {
                tracing::debug!("EOF while detecting payload length");
                return Ok(None);
            }
            return Err(EofError::MidHeader {
                bytes_received: self.pending.len(),
                header_size: LENGTH_HEADER_SIZE,
            }
            .into());
        }
        let mut header = [0_u8; LENGTH_HEADER_SIZE];
        header.copy_from_slice(&self.pending.split_to(LENGTH_HEADER_SIZE));
        let length = read_length(header) as usize;
        tracing::trace!(length, "payload length detected");

        if length > self.limits.max_frame_length {
            return Err(FrameError::Oversized {
                size: length,
                max: self.limits.max_frame_length,
            });
        }

        self.check_marker(length).await?;
        let payload = self.read_payload(length).await?;
        tracing::trace!(length, "done reading payload");
        Ok(Some(Frame { payload }))
    }

    /// Peek at the marker bytes without consuming them.
    async fn check_marker(&mut self, length: usize) -> Result<(), FrameError> {
        let want = PAYLOAD_MARKER_LEN.min(length);
        if !self.fill(want).await? {
            return Err(EofError::MidFrame {
                bytes_received: self.pending.len(),
                expected: length,
            }
            .into());
        }
        let available = self.pending.len().min(want);
        let prefix = &self.pending[..available];
        if length < PAYLOAD_MARKER_LEN || !has_payload_marker(prefix) {
            return Err(FrameError::InvalidPrefix {
                found: prefix.to_vec(),
            });
        }
        Ok(())
    }

    async fn read_payload(&mut self, length: usize) -> Result<Bytes, FrameError> {
        let mut payload = BytesMut::with_capacity(length.min(self.limits.chunk_size));
        let buffered = self.pending.len().min(length);
        payload.extend_from_slice(&self.pending.split_to(buffered));

        let mut chunk = vec![0_u8; self.limits.chunk_size.min(length)];
        while payload.len() < length {
            let to_read = (length - payload.len()).min(chunk.len());
            let n = self.read_some(&mut chunk[..to_read]).await?;
            if n == 0 {
                return Err(EofError::MidFrame {
                    bytes_received: payload.len(),
                    expected: length,
                }
                .into());
            }
            payload.extend_from_slice(&chunk[..n]);
        }
        Ok(payload.freeze())
    }

    /// Top up the read-ahead buffer until it holds `want` bytes.
    ///
    /// Returns `false` if the stream ended first.
    async fn fill(&mut self, want: usize) -> Result<bool, FrameError> {
        while self.pending.len() < want {
            let mut chunk = [0_u8; LENGTH_HEADER_SIZE];
            let n = self.read_some(&mut chunk[..want - self.pending.len()]).await?;
            if n == 0 {
                return Ok(false);
            }
            self.pending.extend_from_slice(&chunk[..n]);
        }
        Ok(true)
    }

    async fn read_some(&mut self, buf: &mut [u8]) -> Result<usize, FrameError> {
        match self.limits.read_timeout {
            Some(limit) => tokio::time::timeout(limit, self.inner.read(buf))
                .await
                .map_err(|_| FrameError::Timeout(limit))?
                .map_err(FrameError::from),
            None => self.inner.read(buf).await.map_err(FrameError::from),
        }
    }
}
