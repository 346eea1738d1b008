//! Error types for the frame reader.
//!
//! Every variant is fatal to the connection it was raised on: the pickle
//! framing protocol has no resynchronisation marker, so once the reader
//! loses its place in the stream nothing after that point can be trusted.

use std::{io, time::Duration};

use thiserror::Error;

/// EOF variants that indicate a premature disconnect.
///
/// A clean close at a frame boundary is not an error and is reported by
/// [`FrameReader::next_frame`](super::FrameReader::next_frame) returning
/// `Ok(None)`.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EofError {
    /// EOF received while the 4-byte length prefix was being read.
    #[error("premature EOF during header: {bytes_received} of {header_size} header bytes")]
    MidHeader {
        /// Header bytes received before EOF.
        bytes_received: usize,
        /// Expected header size.
        header_size: usize,
    },

    /// EOF received after the header but before the payload completed.
    #[error("premature EOF: {bytes_received} bytes of {expected} byte frame received")]
    MidFrame {
        /// Payload bytes received before EOF.
        bytes_received: usize,
        /// Payload length announced by the header.
        expected: usize,
    },
}

/// Errors raised while extracting frames from a connection.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The length prefix announces a payload larger than the configured cap.
    #[error("payload length of {size} is more than the supported maximum {max}")]
    Oversized {
        /// Announced payload length.
        size: usize,
        /// Configured maximum payload length.
        max: usize,
    },

    /// The payload does not start with `0x80 <proto> ']'`.
    #[error("invalid payload prefix: {found:02x?}")]
    InvalidPrefix {
        /// The bytes found where the marker was expected.
        found: Vec<u8>,
    },

    /// The peer closed the connection part way through a frame.
    #[error(transparent)]
    Eof(#[from] EofError),

    /// No bytes arrived within the configured read timeout.
    #[error("no data received for {0:?}")]
    Timeout(Duration),

    /// Transport failure while reading.
    #[error("couldn't read from connection: {0}")]
    Io(#[from] io::Error),
}

impl FrameError {
    /// Short label used for logs and the connection error metric.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Oversized { .. } => "oversized",
            Self::InvalidPrefix { .. } => "prefix",
            Self::Eof(_) => "eof",
            Self::Timeout(_) => "timeout",
            Self::Io(_) => "io",
        }
    }
}
