//! Ingest configuration.
//!
//! [`IngestConfig`] gathers the limits applied to the wire and the policy
//! handed to the validation pipeline. Defaults match the carbon relay:
//! 500 MiB frames, 4 KiB read chunks, no idle timeout, no order checking
//! and medium validation.

use std::time::Duration;

use crate::{
    frame::{DEFAULT_CHUNK_SIZE, FrameLimits, MAX_FRAME_LENGTH},
    validate::{LegacyLevel, M20Level},
};

/// Per-server ingest settings, shared by every connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IngestConfig {
    /// Largest frame payload accepted.
    pub max_frame_length: usize,
    /// Scratch buffer size used while reading payloads.
    pub chunk_size: usize,
    /// Close connections that send nothing for this long.
    pub read_timeout: Option<Duration>,
    /// Reject timestamps that do not advance per key.
    pub validate_order: bool,
    /// Key policy for plain dotted keys.
    pub legacy_level: LegacyLevel,
    /// Key policy for metrics 2.0 keys.
    pub m20_level: M20Level,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_frame_length: MAX_FRAME_LENGTH,
            chunk_size: DEFAULT_CHUNK_SIZE,
            read_timeout: None,
            validate_order: false,
            legacy_level: LegacyLevel::default(),
            m20_level: M20Level::default(),
        }
    }
}

impl IngestConfig {
    /// Set the maximum frame payload length, clamped to at least one byte.
    #[must_use]
    pub fn max_frame_length(mut self, len: usize) -> Self {
        self.max_frame_length = len.max(1);
        self
    }

    /// Set the read chunk size, clamped to at least one byte.
    #[must_use]
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Set the idle read timeout. `None` disables it.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Enable or disable per-key order checking.
    #[must_use]
    pub fn validate_order(mut self, enabled: bool) -> Self {
        self.validate_order = enabled;
        self
    }

    /// Set both validation levels.
    #[must_use]
    pub fn validation_levels(mut self, legacy: LegacyLevel, m20: M20Level) -> Self {
        self.legacy_level = legacy;
        self.m20_level = m20;
        self
    }

    /// Frame reader limits derived from this configuration.
    #[must_use]
    pub fn frame_limits(&self) -> FrameLimits {
        FrameLimits {
            max_frame_length: self.max_frame_length,
            chunk_size: self.chunk_size,
            read_timeout: self.read_timeout,
        }
    }
}
