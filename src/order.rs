//! Per-key timestamp ordering.

use dashmap::{DashMap, mapref::entry::Entry};
use thiserror::Error;

/// A timestamp that does not advance past the last accepted one.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("out of order: timestamp {timestamp} is not after {last}")]
pub struct OrderError {
    /// Rejected timestamp.
    pub timestamp: u32,
    /// Last timestamp accepted for the key.
    pub last: u32,
}

/// Checks that timestamps advance per key.
///
/// Implementations are stateful for the life of the process and shared by
/// every connection.
pub trait OrderChecker: Send + Sync {
    /// Record `timestamp` for `key` if it advances.
    ///
    /// # Errors
    ///
    /// Returns an [`OrderError`] if `timestamp` does not advance past the
    /// last accepted timestamp for `key`.
    fn check_order(&self, key: &str, timestamp: u32) -> Result<(), OrderError>;
}

/// Tracks the last accepted timestamp per key and requires each new one to
/// be strictly greater.
#[derive(Debug, Default)]
pub struct LastSeenOrder {
    seen: DashMap<String, u32>,
}

impl LastSeenOrder {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Number of keys tracked.
    #[must_use]
    pub fn len(&self) -> usize { self.seen.len() }

    /// Whether no key has been seen yet.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.seen.is_empty() }
}

impl OrderChecker for LastSeenOrder {
    fn check_order(&self, key: &str, timestamp: u32) -> Result<(), OrderError> {
        if let Some(mut last) = self.seen.get_mut(key) {
            if timestamp <= *last {
                return Err(OrderError {
                    timestamp,
                    last: *last,
                });
            }
            *last = timestamp;
            return Ok(());
        }
        // Two connections may race to insert the same key; the entry lock
        // settles which of them wins.
        match self.seen.entry(key.to_owned()) {
            Entry::Occupied(mut entry) => {
                let last = *entry.get();
                if timestamp <= last {
                    return Err(OrderError { timestamp, last });
                }
                entry.insert(timestamp);
            }
            Entry::Vacant(entry) => {
                entry.insert(timestamp);
            }
        }
        Ok(())
    }
}
