//! Quarantine for rejected metrics.
//!
//! Rejected lines are recorded per key so operators can inspect what a
//! client is getting wrong without the relay forwarding it.

use std::{
    fmt,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use dashmap::DashMap;
use tokio::time::Instant;

/// Receives observations that failed validation or ordering.
pub trait QuarantineSink: Send + Sync {
    /// Record a rejected line. Must not block.
    fn record(&self, key: &str, line: &[u8], error: &(dyn std::error::Error + Send + Sync));
}

/// Most recent rejection recorded for a key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BadMetric {
    /// Metric key, possibly empty when none could be extracted.
    pub key: String,
    /// The last rejected line, lossily decoded.
    pub last_line: String,
    /// Rendered error for the last rejection.
    pub last_error: String,
    /// Rejections recorded for this key.
    pub count: u64,
    /// When the last rejection was recorded.
    pub last_seen: Instant,
}

/// How long a key is kept after its last rejection by default.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60 * 60);
/// Number of distinct keys kept by default.
pub const DEFAULT_MAX_KEYS: usize = 10_000;

/// In-memory [`QuarantineSink`] keeping the latest rejection per key.
///
/// Records older than `max_age` are pruned while recording, at most once per
/// `max_age` or whenever the map is full. When every slot holds a live
/// record, rejections for new keys are logged and not stored.
pub struct BadMetrics {
    records: DashMap<String, BadMetric>,
    max_age: Duration,
    max_keys: usize,
    last_prune: Mutex<Instant>,
}

impl Default for BadMetrics {
    fn default() -> Self { Self::with_limits(DEFAULT_MAX_AGE, DEFAULT_MAX_KEYS) }
}

impl BadMetrics {
    /// Create an empty quarantine with the default limits.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Create an empty quarantine keeping at most `max_keys` keys, each for
    /// `max_age` after its last rejection.
    #[must_use]
    pub fn with_limits(max_age: Duration, max_keys: usize) -> Self {
        Self {
            records: DashMap::new(),
            max_age,
            max_keys: max_keys.max(1),
            last_prune: Mutex::new(Instant::now()),
        }
    }

    /// Age after which records are pruned.
    #[must_use]
    pub fn max_age(&self) -> Duration { self.max_age }

    /// Drop records older than `max_age`.
    pub fn prune(&self) {
        let now = Instant::now();
        self.records
            .retain(|_, record| now.saturating_duration_since(record.last_seen) <= self.max_age);
        *self.last_prune.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    fn prune_due(&self, now: Instant) -> bool {
        let last = *self.last_prune.lock().unwrap_or_else(PoisonError::into_inner);
        self.records.len() >= self.max_keys
            || now.saturating_duration_since(last) >= self.max_age
    }

    /// Records seen within `max_age`, most recent first.
    ///
    /// Older records are evicted as a side effect.
    #[must_use]
    pub fn snapshot(&self, max_age: Duration) -> Vec<BadMetric> {
        let now = Instant::now();
        self.records
            .retain(|_, record| now.saturating_duration_since(record.last_seen) <= max_age);
        let mut out: Vec<BadMetric> = self.records.iter().map(|r| r.value().clone()).collect();
        out.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        out
    }

    /// Record for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<BadMetric> {
        self.records.get(key).map(|r| r.value().clone())
    }

    /// Number of distinct keys with a recorded rejection.
    #[must_use]
    pub fn len(&self) -> usize { self.records.len() }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.records.is_empty() }
}

impl fmt::Debug for BadMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BadMetrics")
            .field("keys", &self.records.len())
            .field("max_age", &self.max_age)
            .field("max_keys", &self.max_keys)
            .finish()
    }
}

impl QuarantineSink for BadMetrics {
    fn record(&self, key: &str, line: &[u8], error: &(dyn std::error::Error + Send + Sync)) {
        let last_line = String::from_utf8_lossy(line).into_owned();
        let last_error = error.to_string();
        tracing::debug!(key, line = %last_line, error = %last_error, "metric quarantined");
        let now = Instant::now();
        if !self.records.contains_key(key) {
            if self.prune_due(now) {
                self.prune();
            }
            if self.records.len() >= self.max_keys {
                tracing::debug!(key, "quarantine full, not recording key");
                return;
            }
        }
        self.records
            .entry(key.to_owned())
            .and_modify(|record| {
                record.last_line.clone_from(&last_line);
                record.last_error.clone_from(&last_error);
                record.count += 1;
                record.last_seen = now;
            })
            .or_insert_with(|| BadMetric {
                key: key.to_owned(),
                last_line: last_line.clone(),
                last_error: last_error.clone(),
                count: 1,
                last_seen: now,
            });
    }
}
