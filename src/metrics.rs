//! Counters and metric helpers for `pickle_ingest`.
//!
//! [`IngestCounters`] is the authoritative, process-wide tally of items the
//! ingest path has seen. It is owned by whoever builds the server and handed
//! to every connection; nothing in the crate resets it. The free functions
//! mirror the same events into the [`metrics`](https://docs.rs/metrics)
//! facade so an installed recorder (for example the Prometheus exporter)
//! can publish them. Without the `metrics` feature they compile to no-ops.

use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking active connections.
pub const CONNECTIONS_ACTIVE: &str = "pickle_connections_active";
/// Name of the counter tracking decoded frames.
pub const FRAMES_DECODED: &str = "pickle_frames_decoded_total";
/// Name of the counter tracking items seen.
pub const ITEMS_TOTAL: &str = "pickle_items_total";
/// Name of the counter tracking invalid items.
pub const ITEMS_INVALID: &str = "pickle_items_invalid_total";
/// Name of the counter tracking out-of-order items.
pub const ITEMS_OUT_OF_ORDER: &str = "pickle_items_out_of_order_total";
/// Name of the counter tracking dispatched items.
pub const ITEMS_DISPATCHED: &str = "pickle_items_dispatched_total";
/// Name of the counter tracking metrics dropped by the dispatcher.
pub const DISPATCH_DROPPED: &str = "pickle_dispatch_dropped_total";
/// Name of the counter tracking connections ended by an error.
pub const CONNECTION_ERRORS: &str = "pickle_connection_errors_total";
/// Name of the counter tracking panics in connection tasks.
pub const CONNECTION_PANICS: &str = "pickle_connection_panics_total";

/// Process-wide ingest counters.
///
/// All counters only ever increase.
#[derive(Debug, Default)]
pub struct IngestCounters {
    items: AtomicU64,
    invalid: AtomicU64,
    out_of_order: AtomicU64,
    dispatched: AtomicU64,
    frames: AtomicU64,
}

/// Point-in-time copy of [`IngestCounters`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Items seen.
    pub items: u64,
    /// Items rejected by shape, type or validation checks.
    pub invalid: u64,
    /// Items rejected by the order checker.
    pub out_of_order: u64,
    /// Items handed to the dispatcher.
    pub dispatched: u64,
    /// Frames decoded.
    pub frames: u64,
}

impl IngestCounters {
    /// Create a zeroed counter set.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    pub(crate) fn item_seen(&self) {
        self.items.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        counter!(ITEMS_TOTAL).increment(1);
    }

    pub(crate) fn item_invalid(&self) {
        self.invalid.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        counter!(ITEMS_INVALID).increment(1);
    }

    pub(crate) fn item_out_of_order(&self) {
        self.out_of_order.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        counter!(ITEMS_OUT_OF_ORDER).increment(1);
    }

    pub(crate) fn item_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        counter!(ITEMS_DISPATCHED).increment(1);
    }

    pub(crate) fn frame_decoded(&self) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        counter!(FRAMES_DECODED).increment(1);
    }

    /// Read every counter.
    ///
    /// The counters are read independently, so a snapshot taken while
    /// connections are active may mix values from slightly different
    /// moments.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            items: self.items.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
            out_of_order: self.out_of_order.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            frames: self.frames.load(Ordering::Relaxed),
        }
    }
}

/// Increment the active connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the active connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a connection that ended with an error of the given kind.
pub fn inc_connection_errors(kind: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(CONNECTION_ERRORS, "kind" => kind).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}

/// Record a panic in a connection task.
pub fn inc_connection_panics() {
    #[cfg(feature = "metrics")]
    counter!(CONNECTION_PANICS).increment(1);
}

/// Record a metric dropped by the dispatcher.
pub fn inc_dispatch_dropped() {
    #[cfg(feature = "metrics")]
    counter!(DISPATCH_DROPPED).increment(1);
}
