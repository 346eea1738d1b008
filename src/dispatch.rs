//! Hand-off of accepted metrics to downstream routing.
//!
//! Dispatch runs inline on the connection task, so a [`Dispatcher`] must
//! return promptly: a blocking implementation stalls the read loop of the
//! connection that called it.

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::metrics;

/// A validated metric on its way downstream.
#[derive(Clone, Debug, PartialEq)]
pub struct Metric {
    /// The canonical `"<key> <value> <timestamp>"` line.
    pub line: Bytes,
    /// Parsed value.
    pub value: f64,
    /// Parsed unix timestamp.
    pub timestamp: u32,
}

/// Receives metrics that passed validation.
pub trait Dispatcher: Send + Sync {
    /// Forward a metric. Fire and forget; must not block.
    fn dispatch(&self, line: &[u8], value: f64, timestamp: u32);
}

/// [`Dispatcher`] backed by a bounded Tokio channel.
///
/// When the consumer falls behind and the channel is full, metrics are
/// dropped and counted rather than stalling the connection.
#[derive(Clone, Debug)]
pub struct ChannelDispatcher {
    tx: mpsc::Sender<Metric>,
}

impl ChannelDispatcher {
    /// Create a dispatcher and the receiver that drains it.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Metric>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl Dispatcher for ChannelDispatcher {
    fn dispatch(&self, line: &[u8], value: f64, timestamp: u32) {
        let metric = Metric {
            line: Bytes::copy_from_slice(line),
            value,
            timestamp,
        };
        match self.tx.try_send(metric) {
            Ok(()) => {}
            Err(TrySendError::Full(metric)) => {
                metrics::inc_dispatch_dropped();
                tracing::warn!(
                    line = %String::from_utf8_lossy(&metric.line),
                    "dispatch queue full, dropping metric"
                );
            }
            Err(TrySendError::Closed(_)) => {
                metrics::inc_dispatch_dropped();
                tracing::warn!("dispatch queue closed, dropping metric");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forwards_metrics_in_order() {
        let (dispatcher, mut rx) = ChannelDispatcher::channel(4);
        dispatcher.dispatch(b"a 1 1", 1.0, 1);
        dispatcher.dispatch(b"b 2 2", 2.0, 2);

        let first = rx.recv().await.expect("first metric");
        let second = rx.recv().await.expect("second metric");
        assert_eq!(first.line.as_ref(), b"a 1 1");
        assert_eq!(second.timestamp, 2);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let (dispatcher, mut rx) = ChannelDispatcher::channel(1);
        dispatcher.dispatch(b"a 1 1", 1.0, 1);
        dispatcher.dispatch(b"b 2 2", 2.0, 2);

        assert_eq!(rx.recv().await.map(|m| m.timestamp), Some(1));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_queue_is_tolerated() {
        let (dispatcher, rx) = ChannelDispatcher::channel(1);
        drop(rx);
        dispatcher.dispatch(b"a 1 1", 1.0, 1);
    }
}
