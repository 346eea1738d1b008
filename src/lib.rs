#![doc(html_root_url = "https://docs.rs/pickle_ingest/latest")]
//! Graphite pickle protocol ingestion.
//!
//! Reads length-prefixed pickle batches from TCP connections, turns each
//! `(path, (timestamp, value))` item into a canonical
//! `"<path> <value> <timestamp>"` line, validates it and hands it to a
//! [`Dispatcher`](dispatch::Dispatcher). Malformed items are counted and
//! skipped; malformed frames end the connection.

pub mod config;
pub mod connection;
pub mod decode;
pub mod dispatch;
pub mod frame;
pub mod metrics;
pub mod normalize;
pub mod order;
pub mod panic;
pub mod pipeline;
pub mod quarantine;
pub mod server;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
pub mod validate;

pub use config::IngestConfig;
pub use connection::{ConnectionError, ConnectionStats, handle_connection};
pub use decode::{BatchDecoder, DecodeError, PickleDecoder, Value};
pub use dispatch::{ChannelDispatcher, Dispatcher, Metric};
pub use metrics::{CounterSnapshot, IngestCounters};
pub use pipeline::{ItemOutcome, Pipeline};
pub use server::{PickleServer, ServerError};
