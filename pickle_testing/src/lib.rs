//! Utilities for exercising `pickle_ingest` in tests.
//!
//! Re-exports the library's pickle encoder and recording collaborators, and
//! adds helpers that drive a connection over an in-memory duplex stream,
//! start a real server on a free port and capture emitted metrics.
//!
//! ```rust
//! use pickle_ingest::decode::Value;
//! use pickle_testing::{drive_frames, metric_item, pickle_frame, recording_harness};
//!
//! # async fn example() -> std::io::Result<()> {
//! let harness = recording_harness();
//! let frame = pickle_frame(&Value::List(vec![metric_item(
//!     "a.b",
//!     Value::Signed(1),
//!     Value::Signed(2),
//! )]));
//! let outcome = drive_frames(&harness.pipeline, vec![frame]).await?;
//! assert!(outcome.is_ok());
//! assert_eq!(harness.dispatched.lines(), ["a.b 2 1"]);
//! # Ok(())
//! # }
//! ```

pub mod drive;
pub mod fixtures;
pub mod metrics;

pub use drive::{DEFAULT_CAPACITY, drive_bytes, drive_frames, drive_frames_with_capacity};
pub use fixtures::{
    Harness,
    RunningServer,
    eventually,
    harness_with,
    recording_harness,
    spawn_server,
    unused_listener,
};
pub use pickle_ingest::test_helpers::{
    Dispatched,
    Quarantined,
    RecordingDispatcher,
    RecordingQuarantine,
    encode_pickle,
    frame_bytes,
    metric_item,
    pickle_frame,
};

/// Result type for fallible tests.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;
