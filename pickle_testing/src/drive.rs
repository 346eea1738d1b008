//! In-memory connection driving.

use std::io;

use futures::FutureExt as _;
use pickle_ingest::{
    connection::{ConnectionError, ConnectionStats, handle_connection},
    panic::format_panic,
    pipeline::Pipeline,
};
use tokio::io::{AsyncWriteExt, duplex};

/// Duplex buffer size used by [`drive_frames`].
pub const DEFAULT_CAPACITY: usize = 4096;

/// Run [`handle_connection`] on the server half of a duplex stream while
/// the client half writes `frames` in order and then closes.
///
/// The outer `io::Result` reports failures of the harness itself: a failed
/// client write, or a panic inside the connection loop (surfaced as an
/// error whose message begins with `"connection task failed"`). The inner
/// result is whatever the connection loop returned.
///
/// # Errors
///
/// Returns an [`io::Error`] if writing to the duplex stream fails or the
/// connection loop panics.
pub async fn drive_frames(
    pipeline: &Pipeline,
    frames: Vec<Vec<u8>>,
) -> io::Result<Result<ConnectionStats, ConnectionError>> {
    drive_frames_with_capacity(pipeline, frames, DEFAULT_CAPACITY).await
}

/// Variant of [`drive_frames`] with an explicit duplex capacity.
///
/// Small capacities force the reader to see partial headers and payloads.
///
/// # Errors
///
/// See [`drive_frames`].
pub async fn drive_frames_with_capacity(
    pipeline: &Pipeline,
    frames: Vec<Vec<u8>>,
    capacity: usize,
) -> io::Result<Result<ConnectionStats, ConnectionError>> {
    let (mut client, server) = duplex(capacity.max(1));

    let server_fut = async {
        std::panic::AssertUnwindSafe(handle_connection(server, pipeline))
            .catch_unwind()
            .await
            .map_err(|panic| {
                io::Error::other(format!(
                    "connection task failed: {}",
                    format_panic(panic.as_ref())
                ))
            })
    };

    let client_fut = async {
        for frame in &frames {
            // The server may stop reading after a fatal frame; a broken pipe
            // from then on is expected and not a harness failure.
            if let Err(e) = client.write_all(frame).await {
                if e.kind() == io::ErrorKind::BrokenPipe {
                    return Ok(());
                }
                return Err(e);
            }
        }
        client.shutdown().await
    };

    let (outcome, ()) = tokio::try_join!(server_fut, client_fut)?;
    Ok(outcome)
}

/// Drive a connection with one raw byte buffer.
///
/// # Errors
///
/// See [`drive_frames`].
pub async fn drive_bytes(
    pipeline: &Pipeline,
    bytes: Vec<u8>,
) -> io::Result<Result<ConnectionStats, ConnectionError>> {
    drive_frames(pipeline, vec![bytes]).await
}
