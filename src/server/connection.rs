//! Connection task spawning for [`PickleServer`](super::PickleServer).

use std::net::SocketAddr;

use futures::FutureExt;
use log::warn;
use tokio::net::TcpStream;
use tokio_util::task::TaskTracker;

use crate::{connection::handle_connection, metrics, panic::format_panic, pipeline::Pipeline};

/// Spawn a task to process a single TCP connection, logging and discarding
/// any panics.
pub(super) fn spawn_connection_task(stream: TcpStream, pipeline: Pipeline, tracker: &TaskTracker) {
    let peer_addr = match stream.peer_addr() {
        Ok(addr) => Some(addr),
        Err(e) => {
            warn!("Failed to retrieve peer address: error={e}");
            None
        }
    };
    tracker.spawn(async move {
        metrics::inc_connections();
        let fut = std::panic::AssertUnwindSafe(process_stream(stream, peer_addr, &pipeline))
            .catch_unwind();
        let result = fut.await;
        metrics::dec_connections();

        if let Err(panic) = result {
            metrics::inc_connection_panics();
            let panic_msg = format_panic(panic.as_ref());
            tracing::error!(panic = %panic_msg, ?peer_addr, "connection task panicked");
        }
    });
}

async fn process_stream(stream: TcpStream, peer_addr: Option<SocketAddr>, pipeline: &Pipeline) {
    tracing::debug!(?peer_addr, "connection accepted");
    match handle_connection(stream, pipeline).await {
        Ok(stats) => {
            tracing::debug!(
                ?peer_addr,
                frames = stats.frames,
                items = stats.items,
                "connection closed"
            );
        }
        Err(e) => {
            let kind = e.error_type();
            metrics::inc_connection_errors(kind);
            tracing::warn!(kind = %kind, error = %e, ?peer_addr, "connection closed with error");
        }
    }
}
