//! Shared fixtures: recording pipelines and a server on a free port.

use std::{
    io,
    net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
    time::Duration,
};

use pickle_ingest::{
    config::IngestConfig,
    metrics::IngestCounters,
    pipeline::Pipeline,
    server::{PickleServer, ServerError},
    test_helpers::{RecordingDispatcher, RecordingQuarantine},
};
use rstest::fixture;
use tokio::{sync::oneshot, task::JoinHandle};

/// A pipeline wired to recording collaborators.
#[derive(Clone, Debug)]
pub struct Harness {
    /// Pipeline to hand to connections or the server.
    pub pipeline: Pipeline,
    /// Everything the pipeline dispatched.
    pub dispatched: RecordingDispatcher,
    /// Everything the pipeline quarantined.
    pub quarantined: RecordingQuarantine,
    /// Counters shared with the pipeline.
    pub counters: Arc<IngestCounters>,
}

/// Build a [`Harness`] around `config`.
#[must_use]
pub fn harness_with(config: IngestConfig) -> Harness {
    let dispatched = RecordingDispatcher::new();
    let quarantined = RecordingQuarantine::new();
    let counters = Arc::new(IngestCounters::new());
    let pipeline = Pipeline::new(config, Arc::new(dispatched.clone()), Arc::clone(&counters))
        .with_quarantine(Arc::new(quarantined.clone()));
    Harness {
        pipeline,
        dispatched,
        quarantined,
        counters,
    }
}

/// Harness with the default configuration.
#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
pub fn recording_harness() -> Harness { harness_with(IngestConfig::default()) }

/// Create a TCP listener bound to a free local port.
///
/// # Errors
///
/// Returns any IO error encountered while binding to an ephemeral localhost
/// port.
pub fn unused_listener() -> io::Result<StdTcpListener> {
    StdTcpListener::bind(SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0))
}

/// A server running on a background task.
#[derive(Debug)]
pub struct RunningServer {
    /// Address the server accepts connections on.
    pub addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl RunningServer {
    /// Signal shutdown and wait for every connection task to finish.
    ///
    /// # Errors
    ///
    /// Returns the server's error, or a join error if the server task
    /// panicked.
    pub async fn shutdown(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let _ = self.shutdown.send(());
        self.handle.await??;
        Ok(())
    }
}

/// Bind `pipeline` to a free port, start it and wait until it is ready.
///
/// # Errors
///
/// Returns an error if binding fails or the server exits before signalling
/// readiness.
pub async fn spawn_server(
    pipeline: Pipeline,
    workers: usize,
) -> Result<RunningServer, Box<dyn std::error::Error + Send + Sync>> {
    let (ready_tx, ready_rx) = oneshot::channel();
    let (shutdown, shutdown_rx) = oneshot::channel();
    let server = PickleServer::new(pipeline)
        .workers(workers)
        .ready_signal(ready_tx)
        .bind_existing_listener(unused_listener()?)?;
    let addr = server.local_addr().ok_or("server missing local addr")?;
    let handle = tokio::spawn(server.run_with_shutdown(async move {
        let _ = shutdown_rx.await;
    }));
    ready_rx.await?;
    Ok(RunningServer {
        addr,
        shutdown,
        handle,
    })
}

/// Poll `condition` every few milliseconds until it holds or `limit`
/// elapses. Returns whether it held.
///
/// Server-side work happens on other tasks, so tests wait for its effects
/// before signalling shutdown.
pub async fn eventually(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
