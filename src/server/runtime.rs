//! Runtime control for [`PickleServer`].

mod accept;

use std::sync::Arc;

#[cfg(test)]
pub(super) use accept::MockAcceptListener;
pub use accept::BackoffConfig;
pub(super) use accept::{AcceptLoopOptions, accept_loop};
use futures::Future;
use log::warn;
use tokio::{select, signal};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{Bound, PickleServer, ServerError};

impl PickleServer<Bound> {
    /// Run the server until Ctrl+C is received.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    ///
    /// use pickle_ingest::{
    ///     config::IngestConfig,
    ///     dispatch::ChannelDispatcher,
    ///     metrics::IngestCounters,
    ///     pipeline::Pipeline,
    ///     server::PickleServer,
    /// };
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), pickle_ingest::server::ServerError> {
    /// let (dispatcher, _rx) = ChannelDispatcher::channel(1024);
    /// let pipeline = Pipeline::new(
    ///     IngestConfig::default(),
    ///     Arc::new(dispatcher),
    ///     Arc::new(IngestCounters::new()),
    /// );
    /// PickleServer::new(pipeline)
    ///     .bind(([127, 0, 0, 1], 2004).into())?
    ///     .run()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// Attempting to run a server without binding fails to compile:
    ///
    /// ```compile_fail
    /// use std::sync::Arc;
    ///
    /// use pickle_ingest::{
    ///     config::IngestConfig,
    ///     dispatch::ChannelDispatcher,
    ///     metrics::IngestCounters,
    ///     pipeline::Pipeline,
    ///     server::PickleServer,
    /// };
    ///
    /// async fn try_run() {
    ///     let (dispatcher, _rx) = ChannelDispatcher::channel(1);
    ///     let pipeline = Pipeline::new(
    ///         IngestConfig::default(),
    ///         Arc::new(dispatcher),
    ///         Arc::new(IngestCounters::new()),
    ///     );
    ///     PickleServer::new(pipeline)
    ///         .run()
    ///         .await
    ///         .expect("unbound servers do not expose run()");
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok`; accept failures are retried with
    /// exponential back-off and connection failures are logged.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await
    }

    /// Run the server until the `shutdown` future resolves.
    ///
    /// Spawns the configured number of accept workers. Once `shutdown`
    /// completes the workers stop accepting, and the call returns after
    /// every in-flight connection has finished.
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok`; accept failures are retried with
    /// exponential back-off and connection failures are logged.
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    pub async fn run_with_shutdown<S>(self, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()> + Send,
    {
        let PickleServer {
            pipeline,
            workers,
            ready_tx,
            backoff_config,
            state: Bound { listener },
        } = self;
        let shutdown_token = CancellationToken::new();
        let tracker = TaskTracker::new();

        for _ in 0..workers {
            tracker.spawn(accept_loop(
                Arc::clone(&listener),
                pipeline.clone(),
                AcceptLoopOptions {
                    shutdown: shutdown_token.clone(),
                    tracker: tracker.clone(),
                    backoff: backoff_config,
                },
            ));
        }
        tracing::info!(
            workers,
            addr = ?listener.local_addr().ok(),
            "listening for pickle connections"
        );

        // Signal readiness after all workers have been spawned.
        if let Some(tx) = ready_tx
            && tx.send(()).is_err()
        {
            warn!("Failed to send readiness signal: receiver dropped");
        }

        select! {
            () = shutdown => shutdown_token.cancel(),
            () = tracker.wait() => {},
        }

        tracker.close();
        tracker.wait().await;
        tracing::info!("server stopped");
        Ok(())
    }
}
