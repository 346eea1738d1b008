//! Builder methods for [`PickleServer`].

use tokio::sync::oneshot;

use super::{BackoffConfig, PickleServer, ServerState, Unbound};
use crate::pipeline::Pipeline;

pub mod binding;


impl PickleServer<Unbound> {
    /// Create a server that feeds every connection into `pipeline`.
    ///
    /// The worker count defaults to the number of available CPU cores (or 1
    /// if this cannot be determined). Call [`bind`](Self::bind) before
    /// running the server.
    #[must_use]
    pub fn new(pipeline: Pipeline) -> Self {
        let workers = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self {
            pipeline,
            workers,
            ready_tx: None,
            backoff_config: BackoffConfig::default(),
            state: Unbound,
        }
    }
}

impl<S> PickleServer<S>
where
    S: ServerState,
{
    /// Set the number of accept workers, clamped to at least one.
    #[must_use]
    pub fn workers(mut self, count: usize) -> Self {
        self.workers = count.max(1);
        self
    }

    /// Configure a channel used to signal when the server is ready to
    /// accept connections.
    #[must_use]
    pub fn ready_signal(mut self, tx: oneshot::Sender<()>) -> Self {
        self.ready_tx = Some(tx);
        self
    }

    /// Configure the exponential back-off applied after failed accepts.
    ///
    /// The values are normalised by [`BackoffConfig::normalized`].
    #[must_use]
    pub fn accept_backoff(mut self, cfg: BackoffConfig) -> Self {
        self.backoff_config = cfg.normalized();
        self
    }

    /// Returns the configured number of worker tasks.
    #[inline]
    #[must_use]
    pub const fn worker_count(&self) -> usize { self.workers }

    /// Returns the accept back-off configuration.
    #[inline]
    #[must_use]
    pub const fn backoff_config(&self) -> BackoffConfig { self.backoff_config }

    /// Returns the pipeline shared by every connection.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline { &self.pipeline }
}
