//! Tokio-based TCP server for pickle streams.
//!
//! [`PickleServer`] spawns worker tasks that accept TCP connections and
//! run each one through [`handle_connection`](crate::connection::handle_connection)
//! on its own task, sharing a single [`Pipeline`].

use std::sync::Arc;

use tokio::{net::TcpListener, sync::oneshot};

use crate::pipeline::Pipeline;

/// TCP server feeding every accepted connection into a shared [`Pipeline`].
///
/// The server carries a typestate `S` indicating whether it is [`Unbound`]
/// (not yet bound to a TCP listener) or [`Bound`]. New servers start
/// `Unbound` and must call [`bind`](PickleServer::bind) or
/// [`bind_existing_listener`](PickleServer::bind_existing_listener) before
/// running.
pub struct PickleServer<S = Unbound>
where
    S: ServerState,
{
    pub(crate) pipeline: Pipeline,
    pub(crate) workers: usize,
    /// Single-use readiness notification, sent once all workers are spawned.
    pub(crate) ready_tx: Option<oneshot::Sender<()>>,
    pub(crate) backoff_config: BackoffConfig,
    pub(crate) state: S,
}

/// Marker indicating the server has not yet bound a listener.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbound;

/// Marker indicating the server is bound to a TCP listener.
#[derive(Debug, Clone)]
pub struct Bound {
    pub(crate) listener: Arc<TcpListener>,
}

/// Trait implemented by [`Unbound`] and [`Bound`] to model binding typestate.
pub trait ServerState: sealed::Sealed {}

mod sealed {
    //! Prevent external implementations of [`ServerState`].

    pub trait Sealed {}
    impl Sealed for super::Unbound {}
    impl Sealed for super::Bound {}
}

impl ServerState for Unbound {}
impl ServerState for Bound {}

mod config;
pub use config::binding;
mod connection;
pub mod error;
pub use error::ServerError;
mod runtime;

/// Re-exported configuration types for server backoff behaviour.
pub use runtime::BackoffConfig;

#[cfg(test)]
pub(crate) mod test_util;
