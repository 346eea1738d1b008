//! Test helpers shared across server modules.

use std::{
    net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
};

use rstest::fixture;

use super::{Bound, PickleServer};
use crate::{
    config::IngestConfig,
    metrics::IngestCounters,
    pipeline::Pipeline,
    test_helpers::RecordingDispatcher,
};

/// Pipeline with default settings and a recording dispatcher.
pub fn recording_pipeline() -> (Pipeline, RecordingDispatcher) {
    let dispatched = RecordingDispatcher::new();
    let pipeline = Pipeline::new(
        IngestConfig::default(),
        Arc::new(dispatched.clone()),
        Arc::new(IngestCounters::new()),
    );
    (pipeline, dispatched)
}

#[fixture]
pub fn pipeline() -> Pipeline { recording_pipeline().0 }

#[fixture]
/// Returns a bound [`StdTcpListener`] on a free port for use in tests.
///
/// Keeping the listener bound prevents race conditions where another
/// process could claim the port between discovery and use.
pub fn free_listener() -> StdTcpListener {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr).expect("Failed to bind free port listener")
}

/// Extract the bound address from a listener.
#[must_use]
pub fn listener_addr(listener: &StdTcpListener) -> SocketAddr {
    listener
        .local_addr()
        .expect("failed to get listener address")
}

pub fn bind_server(pipeline: Pipeline, listener: StdTcpListener) -> PickleServer<Bound> {
    PickleServer::new(pipeline)
        .bind_existing_listener(listener)
        .expect("Failed to bind")
}
