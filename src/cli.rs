//! Command line interface for the `pickle_ingest` binary.
//!
//! Also compiled by `build.rs` to render the man page, so it must not
//! depend on the library crate.

use std::net::SocketAddr;

use clap::{Parser, ValueEnum};

/// Strictness of a key validation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Level {
    /// Reject anything not explicitly allowed.
    Strict,
    /// Reject clearly broken keys.
    #[default]
    Medium,
    /// Skip the check.
    None,
}

/// Command line arguments for the `pickle_ingest` binary.
#[derive(Debug, Parser)]
#[command(
    name = "pickle_ingest",
    version,
    about = "Receive Graphite pickle batches over TCP and emit validated metric lines"
)]
pub struct Cli {
    /// Address to listen on.
    #[arg(short, long, default_value = "0.0.0.0:2004")]
    pub listen: SocketAddr,

    /// Number of accept workers. Defaults to the number of CPUs.
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Reject metrics whose timestamp does not advance per key.
    #[arg(long)]
    pub validate_order: bool,

    /// Validation level for plain dotted keys.
    #[arg(long, value_enum, default_value_t = Level::Medium)]
    pub legacy_level: Level,

    /// Validation level for metrics 2.0 keys.
    #[arg(long, value_enum, default_value_t = Level::Medium)]
    pub m20_level: Level,

    /// Close connections idle for this many seconds. Disabled when unset.
    #[arg(long, value_name = "SECS")]
    pub read_timeout_secs: Option<u64>,

    /// Largest frame payload accepted, in bytes.
    #[arg(long, default_value_t = 500 * 1024 * 1024)]
    pub max_frame_length: usize,

    /// Metrics buffered between the connections and the output writer.
    #[arg(long, default_value_t = 65_536)]
    pub dispatch_capacity: usize,

    /// Forget a quarantined key this many seconds after its last rejection.
    #[arg(long, value_name = "SECS", default_value_t = 3600)]
    pub bad_metrics_max_age_secs: u64,

    /// Most distinct keys held in the quarantine.
    #[arg(long, default_value_t = 10_000)]
    pub bad_metrics_max_keys: usize,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}
