//! `pickle_ingest` binary.
//!
//! Listens for Graphite pickle connections and writes every validated
//! metric to stdout as a `"<key> <value> <timestamp>"` line.

mod cli;

use std::{sync::Arc, time::Duration};

use clap::Parser;
use pickle_ingest::{
    config::IngestConfig,
    dispatch::{ChannelDispatcher, Metric},
    metrics::IngestCounters,
    pipeline::Pipeline,
    quarantine::BadMetrics,
    server::PickleServer,
    validate::{LegacyLevel, M20Level},
};
use tokio::{
    io::{self, AsyncWriteExt, BufWriter},
    sync::mpsc,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();
    install_metrics_exporter(cli.metrics_addr)?;

    let config = IngestConfig::default()
        .max_frame_length(cli.max_frame_length)
        .read_timeout(cli.read_timeout_secs.map(Duration::from_secs))
        .validate_order(cli.validate_order)
        .validation_levels(legacy_level(cli.legacy_level), m20_level(cli.m20_level));

    let (dispatcher, rx) = ChannelDispatcher::channel(cli.dispatch_capacity.max(1));
    let counters = Arc::new(IngestCounters::new());
    let bad_metrics = Arc::new(BadMetrics::with_limits(
        Duration::from_secs(cli.bad_metrics_max_age_secs.max(1)),
        cli.bad_metrics_max_keys,
    ));
    let pipeline = Pipeline::new(config, Arc::new(dispatcher), Arc::clone(&counters))
        .with_quarantine(bad_metrics.clone());
    let writer = tokio::spawn(write_lines(rx));
    let reporter = tokio::spawn(report_bad_metrics(Arc::clone(&bad_metrics)));

    let mut server = PickleServer::new(pipeline);
    if let Some(workers) = cli.workers {
        server = server.workers(workers);
    }
    server.bind(cli.listen)?.run().await?;

    // Every pipeline clone is gone once the server returns, which closes
    // the dispatch channel and lets the writer drain and exit.
    writer.await??;
    reporter.abort();
    let totals = counters.snapshot();
    tracing::info!(
        items = totals.items,
        dispatched = totals.dispatched,
        invalid = totals.invalid,
        out_of_order = totals.out_of_order,
        quarantined_keys = bad_metrics.len(),
        "shutdown complete"
    );
    Ok(())
}

async fn write_lines(mut rx: mpsc::Receiver<Metric>) -> io::Result<()> {
    let mut out = BufWriter::new(io::stdout());
    while let Some(metric) = rx.recv().await {
        out.write_all(&metric.line).await?;
        out.write_all(b"\n").await?;
        if rx.is_empty() {
            out.flush().await?;
        }
    }
    out.flush().await
}

/// Prune the quarantine once per max age and log what is left.
async fn report_bad_metrics(bad: Arc<BadMetrics>) {
    let mut ticker = tokio::time::interval(bad.max_age());
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let live = bad.snapshot(bad.max_age());
        if let Some(latest) = live.first() {
            tracing::info!(
                keys = live.len(),
                key = %latest.key,
                error = %latest.last_error,
                "quarantined metrics"
            );
        }
    }
}

#[cfg(feature = "metrics")]
fn install_metrics_exporter(
    addr: Option<std::net::SocketAddr>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Some(addr) = addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        tracing::info!(%addr, "serving Prometheus metrics");
    }
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn install_metrics_exporter(
    addr: Option<std::net::SocketAddr>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if addr.is_some() {
        tracing::warn!("built without the metrics feature; ignoring --metrics-addr");
    }
    Ok(())
}

fn legacy_level(level: cli::Level) -> LegacyLevel {
    match level {
        cli::Level::Strict => LegacyLevel::Strict,
        cli::Level::Medium => LegacyLevel::Medium,
        cli::Level::None => LegacyLevel::None,
    }
}

fn m20_level(level: cli::Level) -> M20Level {
    match level {
        cli::Level::Strict => M20Level::Strict,
        cli::Level::Medium => M20Level::Medium,
        cli::Level::None => M20Level::None,
    }
}
