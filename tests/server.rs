//! End-to-end tests over real TCP connections.

use std::{sync::Arc, time::Duration};

use pickle_ingest::{
    config::IngestConfig,
    decode::Value,
    dispatch::ChannelDispatcher,
    metrics::IngestCounters,
    pipeline::Pipeline,
};
use pickle_testing::{
    TestResult,
    eventually,
    frame_bytes,
    harness_with,
    metric_item,
    pickle_frame,
    recording_harness,
    spawn_server,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};

const WAIT: Duration = Duration::from_secs(5);

fn item_frame(path: &str, ts: i64, value: i64) -> Vec<u8> {
    pickle_frame(&Value::List(vec![metric_item(
        path,
        Value::Signed(ts),
        Value::Signed(value),
    )]))
}

#[tokio::test]
async fn metrics_flow_to_the_channel_dispatcher() -> TestResult {
    let (dispatcher, mut rx) = ChannelDispatcher::channel(16);
    let pipeline = Pipeline::new(
        IngestConfig::default(),
        Arc::new(dispatcher),
        Arc::new(IngestCounters::new()),
    );
    let server = spawn_server(pipeline, 2).await?;

    let mut client = TcpStream::connect(server.addr).await?;
    client
        .write_all(&pickle_frame(&Value::List(vec![
            metric_item("net.rx", Value::Signed(1_600_000_000), Value::Float(1.5)),
            metric_item("net.tx", Value::Signed(1_600_000_001), Value::Signed(3)),
        ])))
        .await?;

    let first = timeout(WAIT, rx.recv()).await?.ok_or("channel closed")?;
    let second = timeout(WAIT, rx.recv()).await?.ok_or("channel closed")?;
    assert_eq!(&first.line[..], b"net.rx 1.500000 1600000000");
    assert!((first.value - 1.5).abs() < f64::EPSILON);
    assert_eq!(second.timestamp, 1_600_000_001);

    drop(client);
    server.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn a_bad_connection_does_not_disturb_others() -> TestResult {
    let harness = recording_harness();
    let server = spawn_server(harness.pipeline.clone(), 2).await?;

    let mut good = TcpStream::connect(server.addr).await?;
    let mut bad = TcpStream::connect(server.addr).await?;

    good.write_all(&item_frame("good.one", 1, 1)).await?;
    bad.write_all(&frame_bytes(b"garbage")).await?;
    // The server closes the bad connection without replying.
    let mut buf = [0_u8; 1];
    let read = timeout(WAIT, bad.read(&mut buf)).await?;
    assert!(matches!(read, Ok(0) | Err(_)));

    good.write_all(&item_frame("good.two", 2, 2)).await?;
    drop(good);

    assert!(eventually(WAIT, || harness.dispatched.calls().len() == 2).await);
    assert_eq!(harness.dispatched.lines(), ["good.one 1 1", "good.two 2 2"]);
    server.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn order_checking_spans_connections() -> TestResult {
    let harness = harness_with(IngestConfig::default().validate_order(true));
    let server = spawn_server(harness.pipeline.clone(), 1).await?;

    let mut first = TcpStream::connect(server.addr).await?;
    first.write_all(&item_frame("ordered.key", 200, 1)).await?;
    drop(first);
    assert!(eventually(WAIT, || harness.dispatched.calls().len() == 1).await);

    let mut second = TcpStream::connect(server.addr).await?;
    second.write_all(&item_frame("ordered.key", 100, 2)).await?;
    second.write_all(&item_frame("ordered.key", 300, 3)).await?;
    drop(second);
    assert!(eventually(WAIT, || harness.dispatched.calls().len() == 2).await);

    server.shutdown().await?;
    assert_eq!(
        harness.dispatched.lines(),
        ["ordered.key 1 200", "ordered.key 3 300"]
    );
    assert_eq!(harness.counters.snapshot().out_of_order, 1);
    assert_eq!(harness.quarantined.calls()[0].line, "ordered.key 2 100");
    Ok(())
}

#[tokio::test]
async fn shutdown_waits_for_open_connections() -> TestResult {
    let harness = recording_harness();
    let server = spawn_server(harness.pipeline.clone(), 1).await?;

    let mut client = TcpStream::connect(server.addr).await?;
    client.write_all(&item_frame("late.metric", 1, 1)).await?;
    assert!(eventually(WAIT, || harness.dispatched.calls().len() == 1).await);

    let shutdown = tokio::spawn(server.shutdown());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!shutdown.is_finished(), "shutdown must wait for the open connection");

    drop(client);
    timeout(WAIT, shutdown).await???;
    Ok(())
}
