//! Connection-level behaviour driven over in-memory streams.

use pickle_ingest::{
    config::IngestConfig,
    connection::ConnectionError,
    decode::{DecodeError, Value},
    frame::FrameError,
    validate::{LegacyLevel, M20Level},
};
use pickle_testing::{
    TestResult,
    drive_bytes,
    drive_frames,
    drive_frames_with_capacity,
    encode_pickle,
    frame_bytes,
    harness_with,
    metric_item,
    pickle_frame,
    recording_harness,
};
use proptest::prelude::*;
use rstest::rstest;

#[tokio::test]
async fn graphite_batch_is_dispatched_line_by_line() -> TestResult {
    let harness = recording_harness();
    let frame = pickle_frame(&Value::List(vec![
        metric_item("servers.a.cpu", Value::Signed(1_700_000_000), Value::Float(12.5)),
        metric_item("servers.a.mem", Value::Signed(1_700_000_000), Value::Signed(2048)),
        metric_item("servers.a.up", Value::Float(1_700_000_000.4), Value::from("1")),
    ]));

    let stats = drive_frames(&harness.pipeline, vec![frame]).await??;

    assert_eq!(stats.items, 3);
    assert_eq!(
        harness.dispatched.lines(),
        [
            "servers.a.cpu 12.500000 1700000000",
            "servers.a.mem 2048 1700000000",
            "servers.a.up 1 1700000000",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn bad_items_only_cost_themselves() -> TestResult {
    let harness = recording_harness();
    let frame = pickle_frame(&Value::List(vec![
        metric_item("ok.first", Value::Signed(10), Value::Signed(1)),
        Value::Tuple(vec![Value::from("too"), Value::from("short"), Value::None]),
        metric_item("bad.value", Value::Signed(10), Value::None),
        metric_item("bad key", Value::Signed(10), Value::Signed(1)),
        metric_item("ok.second", Value::Signed(11), Value::Signed(2)),
    ]));

    drive_frames(&harness.pipeline, vec![frame]).await??;

    assert_eq!(harness.dispatched.lines(), ["ok.first 1 10", "ok.second 2 11"]);
    let totals = harness.counters.snapshot();
    assert_eq!(totals.items, 5);
    assert_eq!(totals.invalid, 3);
    assert_eq!(totals.dispatched, 2);
    // Only the item that reached the validator has a line to quarantine.
    let quarantined = harness.quarantined.calls();
    assert_eq!(quarantined.len(), 1);
    assert_eq!(quarantined[0].line, "bad key 1 10");
    Ok(())
}

#[tokio::test]
async fn frames_after_a_bad_frame_are_never_read() -> TestResult {
    let harness = recording_harness();
    let good = pickle_frame(&Value::List(vec![metric_item(
        "before",
        Value::Signed(1),
        Value::Signed(1),
    )]));
    let bad = frame_bytes(b"\x80\x02(not a list");
    let after = pickle_frame(&Value::List(vec![metric_item(
        "after",
        Value::Signed(1),
        Value::Signed(1),
    )]));

    let outcome = drive_frames(&harness.pipeline, vec![good, bad, after]).await?;

    assert!(matches!(
        outcome,
        Err(ConnectionError::Frame(FrameError::InvalidPrefix { .. }))
    ));
    assert_eq!(harness.dispatched.lines(), ["before 1 1"]);
    Ok(())
}

#[tokio::test]
async fn oversized_announcement_ends_the_connection() -> TestResult {
    let harness = harness_with(IngestConfig::default().max_frame_length(1024));
    let outcome = drive_bytes(&harness.pipeline, 1025_u32.to_be_bytes().to_vec()).await?;
    assert!(matches!(
        outcome,
        Err(ConnectionError::Frame(FrameError::Oversized { size: 1025, max: 1024 }))
    ));
    Ok(())
}

#[tokio::test]
async fn list_shaped_items_are_counted_invalid() -> TestResult {
    let harness = recording_harness();
    let frame = pickle_frame(&Value::List(vec![
        Value::List(vec![
            Value::from("list.item"),
            Value::Tuple(vec![Value::Signed(5), Value::Signed(6)]),
        ]),
        Value::Tuple(vec![
            Value::from("list.data"),
            Value::List(vec![Value::Signed(5), Value::Signed(6)]),
        ]),
        metric_item("tuple.item", Value::Signed(5), Value::Signed(6)),
    ]));

    let stats = drive_frames(&harness.pipeline, vec![frame]).await??;

    assert_eq!(stats.items, 3);
    assert_eq!(harness.dispatched.lines(), ["tuple.item 6 5"]);
    assert_eq!(harness.counters.snapshot().invalid, 2);
    Ok(())
}

#[tokio::test]
async fn tuple_batches_end_the_connection() -> TestResult {
    let harness = recording_harness();
    // Push and pop an empty list so the payload still carries the marker,
    // then leave a tuple as the final value.
    let tuple = encode_pickle(&Value::Tuple(vec![metric_item(
        "as.tuple",
        Value::Signed(7),
        Value::Signed(8),
    )]));
    let mut payload = vec![0x80, 0x02, b']', b'0'];
    payload.extend_from_slice(&tuple[2..]);

    let outcome = drive_bytes(&harness.pipeline, frame_bytes(&payload)).await?;

    assert!(matches!(
        outcome,
        Err(ConnectionError::Decode(DecodeError::Shape { found: "tuple" }))
    ));
    assert!(harness.dispatched.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn bytes_after_the_stop_opcode_are_ignored() -> TestResult {
    let harness = recording_harness();
    let mut payload = encode_pickle(&Value::List(vec![metric_item(
        "trailing.bytes",
        Value::Signed(1),
        Value::Signed(2),
    )]));
    payload.extend_from_slice(b"junk");
    let after = pickle_frame(&Value::List(vec![metric_item(
        "next.frame",
        Value::Signed(3),
        Value::Signed(4),
    )]));
    let mut bytes = frame_bytes(&payload);
    bytes.extend(after);

    let stats = drive_bytes(&harness.pipeline, bytes).await??;

    assert_eq!(stats.frames, 2);
    assert_eq!(harness.dispatched.lines(), ["trailing.bytes 2 1", "next.frame 4 3"]);
    Ok(())
}

#[rstest]
#[case::dict_on_top(vec![0x80, 0x02, b']', b'0', b'}', b'.'], "dict")]
#[case::none_on_top(vec![0x80, 0x02, b']', b'0', b'N', b'.'], "none")]
#[tokio::test]
async fn non_list_batches_are_shape_errors(
    #[case] payload: Vec<u8>,
    #[case] found: &'static str,
) -> TestResult {
    let harness = recording_harness();
    let outcome = drive_bytes(&harness.pipeline, frame_bytes(&payload)).await?;
    match outcome {
        Err(ConnectionError::Decode(DecodeError::Shape { found: got })) => assert_eq!(got, found),
        other => panic!("unexpected outcome: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn strict_levels_reject_what_medium_allows() -> TestResult {
    let strict = harness_with(
        IngestConfig::default().validation_levels(LegacyLevel::Strict, M20Level::Strict),
    );
    let medium = recording_harness();
    let frame = pickle_frame(&Value::List(vec![
        metric_item("a..b", Value::Signed(1), Value::Signed(1)),
        metric_item("unit=B.host=x", Value::Signed(1), Value::Signed(1)),
    ]));

    drive_frames(&strict.pipeline, vec![frame.clone()]).await??;
    drive_frames(&medium.pipeline, vec![frame]).await??;

    assert!(strict.dispatched.calls().is_empty());
    assert_eq!(strict.quarantined.calls().len(), 2);
    assert_eq!(medium.dispatched.calls().len(), 2);
    Ok(())
}

#[tokio::test]
async fn truncated_pickle_closes_without_error() -> TestResult {
    let harness = recording_harness();
    let full = encode_pickle(&Value::List(vec![metric_item(
        "a.b",
        Value::Signed(1),
        Value::Signed(1),
    )]));
    let stats = drive_bytes(&harness.pipeline, frame_bytes(&full[..full.len() - 1])).await??;
    assert_eq!(stats.frames, 0);
    assert!(harness.dispatched.calls().is_empty());
    Ok(())
}

fn arb_item() -> impl Strategy<Value = (String, i64, i64)> {
    ("[a-z]{1,8}(\\.[a-z0-9_]{1,8}){0,4}", 0_i64..=i64::from(u32::MAX), any::<i32>())
        .prop_map(|(path, ts, value)| (path, ts, i64::from(value)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn every_well_formed_item_is_dispatched_in_order(
        items in prop::collection::vec(arb_item(), 0..40),
        capacity in 1_usize..64,
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("build runtime");
        let harness = recording_harness();
        let batch = Value::List(
            items
                .iter()
                .map(|(path, ts, value)| {
                    metric_item(path, Value::Signed(*ts), Value::Signed(*value))
                })
                .collect(),
        );
        let stats = rt
            .block_on(drive_frames_with_capacity(&harness.pipeline, vec![pickle_frame(&batch)], capacity))
            .expect("harness")
            .expect("clean close");

        let expected: Vec<String> = items
            .iter()
            .map(|(path, ts, value)| format!("{path} {value} {ts}"))
            .collect();
        prop_assert_eq!(stats.items, items.len() as u64);
        prop_assert_eq!(harness.dispatched.lines(), expected);
    }
}
