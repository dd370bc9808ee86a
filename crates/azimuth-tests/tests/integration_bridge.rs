// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Bridge Integration Tests
//!
//! Poller, command router and telemetry hub wired over one simulated console.
//!
//! ## Test Categories
//!
//! - `test_poll_*`: read cycles into snapshots and frames
//! - `test_command_*`: write plans against the console
//! - `test_hub_*`: fan-out, suppression and inbound handling
//! - `test_recorder_*`: run history

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use azimuth_bridge::{CommandError, CycleOutcome, PollerConfig};
use azimuth_core::{
    Command, CommandRegisters, DataType, JsonLinesRunRecorder, RegisterKey, RegisterKind, RunRecorder, Snapshot,
    StaleValues, ThrusterAxis, Value,
};
use azimuth_modbus::{ByteOrder, WriteRecord};

use azimuth_tests::common::{
    float_words, init_test_logging, is_ack, is_frame, sample_summary, seed_console,
    temp_test_dir, BridgeHarness, RecordingSubscriber, RegisterMapBuilder, Roles, STOP_MESSAGE,
    TEST_TIMEOUT,
};

const SHORT_WAIT: Duration = Duration::from_millis(100);

fn snapshot_with(version: u64, position: f64) -> Arc<Snapshot> {
    let mut values = HashMap::new();
    values.insert(RegisterKey::input(100), Value::Float(position));
    Arc::new(Snapshot::new(version, values, HashSet::new()))
}

// =============================================================================
// Polling
// =============================================================================

#[tokio::test]
async fn test_poll_float_end_to_end() {
    init_test_logging();
    let table = RegisterMapBuilder::new()
        .row("Motion", "Position", "IREG", "x00", "FLOAT", Roles::AXIS1)
        .table();
    let harness = BridgeHarness::builder().table(table).build();
    harness.device.set_input_words(100, &[0xF5C3, 0x4048]);
    assert!(harness.connect().await);

    let mut subscriber = RecordingSubscriber::attach(&harness.hub);
    let mut poller = harness.poller(PollerConfig::default());

    let outcome = poller.poll_once().await;
    assert_eq!(outcome, CycleOutcome::Published { version: 1, failures: 0 });

    let snapshot = harness.hub.latest_snapshot();
    assert_eq!(snapshot.get(&RegisterKey::input(100)), Some(Value::Float(3.14)));

    let frame = subscriber.next(TEST_TIMEOUT).await.unwrap();
    assert!(is_frame(&frame));
    assert_eq!(frame["position_pri"], 3.14);
    assert_eq!(frame["angle_pri"], 0.0);
}

#[tokio::test]
async fn test_poll_big_endian_literal_words() {
    let table = RegisterMapBuilder::new()
        .row("Motion", "Position", "IREG", "x00", "FLOAT", Roles::AXIS1)
        .table();
    let harness = BridgeHarness::builder()
        .table(table)
        .byte_order(ByteOrder::BigEndian)
        .build();
    harness.device.set_input_words(100, &[0x4048, 0xF5C3]);
    assert!(harness.connect().await);

    let mut poller = harness.poller(PollerConfig::default());
    poller.poll_once().await;

    let snapshot = harness.hub.latest_snapshot();
    assert_eq!(snapshot.get(&RegisterKey::input(100)), Some(Value::Float(3.14)));
}

#[tokio::test]
async fn test_poll_partial_read_failure() {
    let harness = BridgeHarness::new();
    seed_console(&harness.device);
    assert!(harness.connect().await);
    let mut poller = harness.poller(PollerConfig::default());

    poller.poll_once().await;
    harness.device.set_input_words(100, &float_words(43.0, ByteOrder::default()));
    harness.device.fail_reads_of(RegisterKind::InputRegister, 102);

    let outcome = poller.poll_once().await;
    assert_eq!(outcome, CycleOutcome::Published { version: 2, failures: 1 });

    let snapshot = harness.hub.latest_snapshot();
    assert_eq!(snapshot.len(), 8);
    assert_eq!(snapshot.get(&RegisterKey::input(100)), Some(Value::Float(43.0)));
    assert_eq!(snapshot.get(&RegisterKey::input(200)), Some(Value::Float(-12.25)));
    assert_eq!(snapshot.get(&RegisterKey::input(204)), Some(Value::Float(0.5)));
    assert_eq!(snapshot.get(&RegisterKey::coil(1)), Some(Value::Bool(true)));
    assert_eq!(snapshot.get(&RegisterKey::holding(7)), Some(Value::Int(2)));

    // The failed register keeps its previous value, marked stale.
    assert_eq!(snapshot.get(&RegisterKey::input(102)), Some(Value::Float(90.0)));
    assert!(snapshot.is_stale(&RegisterKey::input(102)));
    assert!(!snapshot.is_stale(&RegisterKey::input(100)));
}

#[tokio::test]
async fn test_poll_omit_policy_drops_failed_key() {
    let harness = BridgeHarness::new();
    seed_console(&harness.device);
    assert!(harness.connect().await);
    let mut poller = harness.poller(PollerConfig::default().stale_values(StaleValues::Omit));

    poller.poll_once().await;
    harness.device.fail_reads_of(RegisterKind::InputRegister, 202);
    poller.poll_once().await;

    let snapshot = harness.hub.latest_snapshot();
    assert_eq!(snapshot.len(), 7);
    assert!(!snapshot.contains(&RegisterKey::input(202)));
}

#[tokio::test]
async fn test_poll_loop_reconnects_and_publishes() {
    init_test_logging();
    let harness = BridgeHarness::new();
    seed_console(&harness.device);
    let mut subscriber = RecordingSubscriber::attach(&harness.hub);

    let handle = harness.poller(BridgeHarness::fast_poller_config()).start();

    let frame = subscriber.next(TEST_TIMEOUT).await.expect("no frame published");
    assert_eq!(frame["position_pri"], 42.5);
    assert_eq!(frame["angle_sec"], 270.0);
    assert_eq!(frame["pos_setpoint_sec"], 0.5);

    let stats = tokio::time::timeout(TEST_TIMEOUT, handle.stop()).await.unwrap();
    assert!(stats.reconnects >= 1);
    assert!(stats.published >= 1);

    // Values do not change, so later cycles broadcast nothing new.
    let hub_stats = harness.hub.stats();
    assert_eq!(hub_stats.broadcasts, 1);
    assert_eq!(hub_stats.suppressed, hub_stats.published - 1);
}

// =============================================================================
// Commands
// =============================================================================

fn command_registers(harness: &BridgeHarness) -> Vec<(RegisterKey, i64)> {
    CommandRegisters::default()
        .all()
        .into_iter()
        .map(|(_, key)| {
            let value = match key.kind {
                RegisterKind::Coil => i64::from(harness.device.coil(key.address)),
                _ => i64::from(harness.device.holding(key.address)),
            };
            (key, value)
        })
        .collect()
}

#[tokio::test]
async fn test_command_detent_idempotent() {
    let harness = BridgeHarness::new();
    assert!(harness.connect().await);
    let detent = Command::SetDetent {
        strength: 2,
        axis: ThrusterAxis::Thrust,
        position: 50,
    };

    harness.router.dispatch(&detent).await.unwrap();
    let once = command_registers(&harness);

    harness.router.dispatch(&detent).await.unwrap();
    let twice = command_registers(&harness);

    assert_eq!(once, twice);
    assert!(harness.device.coil(1));
    assert!(harness.device.coil(140));
    assert!(!harness.device.coil(141));
    assert_eq!(harness.device.holding(140), 50);
    assert_eq!(harness.device.holding(100), 2);
}

#[tokio::test]
async fn test_command_range_rejection_writes_nothing() {
    let harness = BridgeHarness::new();
    assert!(harness.connect().await);

    let err = harness
        .router
        .dispatch(&Command::SetSetpoint { thrust: 150, angle: 0 })
        .await
        .unwrap_err();

    assert!(matches!(err, CommandError::Validation(_)));
    assert_eq!(harness.device.write_count(), 0);
    assert_eq!(harness.router.stats().rejected, 1);
}

#[tokio::test]
async fn test_command_vibration_off_writes_coil_only() {
    let harness = BridgeHarness::new();
    assert!(harness.connect().await);

    harness
        .router
        .dispatch(&Command::SetVibration { strength: 0 })
        .await
        .unwrap();

    assert_eq!(
        harness.device.writes(),
        vec![WriteRecord::Coil {
            address: 2,
            value: false
        }]
    );
}

#[tokio::test]
async fn test_command_failed_step_stops_plan() {
    let harness = BridgeHarness::new();
    assert!(harness.connect().await);
    harness.device.fail_writes_to(RegisterKind::Coil, 140);

    let err = harness
        .router
        .dispatch(&Command::SetDetent {
            strength: 1,
            axis: ThrusterAxis::Angle,
            position: 10,
        })
        .await
        .unwrap_err();

    assert_eq!(err.step(), Some("detent_primary_thrust"));
    assert_eq!(err.kind(), "write");
    // detent_use, then the failing step; nothing after it.
    assert_eq!(harness.device.write_count(), 2);
    assert_eq!(harness.device.holding(240), 0);
}

fn thrust_detent() -> Command {
    Command::SetDetent {
        strength: 2,
        axis: ThrusterAxis::Thrust,
        position: 50,
    }
}

#[tokio::test]
async fn test_command_steps_let_reads_through() {
    let harness = BridgeHarness::new();
    assert!(harness.connect().await);
    harness.device.set_latency(Duration::from_millis(30));

    let detent = thrust_detent();
    let steps = harness.router.plan(&detent).unwrap().len();
    assert!(steps > 1);

    let router = Arc::clone(&harness.router);
    let command = tokio::spawn(async move { router.dispatch(&detent).await });

    // Queue a read while the first step holds the link.
    tokio::time::sleep(Duration::from_millis(10)).await;
    let read = harness
        .link
        .read_register(RegisterKey::input(100), DataType::Float32)
        .await
        .unwrap();
    assert!(!read.is_skipped());
    command.await.unwrap().unwrap();

    let ops = harness.device.operations();
    assert_eq!(ops.len(), steps + 1);
    assert!(ops[0].write);
    assert!(!ops[1].write, "read was not served between the first two steps");
    assert!(ops[2..].iter().all(|op| op.write));
    assert_eq!(harness.device.max_in_flight(), 1);
}

#[tokio::test]
async fn test_command_waits_for_in_flight_read() {
    let harness = BridgeHarness::new();
    seed_console(&harness.device);
    assert!(harness.connect().await);
    harness.device.set_latency(Duration::from_millis(15));

    let mut poller = harness.poller(PollerConfig::default());
    let cycle = tokio::spawn(async move { poller.poll_once().await });

    tokio::time::sleep(Duration::from_millis(5)).await;
    harness.router.dispatch(&thrust_detent()).await.unwrap();

    let outcome = cycle.await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Published { failures: 0, .. }));

    let ops = harness.device.operations();
    let first_write = ops.iter().position(|op| op.write).unwrap();
    let last_write = ops.iter().rposition(|op| op.write).unwrap();

    // The cycle's first read finishes before the command starts, and the
    // cycle keeps reading between the command's steps.
    assert_eq!(first_write, 1);
    assert!(!ops[0].write);
    assert!(ops[first_write..last_write].iter().any(|op| !op.write));
    assert_eq!(ops.iter().filter(|op| !op.write).count(), harness.table.len());
    assert_eq!(harness.device.max_in_flight(), 1);
}

// =============================================================================
// Hub
// =============================================================================

#[tokio::test]
async fn test_hub_fan_out_survives_dropped_subscriber() {
    let harness = BridgeHarness::new();
    let mut subscribers: Vec<RecordingSubscriber> = (0..50)
        .map(|_| RecordingSubscriber::attach(&harness.hub))
        .collect();
    assert_eq!(harness.hub.subscriber_count(), 50);

    subscribers.remove(17).close();
    assert!(harness.hub.publish(snapshot_with(1, 12.5)));

    for subscriber in &mut subscribers {
        let frame = subscriber.next(TEST_TIMEOUT).await.expect("frame missing");
        assert_eq!(frame["position_pri"], 12.5);
    }

    let stats = harness.hub.stats();
    assert_eq!(stats.removed, 1);
    assert_eq!(harness.hub.subscriber_count(), 49);
}

#[tokio::test]
async fn test_hub_suppresses_identical_view() {
    let harness = BridgeHarness::new();
    let mut subscriber = RecordingSubscriber::attach(&harness.hub);

    assert!(harness.hub.publish(snapshot_with(1, 5.0)));
    assert!(!harness.hub.publish(snapshot_with(2, 5.0)));
    assert!(harness.hub.publish(snapshot_with(3, 6.0)));

    let frames = subscriber.drain();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1]["position_pri"], 6.0);
    assert_eq!(harness.hub.latest_snapshot().version(), 3);
}

#[tokio::test]
async fn test_hub_late_joiner_gets_current_frame() {
    let harness = BridgeHarness::new();
    harness.hub.publish(snapshot_with(1, 8.25));

    let mut late = RecordingSubscriber::attach(&harness.hub);
    let frame = late.next(SHORT_WAIT).await.unwrap();
    assert_eq!(frame["position_pri"], 8.25);
}

#[tokio::test]
async fn test_hub_parse_error_acks_sender_only() {
    let harness = BridgeHarness::new();
    let mut sender = RecordingSubscriber::attach(&harness.hub);
    let mut bystander = RecordingSubscriber::attach(&harness.hub);

    let ack = harness.hub.handle_message(sender.id(), "{not json").await;
    assert!(!ack.is_ok());

    let message = sender.next(SHORT_WAIT).await.unwrap();
    assert!(is_ack(&message));
    assert_eq!(message["status"], "error");
    assert_eq!(message["kind"], "parse");
    assert_eq!(message["command"], "unknown");

    assert!(bystander.drain().is_empty());
}

#[tokio::test]
async fn test_hub_write_error_ack() {
    let harness = BridgeHarness::new();
    let mut sender = RecordingSubscriber::attach(&harness.hub);

    // Link never connected: the first step is skipped.
    let ack = harness
        .hub
        .handle_message(sender.id(), r#"{"command":"set_friction_strength","friction":2}"#)
        .await;
    assert!(!ack.is_ok());

    let message = sender.next(SHORT_WAIT).await.unwrap();
    assert_eq!(message["command"], "set_friction_strength");
    assert_eq!(message["kind"], "write");
}

#[tokio::test]
async fn test_hub_stop_session_recorded_once() {
    let harness = BridgeHarness::new();
    let mut sender = RecordingSubscriber::attach(&harness.hub);

    let ack = harness.hub.handle_message(sender.id(), STOP_MESSAGE).await;
    assert!(ack.is_ok());

    let runs = harness.recorder.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].summary, sample_summary());

    let message = sender.next(SHORT_WAIT).await.unwrap();
    assert_eq!(message["command"], "stop_simulation");
    assert_eq!(message["status"], "ok");
    assert_eq!(harness.device.write_count(), 0);
}

// =============================================================================
// Recorder
// =============================================================================

#[tokio::test]
async fn test_recorder_jsonl_appends() {
    let dir = temp_test_dir("azimuth_runs");
    let path = dir.path().join("history").join("runs.jsonl");

    let recorder = JsonLinesRunRecorder::open(&path).unwrap();
    recorder.store(&sample_summary()).await.unwrap();
    let first_line = std::fs::read_to_string(&path).unwrap();
    drop(recorder);

    let reopened = JsonLinesRunRecorder::open(&path).unwrap();
    let mut second = sample_summary();
    second.configuration_number = 4;
    reopened.store(&second).await.unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.starts_with(&first_line));

    let runs = reopened.read_all().unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].summary.configuration_number, 3);
    assert_eq!(runs[1].summary.configuration_number, 4);
    assert_eq!(reopened.records_written(), 1);
}

#[tokio::test]
async fn test_recorder_rejects_invalid_summary() {
    let harness = BridgeHarness::new();
    let sender = RecordingSubscriber::attach(&harness.hub);

    let ack = harness
        .hub
        .handle_message(
            sender.id(),
            r#"{"command":"stop_simulation","avg_speed":-1.0,"avg_rpm":610.0,"total_consumption":12.4,"run_time":300.0,"configuration_number":3}"#,
        )
        .await;

    assert!(!ack.is_ok());
    assert!(harness.recorder.is_empty());
}
