// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Device Link Integration Tests
//!
//! Link state machine and float decoding against the simulated console.

use std::time::Duration;

use azimuth_core::{DataType, RegisterKey, Value};
use azimuth_modbus::{ByteOrder, ConnectPolicy, DeviceLink, LinkState, Outcome, SimulatedDevice};

use azimuth_tests::common::float_words;

fn link_over(device: &SimulatedDevice, order: ByteOrder) -> DeviceLink {
    DeviceLink::new(Box::new(device.transport()), order)
}

// =============================================================================
// Word Order
// =============================================================================

#[tokio::test]
async fn test_float_device_word_order() {
    let device = SimulatedDevice::new();
    device.set_input_words(100, &[0xF5C3, 0x4048]);
    let link = link_over(&device, ByteOrder::MidLittleEndian);
    assert!(link.connect(&ConnectPolicy::once()).await);

    let value = link
        .read_register(RegisterKey::input(100), DataType::Float32)
        .await
        .unwrap()
        .completed()
        .unwrap();
    assert!((value.as_f64() - 3.14).abs() < 1e-5);
}

#[tokio::test]
async fn test_float_big_endian_literal_words() {
    let device = SimulatedDevice::new();
    device.set_input_words(100, &[0x4048, 0xF5C3]);
    let link = link_over(&device, ByteOrder::BigEndian);
    assert!(link.connect(&ConnectPolicy::once()).await);

    let value = link
        .read_register(RegisterKey::input(100), DataType::Float32)
        .await
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!(value.rounded(3), Value::Float(3.14));
}

#[tokio::test]
async fn test_float_representative_values() {
    let device = SimulatedDevice::new();
    let link = link_over(&device, ByteOrder::default());
    assert!(link.connect(&ConnectPolicy::once()).await);

    for value in [0.0f32, -1.0, 3.14159, f32::MAX] {
        device.set_input_words(300, &float_words(value, ByteOrder::default()));
        let read = link
            .read_register(RegisterKey::input(300), DataType::Float32)
            .await
            .unwrap()
            .completed()
            .unwrap();
        assert_eq!(read.as_f64() as f32, value);
    }
}

// =============================================================================
// Connection State
// =============================================================================

#[tokio::test]
async fn test_connect_exhausts_attempts() {
    let device = SimulatedDevice::new();
    device.refuse_all_connects(true);
    let link = link_over(&device, ByteOrder::default());

    let connected = link
        .connect(&ConnectPolicy::fixed(3, Duration::from_millis(1)))
        .await;

    assert!(!connected);
    assert_eq!(link.state(), LinkState::Failed);
    assert_eq!(device.connect_attempts(), 3);
    assert_eq!(link.stats().connect_attempts, 3);
}

#[tokio::test]
async fn test_connect_recovers_after_refusals() {
    let device = SimulatedDevice::new();
    device.refuse_connects(2);
    let link = link_over(&device, ByteOrder::default());

    assert!(link.connect(&ConnectPolicy::fixed(3, Duration::from_millis(1))).await);
    assert_eq!(link.state(), LinkState::Connected);
    assert_eq!(device.connect_attempts(), 3);
}

#[tokio::test]
async fn test_disconnect_twice_and_skipped_io() {
    let device = SimulatedDevice::new();
    let link = link_over(&device, ByteOrder::default());
    assert!(link.connect(&ConnectPolicy::once()).await);

    link.disconnect().await;
    link.disconnect().await;
    assert_eq!(link.state(), LinkState::Disconnected);

    let reads_before = device.read_count();
    let read = link
        .read_register(RegisterKey::input(100), DataType::Int16)
        .await
        .unwrap();
    let write = link
        .write_register(RegisterKey::holding(4), Value::Int(10))
        .await
        .unwrap();

    assert!(matches!(read, Outcome::Skipped));
    assert!(matches!(write, Outcome::Skipped));
    assert_eq!(device.read_count(), reads_before);
    assert_eq!(device.write_count(), 0);
    assert_eq!(link.stats().skipped, 2);
}

#[tokio::test]
async fn test_severed_link_drops_state() {
    let device = SimulatedDevice::new();
    let link = link_over(&device, ByteOrder::default());
    assert!(link.connect(&ConnectPolicy::once()).await);

    device.sever_link();
    let err = link
        .read_register(RegisterKey::input(100), DataType::Int16)
        .await
        .unwrap_err();

    assert!(err.is_link_loss());
    assert!(link.state().needs_connect());

    assert!(link.connect(&ConnectPolicy::once()).await);
    assert!(link.is_connected());
}
