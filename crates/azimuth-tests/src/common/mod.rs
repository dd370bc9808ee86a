// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Common Test Utilities
//!
//! - `fixtures`: pre-built register maps and device contents
//! - `harness`: bridge components wired over a simulated console
//! - `recording`: subscriber that records frames and acks
//! - `ws`: WebSocket and HTTP clients for the channel server

pub mod fixtures;
pub mod harness;
pub mod recording;
pub mod ws;

pub use fixtures::*;
pub use harness::*;
pub use recording::*;
pub use ws::*;

use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Upper bound for anything a test waits on.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize test logging. Safe to call from every test.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("warn,azimuth_bridge=debug,azimuth_modbus=debug")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Create a temporary directory for test data.
pub fn temp_test_dir(prefix: &str) -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .expect("Failed to create temp directory")
}
