// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Azimuth Integration Tests
//!
//! Integration tests for the azimuth bridge plus the fixtures they share.
//!
//! ## Module Structure
//!
//! - [`common`]: shared test utilities
//!   - `fixtures`: register map CSV builder, console presets, float words
//!   - `harness`: a wired link/router/hub over a simulated console
//!   - `recording`: a hub subscriber that collects what it receives
//!   - `ws`: a minimal WebSocket client for the channel server
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p azimuth-tests
//! cargo test -p azimuth-tests --test integration_bridge
//! cargo test -p azimuth-tests --test integration_channel -- --nocapture
//! ```
//!
//! ## Test Suites
//!
//! - `integration_config.rs`: register map CSV and YAML configuration
//! - `integration_link.rs`: device link state machine and word order
//! - `integration_bridge.rs`: poller, command router and hub together
//! - `integration_channel.rs`: the WebSocket channel end to end

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod common;

/// Re-export commonly used items for convenience.
pub mod prelude {
    pub use crate::common::fixtures::*;
    pub use crate::common::harness::*;
    pub use crate::common::recording::*;
    pub use crate::common::ws::*;
}
