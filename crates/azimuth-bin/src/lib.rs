// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # azimuth-bin
//!
//! The `azimuth` command.
//!
//! ## Architecture
//!
//! ```text
//!                    main.rs
//!                       │
//!                ┌──────▼──────┐
//!                │   cli.rs    │
//!                └──────┬──────┘
//!                       │
//!           ┌───────────┼───────────┐
//!           ▼           ▼           ▼
//!      ┌──────────┐ ┌──────────┐ ┌──────────┐
//!      │ commands │ │ runtime  │ │ logging  │
//!      └──────────┘ └────┬─────┘ └──────────┘
//!                        │
//!              ┌─────────┼──────────┐
//!              ▼         ▼          ▼
//!         DeviceLink  Poller   ChannelServer
//!                        │
//!                   ┌────▼─────┐
//!                   │ shutdown │
//!                   └──────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the bridge (default command)
//! azimuth
//!
//! # Start against the built-in simulated console
//! azimuth run --simulate
//!
//! # Check a config and its register map
//! azimuth -c /etc/azimuth/azimuth.yaml validate --strict
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod shutdown;

// =============================================================================
// Re-exports
// =============================================================================

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use logging::init_logging;
pub use runtime::{BridgeRuntime, RuntimeBuilder};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
