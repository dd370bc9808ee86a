// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # azimuth-core
//!
//! Core domain types for the azimuth-thruster console bridge.
//!
//! This crate has no I/O of its own beyond the run recorders. It defines the
//! vocabulary the other crates speak:
//!
//! - **Register model**: [`RegisterKind`], [`DataType`], [`Axis`], [`RegisterKey`],
//!   [`Register`] and the immutable [`RegisterTable`]
//! - **Values**: [`Value`] and the copy-on-write [`Snapshot`]
//! - **Commands**: the inbound [`Command`] union, its JSON wire form and
//!   [`CommandLimits`] validation
//! - **Dashboard**: the reduced [`DashboardView`] and its [`DashboardMapping`]
//! - **Run recording**: [`RunSummary`] and the [`RunRecorder`] collaborator
//!
//! ## Data Flow
//!
//! ```text
//! RegisterTable ──► Poller ──► Snapshot ──► DashboardMapping ──► DashboardView
//!       │                                                             │
//!       ▼                                                             ▼
//! CommandRouter ◄──────────────── Command ◄──────────────────── subscribers
//!                                    │
//!                                    ▼ (stop_simulation)
//!                               RunRecorder
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod command;
pub mod dashboard;
pub mod error;
pub mod recorder;
pub mod register;
pub mod value;

// =============================================================================
// Re-exports
// =============================================================================

pub use command::{AxisKeys, Command, CommandLimits, CommandRegisters, IntRange, ThrusterAxis};
pub use dashboard::{DashboardMapping, DashboardView};
pub use error::{CommandParseError, KeyParseError, RecorderError, TableError, ValidationError};
pub use recorder::{
    JsonLinesRunRecorder, MemoryRunRecorder, RecordedRun, RunRecorder, RunSummary,
};
pub use register::{Axis, DataType, Register, RegisterKey, RegisterKind, RegisterTable, RoleFlags};
pub use value::{Snapshot, StaleValues, Value};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
