// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # azimuth-bridge
//!
//! The moving parts between the console link and the dashboard.
//!
//! ```text
//!                        ┌──────────────┐
//!  DeviceLink ◄──reads── │    Poller    │ ──Snapshot──┐
//!      ▲                 └──────────────┘             ▼
//!      │                                      ┌──────────────┐   views   ┌───────────────┐
//!      └──writes── CommandRouter ◄─commands── │ TelemetryHub │ ◄───────► │ ChannelServer │ ◄──► dashboards
//!                                             └──────┬───────┘   acks    └───────────────┘
//!                                                    ▼
//!                                               RunRecorder
//! ```
//!
//! - [`Poller`]: reads the register table every interval and publishes whole
//!   snapshots
//! - [`CommandRouter`]: validates commands and applies their write plans
//! - [`TelemetryHub`]: broadcasts changed dashboard views and answers commands
//! - [`ChannelServer`]: the `/ws` and `/health` endpoints

#![warn(missing_docs)]

pub mod error;
pub mod hub;
pub mod poller;
pub mod router;
pub mod server;

pub use error::{CommandError, ServerError, ServerResult};
pub use hub::{Ack, AckStatus, HubStats, Subscription, TelemetryHub, DEFAULT_QUEUE_CAPACITY};
pub use poller::{CycleOutcome, Poller, PollerConfig, PollerHandle, PollerStats};
pub use router::{CommandRouter, DispatchReport, RouterStats, WritePlan, WriteStep};
pub use server::ChannelServer;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
