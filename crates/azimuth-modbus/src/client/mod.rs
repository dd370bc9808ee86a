// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Modbus transports and register word conversion.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        DeviceLink                               │
//! │           (state machine, typed reads/writes, lock)             │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     ModbusTransport                             │
//! │        (SessionTransport<Dialer> for the wire transports)       │
//! └─────────────────────────────────────────────────────────────────┘
//!        │                      │                        │
//!        ▼                      ▼                        ▼
//! ┌──────────────┐     ┌──────────────────┐     ┌────────────────────┐
//! │ TCP          │     │ RTU              │     │ Simulated          │
//! │ tokio-modbus │     │ tokio-modbus +   │     │ in-process bank    │
//! │              │     │ tokio-serial     │     │                    │
//! └──────────────┘     └──────────────────┘     └────────────────────┘
//! ```

mod conversion;
mod retry;
mod rtu;
mod session;
mod simulated;
mod tcp;
mod transport;

pub use conversion::{DataConverter, encode_word};
pub use retry::{ConnectPolicy, ExponentialBackoff, RetryStrategy};
pub use rtu::{ModbusRtuTransport, RtuDialer};
pub use simulated::{DeviceOp, SimulatedDevice, SimulatedTransport, WriteRecord};
pub use session::{Dialer, SessionTransport};
pub use tcp::{ModbusTcpTransport, TcpDialer};
pub use transport::ModbusTransport;
