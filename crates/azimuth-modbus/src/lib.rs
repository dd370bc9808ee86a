// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # azimuth-modbus
//!
//! Device link to the azimuth-thruster console over Modbus RTU or TCP.
//!
//! - **Transports**: RTU over `tokio-serial`, TCP, and an in-process
//!   simulated console for tests and dry runs
//! - **DeviceLink**: connection state machine with bounded connect retries,
//!   typed register reads/writes and one operation in flight at a time
//! - **Word order**: 32-bit floats span two registers; the console stores
//!   them low word first with big-endian bytes inside each word
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use azimuth_modbus::{ByteOrder, DeviceLink, ModbusRtuConfig, ModbusRtuTransport};
//!
//! let transport = ModbusRtuTransport::new(ModbusRtuConfig::new("/dev/ttyUSB0"));
//! let link = DeviceLink::new(Box::new(transport), ByteOrder::default());
//!
//! if link.connect_with(5, Duration::from_secs(2)).await {
//!     let value = link.read_register(RegisterKey::input(100), DataType::Float32).await?;
//! }
//! ```

pub mod client;
pub mod error;
pub mod link;
pub mod types;

pub use client::{
    ConnectPolicy, DataConverter, DeviceOp, Dialer, ExponentialBackoff, ModbusRtuTransport,
    ModbusTcpTransport, ModbusTransport, RetryStrategy, SessionTransport, SimulatedDevice,
    SimulatedTransport, WriteRecord,
};
pub use error::{
    ConnectionError, ConversionError, ModbusError, ModbusResult, OperationError, ProtocolError,
    SerialProblem, TimeoutError,
};
pub use link::{DeviceLink, LinkState, LinkStats, Outcome};
pub use types::{ByteOrder, DataBits, ModbusRtuConfig, ModbusTcpConfig, Parity, StopBits};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
