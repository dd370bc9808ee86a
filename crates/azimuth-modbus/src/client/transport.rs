// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The seam between [`DeviceLink`](crate::DeviceLink) and the wire.

use async_trait::async_trait;
use azimuth_core::RegisterKind;

use crate::error::{ModbusError, ModbusResult, OperationError};

/// FC 05.
pub(crate) const FC_WRITE_COIL: u8 = 0x05;
/// FC 06.
pub(crate) const FC_WRITE_WORD: u8 = 0x06;
/// FC 16.
pub(crate) const FC_WRITE_WORDS: u8 = 0x10;

/// Read function code for a register kind (FC 01-04).
pub(crate) fn read_function_code(kind: RegisterKind) -> u8 {
    match kind {
        RegisterKind::Coil => 0x01,
        RegisterKind::DiscreteInput => 0x02,
        RegisterKind::HoldingRegister => 0x03,
        RegisterKind::InputRegister => 0x04,
    }
}

/// Rejects a bit read of a word kind and the reverse.
pub(crate) fn expect_table(kind: RegisterKind, bits: bool) -> ModbusResult<()> {
    if kind.is_bit() == bits {
        Ok(())
    } else {
        let requested = if bits { "bits" } else { "words" };
        Err(ModbusError::operation(OperationError::wrong_table(kind.code(), requested)))
    }
}

/// One Modbus session to the console: TCP, RTU or the simulator.
///
/// Connection management takes `&mut self`. The device link holds its own
/// lock around every call, so implementations never see concurrent
/// requests. A connection-class error on any call leaves the transport
/// disconnected.
#[async_trait]
pub trait ModbusTransport: Send + Sync {
    /// Opens the session. A no-op when already open.
    async fn connect(&mut self) -> ModbusResult<()>;

    /// Closes the session. A no-op when already closed.
    async fn disconnect(&mut self) -> ModbusResult<()>;

    /// `true` while a session is open.
    fn is_connected(&self) -> bool;

    /// Endpoint for logs, e.g. `rtu:///dev/ttyUSB0` or `tcp://10.0.0.5:502`.
    fn describe(&self) -> String;

    /// Reads `count` coils or discrete inputs.
    async fn read_bits(&self, kind: RegisterKind, address: u16, count: u16) -> ModbusResult<Vec<bool>>;

    /// Reads `count` holding or input register words.
    async fn read_words(&self, kind: RegisterKind, address: u16, count: u16) -> ModbusResult<Vec<u16>>;

    /// Writes one coil.
    async fn write_coil(&self, address: u16, value: bool) -> ModbusResult<()>;

    /// Writes one holding register.
    async fn write_word(&self, address: u16, value: u16) -> ModbusResult<()>;

    /// Writes consecutive holding registers in one request.
    async fn write_words(&self, address: u16, values: &[u16]) -> ModbusResult<()>;
}
