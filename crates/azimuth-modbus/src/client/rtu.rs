// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Modbus RTU over the console's RS-485 line (normally 115200 8N1).

use std::io::ErrorKind as IoErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use tokio_modbus::client::Context as ModbusContext;
use tokio_modbus::prelude::*;
use tokio_serial::{ErrorKind as SerialErrorKind, SerialPortBuilderExt};

use crate::error::{ConnectionError, ModbusResult, SerialProblem};
use crate::types::{DataBits, ModbusRtuConfig, Parity, StopBits};

use super::session::{Dialer, SessionTransport};

/// Serial transport.
pub type ModbusRtuTransport = SessionTransport<RtuDialer>;

impl SessionTransport<RtuDialer> {
    /// Creates a disconnected RTU transport.
    pub fn new(config: ModbusRtuConfig) -> Self {
        Self::from_dialer(RtuDialer { config })
    }

    /// The serial settings.
    pub fn config(&self) -> &ModbusRtuConfig {
        &self.dialer.config
    }
}

/// Opens serial sessions.
#[derive(Debug, Clone)]
pub struct RtuDialer {
    config: ModbusRtuConfig,
}

impl From<DataBits> for tokio_serial::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Seven => Self::Seven,
            DataBits::Eight => Self::Eight,
        }
    }
}

impl From<Parity> for tokio_serial::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => Self::None,
            Parity::Odd => Self::Odd,
            Parity::Even => Self::Even,
        }
    }
}

impl From<StopBits> for tokio_serial::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => Self::One,
            StopBits::Two => Self::Two,
        }
    }
}

fn serial_problem(error: &tokio_serial::Error) -> SerialProblem {
    match error.kind {
        SerialErrorKind::NoDevice | SerialErrorKind::Io(IoErrorKind::NotFound) => SerialProblem::Missing,
        SerialErrorKind::Io(IoErrorKind::PermissionDenied) => SerialProblem::PermissionDenied,
        _ => SerialProblem::Rejected(error.description.clone()),
    }
}

#[async_trait]
impl Dialer for RtuDialer {
    async fn dial(&self) -> ModbusResult<ModbusContext> {
        let config = &self.config;
        let port = tokio_serial::new(&config.port, config.baud_rate)
            .data_bits(config.data_bits.into())
            .parity(config.parity.into())
            .stop_bits(config.stop_bits.into())
            .open_native_async()
            .map_err(|e| ConnectionError::serial(&config.port, serial_problem(&e)))?;

        tracing::debug!(port = %config.port, line = %config.line_settings(), "Serial port opened");
        Ok(rtu::attach_slave(port, Slave(config.unit_id)))
    }

    fn endpoint(&self) -> String {
        format!("rtu://{}", self.config.port)
    }

    fn operation_timeout(&self) -> Duration {
        self.config.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ModbusTransport;
    use crate::error::ModbusError;

    #[tokio::test]
    async fn test_missing_port_fails_to_connect() {
        let mut transport = ModbusRtuTransport::new(ModbusRtuConfig::new("/dev/azimuth-does-not-exist"));
        let err = transport.connect().await.unwrap_err();
        assert!(matches!(err, ModbusError::Connection(ConnectionError::Serial { .. })));
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_describe() {
        let transport = ModbusRtuTransport::new(ModbusRtuConfig::default());
        assert_eq!(transport.describe(), "rtu:///dev/ttyUSB0");
        assert_eq!(transport.config().line_settings(), "115200 8N1");
    }
}
