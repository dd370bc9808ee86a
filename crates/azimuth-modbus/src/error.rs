// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Errors raised while talking to the console.
//!
//! ```text
//! ModbusError
//! ├── Connection    - the link itself (socket, serial port, closed pipe)
//! ├── Protocol      - exception responses and malformed replies
//! ├── Operation     - requests the link refuses to send
//! ├── Conversion    - register word decoding/encoding
//! └── Timeout       - no reply before the deadline
//! ```
//!
//! Only connection errors end a session; see [`ModbusError::is_link_loss`].

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Result alias for link and transport calls.
pub type ModbusResult<T> = Result<T, ModbusError>;

// =============================================================================
// ModbusError
// =============================================================================

/// Any failure of a transport or of the device link.
#[derive(Debug, Error)]
pub enum ModbusError {
    /// The link to the device is unusable.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The device answered, but not with data.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The request was refused before reaching the wire.
    #[error(transparent)]
    Operation(#[from] OperationError),

    /// Register words and the typed value disagree.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// The device stayed silent.
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
}

impl ModbusError {
    /// Wraps a connection error.
    pub fn connection(error: ConnectionError) -> Self {
        Self::Connection(error)
    }

    /// Wraps a protocol error.
    pub fn protocol(error: ProtocolError) -> Self {
        Self::Protocol(error)
    }

    /// Wraps an operation error.
    pub fn operation(error: OperationError) -> Self {
        Self::Operation(error)
    }

    /// Wraps a conversion error.
    pub fn conversion(error: ConversionError) -> Self {
        Self::Conversion(error)
    }

    /// Wraps a timeout.
    pub fn timeout(error: TimeoutError) -> Self {
        Self::Timeout(error)
    }

    /// No session is open.
    pub fn not_connected() -> Self {
        Self::Connection(ConnectionError::NotConnected)
    }

    /// The device returned an exception for `function_code`.
    pub fn exception(function_code: u8, exception_code: u8) -> Self {
        Self::Protocol(ProtocolError::exception_response(function_code, exception_code))
    }

    /// `true` when the session is gone and must be reopened.
    ///
    /// A timeout or an exception response leaves the session usable.
    pub fn is_link_loss(&self) -> bool {
        matches!(self, Self::Connection(e) if e.ends_session())
    }
}

impl From<io::Error> for ModbusError {
    fn from(error: io::Error) -> Self {
        Self::Connection(ConnectionError::from_io(error))
    }
}

// =============================================================================
// ConnectionError
// =============================================================================

/// Failures opening or keeping a TCP or serial session.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Nothing accepted the connection.
    #[error("{endpoint} refused the connection")]
    Refused {
        /// `host:port` or a device label.
        endpoint: String,
        /// Socket error, if any.
        #[source]
        source: Option<io::Error>,
    },

    /// The connect attempt ran past its deadline.
    #[error("no answer from {endpoint} within {after:?}")]
    ConnectTimeout {
        /// `host:port`.
        endpoint: String,
        /// The deadline that expired.
        after: Duration,
    },

    /// The host name does not resolve.
    #[error("cannot resolve host '{host}'")]
    Unresolvable {
        /// Host as configured.
        host: String,
        /// Resolver error, if any.
        #[source]
        source: Option<io::Error>,
    },

    /// The serial port cannot be used.
    #[error("serial port {port}: {problem}")]
    Serial {
        /// Device path.
        port: String,
        /// What went wrong.
        problem: SerialProblem,
    },

    /// The peer went away mid-session.
    #[error("link closed{}", reason.as_deref().map(|r| format!(" ({})", r)).unwrap_or_default())]
    Closed {
        /// Reason, when known.
        reason: Option<String>,
    },

    /// No session is open.
    #[error("not connected to the console")]
    NotConnected,

    /// Any other socket or port error.
    #[error("link I/O error: {0}")]
    Io(#[source] io::Error),
}

/// Why a serial port could not be opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialProblem {
    /// No device at that path.
    Missing,
    /// The process may not open it.
    PermissionDenied,
    /// The driver rejected the line settings.
    Rejected(String),
}

impl std::fmt::Display for SerialProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => f.write_str("no such device"),
            Self::PermissionDenied => f.write_str("permission denied"),
            Self::Rejected(message) => write!(f, "settings rejected: {}", message),
        }
    }
}

impl ConnectionError {
    /// Connection refused by `endpoint`.
    pub fn refused(endpoint: impl Into<String>) -> Self {
        Self::Refused {
            endpoint: endpoint.into(),
            source: None,
        }
    }

    /// Connection refused with the socket error attached.
    pub fn refused_with(endpoint: impl Into<String>, source: io::Error) -> Self {
        Self::Refused {
            endpoint: endpoint.into(),
            source: Some(source),
        }
    }

    /// Connect deadline expired.
    pub fn timed_out(endpoint: impl Into<String>, after: Duration) -> Self {
        Self::ConnectTimeout {
            endpoint: endpoint.into(),
            after,
        }
    }

    /// Host lookup failed.
    pub fn unresolvable(host: impl Into<String>, source: Option<io::Error>) -> Self {
        Self::Unresolvable {
            host: host.into(),
            source,
        }
    }

    /// Serial port failure.
    pub fn serial(port: impl Into<String>, problem: SerialProblem) -> Self {
        Self::Serial {
            port: port.into(),
            problem,
        }
    }

    /// Peer closed the session.
    pub fn closed(reason: Option<String>) -> Self {
        Self::Closed { reason }
    }

    /// Sorts an I/O error into closed, not-connected or generic.
    pub fn from_io(error: io::Error) -> Self {
        use io::ErrorKind::*;
        match error.kind() {
            NotConnected => Self::NotConnected,
            ConnectionReset | ConnectionAborted | BrokenPipe | UnexpectedEof => {
                Self::closed(Some(error.to_string()))
            }
            _ => Self::Io(error),
        }
    }

    /// `true` for errors seen on an open session that leave it unusable.
    pub fn ends_session(&self) -> bool {
        match self {
            Self::Closed { .. } | Self::NotConnected | Self::Io(_) => true,
            Self::Serial { problem, .. } => *problem == SerialProblem::Missing,
            _ => false,
        }
    }
}

// =============================================================================
// ProtocolError
// =============================================================================

/// The device replied, but not with the requested data.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Modbus exception response.
    #[error("exception {exception_code:#04x} ({}) for function {function_code:#04x}", exception_name(*.exception_code))]
    ExceptionResponse {
        /// Function code of the request.
        function_code: u8,
        /// Exception code in the reply.
        exception_code: u8,
    },

    /// The reply could not be matched to the request.
    #[error("malformed reply: {0}")]
    Malformed(String),
}

impl ProtocolError {
    /// Exception response for `function_code`.
    pub fn exception_response(function_code: u8, exception_code: u8) -> Self {
        Self::ExceptionResponse {
            function_code,
            exception_code,
        }
    }

    /// Malformed reply.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }
}

/// Name of a standard Modbus exception code.
pub fn exception_name(code: u8) -> &'static str {
    match code {
        0x01 => "illegal function",
        0x02 => "illegal data address",
        0x03 => "illegal data value",
        0x04 => "server device failure",
        0x05 => "acknowledge",
        0x06 => "server device busy",
        0x08 => "memory parity error",
        0x0A => "gateway path unavailable",
        0x0B => "gateway target failed to respond",
        _ => "unknown exception",
    }
}

// =============================================================================
// OperationError
// =============================================================================

/// Requests rejected before any frame is sent.
#[derive(Debug, Error)]
pub enum OperationError {
    /// Input registers and discrete inputs cannot be written.
    #[error("{register_type} {address} is read-only")]
    ReadOnly {
        /// Register kind code.
        register_type: &'static str,
        /// Register address.
        address: u16,
    },

    /// The register kind cannot hold this value.
    #[error("cannot write a {value_type} to {register_type} {address}")]
    ValueMismatch {
        /// Register kind code.
        register_type: &'static str,
        /// Register address.
        address: u16,
        /// Value variant name.
        value_type: &'static str,
    },

    /// A bit read aimed at a word table or the reverse.
    #[error("{register_type} cannot be read as {requested}")]
    WrongTable {
        /// Register kind code.
        register_type: &'static str,
        /// `bits` or `words`.
        requested: &'static str,
    },
}

impl OperationError {
    /// Write attempted on a read-only kind.
    pub fn read_only(register_type: &'static str, address: u16) -> Self {
        Self::ReadOnly {
            register_type,
            address,
        }
    }

    /// Read of the wrong width for the kind.
    pub fn wrong_table(register_type: &'static str, requested: &'static str) -> Self {
        Self::WrongTable {
            register_type,
            requested,
        }
    }
}

// =============================================================================
// ConversionError
// =============================================================================

/// Word-level decode and encode failures.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// Fewer words than the data type needs.
    #[error("expected {expected} register words, got {actual}")]
    InsufficientData {
        /// Words needed.
        expected: usize,
        /// Words received.
        actual: usize,
    },

    /// The value is out of range for the target.
    #[error("{value} is out of range for {target_type}")]
    Overflow {
        /// Offending value, formatted.
        value: String,
        /// Target description.
        target_type: &'static str,
    },

    /// NaN or infinity.
    #[error("{value} cannot be written to a register")]
    NonFinite {
        /// Offending value.
        value: f64,
    },
}

impl ConversionError {
    /// Short read.
    pub fn insufficient_data(expected: usize, actual: usize) -> Self {
        Self::InsufficientData { expected, actual }
    }

    /// Out-of-range value.
    pub fn overflow(value: impl ToString, target_type: &'static str) -> Self {
        Self::Overflow {
            value: value.to_string(),
            target_type,
        }
    }
}

// =============================================================================
// TimeoutError
// =============================================================================

/// No reply within the operation deadline.
#[derive(Debug, Error)]
#[error("{direction} timed out after {after:?}")]
pub struct TimeoutError {
    /// `read` or `write`.
    pub direction: &'static str,
    /// The deadline that expired.
    pub after: Duration,
}

impl TimeoutError {
    /// Read deadline expired.
    pub fn read(after: Duration) -> Self {
        Self {
            direction: "read",
            after,
        }
    }

    /// Write deadline expired.
    pub fn write(after: Duration) -> Self {
        Self {
            direction: "write",
            after,
        }
    }
}
