// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for azimuth-bridge.
//!
//! ```text
//! azimuth-bridge
//! ├── CommandError - one command, reported back to the subscriber that sent it
//! └── ServerError  - the WebSocket listener itself
//! ```

use std::net::SocketAddr;

use azimuth_core::{RecorderError, ValidationError};
use azimuth_modbus::ModbusError;
use thiserror::Error;

// =============================================================================
// CommandError
// =============================================================================

/// A command that could not be applied.
///
/// Errors never outlive the command: the next command starts from scratch.
#[derive(Debug, Error)]
pub enum CommandError {
    /// A parameter was out of range. Nothing was written.
    #[error("Invalid command: {0}")]
    Validation(#[from] ValidationError),

    /// A write step failed. Later steps were not attempted.
    #[error("Write step '{step}' failed: {source}")]
    Write {
        /// Label of the failed step.
        step: String,
        /// Device error.
        #[source]
        source: ModbusError,
    },

    /// The link dropped before a step could be sent.
    #[error("Device link unavailable at step '{step}'")]
    LinkUnavailable {
        /// Label of the step that was not sent.
        step: String,
    },

    /// The run summary could not be stored.
    #[error("Failed to record run: {0}")]
    Recorder(#[from] RecorderError),
}

impl CommandError {
    /// Creates a write error.
    pub fn write(step: impl Into<String>, source: ModbusError) -> Self {
        Self::Write {
            step: step.into(),
            source,
        }
    }

    /// Creates a link unavailable error.
    pub fn link_unavailable(step: impl Into<String>) -> Self {
        Self::LinkUnavailable { step: step.into() }
    }

    /// The `kind` reported in a failure acknowledgement.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Write { .. } | Self::LinkUnavailable { .. } => "write",
            Self::Recorder(_) => "recorder",
        }
    }

    /// Label of the step that failed, for write errors.
    pub fn step(&self) -> Option<&str> {
        match self {
            Self::Write { step, .. } | Self::LinkUnavailable { step } => Some(step),
            _ => None,
        }
    }
}

// =============================================================================
// ServerError
// =============================================================================

/// Result type for the channel server.
pub type ServerResult<T> = Result<T, ServerError>;

/// WebSocket server failures.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The server stopped with an error.
    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_step() {
        let err = CommandError::write("detent_use", ModbusError::not_connected());
        assert_eq!(err.kind(), "write");
        assert_eq!(err.step(), Some("detent_use"));
        assert!(err.to_string().starts_with("Write step 'detent_use' failed"));

        let err = CommandError::link_unavailable("thrust_setpoint");
        assert_eq!(err.kind(), "write");

        let err = CommandError::from(ValidationError::NotFinite { field: "run_time" });
        assert_eq!(err.kind(), "validation");
        assert_eq!(err.step(), None);
    }
}
