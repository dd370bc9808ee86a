// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types shared across the bridge crates.
//!
//! ```text
//! azimuth-core
//! ├── TableError        - register table construction
//! ├── KeyParseError     - "IREG_100" style key parsing
//! ├── ValidationError   - command rejected before any device I/O
//! ├── CommandParseError - inbound JSON that is not a known command
//! └── RecorderError     - run summary persistence
//! ```

use std::path::PathBuf;

use thiserror::Error;

use crate::register::RegisterKey;

// =============================================================================
// TableError
// =============================================================================

/// Errors raised while assembling a [`RegisterTable`](crate::RegisterTable).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    /// Two registers derived the same key.
    #[error("Duplicate register key: {key}")]
    DuplicateKey {
        /// The key that appeared twice.
        key: RegisterKey,
    },
}

// =============================================================================
// KeyParseError
// =============================================================================

/// Error parsing a textual register key such as `IREG_100`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid register key '{input}': {message}")]
pub struct KeyParseError {
    /// The rejected input.
    pub input: String,
    /// Why it was rejected.
    pub message: String,
}

impl KeyParseError {
    pub(crate) fn new(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            message: message.into(),
        }
    }
}

// =============================================================================
// ValidationError
// =============================================================================

/// A command parameter failed validation.
///
/// Raised before any register write is attempted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// An integer parameter lies outside its accepted range.
    #[error("{field} = {value} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Parameter name as it appears on the wire.
        field: &'static str,
        /// Rejected value.
        value: i64,
        /// Inclusive lower bound.
        min: i64,
        /// Inclusive upper bound.
        max: i64,
    },

    /// A floating point parameter is NaN or infinite.
    #[error("{field} must be a finite number")]
    NotFinite {
        /// Parameter name as it appears on the wire.
        field: &'static str,
    },

    /// A parameter that must be zero or positive was negative.
    #[error("{field} = {value} must not be negative")]
    Negative {
        /// Parameter name as it appears on the wire.
        field: &'static str,
        /// Rejected value.
        value: f64,
    },
}

impl ValidationError {
    /// Returns the name of the offending parameter.
    pub fn field(&self) -> &'static str {
        match self {
            Self::OutOfRange { field, .. } | Self::NotFinite { field } | Self::Negative { field, .. } => {
                field
            }
        }
    }
}

// =============================================================================
// CommandParseError
// =============================================================================

/// Inbound message could not be decoded into a [`Command`](crate::Command).
#[derive(Debug, Error)]
#[error("Invalid command message: {message}")]
pub struct CommandParseError {
    /// The `command` tag, if one could be read.
    pub command: Option<String>,
    /// Decoder message.
    pub message: String,
}

// =============================================================================
// RecorderError
// =============================================================================

/// Errors raised by a [`RunRecorder`](crate::RunRecorder).
#[derive(Debug, Error)]
pub enum RecorderError {
    /// The backing file could not be opened or written.
    #[error("Failed to write run record to '{path}': {source}")]
    Io {
        /// Target path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The summary could not be serialized.
    #[error("Failed to serialize run record: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The summary itself is invalid.
    #[error("Invalid run summary: {0}")]
    Invalid(#[from] ValidationError),
}

impl RecorderError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::OutOfRange {
            field: "thrust_setpoint",
            value: 150,
            min: -100,
            max: 100,
        };
        assert_eq!(err.to_string(), "thrust_setpoint = 150 is out of range [-100, 100]");
        assert_eq!(err.field(), "thrust_setpoint");
    }

    #[test]
    fn test_recorder_error_wraps_validation() {
        let err = RecorderError::from(ValidationError::NotFinite { field: "run_time" });
        assert!(err.to_string().contains("run_time"));
    }
}
