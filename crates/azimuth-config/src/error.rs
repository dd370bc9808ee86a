// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration error types for azimuth-config.
//!
//! Covers both inputs the bridge reads at startup: the register map CSV and
//! the YAML application config. Register map errors carry the 1-based CSV
//! line of the offending row.

use std::path::PathBuf;

use azimuth_core::RegisterKey;
use thiserror::Error;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration-related errors.
///
/// Every variant is fatal at load time.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to parse a configuration or register map file.
    #[error("Failed to parse config file '{path}': {message}")]
    Parse {
        /// Path to the file.
        path: PathBuf,
        /// Error message.
        message: String,
        /// Line number (if available).
        line: Option<usize>,
    },

    /// Configuration validation failed.
    #[error("Validation failed for '{field}': {message}")]
    Validation {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// File I/O error.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        /// Path to the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// File not found.
    #[error("File not found: {path}")]
    FileNotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// Register map row has an unparsable address.
    #[error("Line {line}: invalid address '{address}': {message}")]
    InvalidAddress {
        /// CSV line.
        line: usize,
        /// The invalid address string.
        address: String,
        /// Error message.
        message: String,
    },

    /// A derived address does not fit in 16 bits.
    #[error("Line {line}: address {base} + {offset} overflows the register space")]
    AddressOverflow {
        /// CSV line.
        line: usize,
        /// Base address from the row.
        base: u16,
        /// Axis offset that was applied.
        offset: u16,
    },

    /// Two rows derive the same register key.
    #[error("Line {line}: duplicate register {key}")]
    DuplicateRegister {
        /// CSV line of the second occurrence.
        line: usize,
        /// The duplicated key.
        key: RegisterKey,
    },

    /// Register kind is not one of COIL, ISTS, HREG, IREG.
    #[error("Line {line}: unknown register kind '{kind}'")]
    UnknownKind {
        /// CSV line.
        line: usize,
        /// The rejected kind.
        kind: String,
    },

    /// Data type is unknown or not valid for the register kind.
    #[error("Line {line}: unsupported data type '{data_type}' for {kind} register")]
    UnknownDataType {
        /// CSV line.
        line: usize,
        /// The rejected type.
        data_type: String,
        /// Register kind code of the row.
        kind: String,
    },

    /// A flag column holds something other than a yes/no marker.
    #[error("Line {line}: invalid {column} flag '{value}'")]
    InvalidFlag {
        /// CSV line.
        line: usize,
        /// Column header.
        column: &'static str,
        /// The rejected value.
        value: String,
    },

    /// A numeric column is not a number.
    #[error("Line {line}: invalid {column} value '{value}'")]
    InvalidNumber {
        /// CSV line.
        line: usize,
        /// Column header.
        column: &'static str,
        /// The rejected value.
        value: String,
    },

    /// Invalid environment variable value.
    #[error("Invalid environment variable value for '{name}': {message}")]
    InvalidEnvVar {
        /// The environment variable name.
        name: String,
        /// Error message.
        message: String,
    },

    /// Serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message.
        message: String,
    },
}

impl ConfigError {
    /// Creates a parse error.
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
            line: None,
        }
    }

    /// Creates a parse error with line number.
    pub fn parse_at_line(path: impl Into<PathBuf>, message: impl Into<String>, line: usize) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
            line: Some(line),
        }
    }

    /// Creates a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a file not found error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates an invalid address error.
    pub fn invalid_address(line: usize, address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAddress {
            line,
            address: address.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid flag error.
    pub fn invalid_flag(line: usize, column: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidFlag {
            line,
            column,
            value: value.into(),
        }
    }

    /// Creates an invalid number error.
    pub fn invalid_number(line: usize, column: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidNumber {
            line,
            column,
            value: value.into(),
        }
    }

    /// Creates an invalid environment variable error.
    pub fn invalid_env_var(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEnvVar {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Returns the register map line the error refers to, if any.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Parse { line, .. } => *line,
            Self::InvalidAddress { line, .. }
            | Self::AddressOverflow { line, .. }
            | Self::DuplicateRegister { line, .. }
            | Self::UnknownKind { line, .. }
            | Self::UnknownDataType { line, .. }
            | Self::InvalidFlag { line, .. }
            | Self::InvalidNumber { line, .. } => Some(*line),
            _ => None,
        }
    }

    /// Returns `true` if this error came from the file system.
    pub fn is_io_error(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::FileNotFound { .. })
    }

    /// Returns a short category name for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse",
            Self::Validation { .. } => "validation",
            Self::Io { .. } | Self::FileNotFound { .. } => "io",
            Self::InvalidAddress { .. } | Self::AddressOverflow { .. } => "address",
            Self::DuplicateRegister { .. } => "duplicate",
            Self::UnknownKind { .. } | Self::UnknownDataType { .. } => "type",
            Self::InvalidFlag { .. } | Self::InvalidNumber { .. } => "value",
            Self::InvalidEnvVar { .. } => "env",
            Self::Serialization { .. } => "serialization",
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
    fn test_error_display() {
        let err = ConfigError::invalid_address(4, "xZZ", "not a number");
        assert_eq!(err.to_string(), "Line 4: invalid address 'xZZ': not a number");
        assert_eq!(err.line(), Some(4));
        assert_eq!(err.error_type(), "address");
    }

    #[test]
    fn test_line_only_for_row_errors() {
        assert_eq!(ConfigError::validation("poller.interval", "zero").line(), None);
        assert_eq!(ConfigError::parse_at_line("r.csv", "bad", 9).line(), Some(9));
        assert!(ConfigError::file_not_found("missing.csv").is_io_error());
    }
}
