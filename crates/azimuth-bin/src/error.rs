// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Errors that end the `azimuth` process, and their exit codes.
//!
//! | Code | Meaning                                    |
//! |------|--------------------------------------------|
//! | 1    | configuration or register map              |
//! | 2    | run recorder could not be opened           |
//! | 3    | runtime failure                            |
//! | 4    | I/O                                        |
//! | 5    | dashboard server could not bind or serve   |

use thiserror::Error;

/// Result alias for the binary.
pub type BinResult<T> = Result<T, BinError>;

/// A fatal error.
#[derive(Debug, Error)]
pub enum BinError {
    /// Bad or missing configuration found by the binary itself.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Config file or register map failed to load.
    #[error(transparent)]
    Config(#[from] azimuth_config::ConfigError),

    /// Run history store failure.
    #[error("Recorder error: {0}")]
    Recorder(#[from] azimuth_core::RecorderError),

    /// Dashboard server failure.
    #[error("Server error: {0}")]
    Server(#[from] azimuth_bridge::ServerError),

    /// Anything else that stops the runtime.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Filesystem or terminal I/O.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Another error, prefixed with what was being attempted.
    #[error("{context}: {source}")]
    Context {
        /// What was being attempted.
        context: String,
        /// Why it failed.
        #[source]
        source: Box<BinError>,
    },
}

impl BinError {
    /// Configuration problem detected outside the loader.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Runtime failure.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(message.into())
    }

    /// Prefixes the error with `context`.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Exit status for the process.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) | Self::Config(_) => 1,
            Self::Recorder(_) => 2,
            Self::Runtime(_) => 3,
            Self::Io(_) => 4,
            Self::Server(_) => 5,
            Self::Context { source, .. } => source.exit_code(),
        }
    }
}

/// Prints the error and every cause to stderr, then exits.
pub fn report_error_and_exit(error: BinError) -> ! {
    eprintln!("Error: {}", error);
    // Context already prints its source inline.
    let mut cause = match &error {
        BinError::Context { source, .. } => std::error::Error::source(source.as_ref()),
        other => std::error::Error::source(other),
    };
    while let Some(err) = cause {
        eprintln!("  Caused by: {}", err);
        cause = err.source();
    }
    std::process::exit(error.exit_code())
}
