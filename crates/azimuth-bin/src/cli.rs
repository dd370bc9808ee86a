// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! `azimuth [run|validate|version]`, with `run` as the default.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Modbus bridge between an azimuth-thruster console and its dashboard.
///
/// Polls the console's registers and serves them to dashboard clients over
/// WebSocket; commands from those clients are written back to the console.
#[derive(Parser, Debug)]
#[command(name = "azimuth", version = crate::VERSION, propagate_version = true)]
pub struct Cli {
    /// Bridge configuration file (YAML)
    #[arg(short, long, global = true, env = "AZIMUTH_CONFIG", default_value = "azimuth.yaml")]
    pub config: PathBuf,

    /// trace, debug, info, warn or error
    #[arg(short, long, global = true, env = "AZIMUTH_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log line layout
    #[arg(long, global = true, env = "AZIMUTH_LOG_FORMAT", value_enum, default_value_t)]
    pub log_format: LogFormat,

    /// Warnings and errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Same as `--log-level debug`
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand; `run` when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// What to do.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the bridge until SIGINT or SIGTERM
    Run(RunArgs),

    /// Load the configuration and register map, then exit
    Validate(ValidateArgs),

    /// Print crate versions
    Version,
}

/// `azimuth run`.
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Talk to the built-in simulated console instead of the configured device
    #[arg(long, env = "AZIMUTH_SIMULATE")]
    pub simulate: bool,

    /// Leave the first connect to the poller
    #[arg(long)]
    pub skip_connect: bool,
}

/// `azimuth validate`.
#[derive(Args, Debug, Clone, Default)]
pub struct ValidateArgs {
    /// Also print the effective configuration
    #[arg(short, long)]
    pub show_config: bool,

    /// Report layout
    #[arg(short, long, value_enum, default_value_t)]
    pub format: OutputFormat,

    /// Fail on warnings
    #[arg(long)]
    pub strict: bool,
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Full text lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
    /// Short text lines without targets
    Compact,
}

/// Layout of the `validate` report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// For people
    #[default]
    Text,
    /// For scripts
    Json,
}

impl Cli {
    /// Parses `std::env::args`.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The subcommand, `run` when none was given.
    pub fn effective_command(&self) -> Commands {
        match &self.command {
            Some(command) => command.clone(),
            None => Commands::Run(RunArgs::default()),
        }
    }

    /// `--quiet` beats `--verbose`, which beats `--log-level`.
    pub fn effective_log_level(&self) -> &str {
        match (self.quiet, self.verbose) {
            (true, _) => "warn",
            (false, true) => "debug",
            (false, false) => &self.log_level,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
