// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Application configuration schema.
//!
//! # Schema Structure
//!
//! ```text
//! BridgeConfig
//! ├── connection: ConnectionConfig   (transport, retry, word order)
//! ├── register_map: PathBuf          (CSV, relative to the config file)
//! ├── poller: PollerSettings
//! ├── commands: CommandSettings      (limits + register layout)
//! ├── dashboard: DashboardMapping
//! ├── server: ServerConfig
//! └── recorder: RecorderConfig
//! ```
//!
//! Every section is optional; an empty document yields the console defaults.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use azimuth_core::{CommandLimits, CommandRegisters, DashboardMapping, StaleValues};
use azimuth_modbus::{ByteOrder, ConnectPolicy, ExponentialBackoff, ModbusRtuConfig, ModbusTcpConfig, RetryStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

// =============================================================================
// Constants
// =============================================================================

/// Default connect attempts per `connect` call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay between connect attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Default poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default decimals kept for float registers.
pub const DEFAULT_FLOAT_PRECISION: u32 = 3;

/// Largest accepted float precision.
pub const MAX_FLOAT_PRECISION: u32 = 9;

/// Default WebSocket server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default per-subscriber queue capacity.
pub const DEFAULT_SUBSCRIBER_QUEUE: usize = 32;

// =============================================================================
// Top-Level Configuration
// =============================================================================

/// The root configuration structure for the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Device connection.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Register map CSV.
    #[serde(default = "default_register_map")]
    pub register_map: PathBuf,

    /// Poll loop.
    #[serde(default)]
    pub poller: PollerSettings,

    /// Command validation and register layout.
    #[serde(default)]
    pub commands: CommandSettings,

    /// Registers feeding the dashboard view.
    #[serde(default)]
    pub dashboard: DashboardMapping,

    /// WebSocket server.
    #[serde(default)]
    pub server: ServerConfig,

    /// Run summary storage.
    #[serde(default)]
    pub recorder: RecorderConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            register_map: default_register_map(),
            poller: PollerSettings::default(),
            commands: CommandSettings::default(),
            dashboard: DashboardMapping::default(),
            server: ServerConfig::default(),
            recorder: RecorderConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.connection.validate()?;
        self.poller.validate()?;
        self.commands.validate()?;
        self.server.validate()?;
        self.recorder.validate()?;

        if self.register_map.as_os_str().is_empty() {
            return Err(ConfigError::validation("register_map", "path must not be empty"));
        }

        Ok(())
    }
}

fn default_register_map() -> PathBuf {
    PathBuf::from("registers.csv")
}

// =============================================================================
// Connection
// =============================================================================

/// Which transport carries the Modbus traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    /// Serial RTU.
    #[default]
    Rtu,
    /// Modbus TCP.
    Tcp,
    /// In-process simulated console.
    Simulated,
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rtu => f.write_str("rtu"),
            Self::Tcp => f.write_str("tcp"),
            Self::Simulated => f.write_str("simulated"),
        }
    }
}

impl std::str::FromStr for ConnectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rtu" | "serial" => Ok(Self::Rtu),
            "tcp" => Ok(Self::Tcp),
            "simulated" | "sim" => Ok(Self::Simulated),
            other => Err(format!("unknown connection kind '{}'", other)),
        }
    }
}

/// Delay shape between connect attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// `retry_delay` between every attempt.
    #[default]
    Fixed,
    /// Doubling from `retry_delay` up to `max_retry_delay`.
    Exponential,
}

/// Device connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Transport.
    #[serde(default)]
    pub kind: ConnectionKind,

    /// Attempts per `connect` call.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between attempts.
    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub retry_delay: Duration,

    /// Delay shape.
    #[serde(default)]
    pub backoff: BackoffKind,

    /// Cap for exponential backoff.
    #[serde(default = "default_max_retry_delay", with = "humantime_serde")]
    pub max_retry_delay: Duration,

    /// Jitter factor for exponential backoff (0.0 to 1.0).
    #[serde(default)]
    pub jitter: f64,

    /// Word and byte order of 32-bit values.
    #[serde(default)]
    pub byte_order: ByteOrder,

    /// Serial settings, used when `kind` is `rtu`.
    #[serde(default)]
    pub rtu: ModbusRtuConfig,

    /// TCP settings, used when `kind` is `tcp`.
    #[serde(default)]
    pub tcp: ModbusTcpConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            kind: ConnectionKind::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            backoff: BackoffKind::default(),
            max_retry_delay: default_max_retry_delay(),
            jitter: 0.0,
            byte_order: ByteOrder::default(),
            rtu: ModbusRtuConfig::default(),
            tcp: ModbusTcpConfig::default(),
        }
    }
}

impl ConnectionConfig {
    /// Builds the connect policy described by this section.
    pub fn connect_policy(&self) -> ConnectPolicy {
        let strategy = match self.backoff {
            BackoffKind::Fixed => RetryStrategy::Fixed(self.retry_delay),
            BackoffKind::Exponential => RetryStrategy::Exponential(
                ExponentialBackoff::new(self.retry_delay, self.max_retry_delay).with_jitter(self.jitter),
            ),
        };
        ConnectPolicy {
            max_attempts: self.max_attempts,
            strategy,
        }
    }

    /// Human-readable endpoint for the selected transport.
    pub fn endpoint(&self) -> String {
        match self.kind {
            ConnectionKind::Rtu => format!("rtu://{} ({})", self.rtu.port, self.rtu.line_settings()),
            ConnectionKind::Tcp => format!("tcp://{}", self.tcp.socket_addr()),
            ConnectionKind::Simulated => "simulated".to_string(),
        }
    }

    /// Validates the connection section.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::validation(
                "connection.max_attempts",
                "must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::validation(
                "connection.jitter",
                "must be between 0.0 and 1.0",
            ));
        }
        if self.backoff == BackoffKind::Exponential && self.max_retry_delay < self.retry_delay {
            return Err(ConfigError::validation(
                "connection.max_retry_delay",
                "must not be shorter than retry_delay",
            ));
        }

        match self.kind {
            ConnectionKind::Rtu => {
                if self.rtu.port.trim().is_empty() {
                    return Err(ConfigError::validation("connection.rtu.port", "must not be empty"));
                }
                if self.rtu.baud_rate == 0 {
                    return Err(ConfigError::validation("connection.rtu.baud_rate", "must be positive"));
                }
            }
            ConnectionKind::Tcp => {
                if self.tcp.host.trim().is_empty() {
                    return Err(ConfigError::validation("connection.tcp.host", "must not be empty"));
                }
                if self.tcp.port == 0 {
                    return Err(ConfigError::validation("connection.tcp.port", "must be positive"));
                }
            }
            ConnectionKind::Simulated => {}
        }

        Ok(())
    }
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_retry_delay() -> Duration {
    DEFAULT_RETRY_DELAY
}

fn default_max_retry_delay() -> Duration {
    Duration::from_secs(30)
}

// =============================================================================
// Poller
// =============================================================================

/// Poll loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollerSettings {
    /// Time between cycle starts.
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// What a failed read leaves in the snapshot.
    #[serde(default)]
    pub stale_values: StaleValues,

    /// Decimals kept for float registers.
    #[serde(default = "default_float_precision")]
    pub float_precision: u32,

    /// Reconnect automatically while the link is down.
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,

    /// Wait between cycles while the link is down.
    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub reconnect_backoff: Duration,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            stale_values: StaleValues::default(),
            float_precision: DEFAULT_FLOAT_PRECISION,
            auto_reconnect: true,
            reconnect_backoff: DEFAULT_RETRY_DELAY,
        }
    }
}

impl PollerSettings {
    /// Validates the poller section.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.interval.is_zero() {
            return Err(ConfigError::validation("poller.interval", "must be greater than zero"));
        }
        if self.reconnect_backoff.is_zero() {
            return Err(ConfigError::validation(
                "poller.reconnect_backoff",
                "must be greater than zero",
            ));
        }
        if self.float_precision > MAX_FLOAT_PRECISION {
            return Err(ConfigError::validation(
                "poller.float_precision",
                format!("must be at most {}", MAX_FLOAT_PRECISION),
            ));
        }
        Ok(())
    }
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

fn default_float_precision() -> u32 {
    DEFAULT_FLOAT_PRECISION
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Commands
// =============================================================================

/// Command validation ranges and target registers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandSettings {
    /// Accepted parameter ranges.
    #[serde(default)]
    pub limits: CommandLimits,

    /// Registers each command writes.
    #[serde(default)]
    pub registers: CommandRegisters,
}

impl CommandSettings {
    /// Validates the commands section.
    pub fn validate(&self) -> ConfigResult<()> {
        for (name, range) in self.limits.ranges() {
            if !range.is_valid() {
                return Err(ConfigError::validation(
                    format!("commands.limits.{}", name),
                    format!("min {} is greater than max {}", range.min, range.max),
                ));
            }
        }

        let position = self.limits.position;
        if position.min < i32::from(i16::MIN) || position.max > i32::from(u16::MAX) {
            return Err(ConfigError::validation(
                "commands.limits.position",
                "must fit a 16-bit register",
            ));
        }

        for (name, key) in self.registers.all() {
            if !key.kind.is_writable() {
                return Err(ConfigError::validation(
                    format!("commands.registers.{}", name),
                    format!("{} is not writable", key),
                ));
            }
        }

        Ok(())
    }
}

// =============================================================================
// Server
// =============================================================================

/// WebSocket server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// Listen port.
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Outbound messages buffered per subscriber.
    #[serde(default = "default_subscriber_queue")]
    pub subscriber_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: DEFAULT_SERVER_PORT,
            subscriber_queue: DEFAULT_SUBSCRIBER_QUEUE,
        }
    }
}

impl ServerConfig {
    /// Socket address to bind.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Validates the server section.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.subscriber_queue == 0 {
            return Err(ConfigError::validation(
                "server.subscriber_queue",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_server_port() -> u16 {
    DEFAULT_SERVER_PORT
}

fn default_subscriber_queue() -> usize {
    DEFAULT_SUBSCRIBER_QUEUE
}

// =============================================================================
// Recorder
// =============================================================================

/// Run summary backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecorderKind {
    /// Append-only JSON lines file.
    #[default]
    Jsonl,
    /// Process memory only.
    Memory,
}

/// Run summary storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Backend.
    #[serde(default)]
    pub kind: RecorderKind,

    /// File for the `jsonl` backend.
    #[serde(default = "default_recorder_path")]
    pub path: PathBuf,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            kind: RecorderKind::default(),
            path: default_recorder_path(),
        }
    }
}

impl RecorderConfig {
    /// Validates the recorder section.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.kind == RecorderKind::Jsonl && self.path.as_os_str().is_empty() {
            return Err(ConfigError::validation("recorder.path", "must not be empty"));
        }
        Ok(())
    }
}

fn default_recorder_path() -> PathBuf {
    PathBuf::from("runs.jsonl")
}

// =============================================================================
// Tests
// =============================================================================
