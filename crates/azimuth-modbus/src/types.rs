// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Transport settings and word-order definitions.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// =============================================================================
// ByteOrder
// =============================================================================

/// Layout of a 32-bit value across two 16-bit registers.
///
/// Letters name the bytes of the value from most (`A`) to least (`D`)
/// significant, in the order they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    /// Register order: [MSW, LSW]. Byte order within word: [MSB, LSB] (`ABCD`).
    BigEndian,

    /// Register order: [LSW, MSW]. Byte order within word: [LSB, MSB] (`DCBA`).
    LittleEndian,

    /// Register order: [MSW, LSW]. Byte order within word: [LSB, MSB] (`BADC`).
    MidBigEndian,

    /// Register order: [LSW, MSW]. Byte order within word: [MSB, LSB] (`CDAB`).
    ///
    /// This is what the thruster console firmware uses.
    #[default]
    MidLittleEndian,
}

impl ByteOrder {
    /// Returns common vendor-specific aliases for this byte order.
    pub const fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::BigEndian => &["ABCD", "big", "be", "network"],
            Self::LittleEndian => &["DCBA", "little", "le", "intel"],
            Self::MidBigEndian => &["BADC", "mid_big", "byte_swap"],
            Self::MidLittleEndian => &["CDAB", "mid_little", "word_swap", "device"],
        }
    }

    /// Returns `true` if the low word is sent first.
    pub const fn low_word_first(&self) -> bool {
        matches!(self, Self::LittleEndian | Self::MidLittleEndian)
    }

    /// Returns `true` if the bytes inside each word are swapped.
    pub const fn swap_bytes(&self) -> bool {
        matches!(self, Self::LittleEndian | Self::MidBigEndian)
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BigEndian => "big_endian",
            Self::LittleEndian => "little_endian",
            Self::MidBigEndian => "mid_big_endian",
            Self::MidLittleEndian => "mid_little_endian",
        };
        write!(f, "{}", s)
    }
}

/// Error returned when a byte order name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown byte order '{0}' (expected big_endian, little_endian, mid_big_endian or mid_little_endian)")]
pub struct ByteOrderParseError(pub String);

impl FromStr for ByteOrder {
    type Err = ByteOrderParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "bigendian" | "big" | "be" | "abcd" | "network" => Ok(Self::BigEndian),
            "littleendian" | "little" | "le" | "dcba" | "intel" => Ok(Self::LittleEndian),
            "midbigendian" | "midbig" | "badc" | "byteswap" => Ok(Self::MidBigEndian),
            "midlittleendian" | "midlittle" | "cdab" | "wordswap" | "device" => {
                Ok(Self::MidLittleEndian)
            }
            _ => Err(ByteOrderParseError(s.to_string())),
        }
    }
}

// =============================================================================
// Serial Port Settings
// =============================================================================

/// Data bits configuration.
///
/// Written as a plain number in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum DataBits {
    /// 7 data bits.
    Seven,
    /// 8 data bits (default).
    #[default]
    Eight,
}

impl DataBits {
    /// Returns the number of bits.
    pub const fn bits(&self) -> u8 {
        match self {
            Self::Seven => 7,
            Self::Eight => 8,
        }
    }
}

impl TryFrom<u8> for DataBits {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            7 => Ok(Self::Seven),
            8 => Ok(Self::Eight),
            other => Err(format!("unsupported data bits {} (expected 7 or 8)", other)),
        }
    }
}

impl From<DataBits> for u8 {
    fn from(bits: DataBits) -> Self {
        bits.bits()
    }
}

impl fmt::Display for DataBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

/// Parity configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    /// No parity (default).
    #[default]
    #[serde(alias = "N", alias = "n")]
    None,
    /// Odd parity.
    #[serde(alias = "O", alias = "o")]
    Odd,
    /// Even parity.
    #[serde(alias = "E", alias = "e")]
    Even,
}

impl Parity {
    /// Returns the short character representation.
    pub const fn char(&self) -> char {
        match self {
            Self::None => 'N',
            Self::Odd => 'O',
            Self::Even => 'E',
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.char())
    }
}

/// Stop bits configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum StopBits {
    /// 1 stop bit (default).
    #[default]
    One,
    /// 2 stop bits.
    Two,
}

impl StopBits {
    /// Returns the number of stop bits.
    pub const fn bits(&self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }
}

impl TryFrom<u8> for StopBits {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(format!("unsupported stop bits {} (expected 1 or 2)", other)),
        }
    }
}

impl From<StopBits> for u8 {
    fn from(bits: StopBits) -> Self {
        bits.bits()
    }
}

impl fmt::Display for StopBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

// =============================================================================
// ModbusTcpConfig
// =============================================================================

/// Modbus TCP transport settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModbusTcpConfig {
    /// Device host name or IP address.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port.
    #[serde(default = "default_tcp_port")]
    pub port: u16,

    /// Modbus unit identifier.
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// Deadline for establishing the connection.
    #[serde(default = "default_connect_timeout")]
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Deadline for a single read or write.
    #[serde(default = "default_operation_timeout")]
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,

    /// Disables Nagle's algorithm on the socket.
    #[serde(default = "default_true")]
    pub tcp_nodelay: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_tcp_port() -> u16 {
    502
}

fn default_unit_id() -> u8 {
    1
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_operation_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_true() -> bool {
    true
}

impl ModbusTcpConfig {
    /// Creates a configuration for the given host and port.
    pub fn with_port(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Returns `host:port`.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ModbusTcpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_tcp_port(),
            unit_id: default_unit_id(),
            connect_timeout: default_connect_timeout(),
            operation_timeout: default_operation_timeout(),
            tcp_nodelay: true,
        }
    }
}

// =============================================================================
// ModbusRtuConfig
// =============================================================================

/// Modbus RTU (serial) transport settings.
///
/// Defaults match the console controller: 115200 baud, 8N1, unit 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModbusRtuConfig {
    /// Serial device path.
    #[serde(default = "default_serial_port")]
    pub port: String,

    /// Baud rate.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Data bits.
    #[serde(default)]
    pub data_bits: DataBits,

    /// Parity.
    #[serde(default)]
    pub parity: Parity,

    /// Stop bits.
    #[serde(default)]
    pub stop_bits: StopBits,

    /// Modbus unit identifier.
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// Deadline for a single read or write.
    #[serde(default = "default_operation_timeout")]
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_serial_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud_rate() -> u32 {
    115_200
}

impl ModbusRtuConfig {
    /// Creates a configuration for the given serial port with default line settings.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    /// Line settings in the usual `115200 8N1` notation.
    pub fn line_settings(&self) -> String {
        format!(
            "{} {}{}{}",
            self.baud_rate, self.data_bits, self.parity, self.stop_bits
        )
    }
}

impl Default for ModbusRtuConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            data_bits: DataBits::default(),
            parity: Parity::default(),
            stop_bits: StopBits::default(),
            unit_id: default_unit_id(),
            timeout: default_operation_timeout(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
