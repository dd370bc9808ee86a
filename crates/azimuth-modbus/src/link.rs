// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The single shared connection to the console.
//!
//! # State Machine
//!
//! ```text
//!                connect()
//!  Disconnected ──────────► Connecting ──► Connected
//!       ▲                       │              │
//!       │                       │ attempts     │ link loss
//!       │                       ▼ exhausted    │ or disconnect()
//!       │                    Failed            │
//!       └──────────────────────────────────────┘
//! ```
//!
//! Every read or write holds the transport lock for exactly one Modbus
//! call. The lock is released between connect attempts and between the
//! steps of a multi-register command.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use azimuth_core::{DataType, Register, RegisterKey, RegisterKind, Value};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::client::{ConnectPolicy, DataConverter, ModbusTransport, encode_word};
use crate::error::{ModbusError, ModbusResult, OperationError, ProtocolError};
use crate::types::ByteOrder;

// =============================================================================
// LinkState
// =============================================================================

/// Connection state of the device link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// Not connected. Reads and writes are skipped.
    #[default]
    Disconnected,
    /// A `connect` call is in progress.
    Connecting,
    /// Ready for reads and writes.
    Connected,
    /// The last `connect` call exhausted its attempts.
    Failed,
}

impl LinkState {
    /// Returns `true` if the link is connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` if a `connect` call should be made before using the link.
    pub fn needs_connect(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// Result of an operation attempted on the link.
///
/// `Skipped` is not an error: the link was not connected, so nothing was sent.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The operation ran on the device.
    Completed(T),
    /// The link was not connected.
    Skipped,
}

impl<T> Outcome<T> {
    /// Returns `true` for [`Outcome::Skipped`].
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }

    /// Converts into an `Option`, dropping the skipped case.
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(v) => Some(v),
            Self::Skipped => None,
        }
    }
}

// =============================================================================
// LinkStats
// =============================================================================

/// Point-in-time link counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    /// Reads sent to the device.
    pub reads: u64,
    /// Reads that returned an error.
    pub read_failures: u64,
    /// Writes sent to the device.
    pub writes: u64,
    /// Writes that returned an error.
    pub write_failures: u64,
    /// Operations skipped because the link was not connected.
    pub skipped: u64,
    /// Transport connect attempts.
    pub connect_attempts: u64,
}

#[derive(Debug, Default)]
struct LinkCounters {
    reads: AtomicU64,
    read_failures: AtomicU64,
    writes: AtomicU64,
    write_failures: AtomicU64,
    skipped: AtomicU64,
    connect_attempts: AtomicU64,
}

impl LinkCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> LinkStats {
        LinkStats {
            reads: self.reads.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// DeviceLink
// =============================================================================

/// Typed register access over one transport.
///
/// Shared behind an `Arc` by the poller and the command router.
pub struct DeviceLink {
    transport: Mutex<Box<dyn ModbusTransport>>,
    state: RwLock<LinkState>,
    converter: DataConverter,
    endpoint: String,
    counters: LinkCounters,
}

impl DeviceLink {
    /// Wraps a transport. The link starts disconnected.
    pub fn new(transport: Box<dyn ModbusTransport>, byte_order: ByteOrder) -> Self {
        let endpoint = transport.describe();
        Self {
            transport: Mutex::new(transport),
            state: RwLock::new(LinkState::Disconnected),
            converter: DataConverter::new(byte_order),
            endpoint,
            counters: LinkCounters::default(),
        }
    }

    /// Current state.
    pub fn state(&self) -> LinkState {
        *self.state.read()
    }

    /// Returns `true` if connected.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Transport endpoint, for logs.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Word order used for float registers.
    pub fn byte_order(&self) -> ByteOrder {
        self.converter.byte_order()
    }

    /// Counter snapshot.
    pub fn stats(&self) -> LinkStats {
        self.counters.snapshot()
    }

    fn set_state(&self, state: LinkState) {
        *self.state.write() = state;
    }

    // =========================================================================
    // Connection Management
    // =========================================================================

    /// Connects using `max_attempts` tries `retry_delay` apart.
    pub async fn connect_with(&self, max_attempts: u32, retry_delay: Duration) -> bool {
        self.connect(&ConnectPolicy::fixed(max_attempts, retry_delay)).await
    }

    /// Connects according to `policy`.
    ///
    /// Returns `false` once every attempt has failed and leaves the link
    /// [`LinkState::Failed`]. The transport lock is only held during each
    /// handshake, never across the back-off sleep. Dropping the future part
    /// way through leaves the link [`LinkState::Disconnected`].
    pub async fn connect(&self, policy: &ConnectPolicy) -> bool {
        if self.is_connected() {
            return true;
        }

        let mut pending = PendingConnect::begin(self);
        let attempts = policy.attempts();

        for attempt in 1..=attempts {
            LinkCounters::bump(&self.counters.connect_attempts);

            let result = self.transport.lock().await.connect().await;
            match result {
                Ok(()) => {
                    pending.settle(LinkState::Connected);
                    tracing::info!(endpoint = %self.endpoint, attempt, "Device link connected");
                    return true;
                }
                Err(e) => {
                    tracing::warn!(
                        endpoint = %self.endpoint,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Connect attempt failed"
                    );
                }
            }

            if attempt < attempts {
                let delay = policy.delay_after(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        pending.settle(LinkState::Failed);
        tracing::error!(
            endpoint = %self.endpoint,
            attempts,
            "Device link unavailable, connect attempts exhausted"
        );
        false
    }

    /// Closes the transport. Safe to call in any state, any number of times.
    pub async fn disconnect(&self) {
        let mut transport = self.transport.lock().await;
        if let Err(e) = transport.disconnect().await {
            tracing::warn!(endpoint = %self.endpoint, error = %e, "Error while disconnecting");
        }
        drop(transport);

        let previous = std::mem::replace(&mut *self.state.write(), LinkState::Disconnected);
        if previous.is_connected() {
            tracing::info!(endpoint = %self.endpoint, "Device link disconnected");
        }
    }

    async fn drop_link(&self, transport: &mut Box<dyn ModbusTransport>, error: &ModbusError) {
        if let Err(e) = transport.disconnect().await {
            tracing::debug!(endpoint = %self.endpoint, error = %e, "Error while closing lost link");
        }
        self.set_state(LinkState::Disconnected);
        tracing::warn!(endpoint = %self.endpoint, error = %error, "Device link lost");
    }

    fn skip(&self, op: &'static str, key: RegisterKey) {
        LinkCounters::bump(&self.counters.skipped);
        tracing::warn!(op, key = %key, state = %self.state(), "Link not connected, operation skipped");
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Reads a register from the table.
    pub async fn read(&self, register: &Register) -> ModbusResult<Outcome<Value>> {
        self.read_register(register.key, register.data_type).await
    }

    /// Reads one register and decodes it as `data_type`.
    ///
    /// Bit registers always decode as [`Value::Bool`].
    pub async fn read_register(&self, key: RegisterKey, data_type: DataType) -> ModbusResult<Outcome<Value>> {
        if !self.is_connected() {
            self.skip("read", key);
            return Ok(Outcome::Skipped);
        }

        let mut transport = self.transport.lock().await;
        if !self.is_connected() {
            drop(transport);
            self.skip("read", key);
            return Ok(Outcome::Skipped);
        }

        LinkCounters::bump(&self.counters.reads);
        let result = self.read_locked(&**transport, key, data_type).await;

        match result {
            Ok(value) => Ok(Outcome::Completed(value)),
            Err(e) => {
                LinkCounters::bump(&self.counters.read_failures);
                if e.is_link_loss() {
                    self.drop_link(&mut transport, &e).await;
                }
                Err(e)
            }
        }
    }

    async fn read_locked(
        &self,
        transport: &dyn ModbusTransport,
        key: RegisterKey,
        data_type: DataType,
    ) -> ModbusResult<Value> {
        let address = key.address;
        let empty = || {
            ModbusError::protocol(ProtocolError::unexpected(format!("empty response for {}", key)))
        };

        if key.kind.is_bit() {
            let bits = transport.read_bits(key.kind, address, 1).await?;
            bits.first().copied().map(Value::Bool).ok_or_else(empty)
        } else {
            let words = transport.read_words(key.kind, address, data_type.word_count()).await?;
            self.converter.decode_words(data_type, &words)
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Writes one value.
    ///
    /// | Target  | Value   | Function code |
    /// |---------|---------|---------------|
    /// | coil    | `Bool`  | FC 05         |
    /// | holding | `Int`   | FC 06         |
    /// | holding | `Bool`  | FC 06 (0/1)   |
    /// | holding | `Float` | FC 16, 2 words|
    pub async fn write_register(&self, key: RegisterKey, value: Value) -> ModbusResult<Outcome<()>> {
        let payload = self.encode(key, value)?;

        if !self.is_connected() {
            self.skip("write", key);
            return Ok(Outcome::Skipped);
        }

        let mut transport = self.transport.lock().await;
        if !self.is_connected() {
            drop(transport);
            self.skip("write", key);
            return Ok(Outcome::Skipped);
        }

        LinkCounters::bump(&self.counters.writes);
        let result = match payload {
            Payload::Coil(b) => transport.write_coil(key.address, b).await,
            Payload::Word(w) => transport.write_word(key.address, w).await,
            Payload::Words(words) => transport.write_words(key.address, &words).await,
        };

        match result {
            Ok(()) => {
                tracing::debug!(key = %key, value = %value, "Register written");
                Ok(Outcome::Completed(()))
            }
            Err(e) => {
                LinkCounters::bump(&self.counters.write_failures);
                if e.is_link_loss() {
                    self.drop_link(&mut transport, &e).await;
                }
                Err(e)
            }
        }
    }

    fn encode(&self, key: RegisterKey, value: Value) -> ModbusResult<Payload> {
        let code = key.kind.code();
        if !key.kind.is_writable() {
            return Err(ModbusError::operation(OperationError::read_only(code, key.address)));
        }

        match (key.kind, value) {
            (RegisterKind::Coil, Value::Bool(b)) => Ok(Payload::Coil(b)),
            (RegisterKind::HoldingRegister, Value::Int(i)) => Ok(Payload::Word(encode_word(i)?)),
            (RegisterKind::HoldingRegister, Value::Bool(b)) => Ok(Payload::Word(u16::from(b))),
            (RegisterKind::HoldingRegister, Value::Float(f)) => {
                Ok(Payload::Words(self.converter.encode_float(f)?))
            }
            (_, other) => Err(ModbusError::operation(OperationError::ValueMismatch {
                register_type: code,
                address: key.address,
                value_type: other.type_name(),
            })),
        }
    }
}

enum Payload {
    Coil(bool),
    Word(u16),
    Words([u16; 2]),
}

impl fmt::Debug for DeviceLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceLink")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .field("byte_order", &self.byte_order())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

/// Holds the link in [`LinkState::Connecting`] until settled. Dropped
/// unsettled, it puts the link back to [`LinkState::Disconnected`].
struct PendingConnect<'a> {
    link: &'a DeviceLink,
    settled: bool,
}

impl<'a> PendingConnect<'a> {
    fn begin(link: &'a DeviceLink) -> Self {
        link.set_state(LinkState::Connecting);
        Self { link, settled: false }
    }

    fn settle(&mut self, state: LinkState) {
        self.link.set_state(state);
        self.settled = true;
    }
}

impl Drop for PendingConnect<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.link.state.write();
        if *state == LinkState::Connecting {
            *state = LinkState::Disconnected;
            tracing::debug!(endpoint = %self.link.endpoint, "Connect cancelled");
        }
    }
}
