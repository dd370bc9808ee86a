// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-process simulated console.
//!
//! [`SimulatedDevice`] is a cloneable handle to a register bank. Tests keep
//! one handle to seed values, inject failures and inspect writes, and hand
//! a [`SimulatedTransport`] built from it to the device link.
//!
//! ```rust,ignore
//! let device = SimulatedDevice::new();
//! device.set_input_words(100, &[0xF5C3, 0x4048]);
//! let link = DeviceLink::new(Box::new(device.transport()), ByteOrder::default());
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use azimuth_core::RegisterKind;
use parking_lot::Mutex;

use crate::error::{ConnectionError, ModbusError, ModbusResult};

use super::transport::{
    expect_table, read_function_code, ModbusTransport, FC_WRITE_COIL, FC_WRITE_WORD, FC_WRITE_WORDS,
};

const EXCEPTION_ILLEGAL_DATA_ADDRESS: u8 = 0x02;
const EXCEPTION_SERVER_DEVICE_FAILURE: u8 = 0x04;

// =============================================================================
// WriteRecord
// =============================================================================

/// One write received by the simulated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteRecord {
    /// FC 05.
    Coil {
        /// Coil address.
        address: u16,
        /// Written state.
        value: bool,
    },
    /// FC 06.
    Register {
        /// Register address.
        address: u16,
        /// Written word.
        value: u16,
    },
    /// FC 16.
    Registers {
        /// First register address.
        address: u16,
        /// Written words.
        values: Vec<u16>,
    },
}

impl WriteRecord {
    /// Register kind the write targeted.
    pub fn kind(&self) -> RegisterKind {
        match self {
            Self::Coil { .. } => RegisterKind::Coil,
            Self::Register { .. } | Self::Registers { .. } => RegisterKind::HoldingRegister,
        }
    }

    /// Target address.
    pub fn address(&self) -> u16 {
        match self {
            Self::Coil { address, .. }
            | Self::Register { address, .. }
            | Self::Registers { address, .. } => *address,
        }
    }
}

/// One operation as the device saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceOp {
    /// Table addressed.
    pub kind: RegisterKind,
    /// First address.
    pub address: u16,
    /// `true` for writes.
    pub write: bool,
}

// =============================================================================
// SimulatedDevice
// =============================================================================

#[derive(Debug, Default)]
struct Bank {
    coils: HashMap<u16, bool>,
    discrete_inputs: HashMap<u16, bool>,
    holding: HashMap<u16, u16>,
    input: HashMap<u16, u16>,
    /// Addresses outside this set answer "illegal data address" when set.
    mapped: Option<HashSet<(RegisterKind, u16)>>,
    failing_reads: HashSet<(RegisterKind, u16)>,
    failing_writes: HashSet<(RegisterKind, u16)>,
    refused_connects: u32,
    refuse_all: bool,
    severed: bool,
    latency: Duration,
    writes: Vec<WriteRecord>,
    journal: Vec<DeviceOp>,
}

#[derive(Debug, Default)]
struct Counters {
    connect_attempts: AtomicU64,
    reads: AtomicU64,
    writes: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Shared handle to a simulated register bank.
#[derive(Debug, Clone, Default)]
pub struct SimulatedDevice {
    bank: Arc<Mutex<Bank>>,
    counters: Arc<Counters>,
}

impl SimulatedDevice {
    /// Creates an empty device. Unset addresses read as zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport talking to this device.
    pub fn transport(&self) -> SimulatedTransport {
        SimulatedTransport {
            device: self.clone(),
            connected: AtomicBool::new(false),
        }
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    /// Sets a coil.
    pub fn set_coil(&self, address: u16, value: bool) {
        self.bank.lock().coils.insert(address, value);
    }

    /// Sets a discrete input.
    pub fn set_discrete_input(&self, address: u16, value: bool) {
        self.bank.lock().discrete_inputs.insert(address, value);
    }

    /// Sets one holding register.
    pub fn set_holding(&self, address: u16, value: u16) {
        self.bank.lock().holding.insert(address, value);
    }

    /// Sets consecutive holding registers.
    pub fn set_holding_words(&self, address: u16, words: &[u16]) {
        let mut bank = self.bank.lock();
        for (offset, word) in words.iter().enumerate() {
            bank.holding.insert(address.wrapping_add(offset as u16), *word);
        }
    }

    /// Sets one input register.
    pub fn set_input(&self, address: u16, value: u16) {
        self.bank.lock().input.insert(address, value);
    }

    /// Sets consecutive input registers.
    pub fn set_input_words(&self, address: u16, words: &[u16]) {
        let mut bank = self.bank.lock();
        for (offset, word) in words.iter().enumerate() {
            bank.input.insert(address.wrapping_add(offset as u16), *word);
        }
    }

    /// Restricts the device to the given addresses. Anything else answers
    /// with an "illegal data address" exception.
    pub fn restrict_to(&self, addresses: impl IntoIterator<Item = (RegisterKind, u16)>) {
        self.bank.lock().mapped = Some(addresses.into_iter().collect());
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Current coil state.
    pub fn coil(&self, address: u16) -> bool {
        self.bank.lock().coils.get(&address).copied().unwrap_or(false)
    }

    /// Current holding register word.
    pub fn holding(&self, address: u16) -> u16 {
        self.bank.lock().holding.get(&address).copied().unwrap_or(0)
    }

    /// Current input register word.
    pub fn input(&self, address: u16) -> u16 {
        self.bank.lock().input.get(&address).copied().unwrap_or(0)
    }

    /// Every write received, in order.
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.bank.lock().writes.clone()
    }

    /// Every read and write that reached the device, in the order served.
    pub fn operations(&self) -> Vec<DeviceOp> {
        self.bank.lock().journal.clone()
    }

    /// Number of writes that reached the device, including failed ones.
    pub fn write_count(&self) -> u64 {
        self.counters.writes.load(Ordering::SeqCst)
    }

    /// Number of reads that reached the device, including failed ones.
    pub fn read_count(&self) -> u64 {
        self.counters.reads.load(Ordering::SeqCst)
    }

    /// Number of connect attempts.
    pub fn connect_attempts(&self) -> u64 {
        self.counters.connect_attempts.load(Ordering::SeqCst)
    }

    /// Highest number of operations observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.counters.max_in_flight.load(Ordering::SeqCst)
    }

    /// Clears the write history, the operation journal and the read/write
    /// counters.
    pub fn clear_history(&self) {
        let mut bank = self.bank.lock();
        bank.writes.clear();
        bank.journal.clear();
        drop(bank);
        self.counters.reads.store(0, Ordering::SeqCst);
        self.counters.writes.store(0, Ordering::SeqCst);
    }

    // =========================================================================
    // Failure Injection
    // =========================================================================

    /// Reads of this register answer with a device failure exception.
    pub fn fail_reads_of(&self, kind: RegisterKind, address: u16) {
        self.bank.lock().failing_reads.insert((kind, address));
    }

    /// Writes to this register answer with a device failure exception.
    pub fn fail_writes_to(&self, kind: RegisterKind, address: u16) {
        self.bank.lock().failing_writes.insert((kind, address));
    }

    /// Removes all injected read and write failures.
    pub fn clear_failures(&self) {
        let mut bank = self.bank.lock();
        bank.failing_reads.clear();
        bank.failing_writes.clear();
    }

    /// The next `count` connect attempts fail.
    pub fn refuse_connects(&self, count: u32) {
        self.bank.lock().refused_connects = count;
    }

    /// Every connect attempt fails while set.
    pub fn refuse_all_connects(&self, refuse: bool) {
        self.bank.lock().refuse_all = refuse;
    }

    /// The next operation fails as if the cable was pulled.
    pub fn sever_link(&self) {
        self.bank.lock().severed = true;
    }

    /// Delay applied to every read and write.
    pub fn set_latency(&self, latency: Duration) {
        self.bank.lock().latency = latency;
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn try_connect(&self) -> ModbusResult<()> {
        self.counters.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let mut bank = self.bank.lock();
        if bank.refuse_all {
            return Err(ModbusError::connection(ConnectionError::refused("simulated console")));
        }
        if bank.refused_connects > 0 {
            bank.refused_connects -= 1;
            return Err(ModbusError::connection(ConnectionError::refused("simulated console")));
        }
        bank.severed = false;
        Ok(())
    }

    async fn begin(&self) -> InFlight<'_> {
        let now = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let latency = self.bank.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        InFlight(&self.counters)
    }

    fn check(bank: &Bank, kind: RegisterKind, address: u16, writing: bool, fc: u8) -> ModbusResult<()> {
        if bank.severed {
            return Err(ModbusError::connection(ConnectionError::closed(Some(
                "simulated link severed".into(),
            ))));
        }
        if let Some(mapped) = &bank.mapped {
            if !mapped.contains(&(kind, address)) {
                return Err(ModbusError::exception(fc, EXCEPTION_ILLEGAL_DATA_ADDRESS));
            }
        }
        let failing = if writing {
            &bank.failing_writes
        } else {
            &bank.failing_reads
        };
        if failing.contains(&(kind, address)) {
            return Err(ModbusError::exception(fc, EXCEPTION_SERVER_DEVICE_FAILURE));
        }
        Ok(())
    }

    fn read_bits(&self, kind: RegisterKind, address: u16, count: u16, fc: u8) -> ModbusResult<Vec<bool>> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        let mut bank = self.bank.lock();
        bank.journal.push(DeviceOp {
            kind,
            address,
            write: false,
        });
        (0..count)
            .map(|offset| {
                let addr = address.wrapping_add(offset);
                Self::check(&bank, kind, addr, false, fc)?;
                let source = match kind {
                    RegisterKind::Coil => &bank.coils,
                    _ => &bank.discrete_inputs,
                };
                Ok(source.get(&addr).copied().unwrap_or(false))
            })
            .collect()
    }

    fn read_words(&self, kind: RegisterKind, address: u16, count: u16, fc: u8) -> ModbusResult<Vec<u16>> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        let mut bank = self.bank.lock();
        bank.journal.push(DeviceOp {
            kind,
            address,
            write: false,
        });
        (0..count)
            .map(|offset| {
                let addr = address.wrapping_add(offset);
                Self::check(&bank, kind, addr, false, fc)?;
                let source = match kind {
                    RegisterKind::HoldingRegister => &bank.holding,
                    _ => &bank.input,
                };
                Ok(source.get(&addr).copied().unwrap_or(0))
            })
            .collect()
    }

    fn apply_write(&self, record: WriteRecord, fc: u8) -> ModbusResult<()> {
        self.counters.writes.fetch_add(1, Ordering::SeqCst);
        let mut bank = self.bank.lock();
        bank.journal.push(DeviceOp {
            kind: record.kind(),
            address: record.address(),
            write: true,
        });
        bank.writes.push(record.clone());

        match record {
            WriteRecord::Coil { address, value } => {
                Self::check(&bank, RegisterKind::Coil, address, true, fc)?;
                bank.coils.insert(address, value);
            }
            WriteRecord::Register { address, value } => {
                Self::check(&bank, RegisterKind::HoldingRegister, address, true, fc)?;
                bank.holding.insert(address, value);
            }
            WriteRecord::Registers { address, values } => {
                for offset in 0..values.len() as u16 {
                    Self::check(&bank, RegisterKind::HoldingRegister, address.wrapping_add(offset), true, fc)?;
                }
                for (offset, word) in values.into_iter().enumerate() {
                    bank.holding.insert(address.wrapping_add(offset as u16), word);
                }
            }
        }
        Ok(())
    }
}

struct InFlight<'a>(&'a Counters);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

// =============================================================================
// SimulatedTransport
// =============================================================================

/// [`ModbusTransport`] over a [`SimulatedDevice`].
#[derive(Debug)]
pub struct SimulatedTransport {
    device: SimulatedDevice,
    connected: AtomicBool,
}

impl SimulatedTransport {
    /// The device behind this transport.
    pub fn device(&self) -> &SimulatedDevice {
        &self.device
    }

    fn ensure_connected(&self) -> ModbusResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ModbusError::not_connected())
        }
    }

    fn track<T>(&self, result: ModbusResult<T>) -> ModbusResult<T> {
        if let Err(e) = &result {
            if e.is_link_loss() {
                self.connected.store(false, Ordering::SeqCst);
            }
        }
        result
    }
}

#[async_trait]
impl ModbusTransport for SimulatedTransport {
    async fn connect(&mut self) -> ModbusResult<()> {
        self.device.try_connect()?;
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!("Connected to simulated console");
        Ok(())
    }

    async fn disconnect(&mut self) -> ModbusResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn describe(&self) -> String {
        "simulated".to_string()
    }

    async fn read_bits(&self, kind: RegisterKind, address: u16, count: u16) -> ModbusResult<Vec<bool>> {
        expect_table(kind, true)?;
        self.ensure_connected()?;
        let _guard = self.device.begin().await;
        self.track(self.device.read_bits(kind, address, count, read_function_code(kind)))
    }

    async fn read_words(&self, kind: RegisterKind, address: u16, count: u16) -> ModbusResult<Vec<u16>> {
        expect_table(kind, false)?;
        self.ensure_connected()?;
        let _guard = self.device.begin().await;
        self.track(self.device.read_words(kind, address, count, read_function_code(kind)))
    }

    async fn write_coil(&self, address: u16, value: bool) -> ModbusResult<()> {
        self.ensure_connected()?;
        let _guard = self.device.begin().await;
        self.track(self.device.apply_write(WriteRecord::Coil { address, value }, FC_WRITE_COIL))
    }

    async fn write_word(&self, address: u16, value: u16) -> ModbusResult<()> {
        self.ensure_connected()?;
        let _guard = self.device.begin().await;
        self.track(self.device.apply_write(WriteRecord::Register { address, value }, FC_WRITE_WORD))
    }

    async fn write_words(&self, address: u16, values: &[u16]) -> ModbusResult<()> {
        self.ensure_connected()?;
        let _guard = self.device.begin().await;
        let record = WriteRecord::Registers {
            address,
            values: values.to_vec(),
        };
        self.track(self.device.apply_write(record, FC_WRITE_WORDS))
    }
}

// =============================================================================
// Tests
// =============================================================================
