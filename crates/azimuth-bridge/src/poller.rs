// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Periodic register polling.
//!
//! Each tick the poller either (re)connects the link or reads every register
//! in the table into a fresh map. The map becomes a [`Snapshot`] and is
//! handed to the [`TelemetryHub`] only after the whole table was read.
//!
//! ```text
//!  tick ──► link down? ──yes──► connect / back off ──► LinkDown
//!              │ no
//!              ▼
//!        read register 1..N ──(link lost)──► Abandoned
//!              │  (read error: stale or omitted, keep going)
//!              ▼
//!        Snapshot v+1 ──► hub.publish ──► Published
//! ```
//!
//! Stopping is cooperative: the stop flag is checked between reads and
//! races connect attempts and back-off sleeps. A read already sent to the
//! device is never cut short.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use azimuth_core::{RegisterKey, RegisterTable, Snapshot, StaleValues};
use azimuth_modbus::{ConnectPolicy, DeviceLink, Outcome};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::hub::TelemetryHub;

// =============================================================================
// PollerConfig
// =============================================================================

/// Poll loop settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PollerConfig {
    /// Time between cycle starts.
    pub interval: Duration,
    /// Treatment of registers whose read failed.
    pub stale_values: StaleValues,
    /// Decimal places kept for float values.
    pub float_precision: u32,
    /// Reconnect a dropped link from the poll loop.
    pub auto_reconnect: bool,
    /// Pause after a cycle found the link down without reconnecting.
    pub reconnect_backoff: Duration,
    /// Attempts and delays used when reconnecting.
    pub connect_policy: ConnectPolicy,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            stale_values: StaleValues::Retain,
            float_precision: 3,
            auto_reconnect: true,
            reconnect_backoff: Duration::from_secs(2),
            connect_policy: ConnectPolicy::default(),
        }
    }
}

impl PollerConfig {
    /// Sets the interval.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the stale value policy.
    pub fn stale_values(mut self, policy: StaleValues) -> Self {
        self.stale_values = policy;
        self
    }

    /// Enables or disables reconnecting from the poll loop.
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Sets the back-off used when the link is down.
    pub fn reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    /// Sets the reconnect policy.
    pub fn connect_policy(mut self, policy: ConnectPolicy) -> Self {
        self.connect_policy = policy;
        self
    }
}

// =============================================================================
// Stats
// =============================================================================

/// Poller counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollerStats {
    /// Cycles started.
    pub cycles: u64,
    /// Snapshots published.
    pub published: u64,
    /// Register reads that failed.
    pub read_failures: u64,
    /// Cycles that read nothing or were abandoned because the link was down.
    pub skipped_cycles: u64,
    /// Successful reconnects.
    pub reconnects: u64,
}

#[derive(Debug, Default)]
struct PollerCounters {
    cycles: AtomicU64,
    published: AtomicU64,
    read_failures: AtomicU64,
    skipped_cycles: AtomicU64,
    reconnects: AtomicU64,
}

impl PollerCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PollerStats {
        PollerStats {
            cycles: self.cycles.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            skipped_cycles: self.skipped_cycles.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// What one cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A snapshot was published.
    Published {
        /// Version of the published snapshot.
        version: u64,
        /// Registers that failed to read.
        failures: usize,
    },
    /// The link was down. Nothing was read.
    LinkDown,
    /// The link dropped part way through. Nothing was published.
    Abandoned,
    /// A stop was requested part way through. Nothing was published.
    Cancelled,
}

// =============================================================================
// Poller
// =============================================================================

/// Reads the register table on a fixed interval.
pub struct Poller {
    link: Arc<DeviceLink>,
    table: Arc<RegisterTable>,
    hub: Arc<TelemetryHub>,
    config: PollerConfig,
    previous: Arc<Snapshot>,
    version: u64,
    counters: Arc<PollerCounters>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl Poller {
    /// Creates a poller. Nothing runs until [`Poller::start`] or
    /// [`Poller::poll_once`].
    pub fn new(
        link: Arc<DeviceLink>,
        table: Arc<RegisterTable>,
        hub: Arc<TelemetryHub>,
        config: PollerConfig,
    ) -> Self {
        let previous = hub.latest_snapshot();
        let version = previous.version();
        let (stop_tx, stop_rx) = watch::channel(false);

        Self {
            link,
            table,
            hub,
            config,
            previous,
            version,
            counters: Arc::new(PollerCounters::default()),
            stop_tx,
            stop_rx,
        }
    }

    /// Counter snapshot.
    pub fn stats(&self) -> PollerStats {
        self.counters.snapshot()
    }

    /// Runs a single read cycle against a connected link.
    ///
    /// Does not reconnect. A disconnected link yields
    /// [`CycleOutcome::LinkDown`].
    pub async fn poll_once(&mut self) -> CycleOutcome {
        PollerCounters::bump(&self.counters.cycles);
        if !self.link.is_connected() {
            PollerCounters::bump(&self.counters.skipped_cycles);
            return CycleOutcome::LinkDown;
        }
        self.read_cycle().await
    }

    fn stop_requested(&self) -> bool {
        *self.stop_rx.borrow()
    }

    async fn read_cycle(&mut self) -> CycleOutcome {
        let precision = self.config.float_precision;
        let mut values = HashMap::with_capacity(self.table.len());
        let mut stale = HashSet::new();
        let mut failures = 0;

        for register in self.table.iter() {
            if self.stop_requested() {
                return CycleOutcome::Cancelled;
            }

            match self.link.read(register).await {
                Ok(Outcome::Completed(value)) => {
                    values.insert(register.key, value.rounded(precision));
                }
                Ok(Outcome::Skipped) => return self.abandon(register.key),
                Err(e) if e.is_link_loss() => return self.abandon(register.key),
                Err(e) => {
                    failures += 1;
                    PollerCounters::bump(&self.counters.read_failures);
                    tracing::debug!(key = %register.key, error = %e, "Register read failed");

                    if self.config.stale_values == StaleValues::Retain {
                        if let Some(last) = self.previous.get(&register.key) {
                            values.insert(register.key, last);
                            stale.insert(register.key);
                        }
                    }
                }
            }
        }

        self.version += 1;
        let snapshot = Arc::new(Snapshot::new(self.version, values, stale));
        self.previous = Arc::clone(&snapshot);
        self.hub.publish(snapshot);
        PollerCounters::bump(&self.counters.published);

        CycleOutcome::Published {
            version: self.version,
            failures,
        }
    }

    fn abandon(&self, key: RegisterKey) -> CycleOutcome {
        PollerCounters::bump(&self.counters.skipped_cycles);
        tracing::warn!(key = %key, "Link lost mid-cycle, cycle abandoned");
        CycleOutcome::Abandoned
    }

    /// Brings the link back if it is down. Returns `false` if the cycle should
    /// be skipped.
    async fn ensure_connected(&mut self) -> bool {
        let state = self.link.state();
        if state.is_connected() {
            return true;
        }

        PollerCounters::bump(&self.counters.skipped_cycles);

        if !state.needs_connect() || !self.config.auto_reconnect {
            let backoff = self.config.reconnect_backoff;
            let mut stop = self.stop_rx.clone();
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = stop.wait_for(|stopped| *stopped) => {}
            }
            return false;
        }

        let mut stop = self.stop_rx.clone();
        let connected = tokio::select! {
            ok = self.link.connect(&self.config.connect_policy) => ok,
            _ = stop.wait_for(|stopped| *stopped) => false,
        };

        if connected {
            PollerCounters::bump(&self.counters.reconnects);
        }
        false
    }

    async fn tick(&mut self) -> Option<CycleOutcome> {
        PollerCounters::bump(&self.counters.cycles);
        if !self.ensure_connected().await {
            return Some(CycleOutcome::LinkDown);
        }
        if self.stop_requested() {
            return None;
        }
        Some(self.read_cycle().await)
    }

    /// Spawns the poll loop.
    pub fn start(mut self) -> PollerHandle {
        let stop_tx = self.stop_tx.clone();
        let counters = Arc::clone(&self.counters);

        let join = tokio::spawn(async move {
            tracing::info!(
                interval_ms = self.config.interval.as_millis() as u64,
                registers = self.table.len(),
                stale_values = %self.config.stale_values,
                "Poller started"
            );

            let mut interval = tokio::time::interval(self.config.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut stop = self.stop_rx.clone();

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = stop.wait_for(|stopped| *stopped) => break,
                }

                match self.tick().await {
                    Some(CycleOutcome::Published { version, failures }) if failures > 0 => {
                        tracing::debug!(version, failures, "Snapshot published with read failures");
                    }
                    Some(CycleOutcome::Cancelled) | None => break,
                    Some(_) => {}
                }
            }

            tracing::info!(stats = ?self.counters.snapshot(), "Poller stopped");
        });

        PollerHandle {
            stop_tx,
            join,
            counters,
        }
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("config", &self.config)
            .field("registers", &self.table.len())
            .field("version", &self.version)
            .finish()
    }
}

// =============================================================================
// PollerHandle
// =============================================================================

/// Control handle for a running poll loop.
#[derive(Debug)]
pub struct PollerHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
    counters: Arc<PollerCounters>,
}

impl PollerHandle {
    /// Counter snapshot.
    pub fn stats(&self) -> PollerStats {
        self.counters.snapshot()
    }

    /// Returns `true` once the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Requests a stop and waits for the loop to exit.
    pub async fn stop(self) -> PollerStats {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "Poller task failed");
        }
        self.counters.snapshot()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use azimuth_core::{
        Axis, DashboardMapping, DataType, MemoryRunRecorder, Register, RegisterKind, Value,
    };
    use azimuth_modbus::{ByteOrder, LinkState, SimulatedDevice};

    use super::*;
    use crate::router::CommandRouter;

    fn table() -> Arc<RegisterTable> {
        let registers = [
            Register::new(RegisterKind::InputRegister, 0, Axis::Primary, DataType::Float32),
            Register::new(RegisterKind::InputRegister, 2, Axis::Primary, DataType::Int16),
            Register::new(RegisterKind::Coil, 1, Axis::General, DataType::Bool),
        ];
        Arc::new(RegisterTable::new(registers.into_iter().flatten()).unwrap())
    }

    async fn setup(device: &SimulatedDevice) -> (Arc<DeviceLink>, Arc<TelemetryHub>) {
        let link = Arc::new(DeviceLink::new(
            Box::new(device.transport()),
            ByteOrder::MidLittleEndian,
        ));
        assert!(link.connect(&ConnectPolicy::once()).await);
        let router = Arc::new(CommandRouter::new(Arc::clone(&link)));
        let hub = Arc::new(TelemetryHub::new(
            DashboardMapping::default(),
            router,
            Arc::new(MemoryRunRecorder::new()),
            8,
        ));
        (link, hub)
    }

    #[tokio::test]
    async fn test_poll_once_publishes_rounded_values() {
        let device = SimulatedDevice::new();
        device.set_input_words(100, &[0xF5C3, 0x4048]);
        device.set_input(102, 7);
        device.set_coil(1, true);
        let (link, hub) = setup(&device).await;

        let mut poller = Poller::new(link, table(), Arc::clone(&hub), PollerConfig::default());
        let outcome = poller.poll_once().await;

        assert_eq!(outcome, CycleOutcome::Published { version: 1, failures: 0 });
        let snapshot = hub.latest_snapshot();
        assert_eq!(snapshot.get(&RegisterKey::input(100)), Some(Value::Float(3.14)));
        assert_eq!(snapshot.get(&RegisterKey::input(102)), Some(Value::Int(7)));
        assert_eq!(snapshot.get(&RegisterKey::coil(1)), Some(Value::Bool(true)));
    }

    #[tokio::test]
    async fn test_failed_read_retained_as_stale() {
        let device = SimulatedDevice::new();
        device.set_input(102, 7);
        let (link, hub) = setup(&device).await;
        let mut poller = Poller::new(link, table(), Arc::clone(&hub), PollerConfig::default());
        poller.poll_once().await;

        device.set_input(102, 8);
        device.fail_reads_of(RegisterKind::InputRegister, 102);
        let outcome = poller.poll_once().await;

        assert_eq!(outcome, CycleOutcome::Published { version: 2, failures: 1 });
        let snapshot = hub.latest_snapshot();
        assert_eq!(snapshot.get(&RegisterKey::input(102)), Some(Value::Int(7)));
        assert!(snapshot.is_stale(&RegisterKey::input(102)));
        assert!(snapshot.contains(&RegisterKey::coil(1)));
        assert_eq!(poller.stats().read_failures, 1);
    }

    #[tokio::test]
    async fn test_failed_read_omitted() {
        let device = SimulatedDevice::new();
        let (link, hub) = setup(&device).await;
        let config = PollerConfig::default().stale_values(StaleValues::Omit);
        let mut poller = Poller::new(link, table(), Arc::clone(&hub), config);
        poller.poll_once().await;

        device.fail_reads_of(RegisterKind::InputRegister, 102);
        poller.poll_once().await;

        let snapshot = hub.latest_snapshot();
        assert!(!snapshot.contains(&RegisterKey::input(102)));
        assert_eq!(snapshot.len(), 2);
    }

    #[tokio::test]
    async fn test_link_loss_abandons_cycle() {
        let device = SimulatedDevice::new();
        let (link, hub) = setup(&device).await;
        let mut poller = Poller::new(Arc::clone(&link), table(), Arc::clone(&hub), PollerConfig::default());

        device.sever_link();
        assert_eq!(poller.poll_once().await, CycleOutcome::Abandoned);
        assert_eq!(hub.latest_snapshot().version(), 0);
        assert!(!link.is_connected());

        assert_eq!(poller.poll_once().await, CycleOutcome::LinkDown);
        assert_eq!(device.read_count(), 1);
    }

    #[tokio::test]
    async fn test_start_reconnects_and_stops() {
        let device = SimulatedDevice::new();
        let (link, hub) = setup(&device).await;
        link.disconnect().await;

        let config = PollerConfig::default()
            .interval(Duration::from_millis(10))
            .connect_policy(ConnectPolicy::fixed(1, Duration::from_millis(1)));
        let handle = Poller::new(Arc::clone(&link), table(), Arc::clone(&hub), config).start();

        tokio::time::timeout(Duration::from_secs(2), async {
            while hub.latest_snapshot().version() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let stats = tokio::time::timeout(Duration::from_secs(2), handle.stop())
            .await
            .unwrap();
        assert_eq!(stats.reconnects, 1);
        assert!(stats.published >= 2);
        assert!(link.is_connected());
    }

    #[tokio::test]
    async fn test_stop_while_link_down() {
        let device = SimulatedDevice::new();
        device.refuse_all_connects(true);
        let link = Arc::new(DeviceLink::new(
            Box::new(device.transport()),
            ByteOrder::MidLittleEndian,
        ));
        let router = Arc::new(CommandRouter::new(Arc::clone(&link)));
        let hub = Arc::new(TelemetryHub::new(
            DashboardMapping::default(),
            router,
            Arc::new(MemoryRunRecorder::new()),
            8,
        ));

        let config = PollerConfig::default()
            .interval(Duration::from_millis(10))
            .connect_policy(ConnectPolicy::fixed(100, Duration::from_secs(5)));
        let handle = Poller::new(Arc::clone(&link), table(), Arc::clone(&hub), config).start();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(link.state(), LinkState::Connecting);

        let stats = tokio::time::timeout(Duration::from_secs(1), handle.stop())
            .await
            .unwrap();
        assert_eq!(stats.published, 0);
        assert!(stats.skipped_cycles >= 1);
        assert_eq!(device.read_count(), 0);
        // The stop cut the connect short during its back-off.
        assert_eq!(link.state(), LinkState::Disconnected);
    }
}
