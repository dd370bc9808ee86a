// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Bridge Harness
//!
//! Wires one simulated console to a [`DeviceLink`], [`CommandRouter`] and
//! [`TelemetryHub`] the same way the binary does, with an in-memory run
//! recorder so tests can inspect what was stored.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use azimuth_bridge::{
    ChannelServer, CommandRouter, Poller, PollerConfig, ServerResult, TelemetryHub,
    DEFAULT_QUEUE_CAPACITY,
};
use azimuth_core::{DashboardMapping, MemoryRunRecorder, RegisterTable};
use azimuth_modbus::{ByteOrder, ConnectPolicy, DeviceLink, SimulatedDevice};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::fixtures::console_map;

// =============================================================================
// BridgeHarness
// =============================================================================

/// Bridge components over a simulated console.
pub struct BridgeHarness {
    /// The simulated console. Clones share its register bank.
    pub device: SimulatedDevice,
    /// Link to the console.
    pub link: Arc<DeviceLink>,
    /// Command router on the link.
    pub router: Arc<CommandRouter>,
    /// Telemetry hub.
    pub hub: Arc<TelemetryHub>,
    /// Recorder the hub stores runs in.
    pub recorder: Arc<MemoryRunRecorder>,
    /// Registers polled by [`BridgeHarness::poller`].
    pub table: Arc<RegisterTable>,
}

impl BridgeHarness {
    /// Harness over [`console_map`] with the default word order.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts a customized harness.
    pub fn builder() -> BridgeHarnessBuilder {
        BridgeHarnessBuilder::default()
    }

    /// Connects the link with a single attempt.
    pub async fn connect(&self) -> bool {
        self.link.connect(&ConnectPolicy::once()).await
    }

    /// A poller over the harness table.
    pub fn poller(&self, config: PollerConfig) -> Poller {
        Poller::new(
            Arc::clone(&self.link),
            Arc::clone(&self.table),
            Arc::clone(&self.hub),
            config,
        )
    }

    /// Fast poller settings for tests.
    pub fn fast_poller_config() -> PollerConfig {
        PollerConfig::default()
            .interval(Duration::from_millis(10))
            .reconnect_backoff(Duration::from_millis(10))
            .connect_policy(ConnectPolicy::once())
    }

    /// Serves the hub on an ephemeral localhost port.
    pub async fn serve(&self) -> ServerHandle {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Listener has no address");
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let server = ChannelServer::new(Arc::clone(&self.hub), addr);
        let join = tokio::spawn(server.serve(listener, async move {
            let _ = stop_rx.await;
        }));

        ServerHandle {
            addr,
            stop_tx: Some(stop_tx),
            join,
        }
    }
}

impl Default for BridgeHarness {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// BridgeHarnessBuilder
// =============================================================================

/// Builder for [`BridgeHarness`].
pub struct BridgeHarnessBuilder {
    table: Option<RegisterTable>,
    byte_order: ByteOrder,
    queue_capacity: usize,
    mapping: DashboardMapping,
}

impl Default for BridgeHarnessBuilder {
    fn default() -> Self {
        Self {
            table: None,
            byte_order: ByteOrder::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            mapping: DashboardMapping::default(),
        }
    }
}

impl BridgeHarnessBuilder {
    /// Polls `table` instead of [`console_map`].
    pub fn table(mut self, table: RegisterTable) -> Self {
        self.table = Some(table);
        self
    }

    /// Word order of the link.
    pub fn byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = order;
        self
    }

    /// Per-subscriber queue capacity.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Builds the harness.
    pub fn build(self) -> BridgeHarness {
        let device = SimulatedDevice::new();
        let link = Arc::new(DeviceLink::new(Box::new(device.transport()), self.byte_order));
        let router = Arc::new(CommandRouter::new(Arc::clone(&link)));
        let recorder = Arc::new(MemoryRunRecorder::new());
        let hub = Arc::new(TelemetryHub::new(
            self.mapping,
            Arc::clone(&router),
            recorder.clone(),
            self.queue_capacity,
        ));
        let table = Arc::new(self.table.unwrap_or_else(|| console_map().table()));

        BridgeHarness {
            device,
            link,
            router,
            hub,
            recorder,
            table,
        }
    }
}

// =============================================================================
// ServerHandle
// =============================================================================

/// A channel server running in the background.
pub struct ServerHandle {
    /// Bound address.
    pub addr: SocketAddr,
    stop_tx: Option<oneshot::Sender<()>>,
    join: JoinHandle<ServerResult<()>>,
}

impl ServerHandle {
    /// Signals shutdown and waits for the server to finish.
    pub async fn shutdown(mut self) -> ServerResult<()> {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        tokio::time::timeout(super::TEST_TIMEOUT, self.join)
            .await
            .expect("Server did not stop in time")
            .expect("Server task panicked")
    }
}
