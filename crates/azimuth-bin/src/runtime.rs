// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Bridge runtime orchestration.
//!
//! Start-up order:
//!
//! 1. Load the configuration and the register map (fatal on error)
//! 2. Build the transport, the single [`DeviceLink`] and the run recorder
//! 3. Build the [`CommandRouter`] and [`TelemetryHub`] around that link
//! 4. Connect (unless skipped), start the [`Poller`] and the [`ChannelServer`]
//!
//! Shutdown runs the other way: the server and subscriber loops stop taking
//! new input, the poller stops, then the link is closed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use azimuth_bridge::{ChannelServer, CommandRouter, Poller, PollerConfig, TelemetryHub};
use azimuth_config::{
    load_config, load_register_table, BridgeConfig, ConnectionConfig, ConnectionKind, RecorderConfig,
    RecorderKind,
};
use azimuth_core::{JsonLinesRunRecorder, MemoryRunRecorder, RegisterTable, RunRecorder};
use azimuth_modbus::{
    DeviceLink, ModbusRtuTransport, ModbusTcpTransport, ModbusTransport, SimulatedDevice,
};
use tracing::{info, warn};

use crate::error::{BinError, BinResult};
use crate::shutdown::ShutdownCoordinator;

// =============================================================================
// BridgeRuntime
// =============================================================================

/// Owns the configuration and runs the bridge until shutdown.
pub struct BridgeRuntime {
    config: Arc<BridgeConfig>,
    registers: Arc<RegisterTable>,
    shutdown: ShutdownCoordinator,
    skip_connect: bool,
}

/// Everything built from the configuration, before any task is started.
pub struct BridgeComponents {
    /// The shared device link.
    pub link: Arc<DeviceLink>,
    /// Command router on that link.
    pub router: Arc<CommandRouter>,
    /// Telemetry hub.
    pub hub: Arc<TelemetryHub>,
    /// Run recorder used by the hub.
    pub recorder: Arc<dyn RunRecorder>,
}

impl BridgeRuntime {
    /// Creates a runtime from a loaded configuration and register table.
    pub fn new(config: BridgeConfig, registers: RegisterTable) -> Self {
        Self {
            config: Arc::new(config),
            registers: Arc::new(registers),
            shutdown: ShutdownCoordinator::new(),
            skip_connect: false,
        }
    }

    /// Skips the initial connect.
    pub fn with_skip_connect(mut self, skip: bool) -> Self {
        self.skip_connect = skip;
        self
    }

    /// The coordinator that ends [`run`](Self::run).
    pub fn shutdown_coordinator(&self) -> ShutdownCoordinator {
        self.shutdown.clone()
    }

    /// The effective configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Builds the link, router, recorder and hub.
    pub fn build_components(&self) -> BinResult<BridgeComponents> {
        let transport = build_transport(&self.config.connection);
        let link = Arc::new(DeviceLink::new(transport, self.config.connection.byte_order));

        let router = Arc::new(
            CommandRouter::new(Arc::clone(&link))
                .with_limits(self.config.commands.limits)
                .with_registers(self.config.commands.registers),
        );

        let recorder = build_recorder(&self.config.recorder)?;

        let hub = Arc::new(TelemetryHub::new(
            self.config.dashboard,
            Arc::clone(&router),
            Arc::clone(&recorder),
            self.config.server.subscriber_queue,
        ));

        Ok(BridgeComponents {
            link,
            router,
            hub,
            recorder,
        })
    }

    /// Runs the bridge until shutdown is signaled.
    pub async fn run(self) -> BinResult<()> {
        info!(
            version = crate::VERSION,
            endpoint = %self.config.connection.endpoint(),
            registers = self.registers.len(),
            "Starting azimuth bridge"
        );

        let components = self.build_components()?;
        info!(recorder = components.recorder.name(), "Components initialized");

        if self.skip_connect {
            info!("Initial connect skipped");
        } else if !components
            .link
            .connect(&self.config.connection.connect_policy())
            .await
        {
            warn!("Device unavailable at start-up, the poller will keep retrying");
        }

        let poller = Poller::new(
            Arc::clone(&components.link),
            Arc::clone(&self.registers),
            Arc::clone(&components.hub),
            poller_config(&self.config),
        )
        .start();

        let server = ChannelServer::new(Arc::clone(&components.hub), self.config.server.socket_addr());
        let mut server_task = tokio::spawn(server.run(self.shutdown.shutdown_signal().wait()));

        info!(addr = %self.config.server.socket_addr(), "Azimuth bridge is ready");

        let early = tokio::select! {
            _ = self.shutdown.wait_for_shutdown() => None,
            result = &mut server_task => Some(result),
        };

        self.shutdown.initiate_shutdown();
        let server_result = match early {
            Some(result) => result,
            None => server_task.await,
        };

        let stats = poller.stop().await;
        info!(
            cycles = stats.cycles,
            published = stats.published,
            read_failures = stats.read_failures,
            "Poller stopped"
        );

        components.link.disconnect().await;
        info!(stats = ?components.link.stats(), "Azimuth bridge shutdown complete");

        server_result.map_err(|e| BinError::runtime(format!("Server task failed: {}", e)))??;
        Ok(())
    }
}

// =============================================================================
// Component Builders
// =============================================================================

/// Creates the transport named by `connection.kind`.
pub fn build_transport(connection: &ConnectionConfig) -> Box<dyn ModbusTransport> {
    match connection.kind {
        ConnectionKind::Rtu => Box::new(ModbusRtuTransport::new(connection.rtu.clone())),
        ConnectionKind::Tcp => Box::new(ModbusTcpTransport::new(connection.tcp.clone())),
        ConnectionKind::Simulated => {
            warn!("Using the simulated console; no hardware will be contacted");
            Box::new(SimulatedDevice::new().transport())
        }
    }
}

/// Creates the run recorder.
pub fn build_recorder(config: &RecorderConfig) -> BinResult<Arc<dyn RunRecorder>> {
    match config.kind {
        RecorderKind::Memory => Ok(Arc::new(MemoryRunRecorder::new())),
        RecorderKind::Jsonl => {
            let recorder = JsonLinesRunRecorder::open(&config.path)
                .map_err(|e| BinError::from(e).with_context("Failed to open run recorder"))?;
            info!(path = %config.path.display(), "Run history file opened");
            Ok(Arc::new(recorder))
        }
    }
}

/// Converts the poller section into the poll loop settings.
pub fn poller_config(config: &BridgeConfig) -> PollerConfig {
    let settings = &config.poller;
    PollerConfig {
        interval: settings.interval,
        stale_values: settings.stale_values,
        float_precision: settings.float_precision,
        auto_reconnect: settings.auto_reconnect,
        reconnect_backoff: settings.reconnect_backoff,
        connect_policy: config.connection.connect_policy(),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`BridgeRuntime`].
#[derive(Default)]
pub struct RuntimeBuilder {
    config_path: Option<PathBuf>,
    config: Option<BridgeConfig>,
    simulate: bool,
    skip_connect: bool,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration file path.
    pub fn config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the configuration directly.
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Forces the simulated transport.
    pub fn simulate(mut self, enabled: bool) -> Self {
        self.simulate = enabled;
        self
    }

    /// Skips the initial connect.
    pub fn skip_connect(mut self, skip: bool) -> Self {
        self.skip_connect = skip;
        self
    }

    /// Loads what is missing and builds the runtime.
    pub fn build(self) -> BinResult<BridgeRuntime> {
        let mut config = match self.config {
            Some(config) => config,
            None => {
                let path = self
                    .config_path
                    .ok_or_else(|| BinError::config("No configuration provided"))?;
                load_config(&path)
                    .map_err(|e| BinError::from(e).with_context(format!("Failed to load {}", path.display())))?
            }
        };

        if self.simulate {
            config.connection.kind = ConnectionKind::Simulated;
        }

        let registers = load_register_table(&config)?;
        if registers.is_empty() {
            return Err(BinError::config(format!(
                "Register map {} defines no registers",
                config.register_map.display()
            )));
        }

        Ok(BridgeRuntime::new(config, registers).with_skip_connect(self.skip_connect))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn write_register_map(dir: &Path) -> PathBuf {
        let path = dir.join("registers.csv");
        std::fs::write(
            &path,
            "SECTION,NAME,REG,ADD,CAN,R-ONLY,TYPE,GEN,AX1,AX2,DEF,MIN,MAX,UNIT,PER,SECURE,DEV,SECTION_INDEX\n\
             Motion,Position,IREG,x00,,X,FLOAT,,X,X,,,,%,,,,1\n",
        )
        .unwrap();
        path
    }

    fn test_config(dir: &Path) -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.register_map = write_register_map(dir);
        config.recorder.kind = RecorderKind::Memory;
        config.connection.kind = ConnectionKind::Simulated;
        config.server.bind_address = "127.0.0.1".parse().unwrap();
        config.server.port = 0;
        config.poller.interval = Duration::from_millis(10);
        config
    }

    #[test]
    fn test_builder_requires_config() {
        assert!(RuntimeBuilder::new().build().is_err());
    }

    #[test]
    fn test_builder_simulate_overrides_kind() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.connection.kind = ConnectionKind::Tcp;

        let runtime = RuntimeBuilder::new().config(config).simulate(true).build().unwrap();
        assert_eq!(runtime.config().connection.kind, ConnectionKind::Simulated);
        assert_eq!(runtime.registers.len(), 2);
    }

    #[test]
    fn test_poller_config_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        let poller = poller_config(&config);
        assert_eq!(poller.interval, Duration::from_millis(10));
        assert_eq!(poller.float_precision, 3);
        assert_eq!(poller.connect_policy, config.connection.connect_policy());
    }

    #[test]
    fn test_jsonl_recorder_created() {
        let dir = tempfile::tempdir().unwrap();
        let config = RecorderConfig {
            kind: RecorderKind::Jsonl,
            path: dir.path().join("history/runs.jsonl"),
        };
        let recorder = build_recorder(&config).unwrap();
        assert_eq!(recorder.name(), "jsonl");
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = RuntimeBuilder::new()
            .config(test_config(dir.path()))
            .build()
            .unwrap();
        let shutdown = runtime.shutdown_coordinator();

        let task = tokio::spawn(runtime.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.initiate_shutdown();

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
