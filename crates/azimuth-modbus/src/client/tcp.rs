// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Modbus TCP, for consoles behind an Ethernet serial gateway.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_modbus::client::Context as ModbusContext;
use tokio_modbus::prelude::*;

use crate::error::{ConnectionError, ModbusError, ModbusResult};
use crate::types::ModbusTcpConfig;

use super::session::{Dialer, SessionTransport};

/// TCP transport.
pub type ModbusTcpTransport = SessionTransport<TcpDialer>;

impl SessionTransport<TcpDialer> {
    /// Creates a disconnected TCP transport.
    pub fn new(config: ModbusTcpConfig) -> Self {
        Self::from_dialer(TcpDialer { config })
    }

    /// The TCP settings.
    pub fn config(&self) -> &ModbusTcpConfig {
        &self.dialer.config
    }
}

/// Opens TCP sessions.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    config: ModbusTcpConfig,
}

impl TcpDialer {
    async fn resolve(&self) -> ModbusResult<SocketAddr> {
        let target = self.config.socket_addr();
        if let Ok(addr) = target.parse() {
            return Ok(addr);
        }

        let mut found = tokio::net::lookup_host(&target)
            .await
            .map_err(|e| ConnectionError::unresolvable(&self.config.host, Some(e)))?;
        Ok(found
            .next()
            .ok_or_else(|| ConnectionError::unresolvable(&self.config.host, None))?)
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self) -> ModbusResult<ModbusContext> {
        let endpoint = self.config.socket_addr();
        let open = async {
            let addr = self.resolve().await?;
            let stream = TcpStream::connect(addr)
                .await
                .map_err(|e| ConnectionError::refused_with(&endpoint, e))?;
            if let Err(e) = stream.set_nodelay(self.config.tcp_nodelay) {
                tracing::debug!(error = %e, "TCP_NODELAY not applied");
            }
            Ok::<_, ModbusError>(tcp::attach_slave(stream, Slave(self.config.unit_id)))
        };

        match timeout(self.config.connect_timeout, open).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::timed_out(endpoint, self.config.connect_timeout).into()),
        }
    }

    fn endpoint(&self) -> String {
        format!("tcp://{}", self.config.socket_addr())
    }

    fn operation_timeout(&self) -> Duration {
        self.config.operation_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ModbusTransport;

    #[tokio::test]
    async fn test_read_before_connect_is_link_loss() {
        let transport = ModbusTcpTransport::new(ModbusTcpConfig::default());
        let err = transport
            .read_words(azimuth_core::RegisterKind::HoldingRegister, 0, 1)
            .await
            .unwrap_err();
        assert!(err.is_link_loss());
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut config = ModbusTcpConfig::with_port("127.0.0.1", port);
        config.connect_timeout = Duration::from_secs(2);
        let mut transport = ModbusTcpTransport::new(config);

        assert!(transport.connect().await.is_err());
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_connect_then_disconnect_twice() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.map(|(stream, _)| stream) });

        let mut transport = ModbusTcpTransport::new(ModbusTcpConfig::with_port("127.0.0.1", port));
        transport.connect().await.unwrap();
        assert!(transport.is_connected());
        let _peer = accept.await.unwrap().unwrap();

        transport.disconnect().await.unwrap();
        transport.disconnect().await.unwrap();
        assert!(!transport.is_connected());
        assert_eq!(transport.describe(), format!("tcp://127.0.0.1:{}", port));
    }
}
