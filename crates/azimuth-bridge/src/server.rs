// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! WebSocket channel server.
//!
//! | Route     | Purpose                                         |
//! |-----------|-------------------------------------------------|
//! | `/ws`     | Dashboard channel: telemetry out, commands in   |
//! | `/health` | Link state, subscriber count, snapshot version  |
//!
//! Each socket gets a spawned send loop draining its hub queues and an inline
//! receive loop handing text frames to [`TelemetryHub::handle_message`].
//! On shutdown the receive loop stops taking new frames; a command already
//! taken runs to completion before the socket closes.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::Response,
    routing::get,
    Json, Router,
};
use azimuth_modbus::LinkState;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::{ServerError, ServerResult};
use crate::hub::TelemetryHub;

#[derive(Clone)]
struct ServerState {
    hub: Arc<TelemetryHub>,
    stop: watch::Receiver<bool>,
}

// =============================================================================
// ChannelServer
// =============================================================================

/// Serves the dashboard channel.
pub struct ChannelServer {
    hub: Arc<TelemetryHub>,
    addr: SocketAddr,
    stop_tx: watch::Sender<bool>,
}

impl ChannelServer {
    /// Creates a server for `hub` listening on `addr`.
    pub fn new(hub: Arc<TelemetryHub>, addr: SocketAddr) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self { hub, addr, stop_tx }
    }

    /// Configured listen address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Creates the router.
    pub fn router(&self) -> Router {
        let state = ServerState {
            hub: Arc::clone(&self.hub),
            stop: self.stop_tx.subscribe(),
        };

        Router::new()
            .route("/ws", get(channel))
            .route("/health", get(health))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Binds the configured address and serves until `shutdown` resolves.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> ServerResult<()> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.addr,
                source,
            })?;
        self.serve(listener, shutdown).await
    }

    /// Serves on an already bound listener until `shutdown` resolves.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> ServerResult<()> {
        let local = listener.local_addr().unwrap_or(self.addr);
        let router = self.router();
        let stop_tx = self.stop_tx;

        tracing::info!(addr = %local, "Channel server listening");

        let signal = async move {
            shutdown.await;
            tracing::info!("Channel server shutting down");
            let _ = stop_tx.send(true);
        };

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(ServerError::Serve)?;

        tracing::info!("Channel server stopped");
        Ok(())
    }
}

impl std::fmt::Debug for ChannelServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelServer").field("addr", &self.addr).finish()
    }
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    link: LinkState,
    subscribers: usize,
    snapshot_version: u64,
}

async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        link: state.hub.router().link().state(),
        subscribers: state.hub.subscriber_count(),
        snapshot_version: state.hub.latest_snapshot().version(),
    })
}

async fn channel(
    ws: WebSocketUpgrade,
    State(state): State<ServerState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    ws.on_upgrade(move |socket| run_socket(socket, state, peer))
}

async fn run_socket(socket: WebSocket, state: ServerState, peer: SocketAddr) {
    let ServerState { hub, mut stop } = state;
    let mut subscription = hub.subscribe();
    let id = subscription.id;
    let (mut sink, mut stream) = socket.split();

    tracing::debug!(subscriber = id, peer = %peer, "Socket opened");

    let send_loop = tokio::spawn(async move {
        while let Some(frame) = subscription.recv().await {
            if let Err(e) = sink.send(Message::Text(frame.to_string().into())).await {
                tracing::debug!(subscriber = id, error = %e, "Send failed");
                return;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        let next = tokio::select! {
            next = stream.next() => next,
            _ = stop.wait_for(|stopped| *stopped) => break,
        };

        match next {
            Some(Ok(Message::Text(text))) => {
                let ack = hub.handle_message(id, text.as_str()).await;
                if !ack.is_ok() {
                    tracing::debug!(
                        subscriber = id,
                        command = %ack.command,
                        kind = ack.kind.unwrap_or("unknown"),
                        "Command failed"
                    );
                }
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::debug!(subscriber = id, error = %e, "Receive failed");
                break;
            }
        }
    }

    hub.unsubscribe(id);
    let _ = send_loop.await;
    tracing::debug!(subscriber = id, peer = %peer, "Socket closed");
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use azimuth_core::{DashboardMapping, MemoryRunRecorder};
    use azimuth_modbus::{ByteOrder, DeviceLink, SimulatedDevice};
    use super::*;
    use crate::router::CommandRouter;

    #[tokio::test]
    async fn test_health_reports_link_state() {
        let device = SimulatedDevice::new();
        let link = Arc::new(DeviceLink::new(
            Box::new(device.transport()),
            ByteOrder::MidLittleEndian,
        ));
        let router = Arc::new(CommandRouter::new(link));
        let hub = Arc::new(TelemetryHub::new(
            DashboardMapping::default(),
            router,
            Arc::new(MemoryRunRecorder::new()),
            8,
        ));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
        let server = ChannelServer::new(hub, addr);
        let task = tokio::spawn(server.serve(listener, async {
            let _ = done_rx.await;
        }));

        let response = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        let health: serde_json::Value = response.json().await.unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["link"], "disconnected");
        assert_eq!(health["subscribers"], 0);

        done_tx.send(()).unwrap();
        task.await.unwrap().unwrap();
    }
}
