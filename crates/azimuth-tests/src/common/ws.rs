// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Channel Clients
//!
//! A WebSocket client for `/ws` and a JSON `GET` for the plain HTTP routes.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value as Json;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Message read from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum WsMessage {
    /// Text frame payload.
    Text(String),
    /// The server closed the socket, or it failed.
    Close,
}

/// A connected dashboard socket.
pub struct WsClient {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    /// Connects to `/ws` on `addr`.
    pub async fn connect(addr: SocketAddr) -> Result<Self, WsError> {
        let (socket, _) = connect_async(format!("ws://{}/ws", addr)).await?;
        Ok(Self { socket })
    }

    /// Sends a text frame.
    pub async fn send_text(&mut self, text: &str) -> Result<(), WsError> {
        self.socket.send(Message::text(text.to_owned())).await
    }

    /// Starts the close handshake.
    pub async fn close(&mut self) -> Result<(), WsError> {
        self.socket.close(None).await
    }

    /// Reads the next text frame. Pings and binary frames are skipped.
    pub async fn recv(&mut self) -> WsMessage {
        while let Some(message) = self.socket.next().await {
            match message {
                Ok(Message::Text(text)) => return WsMessage::Text(text.as_str().to_owned()),
                Ok(Message::Close(_)) | Err(_) => return WsMessage::Close,
                Ok(_) => continue,
            }
        }
        WsMessage::Close
    }

    /// Next text frame parsed as JSON, or `None` on close or timeout.
    pub async fn recv_json(&mut self, wait: Duration) -> Option<Json> {
        match tokio::time::timeout(wait, self.recv()).await {
            Ok(WsMessage::Text(text)) => serde_json::from_str(&text).ok(),
            _ => None,
        }
    }

    /// Reads until a frame matching `pred` arrives.
    pub async fn recv_until(&mut self, wait: Duration, pred: impl Fn(&Json) -> bool) -> Option<Json> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let message = self.recv_json(remaining).await?;
            if pred(&message) {
                return Some(message);
            }
        }
    }
}

/// `GET`s `path` and parses the body as JSON. Non-2xx statuses are errors.
pub async fn get_json(addr: SocketAddr, path: &str) -> reqwest::Result<Json> {
    reqwest::get(format!("http://{}{}", addr, path))
        .await?
        .error_for_status()?
        .json()
        .await
}
