// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Telemetry fan-out and inbound command handling.
//!
//! # Architecture
//!
//! ```text
//!                    publish(snapshot)
//!  Poller ──────────────────────────────► TelemetryHub
//!                                          │  latest snapshot
//!                                          │  last view ──(unchanged? stop)
//!                                          ▼
//!                              ┌───────────┼───────────┐
//!                              ▼           ▼           ▼
//!                          frames 1    frames 2  ... frames N     (bounded)
//!                              │           │           │
//!                          send loop   send loop   send loop     (one per socket)
//!                              ▲
//!  socket ──text──► handle_message ──► CommandRouter ──► acks 1
//! ```
//!
//! Frames are enqueued without blocking. A subscriber whose queue is closed
//! is removed; one whose frame queue is full misses that frame and nothing
//! else. Acks have their own queue and wait for room, so every command gets
//! its answer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use azimuth_core::{Command, DashboardMapping, DashboardView, RunRecorder, Snapshot};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::CommandError;
use crate::router::CommandRouter;

/// Default per-subscriber queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

// =============================================================================
// Ack
// =============================================================================

/// Outcome of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    /// The command was applied.
    Ok,
    /// The command failed or could not be read.
    Error,
}

/// Acknowledgement sent back to the subscriber that issued a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ack {
    #[serde(rename = "type")]
    message_type: &'static str,
    /// Command name, or `"unknown"` when it could not be read.
    pub command: String,
    /// Outcome.
    pub status: AckStatus,
    /// Failure category: `validation`, `write`, `parse` or `recorder`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    /// Failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    /// Success acknowledgement.
    pub fn ok(command: impl Into<String>) -> Self {
        Self {
            message_type: "ack",
            command: command.into(),
            status: AckStatus::Ok,
            kind: None,
            error: None,
        }
    }

    /// Failure acknowledgement.
    pub fn failed(command: impl Into<String>, kind: &'static str, error: impl Into<String>) -> Self {
        Self {
            message_type: "ack",
            command: command.into(),
            status: AckStatus::Error,
            kind: Some(kind),
            error: Some(error.into()),
        }
    }

    fn from_error(command: &str, error: &CommandError) -> Self {
        Self::failed(command, error.kind(), error.to_string())
    }

    /// Returns `true` for a success acknowledgement.
    pub fn is_ok(&self) -> bool {
        self.status == AckStatus::Ok
    }

    /// JSON text of the acknowledgement.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"type":"ack","command":"{}","status":"error"}}"#, self.command)
        })
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// A registered subscriber's end of its queues.
#[derive(Debug)]
pub struct Subscription {
    /// Subscriber id, used for acknowledgements and `unsubscribe`.
    pub id: u64,
    frames: mpsc::Receiver<Arc<str>>,
    acks: mpsc::Receiver<Arc<str>>,
}

impl Subscription {
    /// Waits for the next outbound message. Pending acks go first.
    ///
    /// Returns `None` once the hub has dropped this subscriber and both
    /// queues are drained.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        tokio::select! {
            biased;
            Some(ack) = self.acks.recv() => Some(ack),
            Some(frame) = self.frames.recv() => Some(frame),
            else => None,
        }
    }

    /// Takes a queued message without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<str>> {
        self.acks.try_recv().or_else(|_| self.frames.try_recv()).ok()
    }
}

#[derive(Debug, Clone)]
struct Outbox {
    frames: mpsc::Sender<Arc<str>>,
    acks: mpsc::Sender<Arc<str>>,
}

// =============================================================================
// HubStats
// =============================================================================

/// Hub counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Snapshots handed to `publish`.
    pub published: u64,
    /// Views broadcast to subscribers.
    pub broadcasts: u64,
    /// Publishes whose view matched the previous one.
    pub suppressed: u64,
    /// Frames dropped because a subscriber queue was full. Acks are never
    /// dropped.
    pub dropped: u64,
    /// Subscribers removed after their queue closed.
    pub removed: u64,
    /// Inbound messages handled.
    pub messages: u64,
    /// Currently registered subscribers.
    pub subscribers: usize,
}

#[derive(Debug, Default)]
struct HubCounters {
    published: AtomicU64,
    broadcasts: AtomicU64,
    suppressed: AtomicU64,
    dropped: AtomicU64,
    removed: AtomicU64,
    messages: AtomicU64,
}

// =============================================================================
// TelemetryHub
// =============================================================================

struct HubState {
    latest: Arc<Snapshot>,
    view: Option<DashboardView>,
    frame: Option<Arc<str>>,
}

/// Shares the latest snapshot with dashboard subscribers.
pub struct TelemetryHub {
    mapping: DashboardMapping,
    router: Arc<CommandRouter>,
    recorder: Arc<dyn RunRecorder>,
    queue_capacity: usize,
    state: RwLock<HubState>,
    subscribers: DashMap<u64, Outbox>,
    next_id: AtomicU64,
    counters: HubCounters,
}

impl TelemetryHub {
    /// Creates a hub.
    ///
    /// A `queue_capacity` of zero is raised to one.
    pub fn new(
        mapping: DashboardMapping,
        router: Arc<CommandRouter>,
        recorder: Arc<dyn RunRecorder>,
        queue_capacity: usize,
    ) -> Self {
        Self {
            mapping,
            router,
            recorder,
            queue_capacity: queue_capacity.max(1),
            state: RwLock::new(HubState {
                latest: Arc::new(Snapshot::empty()),
                view: None,
                frame: None,
            }),
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            counters: HubCounters::default(),
        }
    }

    /// Router that inbound commands are dispatched to.
    pub fn router(&self) -> &Arc<CommandRouter> {
        &self.router
    }

    /// Most recently published snapshot.
    pub fn latest_snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.state.read().latest)
    }

    /// View last broadcast, if any.
    pub fn current_view(&self) -> Option<DashboardView> {
        self.state.read().view
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Counter snapshot.
    pub fn stats(&self) -> HubStats {
        HubStats {
            published: self.counters.published.load(Ordering::Relaxed),
            broadcasts: self.counters.broadcasts.load(Ordering::Relaxed),
            suppressed: self.counters.suppressed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            removed: self.counters.removed.load(Ordering::Relaxed),
            messages: self.counters.messages.load(Ordering::Relaxed),
            subscribers: self.subscribers.len(),
        }
    }

    // =========================================================================
    // Telemetry
    // =========================================================================

    /// Installs `snapshot` as the latest and broadcasts its view if the view
    /// changed.
    ///
    /// Returns `true` if a broadcast happened.
    pub fn publish(&self, snapshot: Arc<Snapshot>) -> bool {
        self.counters.published.fetch_add(1, Ordering::Relaxed);
        let view = self.mapping.project(&snapshot);

        let mut state = self.state.write();
        state.latest = snapshot;

        if state.view == Some(view) {
            self.counters.suppressed.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let frame: Arc<str> = match serde_json::to_string(&view) {
            Ok(text) => text.into(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize dashboard view");
                return false;
            }
        };

        state.view = Some(view);
        state.frame = Some(Arc::clone(&frame));

        // Enqueueing is non-blocking, so the state lock pins broadcast order
        // against concurrent subscribes.
        self.broadcast(&frame);
        drop(state);

        self.counters.broadcasts.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn broadcast(&self, frame: &Arc<str>) {
        let mut closed = Vec::new();

        for entry in self.subscribers.iter() {
            match entry.value().frames.try_send(Arc::clone(frame)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(subscriber = *entry.key(), "Subscriber queue full, frame dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*entry.key()),
            }
        }

        for id in closed {
            if self.subscribers.remove(&id).is_some() {
                self.counters.removed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(subscriber = id, "Subscriber gone, removed");
            }
        }
    }

    // =========================================================================
    // Subscribers
    // =========================================================================

    /// Registers a subscriber. It receives the current view first, if any.
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (frames_tx, frames) = mpsc::channel(self.queue_capacity);
        let (acks_tx, acks) = mpsc::channel(self.queue_capacity);

        let state = self.state.read();
        if let Some(frame) = &state.frame {
            let _ = frames_tx.try_send(Arc::clone(frame));
        }
        self.subscribers.insert(
            id,
            Outbox {
                frames: frames_tx,
                acks: acks_tx,
            },
        );
        drop(state);

        tracing::info!(subscriber = id, total = self.subscribers.len(), "Subscriber connected");
        Subscription { id, frames, acks }
    }

    /// Removes a subscriber. Its queue closes once drained.
    ///
    /// Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            tracing::info!(subscriber = id, total = self.subscribers.len(), "Subscriber disconnected");
        }
        removed
    }

    /// Queues an ack, waiting for room if the subscriber is behind.
    async fn send_ack(&self, id: u64, text: String) {
        let Some(acks) = self.subscribers.get(&id).map(|e| e.value().acks.clone()) else {
            tracing::debug!(subscriber = id, "Ack for departed subscriber discarded");
            return;
        };

        if acks.send(text.into()).await.is_err() {
            self.unsubscribe(id);
        }
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Handles one inbound text message from subscriber `id`.
    ///
    /// The acknowledgement is queued to that subscriber only and also
    /// returned. If its ack queue is full this waits until the subscriber
    /// catches up.
    pub async fn handle_message(&self, id: u64, text: &str) -> Ack {
        self.counters.messages.fetch_add(1, Ordering::Relaxed);

        let ack = match Command::from_json(text) {
            Ok(command) => self.apply(&command).await,
            Err(e) => {
                tracing::warn!(subscriber = id, error = %e, "Unreadable command");
                let command = e.command.as_deref().unwrap_or("unknown");
                Ack::failed(command, "parse", e.message)
            }
        };

        self.send_ack(id, ack.to_json()).await;
        ack
    }

    async fn apply(&self, command: &Command) -> Ack {
        let name = command.name();

        if let Err(e) = self.router.dispatch(command).await {
            return Ack::from_error(name, &e);
        }

        if let Command::StopSession(summary) = command {
            if let Err(e) = self.recorder.store(summary).await {
                let e = CommandError::from(e);
                tracing::error!(recorder = self.recorder.name(), error = %e, "Failed to record run");
                return Ack::from_error(name, &e);
            }
            tracing::info!(
                recorder = self.recorder.name(),
                run_time = summary.run_time,
                configuration = summary.configuration_number,
                "Run recorded"
            );
        }

        Ack::ok(name)
    }
}

impl std::fmt::Debug for TelemetryHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryHub")
            .field("mapping", &self.mapping)
            .field("queue_capacity", &self.queue_capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use azimuth_core::{MemoryRunRecorder, RegisterKey, Value};
    use azimuth_modbus::{ByteOrder, ConnectPolicy, DeviceLink, SimulatedDevice};

    use super::*;

    async fn hub_with(capacity: usize) -> (TelemetryHub, SimulatedDevice, Arc<MemoryRunRecorder>) {
        let device = SimulatedDevice::new();
        let link = Arc::new(DeviceLink::new(
            Box::new(device.transport()),
            ByteOrder::MidLittleEndian,
        ));
        assert!(link.connect(&ConnectPolicy::once()).await);
        let router = Arc::new(CommandRouter::new(link));
        let recorder = Arc::new(MemoryRunRecorder::new());
        let hub = TelemetryHub::new(DashboardMapping::default(), router, recorder.clone(), capacity);
        (hub, device, recorder)
    }

    fn snapshot(version: u64, position: f64) -> Arc<Snapshot> {
        let mut values = HashMap::new();
        values.insert(RegisterKey::input(100), Value::Float(position));
        Arc::new(Snapshot::new(version, values, HashSet::new()))
    }

    #[tokio::test]
    async fn test_identical_view_suppressed() {
        let (hub, _, _) = hub_with(8).await;
        let mut sub = hub.subscribe();

        assert!(hub.publish(snapshot(1, 1.5)));
        assert!(!hub.publish(snapshot(2, 1.5)));
        assert!(hub.publish(snapshot(3, 2.0)));

        let first = sub.recv().await.unwrap();
        assert!(first.contains("\"position_pri\":1.5"));
        let second = sub.recv().await.unwrap();
        assert!(second.contains("\"position_pri\":2.0"));
        assert!(sub.try_recv().is_none());

        assert_eq!(hub.latest_snapshot().version(), 3);
        assert_eq!(hub.stats().suppressed, 1);
    }

    #[tokio::test]
    async fn test_late_joiner_gets_current_view() {
        let (hub, _, _) = hub_with(8).await;
        hub.publish(snapshot(1, 7.25));

        let mut late = hub.subscribe();
        let frame = late.recv().await.unwrap();
        assert!(frame.contains("\"position_pri\":7.25"));
    }

    #[tokio::test]
    async fn test_closed_subscriber_removed() {
        let (hub, _, _) = hub_with(8).await;
        let mut kept = hub.subscribe();
        let gone = hub.subscribe();
        drop(gone);

        hub.publish(snapshot(1, 3.0));

        assert_eq!(hub.subscriber_count(), 1);
        assert!(kept.recv().await.is_some());
        assert_eq!(hub.stats().removed, 1);
    }

    #[tokio::test]
    async fn test_full_queue_drops_frame_only() {
        let (hub, _, _) = hub_with(1).await;
        let mut slow = hub.subscribe();

        hub.publish(snapshot(1, 1.0));
        hub.publish(snapshot(2, 2.0));

        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(hub.stats().dropped, 1);
        let frame = slow.recv().await.unwrap();
        assert!(frame.contains("\"position_pri\":1.0"));
    }

    #[tokio::test]
    async fn test_parse_error_acked_to_sender_only() {
        let (hub, device, _) = hub_with(8).await;
        let mut sender = hub.subscribe();
        let mut other = hub.subscribe();

        let ack = hub.handle_message(sender.id, "{not json").await;
        assert_eq!(ack.kind, Some("parse"));
        assert_eq!(ack.command, "unknown");

        let frame = sender.recv().await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(json["type"], "ack");
        assert_eq!(json["status"], "error");
        assert_eq!(json["kind"], "parse");
        assert!(other.try_recv().is_none());
        assert_eq!(device.write_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_command_is_parse_error() {
        let (hub, _, _) = hub_with(8).await;
        let sub = hub.subscribe();

        let ack = hub.handle_message(sub.id, r#"{"command":"self_destruct"}"#).await;
        assert_eq!(ack.command, "self_destruct");
        assert_eq!(ack.kind, Some("parse"));
    }

    #[tokio::test]
    async fn test_validation_failure_ack() {
        let (hub, device, _) = hub_with(8).await;
        let sub = hub.subscribe();

        let ack = hub
            .handle_message(sub.id, r#"{"command":"set_setpoint","thrust_setpoint":150,"angle_setpoint":0}"#)
            .await;
        assert!(!ack.is_ok());
        assert_eq!(ack.kind, Some("validation"));
        assert_eq!(device.write_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_session_recorded_once() {
        let (hub, _, recorder) = hub_with(8).await;
        let mut sub = hub.subscribe();

        let text = r#"{"command":"stop_simulation","avg_speed":7.5,"avg_rpm":610.0,"total_consumption":12.4,"run_time":300.0,"configuration_number":3}"#;
        let ack = hub.handle_message(sub.id, text).await;

        assert!(ack.is_ok());
        assert_eq!(recorder.len(), 1);
        assert_eq!(recorder.runs()[0].summary.configuration_number, 3);

        let frame = sub.recv().await.unwrap();
        assert_eq!(&*frame, r#"{"type":"ack","command":"stop_simulation","status":"ok"}"#);
    }

    #[tokio::test]
    async fn test_failure_ack_survives_full_frame_queue() {
        let (hub, device, _) = hub_with(1).await;
        let mut slow = hub.subscribe();

        hub.publish(snapshot(1, 1.0));
        hub.publish(snapshot(2, 2.0));
        assert_eq!(hub.stats().dropped, 1);

        let ack = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            hub.handle_message(slow.id, r#"{"command":"set_setpoint","thrust_setpoint":150,"angle_setpoint":0}"#),
        )
        .await
        .unwrap();
        assert_eq!(ack.kind, Some("validation"));

        let first = slow.recv().await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&first).unwrap();
        assert_eq!(json["type"], "ack");
        assert_eq!(json["status"], "error");
        assert_eq!(json["kind"], "validation");

        let frame = slow.recv().await.unwrap();
        assert!(frame.contains("\"position_pri\":1.0"));
        assert!(slow.try_recv().is_none());
        assert_eq!(hub.stats().dropped, 1);
        assert_eq!(device.write_count(), 0);
    }

    #[tokio::test]
    async fn test_ack_waits_for_room() {
        let (hub, _, _) = hub_with(1).await;
        let mut sub = hub.subscribe();
        let id = sub.id;

        hub.handle_message(id, "{not json").await;

        // The ack queue holds one; the second ack waits until the first is read.
        let reader = async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            sub.recv().await
        };
        let (ack, first) = tokio::join!(hub.handle_message(id, "still not json"), reader);

        assert_eq!(ack.kind, Some("parse"));
        assert!(first.unwrap().contains("\"kind\":\"parse\""));
        assert!(sub.recv().await.unwrap().contains("\"kind\":\"parse\""));
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_queue() {
        let (hub, _, _) = hub_with(8).await;
        let mut sub = hub.subscribe();

        assert!(hub.unsubscribe(sub.id));
        assert!(!hub.unsubscribe(sub.id));
        assert!(sub.recv().await.is_none());
    }
}
