// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Recording Subscriber
//!
//! A hub subscriber that parses everything it receives so tests can tell
//! telemetry frames from acks.

use std::time::Duration;

use azimuth_bridge::{Subscription, TelemetryHub};
use serde_json::Value as Json;

/// Collects the messages queued to one hub subscriber.
pub struct RecordingSubscriber {
    subscription: Subscription,
}

impl RecordingSubscriber {
    /// Subscribes to `hub`.
    pub fn attach(hub: &TelemetryHub) -> Self {
        Self {
            subscription: hub.subscribe(),
        }
    }

    /// Subscriber id, as passed to `handle_message`.
    pub fn id(&self) -> u64 {
        self.subscription.id
    }

    /// Next message, or `None` if nothing arrives within `wait`.
    pub async fn next(&mut self, wait: Duration) -> Option<Json> {
        let text = tokio::time::timeout(wait, self.subscription.recv())
            .await
            .ok()??;
        Some(serde_json::from_str(&text).expect("hub sent invalid JSON"))
    }

    /// Everything queued right now, without waiting.
    pub fn drain(&mut self) -> Vec<Json> {
        let mut out = Vec::new();
        while let Some(text) = self.subscription.try_recv() {
            out.push(serde_json::from_str(&text).expect("hub sent invalid JSON"));
        }
        out
    }

    /// Drops the receiving end, as a vanished client would.
    pub fn close(self) {
        drop(self.subscription);
    }
}

/// Returns true if `message` is an acknowledgement.
pub fn is_ack(message: &Json) -> bool {
    message.get("type").and_then(Json::as_str) == Some("ack")
}

/// Returns true if `message` is a telemetry frame.
pub fn is_frame(message: &Json) -> bool {
    message.get("position_pri").is_some()
}
