// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Reduced telemetry view sent to dashboard subscribers.

use serde::{Deserialize, Serialize};

use crate::register::RegisterKey;
use crate::value::Snapshot;

/// The six values the dashboard renders.
///
/// Serialized as the outbound telemetry message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardView {
    /// Primary thrust lever position.
    pub position_pri: f64,
    /// Secondary thrust lever position.
    pub position_sec: f64,
    /// Primary azimuth angle.
    pub angle_pri: f64,
    /// Secondary azimuth angle.
    pub angle_sec: f64,
    /// Primary position setpoint.
    pub pos_setpoint_pri: f64,
    /// Secondary position setpoint.
    pub pos_setpoint_sec: f64,
}

/// Which register feeds each dashboard field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardMapping {
    /// Source of `position_pri`.
    pub position_pri: RegisterKey,
    /// Source of `position_sec`.
    pub position_sec: RegisterKey,
    /// Source of `angle_pri`.
    pub angle_pri: RegisterKey,
    /// Source of `angle_sec`.
    pub angle_sec: RegisterKey,
    /// Source of `pos_setpoint_pri`.
    pub pos_setpoint_pri: RegisterKey,
    /// Source of `pos_setpoint_sec`.
    pub pos_setpoint_sec: RegisterKey,
}

impl Default for DashboardMapping {
    fn default() -> Self {
        Self {
            position_pri: RegisterKey::input(100),
            position_sec: RegisterKey::input(200),
            angle_pri: RegisterKey::input(102),
            angle_sec: RegisterKey::input(202),
            pos_setpoint_pri: RegisterKey::input(104),
            pos_setpoint_sec: RegisterKey::input(204),
        }
    }
}

impl DashboardMapping {
    /// Field names paired with their source keys.
    pub fn fields(&self) -> [(&'static str, RegisterKey); 6] {
        [
            ("position_pri", self.position_pri),
            ("position_sec", self.position_sec),
            ("angle_pri", self.angle_pri),
            ("angle_sec", self.angle_sec),
            ("pos_setpoint_pri", self.pos_setpoint_pri),
            ("pos_setpoint_sec", self.pos_setpoint_sec),
        ]
    }

    /// Projects a snapshot onto the view.
    ///
    /// Missing and non-finite values render as `0.0`.
    pub fn project(&self, snapshot: &Snapshot) -> DashboardView {
        let read = |key: RegisterKey| {
            snapshot
                .get(&key)
                .map(|v| v.as_f64())
                .filter(|v| v.is_finite())
                .unwrap_or(0.0)
        };

        DashboardView {
            position_pri: read(self.position_pri),
            position_sec: read(self.position_sec),
            angle_pri: read(self.angle_pri),
            angle_sec: read(self.angle_sec),
            pos_setpoint_pri: read(self.pos_setpoint_pri),
            pos_setpoint_sec: read(self.pos_setpoint_sec),
        }
    }
}
