// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Inbound control commands.
//!
//! Commands arrive on the dashboard channel as JSON objects tagged by a
//! `command` field:
//!
//! ```text
//! {"command":"set_setpoint","thrust_setpoint":40,"angle_setpoint":-90}
//! {"command":"set_vibration","strength":2}
//! {"command":"set_detent","detent":2,"type":"thrust","pos":50}
//! {"command":"set_boundary","enable":true,"boundary":1,"type":"angle","lower":-30,"upper":30}
//! {"command":"set_friction_strength","friction":1}
//! {"command":"stop_simulation","avg_speed":7.5,"avg_rpm":610.0,"total_consumption":12.4,"run_time":300.0,"configuration_number":3}
//! {"command":"clear_haptics"}
//! ```
//!
//! Range checks live here so that a command can be rejected before it ever
//! reaches the device link.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CommandParseError, ValidationError};
use crate::recorder::RunSummary;
use crate::register::RegisterKey;

// =============================================================================
// ThrusterAxis
// =============================================================================

/// Console lever a haptic effect applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThrusterAxis {
    /// Thrust lever.
    Thrust,
    /// Azimuth angle.
    Angle,
}

impl fmt::Display for ThrusterAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Thrust => f.write_str("thrust"),
            Self::Angle => f.write_str("angle"),
        }
    }
}

// =============================================================================
// Command
// =============================================================================

/// A control command from a dashboard subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum Command {
    /// Drive thrust and angle toward new targets.
    #[serde(rename = "set_setpoint")]
    SetSetpoint {
        /// Thrust in percent.
        #[serde(rename = "thrust_setpoint")]
        thrust: i32,
        /// Azimuth angle in degrees.
        #[serde(rename = "angle_setpoint")]
        angle: i32,
    },

    /// Lever vibration. Strength 0 turns vibration off.
    #[serde(rename = "set_vibration")]
    SetVibration {
        /// Vibration strength.
        strength: i32,
    },

    /// Haptic notch at a lever position.
    #[serde(rename = "set_detent")]
    SetDetent {
        /// Notch strength.
        #[serde(rename = "detent")]
        strength: i32,
        /// Lever the notch applies to.
        #[serde(rename = "type")]
        axis: ThrusterAxis,
        /// Notch position.
        #[serde(rename = "pos")]
        position: i32,
    },

    /// Soft limit restricting lever travel.
    #[serde(rename = "set_boundary")]
    SetBoundary {
        /// `false` releases the boundary and ignores the remaining fields.
        enable: bool,
        /// Boundary strength.
        #[serde(rename = "boundary")]
        strength: i32,
        /// Lever the boundary applies to.
        #[serde(rename = "type")]
        axis: ThrusterAxis,
        /// Lower travel limit.
        lower: i32,
        /// Upper travel limit.
        upper: i32,
    },

    /// Lever friction.
    #[serde(rename = "set_friction_strength")]
    SetFriction {
        /// Friction strength.
        #[serde(rename = "friction")]
        strength: i32,
    },

    /// Session finished. Carries the summary to record.
    #[serde(rename = "stop_simulation")]
    StopSession(RunSummary),

    /// Remove every haptic effect.
    #[serde(rename = "clear_haptics")]
    ClearHaptics,
}

impl Command {
    /// Wire name of the command.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetSetpoint { .. } => "set_setpoint",
            Self::SetVibration { .. } => "set_vibration",
            Self::SetDetent { .. } => "set_detent",
            Self::SetBoundary { .. } => "set_boundary",
            Self::SetFriction { .. } => "set_friction_strength",
            Self::StopSession(_) => "stop_simulation",
            Self::ClearHaptics => "clear_haptics",
        }
    }

    /// Decodes a command from its JSON text.
    pub fn from_json(text: &str) -> Result<Self, CommandParseError> {
        let raw: serde_json::Value = serde_json::from_str(text).map_err(|e| CommandParseError {
            command: None,
            message: e.to_string(),
        })?;

        let command = raw
            .get("command")
            .and_then(|c| c.as_str())
            .map(str::to_string);

        if command.is_none() {
            return Err(CommandParseError {
                command: None,
                message: "missing 'command' field".to_string(),
            });
        }

        serde_json::from_value(raw).map_err(|e| CommandParseError {
            command,
            message: e.to_string(),
        })
    }

    /// Checks every numeric parameter against `limits`.
    pub fn validate(&self, limits: &CommandLimits) -> Result<(), ValidationError> {
        match self {
            Self::SetSetpoint { thrust, angle } => {
                limits.thrust.check("thrust_setpoint", *thrust)?;
                limits.angle.check("angle_setpoint", *angle)
            }
            Self::SetVibration { strength } => limits.vibration.check("strength", *strength),
            Self::SetDetent { strength, position, .. } => {
                limits.detent.check("detent", *strength)?;
                limits.position.check("pos", *position)
            }
            Self::SetBoundary {
                enable,
                strength,
                lower,
                upper,
                ..
            } => {
                if !enable {
                    return Ok(());
                }
                limits.boundary.check("boundary", *strength)?;
                limits.position.check("lower", *lower)?;
                limits.position.check("upper", *upper)
            }
            Self::SetFriction { strength } => limits.friction.check("friction", *strength),
            Self::StopSession(summary) => summary.validate(),
            Self::ClearHaptics => Ok(()),
        }
    }

    /// Returns `true` if the command produces device writes.
    pub fn writes_registers(&self) -> bool {
        !matches!(self, Self::StopSession(_))
    }
}

// =============================================================================
// CommandLimits
// =============================================================================

/// Inclusive integer range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntRange {
    /// Lower bound.
    pub min: i32,
    /// Upper bound.
    pub max: i32,
}

impl IntRange {
    /// Creates a range.
    pub const fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    /// Returns `true` if `value` lies within the range.
    #[inline]
    pub fn contains(&self, value: i32) -> bool {
        value >= self.min && value <= self.max
    }

    /// Returns `true` if `min <= max`.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.min <= self.max
    }

    /// Validates `value`, naming `field` on failure.
    pub fn check(&self, field: &'static str, value: i32) -> Result<(), ValidationError> {
        if self.contains(value) {
            Ok(())
        } else {
            Err(ValidationError::OutOfRange {
                field,
                value: i64::from(value),
                min: i64::from(self.min),
                max: i64::from(self.max),
            })
        }
    }
}

/// Accepted parameter ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandLimits {
    /// Thrust setpoint in percent.
    pub thrust: IntRange,
    /// Angle setpoint in degrees.
    pub angle: IntRange,
    /// Vibration strength.
    pub vibration: IntRange,
    /// Detent strength.
    pub detent: IntRange,
    /// Boundary strength.
    pub boundary: IntRange,
    /// Friction strength.
    pub friction: IntRange,
    /// Detent and boundary positions. Must fit one register.
    pub position: IntRange,
}

impl CommandLimits {
    /// Returns every range with its name.
    pub fn ranges(&self) -> [(&'static str, IntRange); 7] {
        [
            ("thrust", self.thrust),
            ("angle", self.angle),
            ("vibration", self.vibration),
            ("detent", self.detent),
            ("boundary", self.boundary),
            ("friction", self.friction),
            ("position", self.position),
        ]
    }
}

impl Default for CommandLimits {
    fn default() -> Self {
        Self {
            thrust: IntRange::new(-100, 100),
            angle: IntRange::new(-180, 180),
            vibration: IntRange::new(0, 3),
            detent: IntRange::new(0, 3),
            boundary: IntRange::new(0, 3),
            friction: IntRange::new(0, 3),
            position: IntRange::new(i32::from(i16::MIN), i32::from(u16::MAX)),
        }
    }
}

// =============================================================================
// CommandRegisters
// =============================================================================

/// A register per lever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisKeys {
    /// Register for the thrust lever.
    pub thrust: RegisterKey,
    /// Register for the angle lever.
    pub angle: RegisterKey,
}

impl AxisKeys {
    /// Creates a pair.
    pub const fn new(thrust: RegisterKey, angle: RegisterKey) -> Self {
        Self { thrust, angle }
    }

    /// Selects the register for `axis`.
    #[inline]
    pub fn get(&self, axis: ThrusterAxis) -> RegisterKey {
        match axis {
            ThrusterAxis::Thrust => self.thrust,
            ThrusterAxis::Angle => self.angle,
        }
    }

    /// Both registers, thrust first.
    pub fn both(&self) -> [RegisterKey; 2] {
        [self.thrust, self.angle]
    }
}

/// Console registers written by each command.
///
/// The defaults match the console firmware layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandRegisters {
    /// Thrust setpoint.
    pub setpoint_thrust: RegisterKey,
    /// Angle setpoint.
    pub setpoint_angle: RegisterKey,
    /// Vibration on/off coil.
    pub vibration_enable: RegisterKey,
    /// Vibration strength.
    pub vibration_strength: RegisterKey,
    /// Master "use detents" coil.
    pub detent_use: RegisterKey,
    /// Primary detent enable coils.
    pub detent_primary: AxisKeys,
    /// Secondary detent enable coils.
    pub detent_secondary: AxisKeys,
    /// Primary detent positions.
    pub detent_position: AxisKeys,
    /// Secondary detent positions.
    pub detent_secondary_position: AxisKeys,
    /// Detent strength.
    pub detent_strength: AxisKeys,
    /// Boundary on/off coil.
    pub boundary_enable: RegisterKey,
    /// Lower boundary limits.
    pub boundary_lower: AxisKeys,
    /// Upper boundary limits.
    pub boundary_upper: AxisKeys,
    /// Boundary strength.
    pub boundary_strength: AxisKeys,
    /// Friction strength.
    pub friction_strength: RegisterKey,
}

impl Default for CommandRegisters {
    fn default() -> Self {
        Self {
            setpoint_thrust: RegisterKey::holding(4),
            setpoint_angle: RegisterKey::holding(260),
            vibration_enable: RegisterKey::coil(2),
            vibration_strength: RegisterKey::holding(1),
            detent_use: RegisterKey::coil(1),
            detent_primary: AxisKeys::new(RegisterKey::coil(140), RegisterKey::coil(240)),
            detent_secondary: AxisKeys::new(RegisterKey::coil(141), RegisterKey::coil(241)),
            detent_position: AxisKeys::new(RegisterKey::holding(140), RegisterKey::holding(240)),
            detent_secondary_position: AxisKeys::new(
                RegisterKey::holding(141),
                RegisterKey::holding(241),
            ),
            detent_strength: AxisKeys::new(RegisterKey::holding(100), RegisterKey::holding(200)),
            boundary_enable: RegisterKey::coil(3),
            boundary_lower: AxisKeys::new(RegisterKey::holding(130), RegisterKey::holding(230)),
            boundary_upper: AxisKeys::new(RegisterKey::holding(131), RegisterKey::holding(231)),
            boundary_strength: AxisKeys::new(RegisterKey::holding(102), RegisterKey::holding(202)),
            friction_strength: RegisterKey::holding(7),
        }
    }
}

impl CommandRegisters {
    /// Every configured register with its field name.
    pub fn all(&self) -> Vec<(&'static str, RegisterKey)> {
        let mut keys = vec![
            ("setpoint_thrust", self.setpoint_thrust),
            ("setpoint_angle", self.setpoint_angle),
            ("vibration_enable", self.vibration_enable),
            ("vibration_strength", self.vibration_strength),
            ("detent_use", self.detent_use),
            ("boundary_enable", self.boundary_enable),
            ("friction_strength", self.friction_strength),
        ];
        let pairs = [
            ("detent_primary", self.detent_primary),
            ("detent_secondary", self.detent_secondary),
            ("detent_position", self.detent_position),
            ("detent_secondary_position", self.detent_secondary_position),
            ("detent_strength", self.detent_strength),
            ("boundary_lower", self.boundary_lower),
            ("boundary_upper", self.boundary_upper),
            ("boundary_strength", self.boundary_strength),
        ];
        for (name, pair) in pairs {
            keys.push((name, pair.thrust));
            keys.push((name, pair.angle));
        }
        keys
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_registers_default_layout() {
        let regs = CommandRegisters::default();
        assert_eq!(regs.setpoint_angle.to_string(), "HREG_260");
        assert_eq!(regs.detent_position.get(ThrusterAxis::Angle), RegisterKey::holding(240));
        assert_eq!(regs.boundary_upper.get(ThrusterAxis::Thrust), RegisterKey::holding(131));
        assert!(regs.all().iter().all(|(_, key)| key.kind.is_writable()));
    }

    #[test]
    fn test_command_registers_partial_override() {
        let regs: CommandRegisters =
            serde_json::from_str(r#"{"friction_strength":"HREG_9"}"#).unwrap();
        assert_eq!(regs.friction_strength, RegisterKey::holding(9));
        assert_eq!(regs.setpoint_thrust, RegisterKey::holding(4));
    }

    #[test]
    fn test_parse_every_wire_form() {
        let cases = [
            (r#"{"command":"set_setpoint","thrust_setpoint":40,"angle_setpoint":-90}"#, "set_setpoint"),
            (r#"{"command":"set_vibration","strength":2}"#, "set_vibration"),
            (r#"{"command":"set_detent","detent":2,"type":"thrust","pos":50}"#, "set_detent"),
            (
                r#"{"command":"set_boundary","enable":true,"boundary":1,"type":"angle","lower":-30,"upper":30}"#,
                "set_boundary",
            ),
            (r#"{"command":"set_friction_strength","friction":1}"#, "set_friction_strength"),
            (
                r#"{"command":"stop_simulation","avg_speed":7.5,"avg_rpm":610.0,"total_consumption":12.4,"run_time":300.0,"configuration_number":3}"#,
                "stop_simulation",
            ),
            (r#"{"command":"clear_haptics"}"#, "clear_haptics"),
        ];

        for (text, name) in cases {
            let command = Command::from_json(text).unwrap();
            assert_eq!(command.name(), name);
        }
    }

    #[test]
    fn test_parse_detent_fields() {
        let command = Command::from_json(r#"{"command":"set_detent","detent":2,"type":"thrust","pos":50}"#).unwrap();
        assert_eq!(
            command,
            Command::SetDetent {
                strength: 2,
                axis: ThrusterAxis::Thrust,
                position: 50
            }
        );
    }

    #[test]
    fn test_parse_errors_keep_command_name() {
        let err = Command::from_json(r#"{"command":"set_vibration"}"#).unwrap_err();
        assert_eq!(err.command.as_deref(), Some("set_vibration"));

        let err = Command::from_json(r#"{"command":"warp_drive"}"#).unwrap_err();
        assert_eq!(err.command.as_deref(), Some("warp_drive"));

        let err = Command::from_json(r#"{"strength":2}"#).unwrap_err();
        assert!(err.command.is_none());

        assert!(Command::from_json("not json").is_err());
    }

    #[test]
    fn test_setpoint_range_rejected() {
        let limits = CommandLimits::default();
        let err = Command::SetSetpoint { thrust: 150, angle: 0 }
            .validate(&limits)
            .unwrap_err();
        assert_eq!(err.field(), "thrust_setpoint");

        let err = Command::SetSetpoint { thrust: 0, angle: -181 }
            .validate(&limits)
            .unwrap_err();
        assert_eq!(err.field(), "angle_setpoint");

        assert!(Command::SetSetpoint { thrust: -100, angle: 180 }.validate(&limits).is_ok());
    }

    #[test]
    fn test_strength_ranges() {
        let limits = CommandLimits::default();
        assert!(Command::SetVibration { strength: 4 }.validate(&limits).is_err());
        assert!(Command::SetFriction { strength: -1 }.validate(&limits).is_err());
        assert!(Command::SetDetent {
            strength: 3,
            axis: ThrusterAxis::Angle,
            position: 359
        }
        .validate(&limits)
        .is_ok());
    }

    #[test]
    fn test_disabled_boundary_skips_range_checks() {
        let limits = CommandLimits::default();
        let disable = Command::SetBoundary {
            enable: false,
            strength: 99,
            axis: ThrusterAxis::Thrust,
            lower: 0,
            upper: 0,
        };
        assert!(disable.validate(&limits).is_ok());

        let enable = Command::SetBoundary {
            enable: true,
            strength: 99,
            axis: ThrusterAxis::Thrust,
            lower: 0,
            upper: 0,
        };
        assert!(enable.validate(&limits).is_err());
    }

    #[test]
    fn test_int_range() {
        let range = IntRange::new(0, 3);
        assert!(range.contains(0));
        assert!(range.contains(3));
        assert!(!range.contains(4));
        assert!(!IntRange::new(5, 1).is_valid());
    }
}
