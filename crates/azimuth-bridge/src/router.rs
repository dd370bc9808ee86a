// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Command routing.
//!
//! Every command is validated, compiled into a [`WritePlan`] and executed one
//! step at a time against the shared [`DeviceLink`]:
//!
//! ```text
//! Command ──validate──► WritePlan ──execute──► DeviceLink
//!              │         [step 1]   ──lock/write/unlock──►
//!              ▼         [step 2]   ──lock/write/unlock──►
//!       ValidationError  [  ...  ]
//! ```
//!
//! The link lock is taken per step, never for a whole plan, so the poller
//! can interleave reads between the steps of a long command. The first
//! failing step ends the plan. Nothing is rolled back: every plan writes
//! absolute values, so sending the same command again converges the device.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use azimuth_core::{Command, CommandLimits, CommandRegisters, RegisterKey, ThrusterAxis, Value};
use azimuth_modbus::{DeviceLink, Outcome};
use serde::Serialize;

use crate::error::CommandError;

// =============================================================================
// WritePlan
// =============================================================================

/// One register write inside a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteStep {
    /// Label reported when this step fails.
    pub label: String,
    /// Target register.
    pub key: RegisterKey,
    /// Value to write.
    pub value: Value,
}

impl WriteStep {
    fn new(label: impl Into<String>, key: RegisterKey, value: Value) -> Self {
        Self {
            label: label.into(),
            key,
            value,
        }
    }
}

/// Ordered register writes for one command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WritePlan {
    steps: Vec<WriteStep>,
}

impl WritePlan {
    fn push(&mut self, label: impl Into<String>, key: RegisterKey, value: Value) {
        self.steps.push(WriteStep::new(label, key, value));
    }

    fn coil(&mut self, label: impl Into<String>, key: RegisterKey, on: bool) {
        self.push(label, key, Value::Bool(on));
    }

    fn word(&mut self, label: impl Into<String>, key: RegisterKey, value: i32) {
        self.push(label, key, Value::Int(value));
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` for commands that write nothing.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &WriteStep> {
        self.steps.iter()
    }

    /// Step labels in execution order.
    pub fn labels(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.label.as_str()).collect()
    }
}

// =============================================================================
// DispatchReport / RouterStats
// =============================================================================

/// Result of a successful dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Wire name of the command.
    pub command: &'static str,
    /// Register writes performed.
    pub steps_written: usize,
}

/// Router counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    /// Commands handed to `dispatch`.
    pub dispatched: u64,
    /// Commands that completed every step.
    pub succeeded: u64,
    /// Commands rejected by validation.
    pub rejected: u64,
    /// Commands that failed part way.
    pub failed: u64,
    /// Individual register writes that completed.
    pub steps_written: u64,
}

#[derive(Debug, Default)]
struct RouterCounters {
    dispatched: AtomicU64,
    succeeded: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
    steps_written: AtomicU64,
}

impl RouterCounters {
    fn snapshot(&self) -> RouterStats {
        RouterStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            steps_written: self.steps_written.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// CommandRouter
// =============================================================================

/// Turns commands into device writes.
pub struct CommandRouter {
    link: Arc<DeviceLink>,
    limits: CommandLimits,
    registers: CommandRegisters,
    counters: RouterCounters,
}

impl CommandRouter {
    /// Creates a router with the default limits and register layout.
    pub fn new(link: Arc<DeviceLink>) -> Self {
        Self {
            link,
            limits: CommandLimits::default(),
            registers: CommandRegisters::default(),
            counters: RouterCounters::default(),
        }
    }

    /// Replaces the accepted parameter ranges.
    pub fn with_limits(mut self, limits: CommandLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Replaces the register layout.
    pub fn with_registers(mut self, registers: CommandRegisters) -> Self {
        self.registers = registers;
        self
    }

    /// Accepted parameter ranges.
    pub fn limits(&self) -> &CommandLimits {
        &self.limits
    }

    /// The link commands are written to.
    pub fn link(&self) -> &Arc<DeviceLink> {
        &self.link
    }

    /// Counter snapshot.
    pub fn stats(&self) -> RouterStats {
        self.counters.snapshot()
    }

    /// Validates `command` and compiles it into its write sequence.
    pub fn plan(&self, command: &Command) -> Result<WritePlan, CommandError> {
        command.validate(&self.limits)?;

        let regs = &self.registers;
        let mut plan = WritePlan::default();

        match command {
            Command::SetSetpoint { thrust, angle } => {
                plan.word("thrust_setpoint", regs.setpoint_thrust, *thrust);
                plan.word("angle_setpoint", regs.setpoint_angle, *angle);
            }

            Command::SetVibration { strength } => {
                if *strength == 0 {
                    plan.coil("vibration_enable", regs.vibration_enable, false);
                } else {
                    plan.coil("vibration_enable", regs.vibration_enable, true);
                    plan.word("vibration_strength", regs.vibration_strength, *strength);
                }
            }

            Command::SetDetent {
                strength,
                axis,
                position,
            } => {
                plan.coil("detent_use", regs.detent_use, true);
                for lever in [ThrusterAxis::Thrust, ThrusterAxis::Angle] {
                    plan.coil(
                        format!("detent_primary_{}", lever),
                        regs.detent_primary.get(lever),
                        true,
                    );
                }
                for lever in [ThrusterAxis::Thrust, ThrusterAxis::Angle] {
                    plan.coil(
                        format!("detent_secondary_{}", lever),
                        regs.detent_secondary.get(lever),
                        false,
                    );
                }
                plan.word(
                    format!("detent_position_{}", axis),
                    regs.detent_position.get(*axis),
                    *position,
                );
                plan.word(
                    format!("detent_strength_{}", axis),
                    regs.detent_strength.get(*axis),
                    *strength,
                );
            }

            Command::SetBoundary {
                enable: false, ..
            } => {
                plan.coil("boundary_enable", regs.boundary_enable, false);
            }

            Command::SetBoundary {
                strength,
                axis,
                lower,
                upper,
                ..
            } => {
                plan.coil("boundary_enable", regs.boundary_enable, true);
                plan.word(format!("boundary_lower_{}", axis), regs.boundary_lower.get(*axis), *lower);
                plan.word(format!("boundary_upper_{}", axis), regs.boundary_upper.get(*axis), *upper);
                plan.word(
                    format!("boundary_strength_{}", axis),
                    regs.boundary_strength.get(*axis),
                    *strength,
                );
            }

            Command::SetFriction { strength } => {
                plan.word("friction_strength", regs.friction_strength, *strength);
            }

            Command::ClearHaptics => {
                plan.coil("boundary_enable", regs.boundary_enable, false);
                for lever in [ThrusterAxis::Thrust, ThrusterAxis::Angle] {
                    plan.word(
                        format!("detent_position_{}", lever),
                        regs.detent_position.get(lever),
                        0,
                    );
                    plan.word(
                        format!("detent_secondary_position_{}", lever),
                        regs.detent_secondary_position.get(lever),
                        0,
                    );
                }
                plan.coil("detent_use", regs.detent_use, false);
                for lever in [ThrusterAxis::Thrust, ThrusterAxis::Angle] {
                    plan.coil(
                        format!("detent_primary_{}", lever),
                        regs.detent_primary.get(lever),
                        false,
                    );
                    plan.coil(
                        format!("detent_secondary_{}", lever),
                        regs.detent_secondary.get(lever),
                        false,
                    );
                }
            }

            Command::StopSession(_) => {}
        }

        Ok(plan)
    }

    /// Validates and applies `command`.
    ///
    /// Rejected commands write nothing. A failing step stops the plan and is
    /// named in the returned error.
    pub async fn dispatch(&self, command: &Command) -> Result<DispatchReport, CommandError> {
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);

        let plan = match self.plan(command) {
            Ok(plan) => plan,
            Err(e) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(command = command.name(), error = %e, "Command rejected");
                return Err(e);
            }
        };

        match self.execute(&plan).await {
            Ok(steps_written) => {
                self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(command = command.name(), steps = steps_written, "Command applied");
                Ok(DispatchReport {
                    command: command.name(),
                    steps_written,
                })
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(command = command.name(), error = %e, "Command write plan failed");
                Err(e)
            }
        }
    }

    /// Runs `plan` against the link, one lock acquisition per step.
    ///
    /// Returns the number of steps written.
    pub async fn execute(&self, plan: &WritePlan) -> Result<usize, CommandError> {
        let mut written = 0;

        for step in plan.iter() {
            match self.link.write_register(step.key, step.value).await {
                Ok(Outcome::Completed(())) => {
                    written += 1;
                    self.counters.steps_written.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Outcome::Skipped) => {
                    return Err(CommandError::link_unavailable(step.label.as_str()));
                }
                Err(e) => {
                    return Err(CommandError::write(step.label.as_str(), e));
                }
            }
        }

        Ok(written)
    }
}

impl std::fmt::Debug for CommandRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRouter")
            .field("link", &self.link)
            .field("limits", &self.limits)
            .field("stats", &self.stats())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
