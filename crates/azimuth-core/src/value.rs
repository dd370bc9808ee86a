// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Decoded register values and the published snapshot.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::register::RegisterKey;

// =============================================================================
// Value
// =============================================================================

/// A decoded register value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Coil or discrete input.
    Bool(bool),
    /// Signed integer register.
    Int(i32),
    /// Floating point register.
    Float(f64),
}

impl Value {
    /// Returns the value as `f64`. Booleans map to `0.0` / `1.0`.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Int(i) => f64::from(i),
            Self::Float(f) => f,
        }
    }

    /// Returns the boolean, or `None` for word values.
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the integer, or `None` for other variants.
    pub fn as_int(&self) -> Option<i32> {
        match *self {
            Self::Int(i) => Some(i),
            _ => None,
        }
    }

    /// Type name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
        }
    }

    /// Rounds a float to `decimals` places. Other variants pass through.
    pub fn rounded(self, decimals: u32) -> Self {
        match self {
            Self::Float(f) if f.is_finite() => {
                let scale = 10f64.powi(decimals as i32);
                let scaled = f * scale;
                if scaled.is_finite() {
                    Self::Float(scaled.round() / scale)
                } else {
                    self
                }
            }
            other => other,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Self::Int(i32::from(v))
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

// =============================================================================
// StaleValues
// =============================================================================

/// What a snapshot holds for a register whose read failed this cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleValues {
    /// Carry the previous value forward and mark the key stale.
    #[default]
    Retain,
    /// Leave the key out.
    Omit,
}

impl fmt::Display for StaleValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retain => f.write_str("retain"),
            Self::Omit => f.write_str("omit"),
        }
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Complete result of one poll cycle.
///
/// Snapshots are built privately by the poller and published whole. Once
/// published they are shared behind an `Arc` and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    version: u64,
    timestamp: DateTime<Utc>,
    values: HashMap<RegisterKey, Value>,
    stale: HashSet<RegisterKey>,
}

impl Snapshot {
    /// Creates a snapshot stamped with the current time.
    pub fn new(
        version: u64,
        values: HashMap<RegisterKey, Value>,
        stale: HashSet<RegisterKey>,
    ) -> Self {
        Self {
            version,
            timestamp: Utc::now(),
            values,
            stale,
        }
    }

    /// The version-zero snapshot held before the first cycle completes.
    pub fn empty() -> Self {
        Self::new(0, HashMap::new(), HashSet::new())
    }

    /// Monotonic version counter.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// When the cycle completed.
    #[inline]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Looks up a value.
    #[inline]
    pub fn get(&self, key: &RegisterKey) -> Option<Value> {
        self.values.get(key).copied()
    }

    /// Returns `true` if the key has a value.
    #[inline]
    pub fn contains(&self, key: &RegisterKey) -> bool {
        self.values.contains_key(key)
    }

    /// Returns `true` if the key's value was carried over from an earlier cycle.
    #[inline]
    pub fn is_stale(&self, key: &RegisterKey) -> bool {
        self.stale.contains(key)
    }

    /// Keys whose value was carried over.
    pub fn stale_keys(&self) -> impl Iterator<Item = &RegisterKey> {
        self.stale.iter()
    }

    /// All values.
    pub fn values(&self) -> &HashMap<RegisterKey, Value> {
        &self.values
    }

    /// Number of values.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if no value is present.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
