// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Typed register model.
//!
//! A console register is identified by its Modbus table ([`RegisterKind`]) and
//! its *physical* address. Rows in the register map describe a base address
//! that is duplicated per actuator axis:
//!
//! ```text
//! base address ──┬── general ──► base + 0
//!                ├── axis 1  ──► base + 100
//!                └── axis 2  ──► base + 200
//! ```
//!
//! The derived physical address is what gets polled, and together with the
//! kind it forms the [`RegisterKey`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{KeyParseError, TableError};

// =============================================================================
// RegisterKind
// =============================================================================

/// Modbus register table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterKind {
    /// Read/write single bit (FC 01 / FC 05).
    Coil,
    /// Read-only single bit (FC 02).
    DiscreteInput,
    /// Read/write 16-bit word (FC 03 / FC 06 / FC 16).
    HoldingRegister,
    /// Read-only 16-bit word (FC 04).
    InputRegister,
}

impl RegisterKind {
    /// All kinds in table order.
    pub const ALL: [RegisterKind; 4] = [
        Self::Coil,
        Self::DiscreteInput,
        Self::HoldingRegister,
        Self::InputRegister,
    ];

    /// Returns the short code used in register maps and keys.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Coil => "COIL",
            Self::DiscreteInput => "ISTS",
            Self::HoldingRegister => "HREG",
            Self::InputRegister => "IREG",
        }
    }

    /// Parses a short code (`COIL`, `ISTS`, `HREG`, `IREG`), ignoring case.
    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.code().eq_ignore_ascii_case(code))
    }

    /// Returns `true` for single-bit tables.
    #[inline]
    pub fn is_bit(&self) -> bool {
        matches!(self, Self::Coil | Self::DiscreteInput)
    }

    /// Returns `true` if the table accepts writes.
    #[inline]
    pub fn is_writable(&self) -> bool {
        matches!(self, Self::Coil | Self::HoldingRegister)
    }
}

impl fmt::Display for RegisterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// =============================================================================
// DataType
// =============================================================================

/// Decoded type of a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Single bit.
    Bool,
    /// One word, two's-complement signed.
    Int16,
    /// Two consecutive words.
    Float32,
}

impl DataType {
    /// Number of 16-bit words (or bits) a read of this type spans.
    #[inline]
    pub fn word_count(&self) -> u16 {
        match self {
            Self::Bool | Self::Int16 => 1,
            Self::Float32 => 2,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bool => "bool",
            Self::Int16 => "int16",
            Self::Float32 => "float32",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Axis
// =============================================================================

/// Actuator instance sharing a logical base address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    /// Console-wide register.
    General,
    /// Primary actuator (axis 1).
    Primary,
    /// Secondary actuator (axis 2).
    Secondary,
}

impl Axis {
    /// All axes, general first.
    pub const ALL: [Axis; 3] = [Self::General, Self::Primary, Self::Secondary];

    /// Address offset applied to the base address.
    #[inline]
    pub fn offset(&self) -> u16 {
        match self {
            Self::General => 0,
            Self::Primary => 100,
            Self::Secondary => 200,
        }
    }

    /// Derives the physical address for `base` on this axis.
    ///
    /// Returns `None` if the result does not fit in 16 bits.
    #[inline]
    pub fn derive(&self, base: u16) -> Option<u16> {
        base.checked_add(self.offset())
    }
}

// =============================================================================
// RoleFlags
// =============================================================================

/// Which axes a register map row applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleFlags {
    /// Row applies console-wide.
    pub general: bool,
    /// Row applies to axis 1.
    pub axis1: bool,
    /// Row applies to axis 2.
    pub axis2: bool,
}

impl RoleFlags {
    /// Creates a flag set.
    pub fn new(general: bool, axis1: bool, axis2: bool) -> Self {
        Self { general, axis1, axis2 }
    }

    /// Returns the axes selected by these flags.
    ///
    /// A row with no flag set is treated as general.
    pub fn axes(&self) -> Vec<Axis> {
        let mut axes = Vec::with_capacity(3);
        if self.general {
            axes.push(Axis::General);
        }
        if self.axis1 {
            axes.push(Axis::Primary);
        }
        if self.axis2 {
            axes.push(Axis::Secondary);
        }
        if axes.is_empty() {
            axes.push(Axis::General);
        }
        axes
    }
}

// =============================================================================
// RegisterKey
// =============================================================================

/// Composite register identifier: table plus physical address.
///
/// Displays and parses as `KIND_address`, e.g. `IREG_100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegisterKey {
    /// Register table.
    pub kind: RegisterKind,
    /// Physical (offset-applied) address.
    pub address: u16,
}

impl RegisterKey {
    /// Creates a key.
    #[inline]
    pub const fn new(kind: RegisterKind, address: u16) -> Self {
        Self { kind, address }
    }

    /// Coil key.
    #[inline]
    pub const fn coil(address: u16) -> Self {
        Self::new(RegisterKind::Coil, address)
    }

    /// Discrete input key.
    #[inline]
    pub const fn discrete_input(address: u16) -> Self {
        Self::new(RegisterKind::DiscreteInput, address)
    }

    /// Holding register key.
    #[inline]
    pub const fn holding(address: u16) -> Self {
        Self::new(RegisterKind::HoldingRegister, address)
    }

    /// Input register key.
    #[inline]
    pub const fn input(address: u16) -> Self {
        Self::new(RegisterKind::InputRegister, address)
    }
}

impl fmt::Display for RegisterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.kind.code(), self.address)
    }
}

impl FromStr for RegisterKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (code, address) = s
            .trim()
            .split_once('_')
            .ok_or_else(|| KeyParseError::new(s, "expected KIND_address"))?;

        let kind = RegisterKind::from_code(code)
            .ok_or_else(|| KeyParseError::new(s, format!("unknown register kind '{}'", code)))?;

        let address = address
            .parse::<u16>()
            .map_err(|e| KeyParseError::new(s, format!("invalid address: {}", e)))?;

        Ok(Self::new(kind, address))
    }
}

impl Serialize for RegisterKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RegisterKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Register
// =============================================================================

/// One polled register, fully resolved from a register map row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Register {
    /// Derived key (kind + physical address).
    pub key: RegisterKey,
    /// Address as written in the register map.
    pub base_address: u16,
    /// Axis this instance was derived for.
    pub axis: Axis,
    /// Decoded type.
    pub data_type: DataType,
    /// Role flags of the originating row.
    pub roles: RoleFlags,
    /// Row is marked read-only.
    pub read_only: bool,
    /// Value survives a power cycle on the console.
    pub persistent: bool,
    /// Factory default.
    pub default: Option<f64>,
    /// Lower engineering bound.
    pub min: Option<f64>,
    /// Upper engineering bound.
    pub max: Option<f64>,
    /// Engineering unit.
    pub unit: String,
    /// Register map section.
    pub section: String,
    /// Human-readable name.
    pub name: String,
    /// Position within the section.
    pub section_index: Option<u32>,
}

impl Register {
    /// Creates a register with empty metadata.
    pub fn new(kind: RegisterKind, base_address: u16, axis: Axis, data_type: DataType) -> Option<Self> {
        let address = axis.derive(base_address)?;
        Some(Self {
            key: RegisterKey::new(kind, address),
            base_address,
            axis,
            data_type,
            roles: RoleFlags::default(),
            read_only: !kind.is_writable(),
            persistent: false,
            default: None,
            min: None,
            max: None,
            unit: String::new(),
            section: String::new(),
            name: String::new(),
            section_index: None,
        })
    }

    /// Sets the name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Register table.
    #[inline]
    pub fn kind(&self) -> RegisterKind {
        self.key.kind
    }

    /// Physical address.
    #[inline]
    pub fn address(&self) -> u16 {
        self.key.address
    }

    /// Key in the console editor's `KIND_base_physical` form, e.g. `IREG_0_100`.
    pub fn legacy_key(&self) -> String {
        format!("{}_{}_{}", self.kind().code(), self.base_address, self.address())
    }
}

// =============================================================================
// RegisterTable
// =============================================================================

/// Immutable, key-ordered set of registers.
///
/// Built once per loaded register map. Reloading produces a new table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegisterTable {
    registers: BTreeMap<RegisterKey, Register>,
}

impl RegisterTable {
    /// Builds a table, rejecting duplicate keys.
    pub fn new(registers: impl IntoIterator<Item = Register>) -> Result<Self, TableError> {
        let mut map = BTreeMap::new();
        for register in registers {
            let key = register.key;
            if map.insert(key, register).is_some() {
                return Err(TableError::DuplicateKey { key });
            }
        }
        Ok(Self { registers: map })
    }

    /// Returns an empty table.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Looks up a register.
    #[inline]
    pub fn get(&self, key: &RegisterKey) -> Option<&Register> {
        self.registers.get(key)
    }

    /// Returns `true` if the key is present.
    #[inline]
    pub fn contains(&self, key: &RegisterKey) -> bool {
        self.registers.contains_key(key)
    }

    /// Number of registers.
    #[inline]
    pub fn len(&self) -> usize {
        self.registers.len()
    }

    /// Returns `true` if the table has no registers.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    /// Iterates registers in key order.
    pub fn iter(&self) -> impl Iterator<Item = &Register> {
        self.registers.values()
    }

    /// Iterates keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &RegisterKey> {
        self.registers.keys()
    }

    /// Counts registers per table.
    pub fn count_by_kind(&self, kind: RegisterKind) -> usize {
        self.registers.keys().filter(|k| k.kind == kind).count()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_derivation_is_injective() {
        for base in [0u16, 2, 4, 40, 99] {
            let derived: Vec<u16> = Axis::ALL.iter().filter_map(|a| a.derive(base)).collect();
            assert_eq!(derived.len(), 3);
            assert_ne!(derived[0], derived[1]);
            assert_ne!(derived[1], derived[2]);
            assert_ne!(derived[0], derived[2]);
        }
        assert_eq!(Axis::Primary.derive(0), Some(100));
        assert_eq!(Axis::Secondary.derive(4), Some(204));
        assert_eq!(Axis::Secondary.derive(u16::MAX - 10), None);
    }

    #[test]
    fn test_role_flags_default_to_general() {
        assert_eq!(RoleFlags::default().axes(), vec![Axis::General]);
        assert_eq!(
            RoleFlags::new(false, true, true).axes(),
            vec![Axis::Primary, Axis::Secondary]
        );
    }

    #[test]
    fn test_key_display_and_parse() {
        let key = RegisterKey::input(100);
        assert_eq!(key.to_string(), "IREG_100");
        assert_eq!("IREG_100".parse::<RegisterKey>().unwrap(), key);
        assert_eq!("coil_2".parse::<RegisterKey>().unwrap(), RegisterKey::coil(2));
        assert!("IREG".parse::<RegisterKey>().is_err());
        assert!("XREG_1".parse::<RegisterKey>().is_err());
        assert!("HREG_70000".parse::<RegisterKey>().is_err());
    }

    #[test]
    fn test_key_serde_as_string() {
        let json = serde_json::to_string(&RegisterKey::holding(4)).unwrap();
        assert_eq!(json, "\"HREG_4\"");
        let key: RegisterKey = serde_json::from_str("\"ISTS_12\"").unwrap();
        assert_eq!(key, RegisterKey::discrete_input(12));
    }

    #[test]
    fn test_kind_codes() {
        assert_eq!(RegisterKind::from_code(" hreg "), Some(RegisterKind::HoldingRegister));
        assert_eq!(RegisterKind::from_code("FOO"), None);
        assert!(RegisterKind::Coil.is_bit());
        assert!(!RegisterKind::InputRegister.is_writable());
    }

    #[test]
    fn test_register_legacy_key() {
        let reg = Register::new(RegisterKind::InputRegister, 0, Axis::Primary, DataType::Float32).unwrap();
        assert_eq!(reg.key, RegisterKey::input(100));
        assert_eq!(reg.legacy_key(), "IREG_0_100");
        assert!(reg.read_only);
    }

    #[test]
    fn test_table_rejects_duplicates() {
        let a = Register::new(RegisterKind::HoldingRegister, 4, Axis::General, DataType::Int16).unwrap();
        let b = a.clone().with_name("copy");
        let err = RegisterTable::new(vec![a, b]).unwrap_err();
        assert_eq!(err, TableError::DuplicateKey { key: RegisterKey::holding(4) });
    }

    #[test]
    fn test_table_is_key_ordered() {
        let regs = vec![
            Register::new(RegisterKind::InputRegister, 0, Axis::Secondary, DataType::Float32).unwrap(),
            Register::new(RegisterKind::Coil, 1, Axis::General, DataType::Bool).unwrap(),
            Register::new(RegisterKind::InputRegister, 0, Axis::Primary, DataType::Float32).unwrap(),
        ];
        let table = RegisterTable::new(regs).unwrap();
        let keys: Vec<String> = table.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["COIL_1", "IREG_100", "IREG_200"]);
        assert_eq!(table.count_by_kind(RegisterKind::InputRegister), 2);
    }
}
