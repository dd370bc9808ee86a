// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Register map loading.
//!
//! The console's register map is a CSV exported by the configuration editor:
//!
//! ```text
//! SECTION,NAME,REG,ADD,CAN,R-ONLY,TYPE,GEN,AX1,AX2,DEF,MIN,MAX,UNIT,PER,SECURE,DEV,SECTION_INDEX
//! Motion,Position,IREG,x00,,X,FLOAT,,X,X,,,,%,,,,1
//! ```
//!
//! One row yields one [`Register`] per role flag. The base address in `ADD`
//! is offset by the axis (general +0, axis 1 +100, axis 2 +200) to get the
//! physical address that is polled.
//!
//! # Address format
//!
//! | Input  | Read as            |
//! |--------|--------------------|
//! | `x40`  | decimal 40         |
//! | `0x40` | hexadecimal 64     |
//! | `40`   | decimal 40         |

use std::fs::File;
use std::io::Read;
use std::path::Path;

use azimuth_core::{DataType, Register, RegisterKind, RegisterTable, RoleFlags, TableError};
use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};

// =============================================================================
// Columns
// =============================================================================

const COL_SECTION: usize = 0;
const COL_NAME: usize = 1;
const COL_REG: usize = 2;
const COL_ADD: usize = 3;
const COL_READ_ONLY: usize = 5;
const COL_TYPE: usize = 6;
const COL_GEN: usize = 7;
const COL_AX1: usize = 8;
const COL_AX2: usize = 9;
const COL_DEF: usize = 10;
const COL_MIN: usize = 11;
const COL_MAX: usize = 12;
const COL_UNIT: usize = 13;
const COL_PER: usize = 14;
const COL_SECTION_INDEX: usize = 17;

/// Column headers in export order.
pub const HEADERS: [&str; 18] = [
    "SECTION",
    "NAME",
    "REG",
    "ADD",
    "CAN",
    "R-ONLY",
    "TYPE",
    "GEN",
    "AX1",
    "AX2",
    "DEF",
    "MIN",
    "MAX",
    "UNIT",
    "PER",
    "SECURE",
    "DEV",
    "SECTION_INDEX",
];

const READER_ORIGIN: &str = "<register map>";

// =============================================================================
// RegisterMap
// =============================================================================

/// Loader for register map CSV files.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegisterMap;

impl RegisterMap {
    /// Parses a register map from any reader.
    pub fn load<R: Read>(reader: R) -> ConfigResult<RegisterTable> {
        Self::parse(reader, Path::new(READER_ORIGIN))
    }

    /// Parses a register map held in memory.
    pub fn load_str(content: &str) -> ConfigResult<RegisterTable> {
        Self::load(content.as_bytes())
    }

    /// Reads and parses a register map file.
    pub fn load_path(path: impl AsRef<Path>) -> ConfigResult<RegisterTable> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let file = File::open(path).map_err(|e| ConfigError::io(path, e))?;
        let table = Self::parse(file, path)?;

        info!(
            path = %path.display(),
            registers = table.len(),
            "Register map loaded"
        );
        Ok(table)
    }

    fn parse<R: Read>(reader: R, origin: &Path) -> ConfigResult<RegisterTable> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut registers: Vec<(usize, Register)> = Vec::new();
        let mut rows = 0usize;

        for (index, record) in csv.records().enumerate() {
            // Header is line 1.
            let fallback_line = index + 2;
            let record = record.map_err(|e| {
                let line = e
                    .position()
                    .map(|p| p.line() as usize)
                    .unwrap_or(fallback_line);
                ConfigError::parse_at_line(origin, e.to_string(), line)
            })?;
            let line = record
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(fallback_line);

            let row = Row { record: &record, line };
            if row.is_spacer() {
                continue;
            }

            rows += 1;
            for register in row.registers()? {
                registers.push((line, register));
            }
        }

        let table = RegisterTable::new(registers.iter().map(|(_, r)| r.clone())).map_err(
            |TableError::DuplicateKey { key }| {
                let line = registers
                    .iter()
                    .rev()
                    .find(|(_, r)| r.key == key)
                    .map(|(line, _)| *line)
                    .unwrap_or(0);
                ConfigError::DuplicateRegister { line, key }
            },
        )?;

        debug!(rows, registers = table.len(), "Parsed register map");
        Ok(table)
    }
}

// =============================================================================
// Row
// =============================================================================

struct Row<'a> {
    record: &'a csv::StringRecord,
    line: usize,
}

impl Row<'_> {
    /// Missing trailing columns read as empty.
    fn field(&self, column: usize) -> &str {
        self.record.get(column).unwrap_or("")
    }

    fn is_spacer(&self) -> bool {
        self.field(COL_REG).is_empty() && self.field(COL_ADD).is_empty()
    }

    fn registers(&self) -> ConfigResult<Vec<Register>> {
        let code = self.field(COL_REG);
        let kind = RegisterKind::from_code(code).ok_or_else(|| ConfigError::UnknownKind {
            line: self.line,
            kind: code.to_string(),
        })?;

        let base = parse_address(self.line, self.field(COL_ADD))?;
        let data_type = self.data_type(kind)?;

        let roles = RoleFlags::new(
            self.flag(COL_GEN, "GEN")?,
            self.flag(COL_AX1, "AX1")?,
            self.flag(COL_AX2, "AX2")?,
        );
        let read_only = self.flag(COL_READ_ONLY, "R-ONLY")?;
        let persistent = self.flag(COL_PER, "PER")?;
        let default = self.number(COL_DEF, "DEF")?;
        let min = self.number(COL_MIN, "MIN")?;
        let max = self.number(COL_MAX, "MAX")?;
        let section_index = self.section_index()?;

        let mut registers = Vec::with_capacity(3);
        for axis in roles.axes() {
            let mut register = Register::new(kind, base, axis, data_type).ok_or(
                ConfigError::AddressOverflow {
                    line: self.line,
                    base,
                    offset: axis.offset(),
                },
            )?;

            // Last word of a multi-word value must be addressable too.
            let span = data_type.word_count() - 1;
            if register.address().checked_add(span).is_none() {
                return Err(ConfigError::AddressOverflow {
                    line: self.line,
                    base,
                    offset: axis.offset() + span,
                });
            }

            register.roles = roles;
            register.read_only = read_only || !kind.is_writable();
            register.persistent = persistent;
            register.default = default;
            register.min = min;
            register.max = max;
            register.unit = self.field(COL_UNIT).to_string();
            register.section = self.field(COL_SECTION).to_string();
            register.name = self.field(COL_NAME).to_string();
            register.section_index = section_index;
            registers.push(register);
        }

        Ok(registers)
    }

    fn data_type(&self, kind: RegisterKind) -> ConfigResult<DataType> {
        let raw = self.field(COL_TYPE);
        let upper = raw.to_ascii_uppercase();

        let data_type = match (kind.is_bit(), upper.as_str()) {
            (true, "" | "INT" | "BOOL") => Some(DataType::Bool),
            (false, "" | "INT") => Some(DataType::Int16),
            (false, "FLOAT") => Some(DataType::Float32),
            _ => None,
        };

        data_type.ok_or_else(|| ConfigError::UnknownDataType {
            line: self.line,
            data_type: raw.to_string(),
            kind: kind.code().to_string(),
        })
    }

    fn flag(&self, column: usize, name: &'static str) -> ConfigResult<bool> {
        parse_flag(self.field(column)).ok_or_else(|| {
            ConfigError::invalid_flag(self.line, name, self.field(column))
        })
    }

    fn number(&self, column: usize, name: &'static str) -> ConfigResult<Option<f64>> {
        let raw = self.field(column);
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| ConfigError::invalid_number(self.line, name, raw))
    }

    fn section_index(&self) -> ConfigResult<Option<u32>> {
        let raw = self.field(COL_SECTION_INDEX);
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse::<u32>()
            .map(Some)
            .map_err(|_| ConfigError::invalid_number(self.line, "SECTION_INDEX", raw))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parses a base address (`x40`, `0x28` or `40`).
fn parse_address(line: usize, raw: &str) -> ConfigResult<u16> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::invalid_address(line, raw, "address is empty"));
    }

    let parsed = if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        u16::from_str_radix(hex, 16)
    } else if let Some(digits) = trimmed
        .strip_prefix('x')
        .or_else(|| trimmed.strip_prefix('X'))
    {
        digits.parse::<u16>()
    } else {
        trimmed.parse::<u16>()
    };

    parsed.map_err(|e| ConfigError::invalid_address(line, raw, e.to_string()))
}

/// Parses a yes/no marker column.
fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "x" | "1" | "true" | "yes" => Some(true),
        "" | "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use azimuth_core::{Axis, RegisterKey};
    use std::io::Write;

    fn csv(rows: &[&str]) -> String {
        let mut out = HEADERS.join(",");
        for row in rows {
            out.push('\n');
            out.push_str(row);
        }
        out.push('\n');
        out
    }

    #[test]
    fn test_axis_rows_expand() {
        let table = RegisterMap::load_str(&csv(&[
            "Motion,Position,IREG,x00,,X,FLOAT,,X,X,,-100,100,%,,,,1",
        ]))
        .unwrap();

        assert_eq!(table.len(), 2);
        let primary = table.get(&RegisterKey::input(100)).unwrap();
        assert_eq!(primary.axis, Axis::Primary);
        assert_eq!(primary.data_type, DataType::Float32);
        assert_eq!(primary.base_address, 0);
        assert_eq!(primary.min, Some(-100.0));
        assert_eq!(primary.unit, "%");
        assert_eq!(primary.section_index, Some(1));
        assert!(table.contains(&RegisterKey::input(200)));
    }

    #[test]
    fn test_no_flags_means_general() {
        let table = RegisterMap::load_str(&csv(&["Haptics,Friction,HREG,x07,,,INT"])).unwrap();
        let reg = table.get(&RegisterKey::holding(7)).unwrap();
        assert_eq!(reg.axis, Axis::General);
        assert_eq!(reg.data_type, DataType::Int16);
        assert!(!reg.read_only);
    }

    #[test]
    fn test_address_forms() {
        assert_eq!(parse_address(2, "x40").unwrap(), 40);
        assert_eq!(parse_address(2, "X07").unwrap(), 7);
        assert_eq!(parse_address(2, "0x28").unwrap(), 40);
        assert_eq!(parse_address(2, "12").unwrap(), 12);
        assert!(parse_address(2, "xZZ").is_err());
        assert!(parse_address(2, "x70000").is_err());
    }

    #[test]
    fn test_spacer_and_short_rows() {
        let table = RegisterMap::load_str(&csv(&[
            "Motion,,,,,,,,,,,,,,,,,",
            ",",
            "Haptics,Use detents,COIL,x01",
        ]))
        .unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&RegisterKey::coil(1)).unwrap().data_type, DataType::Bool);
    }

    #[test]
    fn test_row_errors() {
        let err = RegisterMap::load_str(&csv(&["A,B,XREG,x01"])).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKind { line: 2, .. }));

        let err = RegisterMap::load_str(&csv(&["A,B,HREG,x01", "A,C,HREG,bad"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAddress { line: 3, .. }));

        let err = RegisterMap::load_str(&csv(&["A,B,HREG,x01,,,DOUBLE"])).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDataType { .. }));

        let err = RegisterMap::load_str(&csv(&["A,B,COIL,x01,,,FLOAT"])).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDataType { .. }));

        let err = RegisterMap::load_str(&csv(&["A,B,HREG,x01,,maybe"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFlag { column: "R-ONLY", .. }));

        let err = RegisterMap::load_str(&csv(&["A,B,HREG,x01,,,INT,X,,,abc"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { column: "DEF", .. }));
    }

    #[test]
    fn test_duplicate_reports_second_line() {
        let err = RegisterMap::load_str(&csv(&[
            "A,First,HREG,x00,,,INT,,X",
            "A,Second,HREG,x100,,,INT,X",
        ]))
        .unwrap_err();
        match err {
            ConfigError::DuplicateRegister { line, key } => {
                assert_eq!(line, 3);
                assert_eq!(key, RegisterKey::holding(100));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_overflow() {
        let err = RegisterMap::load_str(&csv(&["A,B,HREG,x65500,,,INT,,,X"])).unwrap_err();
        assert!(matches!(err, ConfigError::AddressOverflow { offset: 200, .. }));

        let err = RegisterMap::load_str(&csv(&["A,B,IREG,x65535,,,FLOAT"])).unwrap_err();
        assert!(matches!(err, ConfigError::AddressOverflow { .. }));
    }

    #[test]
    fn test_load_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", csv(&["A,B,ISTS,x05,,X,,X"])).unwrap();

        let table = RegisterMap::load_path(file.path()).unwrap();
        assert!(table.get(&RegisterKey::discrete_input(5)).unwrap().read_only);

        let err = RegisterMap::load_path("/nonexistent/registers.csv").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }
}
