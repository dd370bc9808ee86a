// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Fixtures
//!
//! Register maps, device contents and run summaries shared by the suites.

use azimuth_config::register_map::HEADERS;
use azimuth_config::RegisterMap;
use azimuth_core::{RegisterTable, RunSummary};
use azimuth_modbus::{ByteOrder, SimulatedDevice};

// =============================================================================
// Register Map Builder
// =============================================================================

/// Builds register map CSV text one row at a time.
///
/// ```rust,ignore
/// let csv = RegisterMapBuilder::new()
///     .row("Motion", "Position", "IREG", "x00", "FLOAT", Roles::AXES)
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct RegisterMapBuilder {
    rows: Vec<String>,
}

/// Role columns of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roles {
    /// `GEN` column.
    pub general: bool,
    /// `AX1` column.
    pub axis1: bool,
    /// `AX2` column.
    pub axis2: bool,
}

impl Roles {
    /// General only.
    pub const GENERAL: Roles = Roles {
        general: true,
        axis1: false,
        axis2: false,
    };
    /// First axis only.
    pub const AXIS1: Roles = Roles {
        general: false,
        axis1: true,
        axis2: false,
    };
    /// Both axes.
    pub const AXES: Roles = Roles {
        general: false,
        axis1: true,
        axis2: true,
    };
}

fn mark(flag: bool) -> &'static str {
    if flag { "X" } else { "" }
}

impl RegisterMapBuilder {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a register row.
    pub fn row(
        mut self,
        section: &str,
        name: &str,
        kind: &str,
        address: &str,
        data_type: &str,
        roles: Roles,
    ) -> Self {
        let read_only = matches!(kind, "IREG" | "ISTS");
        self.rows.push(format!(
            "{},{},{},{},,{},{},{},{},{},,,,,,,,",
            section,
            name,
            kind,
            address,
            mark(read_only),
            data_type,
            mark(roles.general),
            mark(roles.axis1),
            mark(roles.axis2),
        ));
        self
    }

    /// Adds a line exactly as given.
    pub fn raw(mut self, line: &str) -> Self {
        self.rows.push(line.to_string());
        self
    }

    /// Adds an empty spacer row.
    pub fn spacer(self) -> Self {
        self.raw(",,,,,,,,,,,,,,,,,")
    }

    /// Renders the CSV with its header.
    pub fn build(&self) -> String {
        let mut out = HEADERS.join(",");
        out.push('\n');
        for row in &self.rows {
            out.push_str(row);
            out.push('\n');
        }
        out
    }

    /// Parses the rendered CSV.
    pub fn table(&self) -> RegisterTable {
        RegisterMap::load_str(&self.build()).expect("fixture register map must parse")
    }
}

// =============================================================================
// Console Presets
// =============================================================================

/// The register map of a console with everything the dashboard shows.
///
/// | Row | Kind | Base | Registers |
/// |-----|------|------|-----------|
/// | Position | IREG FLOAT | 0 | IREG_100, IREG_200 |
/// | Angle | IREG FLOAT | 2 | IREG_102, IREG_202 |
/// | Setpoint | IREG FLOAT | 4 | IREG_104, IREG_204 |
/// | Running | COIL | 1 | COIL_1 |
/// | Friction | HREG INT | 7 | HREG_7 |
pub fn console_map() -> RegisterMapBuilder {
    RegisterMapBuilder::new()
        .row("Motion", "Position", "IREG", "x00", "FLOAT", Roles::AXES)
        .row("Motion", "Angle", "IREG", "x02", "FLOAT", Roles::AXES)
        .row("Motion", "Setpoint", "IREG", "x04", "FLOAT", Roles::AXES)
        .spacer()
        .row("Haptics", "Detents", "COIL", "x01", "", Roles::GENERAL)
        .row("Haptics", "Friction", "HREG", "x07", "INT", Roles::GENERAL)
}

/// Two words holding `value` as the console stores it under `order`.
pub fn float_words(value: f32, order: ByteOrder) -> [u16; 2] {
    let bits = value.to_bits();
    let high = (bits >> 16) as u16;
    let low = (bits & 0xFFFF) as u16;

    match order {
        ByteOrder::BigEndian => [high, low],
        ByteOrder::MidLittleEndian => [low, high],
        ByteOrder::LittleEndian => [low.swap_bytes(), high.swap_bytes()],
        ByteOrder::MidBigEndian => [high.swap_bytes(), low.swap_bytes()],
    }
}

/// Values loaded by [`seed_console`], keyed by physical input address.
pub const CONSOLE_VALUES: [(u16, f32); 6] = [
    (100, 42.5),
    (200, -12.25),
    (102, 90.0),
    (202, 270.0),
    (104, 50.0),
    (204, 0.5),
];

/// Loads [`CONSOLE_VALUES`] into `device` in the default word order.
pub fn seed_console(device: &SimulatedDevice) {
    for (address, value) in CONSOLE_VALUES {
        device.set_input_words(address, &float_words(value, ByteOrder::default()));
    }
    device.set_coil(1, true);
    device.set_holding(7, 2);
}

/// A plausible end-of-session summary.
pub fn sample_summary() -> RunSummary {
    RunSummary {
        run_time: 300.0,
        total_consumption: 12.4,
        configuration_number: 3,
        average_speed: 7.5,
        average_rpm: 610.0,
    }
}

/// `stop_simulation` message carrying [`sample_summary`].
pub const STOP_MESSAGE: &str = r#"{"command":"stop_simulation","avg_speed":7.5,"avg_rpm":610.0,"total_consumption":12.4,"run_time":300.0,"configuration_number":3}"#;
