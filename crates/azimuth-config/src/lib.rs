// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # azimuth-config
//!
//! Configuration management for the azimuth bridge.
//!
//! - **Register map**: the console editor's CSV export parsed into an
//!   immutable [`RegisterTable`](azimuth_core::RegisterTable)
//! - **Application config**: a YAML [`BridgeConfig`] with defaults for every
//!   section, `${VAR:default}` placeholders and `AZIMUTH_*` overrides
//!
//! ## Quick Start
//!
//! ```no_run
//! use azimuth_config::{load_config, load_register_table};
//!
//! let config = load_config("azimuth.yaml").unwrap();
//! let registers = load_register_table(&config).unwrap();
//!
//! println!("Polling {} registers over {}", registers.len(), config.connection.endpoint());
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod register_map;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, load_config_str, load_register_table, ConfigLoader};
pub use register_map::RegisterMap;
pub use schema::{
    BackoffKind, BridgeConfig, CommandSettings, ConnectionConfig, ConnectionKind, PollerSettings,
    RecorderConfig, RecorderKind, ServerConfig,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name() {
        assert_eq!(NAME, "azimuth-config");
    }
}
