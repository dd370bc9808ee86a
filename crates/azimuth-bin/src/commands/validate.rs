// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `validate` command.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use azimuth_config::{load_config, load_register_table, BridgeConfig, ConnectionKind, RecorderKind};
use azimuth_core::{RegisterKind, RegisterTable};

use crate::cli::{Cli, OutputFormat, ValidateArgs};
use crate::error::{BinError, BinResult};

/// Result of loading a configuration and its register map.
#[derive(Debug)]
pub struct ValidationReport {
    /// The configuration file that was checked.
    pub config_path: PathBuf,
    /// The loaded configuration.
    pub config: BridgeConfig,
    /// Register count per kind code.
    pub register_counts: BTreeMap<&'static str, usize>,
    /// Total number of registers.
    pub register_total: usize,
    /// Problems that do not stop the bridge from starting.
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Loads `config_path` and its register map and collects warnings.
    pub fn check(config_path: &Path) -> BinResult<Self> {
        if !config_path.exists() {
            return Err(BinError::config(format!(
                "Configuration file not found: {}",
                config_path.display()
            )));
        }

        let config = load_config(config_path)
            .map_err(|e| BinError::config(format!("Configuration validation failed: {}", e)))?;
        let registers = load_register_table(&config)
            .map_err(|e| BinError::config(format!("Register map validation failed: {}", e)))?;

        let register_counts = RegisterKind::ALL
            .iter()
            .map(|kind| (kind.code(), registers.count_by_kind(*kind)))
            .collect();
        let warnings = collect_warnings(&config, &registers);

        Ok(Self {
            config_path: config_path.to_path_buf(),
            config,
            register_counts,
            register_total: registers.len(),
            warnings,
        })
    }

    fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "connection": self.config.connection.kind.to_string(),
            "endpoint": self.config.connection.endpoint(),
            "register_map": self.config.register_map.display().to_string(),
            "registers": self.register_total,
            "registers_by_kind": self.register_counts,
            "poll_interval_ms": self.config.poller.interval.as_millis() as u64,
            "server": self.config.server.socket_addr().to_string(),
            "recorder": self.config.recorder.kind,
        })
    }
}

fn collect_warnings(config: &BridgeConfig, registers: &RegisterTable) -> Vec<String> {
    let mut warnings = Vec::new();

    if registers.is_empty() {
        warnings.push("Register map defines no registers".to_string());
    }

    for (field, key) in config.dashboard.fields() {
        if !registers.contains(&key) {
            warnings.push(format!("Dashboard field '{}' reads {} which is not in the register map", field, key));
        }
    }

    if config.connection.kind == ConnectionKind::Simulated {
        warnings.push("Connection is simulated; no hardware will be contacted".to_string());
    }

    if config.recorder.kind == RecorderKind::Jsonl {
        if let Some(parent) = config.recorder.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                warnings.push(format!(
                    "Run history directory does not exist yet: {}",
                    parent.display()
                ));
            }
        }
    }

    warnings
}

/// Loads and checks the configuration without touching the device.
pub fn validate(cli: &Cli, args: ValidateArgs) -> BinResult<()> {
    let report = ValidationReport::check(&cli.config)?;

    match args.format {
        OutputFormat::Text => print_text(&report, args.show_config),
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": true,
                "config_path": report.config_path.display().to_string(),
                "summary": report.summary(),
                "warnings": report.warnings,
                "config": if args.show_config { Some(&report.config) } else { None },
            });
            let rendered = serde_json::to_string_pretty(&output)
                .map_err(|e| BinError::runtime(format!("Failed to render report: {}", e)))?;
            println!("{}", rendered);
        }
    }

    if args.strict && !report.warnings.is_empty() {
        return Err(BinError::config(format!(
            "Strict mode: {} warning(s) found",
            report.warnings.len()
        )));
    }

    Ok(())
}

fn print_text(report: &ValidationReport, show_config: bool) {
    let config = &report.config;

    println!("✓ Configuration is valid: {}", report.config_path.display());
    println!();
    println!("Summary:");
    println!("  Connection:    {} ({})", config.connection.kind, config.connection.endpoint());
    println!("  Register map:  {}", config.register_map.display());
    println!("  Registers:     {}", report.register_total);
    for (code, count) in &report.register_counts {
        println!("    {:<6} {}", code, count);
    }
    println!("  Poll interval: {:?}", config.poller.interval);
    println!("  Dashboard:     ws://{}/ws", config.server.socket_addr());
    println!("  Recorder:      {:?}", config.recorder.kind);

    if !report.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in &report.warnings {
            println!("  ⚠ {}", warning);
        }
    }

    if show_config {
        println!();
        println!("Parsed configuration:");
        println!(
            "{}",
            serde_json::to_string_pretty(config).unwrap_or_else(|_| "(serialization error)".to_string())
        );
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTERS: &str = "SECTION,NAME,REG,ADD,CAN,R-ONLY,TYPE,GEN,AX1,AX2,DEF,MIN,MAX,UNIT,PER,SECURE,DEV,SECTION_INDEX\n\
        Motion,Position,IREG,x00,,X,FLOAT,,X,X,,,,%,,,,1\n";

    fn write_files(dir: &Path, kind: &str) -> PathBuf {
        std::fs::write(dir.join("registers.csv"), REGISTERS).unwrap();
        let config_path = dir.join("azimuth.yaml");
        std::fs::write(
            &config_path,
            format!(
                "connection:\n  kind: {}\nregister_map: {}\nrecorder:\n  kind: memory\n",
                kind,
                dir.join("registers.csv").display()
            ),
        )
        .unwrap();
        config_path
    }

    #[test]
    fn test_missing_file() {
        let err = ValidationReport::check(Path::new("/nonexistent/azimuth.yaml")).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_report_counts_and_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_files(dir.path(), "simulated");

        let report = ValidationReport::check(&path).unwrap();
        assert_eq!(report.register_total, 2);
        assert_eq!(report.register_counts["IREG"], 2);
        assert_eq!(report.register_counts["COIL"], 0);
        assert!(report.warnings.iter().any(|w| w.contains("simulated")));
        // Only IREG_100 and IREG_200 exist, so the other dashboard fields are missing.
        assert!(report.warnings.iter().any(|w| w.contains("not in the register map")));
    }

    #[test]
    fn test_bad_register_map_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_files(dir.path(), "tcp");
        std::fs::write(dir.path().join("registers.csv"), "SECTION,NAME,REG,ADD\nA,B,XREG,x01\n").unwrap();

        let err = ValidationReport::check(&path).unwrap_err();
        assert!(err.to_string().contains("Register map validation failed"));
    }
}
