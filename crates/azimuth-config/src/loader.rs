// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading.
//!
//! ```text
//! azimuth.yaml ──► ${VAR:default} ──► YAML ──► AZIMUTH_* ──► relative ──► validate
//!                  placeholders       parse    overrides     paths
//! ```
//!
//! # Environment Overrides
//!
//! ```bash
//! AZIMUTH_CONNECTION_KIND=simulated
//! AZIMUTH_SERVER_PORT=9000
//! AZIMUTH_REGISTER_MAP=/etc/azimuth/registers.csv
//! AZIMUTH_POLL_INTERVAL=250ms
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use azimuth_core::RegisterTable;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::register_map::RegisterMap;
use crate::schema::{BridgeConfig, ConnectionKind};

// =============================================================================
// ConfigLoader
// =============================================================================

/// Loads and validates [`BridgeConfig`] documents.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,

    /// Environment variable prefix.
    env_prefix: String,

    /// Whether to resolve environment variables.
    resolve_env_vars: bool,

    /// Whether to resolve relative paths.
    resolve_paths: bool,
}

impl ConfigLoader {
    /// Creates a new configuration loader with default settings.
    pub fn new() -> Self {
        Self {
            base_path: None,
            env_prefix: "AZIMUTH".to_string(),
            resolve_env_vars: true,
            resolve_paths: true,
        }
    }

    /// Sets the base path for resolving relative paths.
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Sets the environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Enables or disables environment variable resolution.
    pub fn with_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = enabled;
        self
    }

    /// Enables or disables relative path resolution.
    pub fn with_path_resolution(mut self, enabled: bool) -> Self {
        self.resolve_paths = enabled;
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// Relative paths inside the document resolve against the file's
    /// directory unless a base path was set.
    pub fn load(&self, path: impl AsRef<Path>) -> ConfigResult<BridgeConfig> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let base_path = self.base_path.clone().unwrap_or_else(|| {
            path.parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."))
        });

        let content = self.read_file(path)?;
        let mut config = self.parse_content(&content).map_err(|e| match e {
            ConfigError::Serialization { message } => ConfigError::parse(path, message),
            other => other,
        })?;

        if self.resolve_env_vars {
            self.apply_env_overrides(&mut config)?;
        }

        if self.resolve_paths {
            resolve_relative_paths(&mut config, &base_path);
        }

        config.validate()?;

        debug!(
            connection = %config.connection.kind,
            register_map = %config.register_map.display(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Loads configuration from a YAML string.
    pub fn load_from_str(&self, content: &str) -> ConfigResult<BridgeConfig> {
        let mut config = self.parse_content(content)?;

        if self.resolve_env_vars {
            self.apply_env_overrides(&mut config)?;
        }

        if self.resolve_paths {
            if let Some(base_path) = &self.base_path {
                resolve_relative_paths(&mut config, base_path);
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn read_file(&self, path: &Path) -> ConfigResult<String> {
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))
    }

    fn parse_content(&self, content: &str) -> ConfigResult<BridgeConfig> {
        let content = if self.resolve_env_vars {
            resolve_placeholders(content, |name| env::var(name).ok())
        } else {
            content.to_string()
        };

        parse_yaml(&content)
    }

    fn apply_env_overrides(&self, config: &mut BridgeConfig) -> ConfigResult<()> {
        apply_overrides(config, &self.env_prefix, |name| env::var(name).ok())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Replaces `${VAR}` and `${VAR:default}` placeholders.
///
/// An unset variable without a default is left in place.
fn resolve_placeholders(content: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' || chars.peek() != Some(&'{') {
            result.push(c);
            continue;
        }
        chars.next();

        let mut var_content = String::new();
        let mut found_close = false;
        for c in chars.by_ref() {
            if c == '}' {
                found_close = true;
                break;
            }
            var_content.push(c);
        }

        if !found_close {
            result.push_str("${");
            result.push_str(&var_content);
            continue;
        }

        let (name, default) = match var_content.split_once(':') {
            Some((name, default)) => (name, Some(default)),
            None => (var_content.as_str(), None),
        };

        match (lookup(name), default) {
            (Some(value), _) => result.push_str(&value),
            (None, Some(default)) => result.push_str(default),
            (None, None) => {
                warn!(name, "Environment variable not found");
                result.push_str(&format!("${{{}}}", name));
            }
        }
    }

    result
}

/// Applies `<PREFIX>_*` overrides.
fn apply_overrides(
    config: &mut BridgeConfig,
    prefix: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> ConfigResult<()> {
    let var = |suffix: &str| format!("{}_{}", prefix, suffix);

    let name = var("CONNECTION_KIND");
    if let Some(value) = lookup(&name) {
        config.connection.kind = value
            .parse::<ConnectionKind>()
            .map_err(|e| ConfigError::invalid_env_var(&name, e))?;
    }

    let name = var("SERVER_PORT");
    if let Some(value) = lookup(&name) {
        config.server.port = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid_env_var(&name, "expected valid port number"))?;
    }

    let name = var("REGISTER_MAP");
    if let Some(value) = lookup(&name) {
        config.register_map = PathBuf::from(value);
    }

    let name = var("POLL_INTERVAL");
    if let Some(value) = lookup(&name) {
        config.poller.interval = humantime::parse_duration(value.trim())
            .map_err(|e| ConfigError::invalid_env_var(&name, e.to_string()))?;
    }

    Ok(())
}

fn resolve_relative_paths(config: &mut BridgeConfig, base_path: &Path) {
    if config.register_map.is_relative() {
        config.register_map = base_path.join(&config.register_map);
    }
    if config.recorder.path.is_relative() {
        config.recorder.path = base_path.join(&config.recorder.path);
    }
}

/// YAML parsing through the `config` crate.
fn parse_yaml<T: DeserializeOwned>(content: &str) -> ConfigResult<T> {
    let config = config::Config::builder()
        .add_source(config::File::from_str(content, config::FileFormat::Yaml))
        .build()
        .map_err(|e| ConfigError::serialization(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::serialization(e.to_string()))
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Loads configuration from a file with default settings.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<BridgeConfig> {
    ConfigLoader::new().load(path)
}

/// Loads configuration from a YAML string with default settings.
pub fn load_config_str(content: &str) -> ConfigResult<BridgeConfig> {
    ConfigLoader::new().load_from_str(content)
}

/// Loads the register map a configuration points at.
pub fn load_register_table(config: &BridgeConfig) -> ConfigResult<RegisterTable> {
    RegisterMap::load_path(&config.register_map)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::time::Duration;

    use azimuth_core::{RegisterKey, StaleValues};
    use azimuth_modbus::ByteOrder;

    const SAMPLE: &str = r#"
connection:
  kind: tcp
  max_attempts: 3
  retry_delay: 250ms
  byte_order: big_endian
  tcp:
    host: 192.168.1.50
    port: 5020
register_map: maps/registers.csv
poller:
  interval: 200ms
  stale_values: omit
dashboard:
  angle_pri: IREG_110
server:
  port: 8100
recorder:
  kind: memory
"#;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_load_from_str() {
        let config = ConfigLoader::new().with_env_vars(false).load_from_str(SAMPLE).unwrap();

        assert_eq!(config.connection.kind, ConnectionKind::Tcp);
        assert_eq!(config.connection.max_attempts, 3);
        assert_eq!(config.connection.retry_delay, Duration::from_millis(250));
        assert_eq!(config.connection.byte_order, ByteOrder::BigEndian);
        assert_eq!(config.connection.tcp.port, 5020);
        assert_eq!(config.poller.interval, Duration::from_millis(200));
        assert_eq!(config.poller.stale_values, StaleValues::Omit);
        assert_eq!(config.poller.float_precision, 3);
        assert_eq!(config.dashboard.angle_pri, RegisterKey::input(110));
        assert_eq!(config.dashboard.position_pri, RegisterKey::input(100));
        assert_eq!(config.server.port, 8100);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = ConfigLoader::new().with_env_vars(false).load_from_str("").unwrap();
        assert_eq!(config.connection.kind, ConnectionKind::Rtu);
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_placeholders() {
        let vars = lookup(&[("AZ_TEST_HOST", "10.1.1.1")]);
        assert_eq!(
            resolve_placeholders("host: ${AZ_TEST_HOST}", &vars),
            "host: 10.1.1.1"
        );
        assert_eq!(
            resolve_placeholders("port: ${AZ_TEST_PORT:502}", &vars),
            "port: 502"
        );
        assert_eq!(resolve_placeholders("x: ${AZ_MISSING}", &vars), "x: ${AZ_MISSING}");
        assert_eq!(resolve_placeholders("x: ${unclosed", &vars), "x: ${unclosed");
        assert_eq!(resolve_placeholders("cost: $5", &vars), "cost: $5");
    }

    #[test]
    fn test_placeholder_default_in_document() {
        let config = ConfigLoader::new()
            .load_from_str("server:\n  port: ${AZIMUTH_TEST_UNSET_PORT_7781:8123}\n")
            .unwrap();
        assert_eq!(config.server.port, 8123);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = BridgeConfig::default();
        let vars = lookup(&[
            ("AZIMUTH_CONNECTION_KIND", "simulated"),
            ("AZIMUTH_SERVER_PORT", "9001"),
            ("AZIMUTH_REGISTER_MAP", "/srv/map.csv"),
            ("AZIMUTH_POLL_INTERVAL", "1s"),
        ]);
        apply_overrides(&mut config, "AZIMUTH", vars).unwrap();

        assert_eq!(config.connection.kind, ConnectionKind::Simulated);
        assert_eq!(config.server.port, 9001);
        assert_eq!(config.register_map, PathBuf::from("/srv/map.csv"));
        assert_eq!(config.poller.interval, Duration::from_secs(1));

        let err = apply_overrides(&mut config, "AZIMUTH", lookup(&[("AZIMUTH_SERVER_PORT", "x")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { .. }));
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("azimuth.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "register_map: registers.csv").unwrap();

        let config = ConfigLoader::new().with_env_vars(false).load(&path).unwrap();
        assert_eq!(config.register_map, dir.path().join("registers.csv"));
        assert_eq!(config.recorder.path, dir.path().join("runs.jsonl"));
    }

    #[test]
    fn test_invalid_documents() {
        let loader = ConfigLoader::new().with_env_vars(false);
        assert!(loader.load_from_str("poller:\n  interval: 0s\n").is_err());
        assert!(loader.load_from_str("connection:\n  kind: usb\n").is_err());
        assert!(loader.load_from_str("unknown_section: 1\n").is_err());

        let err = loader.load("/nonexistent/azimuth.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }
}
