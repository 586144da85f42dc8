//! # Runtime Configuration Module
//!
//! Listener addresses and coroutine tuning for a panrouter service.
//!
//! ## Layering
//!
//! Later layers override earlier ones:
//!
//! 1. Built-in defaults ([`RuntimeConfig::default`])
//! 2. An optional YAML file ([`RuntimeConfig::from_yaml_file`])
//! 3. Environment variables ([`RuntimeConfig::apply_env`])
//! 4. Command-line flags, applied by the binary
//!
//! ## Environment Variables
//!
//! | Variable | Field | Example |
//! |----------|-------|---------|
//! | `PAN_HTTP_ADDR` | `http_addr` | `0.0.0.0:8080` |
//! | `PAN_WS_ADDR` | `ws_addr` | `0.0.0.0:8081` |
//! | `PAN_STACK_SIZE` | `stack_size` | `0x8000` or `32768` |
//! | `PAN_WS_POLL_MS` | `ws_poll_interval_ms` | `50` |
//!
//! Unparseable values are ignored with a warning and the previous layer's
//! value is kept.
//!
//! ## YAML
//!
//! ```yaml
//! http_addr: 127.0.0.1:8080
//! ws_addr: 127.0.0.1:8081
//! stack_size: 0x8000
//! ws_poll_interval_ms: 25
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::env;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_STACK_SIZE: usize = 0x4000;

/// Runtime configuration for the HTTP and WebSocket listeners.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// HTTP listen address
    pub http_addr: String,
    /// WebSocket listen address
    pub ws_addr: String,
    /// Stack size for coroutines in bytes (default: 16 KB / 0x4000)
    #[serde(deserialize_with = "deserialize_size")]
    pub stack_size: usize,
    /// Read timeout between outbound queue checks on a WebSocket connection
    pub ws_poll_interval_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            http_addr: "127.0.0.1:8080".to_string(),
            ws_addr: "127.0.0.1:8081".to_string(),
            stack_size: DEFAULT_STACK_SIZE,
            ws_poll_interval_ms: 50,
        }
    }
}

/// Parse a byte size written in decimal or `0x` hexadecimal.
#[must_use]
pub fn parse_size(value: &str) -> Option<usize> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

fn deserialize_size<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Number(usize),
        Text(String),
    }

    match Size::deserialize(deserializer)? {
        Size::Number(n) => Ok(n),
        Size::Text(s) => parse_size(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid size '{s}'"))),
    }
}

impl RuntimeConfig {
    /// Defaults overridden by the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Read a YAML file; fields it omits keep their defaults.
    ///
    /// # Errors
    ///
    /// The file cannot be read or is not a valid configuration.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Defaults, then `path` if given, then the environment.
    ///
    /// # Errors
    ///
    /// See [`RuntimeConfig::from_yaml_file`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        self.apply_vars(|key| env::var(key).ok());
    }

    /// Apply `PAN_*` overrides from `lookup`.
    pub fn apply_vars<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("PAN_HTTP_ADDR") {
            self.http_addr = addr;
        }
        if let Some(addr) = lookup("PAN_WS_ADDR") {
            self.ws_addr = addr;
        }
        if let Some(raw) = lookup("PAN_STACK_SIZE") {
            match parse_size(&raw) {
                Some(size) => self.stack_size = size,
                None => warn!(value = %raw, "Ignoring invalid PAN_STACK_SIZE"),
            }
        }
        if let Some(raw) = lookup("PAN_WS_POLL_MS") {
            match raw.trim().parse() {
                Ok(ms) => self.ws_poll_interval_ms = ms,
                Err(_) => warn!(value = %raw, "Ignoring invalid PAN_WS_POLL_MS"),
            }
        }
    }

    #[must_use]
    pub fn ws_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ws_poll_interval_ms.max(1))
    }

    /// Configure the `may` runtime. Call before starting any server.
    pub fn apply(&self) {
        may::config().set_stack_size(self.stack_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("0x8000"), Some(0x8000));
        assert_eq!(parse_size("32768"), Some(32768));
        assert_eq!(parse_size(" 0X10 "), Some(16));
        assert_eq!(parse_size("lots"), None);
    }

    #[test]
    fn test_env_overrides_defaults() {
        let mut config = RuntimeConfig::default();
        config.apply_vars(vars(&[
            ("PAN_HTTP_ADDR", "0.0.0.0:9000"),
            ("PAN_STACK_SIZE", "0x8000"),
            ("PAN_WS_POLL_MS", "10"),
        ]));
        assert_eq!(config.http_addr, "0.0.0.0:9000");
        assert_eq!(config.ws_addr, "127.0.0.1:8081");
        assert_eq!(config.stack_size, 0x8000);
        assert_eq!(config.ws_poll_interval(), Duration::from_millis(10));
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let mut config = RuntimeConfig::default();
        config.apply_vars(vars(&[("PAN_STACK_SIZE", "huge"), ("PAN_WS_POLL_MS", "-1")]));
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn test_yaml_file_with_hex_stack_size() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ws_addr: 0.0.0.0:7000\nstack_size: \"0x10000\"").unwrap();
        let config = RuntimeConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.ws_addr, "0.0.0.0:7000");
        assert_eq!(config.stack_size, 0x10000);
        assert_eq!(config.http_addr, RuntimeConfig::default().http_addr);
    }

    #[test]
    fn test_yaml_rejects_unknown_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "http_port: 8080").unwrap();
        assert!(RuntimeConfig::from_yaml_file(file.path()).is_err());
    }
}
