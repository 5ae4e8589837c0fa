//! Daemon configuration.
//!
//! Loaded from an optional JSON file; every field has a default so an empty
//! or absent file yields a working configuration. A few settings can also be
//! overridden from the environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable overriding the tracing group name.
pub const TRACING_GROUP_ENV: &str = "SPOOR_TRACING_GROUP";

/// Top-level daemon configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DaemonConfig {
    /// Group granted access to the daemon sockets when running as root.
    #[serde(default = "default_tracing_group")]
    pub tracing_group: String,
    /// Consumer communication settings.
    #[serde(default)]
    pub consumer: ConsumerConfig,
    /// Relay connection settings.
    #[serde(default)]
    pub relay: RelayConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            tracing_group: default_tracing_group(),
            consumer: ConsumerConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

fn default_tracing_group() -> String {
    "tracing".to_string()
}

/// Consumer socket settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsumerConfig {
    /// Per-exchange timeout on the consumer command socket (seconds).
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

fn default_command_timeout_secs() -> u64 {
    30
}

/// Relay daemon connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayConfig {
    /// TCP connect timeout towards the relay daemon (seconds).
    #[serde(default = "default_relay_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_relay_connect_timeout_secs(),
        }
    }
}

fn default_relay_connect_timeout_secs() -> u64 {
    10
}

impl DaemonConfig {
    /// Loads the configuration from `path`, or the defaults when `path` is
    /// `None`. Environment overrides are applied on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config file: {}", p.display()))?;
                serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {}", p.display()))?
            }
            None => DaemonConfig::default(),
        };
        if let Ok(group) = std::env::var(TRACING_GROUP_ENV) {
            config.tracing_group = group;
        }
        Ok(config)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
