// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Receiver configuration
//!
//! Loaded from YAML, then overridden by command-line flags:
//!
//! ```yaml
//! data_dir: /var/lib/portlog
//! port: 8001
//! short_capacity: 10
//! long_capacity: 1000
//! sentinels: [-100, -100000, -400000]
//! schema_policy: trust
//! ```

use crate::ingest::TierCapacities;
use crate::sanitize::{Sanitizer, DEFAULT_SENTINELS};
use crate::store::{SchemaPolicy, Tier};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Receiver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the per-port CSV files
    pub data_dir: PathBuf,

    /// Bind address
    pub bind: String,

    /// HTTP port
    pub port: u16,

    /// Rows kept in the short tier
    pub short_capacity: usize,

    /// Rows kept in the long tier
    pub long_capacity: usize,

    /// Raw values stored as missing
    pub sentinels: Vec<f64>,

    /// Behavior when a port changes its channel layout
    pub schema_policy: SchemaPolicy,

    /// Delete the data directory contents at startup
    pub reset_on_start: bool,

    /// Per-request timeout in seconds (0 = none)
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("received_data"),
            bind: "0.0.0.0".to_string(),
            port: 8001,
            short_capacity: Tier::Short.default_capacity(),
            long_capacity: Tier::Long.default_capacity(),
            sentinels: DEFAULT_SENTINELS.to_vec(),
            schema_policy: SchemaPolicy::Trust,
            reset_on_start: false,
            request_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Parse configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Check values that would make the receiver unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.short_capacity == 0 || self.long_capacity == 0 {
            return Err(ConfigError::Invalid(
                "tier capacities must be positive".to_string(),
            ));
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("data_dir is empty".to_string()));
        }
        if self.sentinels.iter().any(|s| s.is_nan()) {
            return Err(ConfigError::Invalid("sentinels must be numbers".to_string()));
        }
        Ok(())
    }

    pub fn capacities(&self) -> TierCapacities {
        TierCapacities {
            short: self.short_capacity,
            long: self.long_capacity,
        }
    }

    pub fn sanitizer(&self) -> Sanitizer {
        Sanitizer::new(self.sentinels.iter().copied())
    }

    /// `bind:port`
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

/// Config builder for fluent API
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    data_dir: Option<PathBuf>,
    bind: Option<String>,
    port: Option<u16>,
    short_capacity: Option<usize>,
    long_capacity: Option<usize>,
    sentinels: Option<Vec<f64>>,
    schema_policy: Option<SchemaPolicy>,
    reset_on_start: Option<bool>,
    request_timeout_secs: Option<u64>,
}

impl ConfigBuilder {
    /// Start from an existing configuration (e.g. one loaded from YAML)
    pub fn from_config(config: Config) -> Self {
        Self {
            data_dir: Some(config.data_dir),
            bind: Some(config.bind),
            port: Some(config.port),
            short_capacity: Some(config.short_capacity),
            long_capacity: Some(config.long_capacity),
            sentinels: Some(config.sentinels),
            schema_policy: Some(config.schema_policy),
            reset_on_start: Some(config.reset_on_start),
            request_timeout_secs: Some(config.request_timeout_secs),
        }
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn bind(mut self, bind: impl Into<String>) -> Self {
        self.bind = Some(bind.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn short_capacity(mut self, rows: usize) -> Self {
        self.short_capacity = Some(rows);
        self
    }

    pub fn long_capacity(mut self, rows: usize) -> Self {
        self.long_capacity = Some(rows);
        self
    }

    pub fn sentinels(mut self, sentinels: Vec<f64>) -> Self {
        self.sentinels = Some(sentinels);
        self
    }

    pub fn schema_policy(mut self, policy: SchemaPolicy) -> Self {
        self.schema_policy = Some(policy);
        self
    }

    pub fn reset_on_start(mut self, reset: bool) -> Self {
        self.reset_on_start = Some(reset);
        self
    }

    /// Per-request timeout in seconds (0 = none)
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = Some(secs);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Config {
        let defaults = Config::default();

        Config {
            data_dir: self.data_dir.unwrap_or(defaults.data_dir),
            bind: self.bind.unwrap_or(defaults.bind),
            port: self.port.unwrap_or(defaults.port),
            short_capacity: self.short_capacity.unwrap_or(defaults.short_capacity),
            long_capacity: self.long_capacity.unwrap_or(defaults.long_capacity),
            sentinels: self.sentinels.unwrap_or(defaults.sentinels),
            schema_policy: self.schema_policy.unwrap_or(defaults.schema_policy),
            reset_on_start: self.reset_on_start.unwrap_or(defaults.reset_on_start),
            request_timeout_secs: self
                .request_timeout_secs
                .unwrap_or(defaults.request_timeout_secs),
        }
    }
}
