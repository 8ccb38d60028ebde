//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - correlate.toml (default configuration)
//! - correlate.local.toml (git-ignored local overrides)
//! - Environment variables (CORRELATE_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # correlate.toml
//! rules = ["rules/k8s.yaml", "rules/logs.yaml"]
//!
//! [[stores]]
//! domain = "metric"
//! metric = "https://prometheus.example:9090"
//!
//! [search]
//! fan_out = 8
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! CORRELATE_SEARCH__FAN_OUT=4
//! CORRELATE_LOGGING__LEVEL=debug
//! ```

use crate::engine::EngineBuilder;
use crate::error::Result;
use crate::model::StoreConfig;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Rule files (YAML or JSON) to load into the engine
    #[serde(default)]
    pub rules: Vec<PathBuf>,

    /// Store configuration entries, one per backend
    #[serde(default)]
    pub stores: Vec<StoreConfig>,

    /// Correlation search settings
    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Correlation search settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Parallel store queries allowed within one rule line
    #[serde(default = "default_fan_out")]
    pub fan_out: usize,
}

/// Logging configuration. The library only emits `tracing` events;
/// installing a subscriber honoring these settings is the application's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_fan_out() -> usize {
    8
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. correlate.toml (base configuration)
    /// 2. correlate.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (CORRELATE_* prefix)
    pub fn load() -> std::result::Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("correlate.toml"))
            .merge(Toml::file("correlate.local.toml"))
            .merge(Env::prefixed("CORRELATE_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &str) -> std::result::Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("CORRELATE_").split("__"))
            .extract()
    }

    /// Apply stores, rule files and search settings to an engine builder.
    /// Domains must already be registered on the builder.
    pub fn apply(&self, mut builder: EngineBuilder) -> Result<EngineBuilder> {
        for store in &self.stores {
            builder = builder.store(store.clone())?;
        }
        for file in &self.rules {
            builder = builder.rule_file(file)?;
        }
        Ok(builder.fan_out(self.search.fan_out))
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            fan_out: default_fan_out(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
