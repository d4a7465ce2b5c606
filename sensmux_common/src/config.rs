//! Configuration loading traits and types.
//!
//! This module provides TOML configuration loading for the sensmux daemon.
//!
//! # TOML Example
//!
//! ```toml
//! channel = "aggregate"
//! admin_listen = "127.0.0.1:7070"
//!
//! [shared]
//! log_level = "debug"
//! service_name = "sensmux-hub-01"
//!
//! [[sensor]]
//! name = "accel"
//! kind = "accelerometer"
//! interval_ms = 100
//! driver = "simulation"
//! ```

use crate::types::{DEFAULT_INTERVAL_MS, SensorKind};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

/// Common configuration fields shared across sensmux applications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// How consumers address the reporting channel.
///
/// A runtime choice; both shapes share the same lifecycle engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelMode {
    /// One logical channel per unit; consumers open units individually.
    #[default]
    PerUnit,
    /// All units behind one shared channel; consumers open the aggregate.
    Aggregate,
}

/// One `[[sensor]]` table: a unit to register at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Unique unit name, the registry lookup key.
    pub name: String,

    /// Physical channel capability set.
    pub kind: SensorKind,

    /// Initial polling interval [ms]. Floor-clamped at runtime.
    #[serde(default = "default_interval")]
    pub interval_ms: u32,

    /// Driver backend name (e.g. "simulation").
    #[serde(default = "default_driver")]
    pub driver: String,
}

fn default_interval() -> u32 {
    DEFAULT_INTERVAL_MS
}

fn default_driver() -> String {
    "simulation".to_string()
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Shared service fields.
    pub shared: SharedConfig,

    /// Aggregate vs per-unit open semantics.
    #[serde(default)]
    pub channel: ChannelMode,

    /// TCP listen address of the administrative text endpoint.
    /// Disabled when absent.
    #[serde(default)]
    pub admin_listen: Option<String>,

    /// Units to register at startup.
    #[serde(default, rename = "sensor")]
    pub sensors: Vec<SensorConfig>,
}

impl HubConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if:
    /// - `shared` fails validation
    /// - a sensor name is empty or duplicated
    /// - a sensor interval is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        let mut names = std::collections::HashSet::new();
        for sensor in &self.sensors {
            if sensor.name.is_empty() {
                return Err(ConfigError::ValidationError(
                    "sensor name cannot be empty".to_string(),
                ));
            }
            if !names.insert(&sensor.name) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate sensor name: {}",
                    sensor.name
                )));
            }
            if sensor.interval_ms == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "sensor {} has zero interval",
                    sensor.name
                )));
            }
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
