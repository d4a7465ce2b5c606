//! Sensor data types.
//!
//! This module defines the data structures shared between the registry and
//! sensor drivers:
//! - `SensorKind` - Physical channel capability set of a unit
//! - `Sample` - One three-axis readout
//! - `UnitStatus` - Readback of the reserved status attribute
//! - Polling interval constants

use serde::{Deserialize, Serialize};

/// Polling interval applied to a freshly registered unit [ms].
pub const DEFAULT_INTERVAL_MS: u32 = 100;

/// Floor applied to every interval write [ms].
pub const MIN_INTERVAL_MS: u32 = 50;

/// Physical channel capability set advertised by a unit.
///
/// Purely descriptive to the registry; it selects what a consumer-facing
/// channel reports the unit as, nothing in the lifecycle engine branches
/// on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SensorKind {
    /// Three-axis acceleration.
    Accelerometer,
    /// Three-axis angular rate.
    Gyroscope,
    /// Ambient light level (x axis only).
    AmbientLight,
    /// Proximity distance (x axis only).
    Proximity,
}

impl SensorKind {
    /// Lowercase identifier used in configuration and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accelerometer => "accelerometer",
            Self::Gyroscope => "gyroscope",
            Self::AmbientLight => "ambient-light",
            Self::Proximity => "proximity",
        }
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One three-axis readout.
///
/// Single-axis kinds (ambient light, proximity) report on `x` and leave
/// the other axes at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Sample {
    /// Create a sample from three axis values.
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// Readback of the per-unit status attribute.
///
/// The status attribute is reserved; no semantics are defined for it, so
/// reads always yield `Unknown`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum UnitStatus {
    /// No status semantics defined.
    #[default]
    Unknown,
}
