//! Sensmux Common Library
//!
//! This crate provides the shared types and contracts used by the sensmux
//! workspace crates.
//!
//! # Module Structure
//!
//! - [`types`] - Sensor kinds, samples and polling constants
//! - [`driver`] - The `SensorDriver` callback contract and error types
//! - [`config`] - Configuration loading traits and types
//!
//! # Usage
//!
//! ```rust
//! use sensmux_common::types::{Sample, SensorKind, DEFAULT_INTERVAL_MS};
//! use sensmux_common::driver::{SensorDriver, SensorError};
//! ```

pub mod config;
pub mod driver;
pub mod types;
