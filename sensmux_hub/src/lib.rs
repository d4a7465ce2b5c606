//! Sensmux Hub - sensor registry and lifecycle engine.
//!
//! Multiplexes several independent physical sensing units behind a shared
//! logical reporting channel, coordinating power state, sampling cadence
//! and background polling per unit while tracking how many consumers hold
//! each unit open.
//!
//! # Architecture
//!
//! - [`hub::SensorHub`] - the registry; owns every unit and the single
//!   exclusion domain serializing all state mutation
//! - [`worker`] - one background polling thread per powered unit
//! - [`power`] - power-on/off sequencing at refcount edges
//! - [`attrs`] - per-unit attribute surface (enable, interval, wake, data)
//! - [`admin`] - line-oriented administrative text endpoint
//! - [`drivers`] - built-in driver backends (simulation)
//!
//! A consumer opens either a specific unit or the aggregate channel. On
//! the powered 0→1 edge the unit's driver is powered on and a sample
//! worker is spawned; attribute writes signal the running worker; on the
//! last close the worker is signaled, joined, and the driver powered off.

pub mod admin;
pub mod attrs;
pub mod drivers;
pub mod hub;
pub mod power;
pub mod unit;
pub mod worker;

pub use hub::{OpenTarget, Report, SensorHub};
pub use sensmux_common::driver::{DriverFactory, PowerFault, SensorDriver, SensorError};
pub use sensmux_common::types::{
    DEFAULT_INTERVAL_MS, MIN_INTERVAL_MS, Sample, SensorKind, UnitStatus,
};
