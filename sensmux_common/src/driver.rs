//! Sensor driver trait and error types.
//!
//! This module defines:
//! - `SensorDriver` trait - Callback contract supplied at registration
//! - `PowerFault` - Failure reported by a power callback
//! - `SensorError` enum - Error taxonomy of the registry
//! - `DriverFactory` type alias - Factory function type

use crate::types::Sample;
use thiserror::Error;

/// Failure reported by a `power_on`/`power_off` callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct PowerFault(pub String);

/// Error types for registry operations.
#[derive(Debug, Clone, Error)]
pub enum SensorError {
    /// A unit with the same name is already registered.
    #[error("sensor '{0}' is already registered")]
    DuplicateId(String),

    /// Deregistration attempted while the unit has outstanding opens.
    #[error("sensor '{0}' is busy ({1} outstanding opens)")]
    Busy(String, u32),

    /// Operation addressed a unit that is not registered.
    #[error("unknown sensor '{0}'")]
    UnknownId(String),

    /// A power callback failed; refcount and enable state were rolled back.
    #[error("power callback failed for '{unit}': {fault}")]
    PowerFault { unit: String, fault: PowerFault },

    /// A sample worker thread could not be spawned or joined.
    #[error("worker error for '{unit}': {reason}")]
    Worker { unit: String, reason: String },

    /// The exclusion domain is held elsewhere (suspend/resume only).
    #[error("sensor registry is busy")]
    Contended,

    /// No driver backend with the requested name exists.
    #[error("no driver backend named '{0}'")]
    DriverNotFound(String),
}

/// Factory function type for creating driver instances.
pub type DriverFactory = fn(crate::types::SensorKind) -> Box<dyn SensorDriver>;

/// Callback contract a collaborator supplies when registering a unit.
///
/// The registry owns the boxed driver for the lifetime of the unit and is
/// the only caller of these methods. All calls are made under the
/// registry's exclusion domain, serialized against open/close and
/// attribute writes.
///
/// # Lifecycle
///
/// 1. `power_on()` - exactly at each powered 0→1 edge
/// 2. `sample()` - periodically from the unit's worker while powered
/// 3. `power_off()` - exactly at each powered 1→0 edge, after the worker
///    has fully stopped
/// 4. `on_unregister()` - once per worker shutdown, on the worker thread,
///    after its final loop iteration
///
/// `power_on` and `power_off` are called strictly alternately, starting
/// with `power_on`. Idempotence is not assumed; the registry guarantees
/// the alternation instead.
pub trait SensorDriver: Send {
    /// Produce one reading, or `None` if no data is available this tick.
    ///
    /// Must not block indefinitely; the worker calls this while holding
    /// the exclusion domain.
    fn sample(&mut self) -> Option<Sample>;

    /// Bring the physical unit out of its low-power state.
    ///
    /// # Errors
    /// Return a [`PowerFault`] if the hardware could not be powered; the
    /// registry treats the unit as still off.
    fn power_on(&mut self) -> Result<(), PowerFault>;

    /// Return the physical unit to its low-power state.
    ///
    /// # Errors
    /// Return a [`PowerFault`] if the hardware could not be powered down;
    /// the registry treats the unit as still on.
    fn power_off(&mut self) -> Result<(), PowerFault>;

    /// Worker teardown hook. Called on the worker thread after its final
    /// loop iteration, before the caller observes the worker as stopped.
    fn on_unregister(&mut self) {}
}
