//! Power sequencing at refcount edges.
//!
//! The registry calls [`power_on`] exactly at each powered 0→1 edge and
//! [`power_off`] exactly at each 1→0 edge, after the unit's worker has
//! fully stopped. The alternation guarantee lives here: each function
//! asserts the pre-state and only flips the `powered` flag when the
//! driver callback succeeded, so a failed power-on leaves the unit "still
//! off" and a failed power-off "still on".

use crate::unit::SensorUnit;
use sensmux_common::driver::SensorError;
use tracing::info;

/// Invoke the unit's power-on callback and mark it powered.
///
/// # Errors
/// Returns [`SensorError::PowerFault`] and leaves the unit off if the
/// callback fails.
pub(crate) fn power_on(unit: &mut SensorUnit) -> Result<(), SensorError> {
    debug_assert!(!unit.powered, "power_on on an already-powered unit");
    unit.driver.power_on().map_err(|fault| SensorError::PowerFault {
        unit: unit.id.clone(),
        fault,
    })?;
    unit.powered = true;
    info!(unit = %unit.id, kind = %unit.kind, "powered on");
    Ok(())
}

/// Invoke the unit's power-off callback and mark it unpowered.
///
/// # Errors
/// Returns [`SensorError::PowerFault`] and leaves the unit on if the
/// callback fails.
pub(crate) fn power_off(unit: &mut SensorUnit) -> Result<(), SensorError> {
    debug_assert!(unit.powered, "power_off on an already-unpowered unit");
    unit.driver.power_off().map_err(|fault| SensorError::PowerFault {
        unit: unit.id.clone(),
        fault,
    })?;
    unit.powered = false;
    info!(unit = %unit.id, kind = %unit.kind, "powered off");
    Ok(())
}
