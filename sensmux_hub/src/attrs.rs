//! Per-unit attribute surface.
//!
//! Read/write endpoints exposed for each unit: enable state, polling
//! interval, wake request and last-sample readout. Every write is
//! serialized through the registry's exclusion domain; the last-sample
//! read takes the domain only to find the unit, never to synchronize
//! with the worker writing the cell.
//!
//! The enable attribute is an independent toggle layered on top of
//! refcounted open/close: a unit is powered iff `open_count > 0` OR the
//! toggle is set, and edges of that merged condition drive the power
//! sequencing.

use crate::hub::{Report, SensorHub};
use crate::worker::WorkerSignal;
use sensmux_common::driver::SensorError;
use sensmux_common::types::{MIN_INTERVAL_MS, Sample, UnitStatus};
use tracing::debug;

impl SensorHub {
    /// Read the enable (powered) state of a unit.
    ///
    /// # Errors
    /// [`SensorError::UnknownId`] if no such unit exists.
    pub fn read_enabled(&self, id: &str) -> Result<bool, SensorError> {
        let guard = self.state.lock();
        guard
            .units
            .get(id)
            .map(|u| u.powered)
            .ok_or_else(|| SensorError::UnknownId(id.to_string()))
    }

    /// Set or clear the manual enable toggle.
    ///
    /// Writing `true` on an already-enabled unit is a no-op. Writing
    /// `true` on a disabled unit performs the same power-on and
    /// worker-start sequence as an open edge, without touching
    /// `open_count`. Writing `false` powers the unit down only if no
    /// opens are outstanding.
    ///
    /// # Errors
    /// [`SensorError::UnknownId`], [`SensorError::PowerFault`] or
    /// [`SensorError::Worker`]; on error the toggle is rolled back.
    pub fn write_enabled(&self, id: &str, on: bool) -> Result<(), SensorError> {
        let mut guard = self.state.lock();
        let suspended = guard.suspended;
        if on {
            let unit = guard
                .units
                .get_mut(id)
                .ok_or_else(|| SensorError::UnknownId(id.to_string()))?;
            if unit.manual_enable {
                return Ok(());
            }
            unit.manual_enable = true;
            if !unit.powered {
                if suspended {
                    unit.suspended = true;
                } else if let Err(e) = self.power_up(unit) {
                    unit.manual_enable = false;
                    return Err(e);
                }
            }
            Ok(())
        } else {
            {
                let unit = guard
                    .units
                    .get_mut(id)
                    .ok_or_else(|| SensorError::UnknownId(id.to_string()))?;
                if !unit.manual_enable {
                    return Ok(());
                }
                unit.manual_enable = false;
                if unit.should_power() {
                    // Refcount still holds the unit open.
                    return Ok(());
                }
            }
            match self.power_down(&mut guard, id) {
                Ok(()) => Ok(()),
                Err(e) => {
                    if let Some(unit) = guard.units.get_mut(id) {
                        unit.manual_enable = true;
                    }
                    Err(e)
                }
            }
        }
    }

    /// Read the current polling interval [ms].
    ///
    /// # Errors
    /// [`SensorError::UnknownId`] if no such unit exists.
    pub fn read_interval(&self, id: &str) -> Result<u32, SensorError> {
        let guard = self.state.lock();
        guard
            .units
            .get(id)
            .map(|u| u.interval_ms)
            .ok_or_else(|| SensorError::UnknownId(id.to_string()))
    }

    /// Set the polling interval, floor-clamped to 50 ms.
    ///
    /// A running worker is always signaled; the new interval takes
    /// effect on its next wait cycle without interrupting a sample in
    /// progress.
    ///
    /// # Errors
    /// [`SensorError::UnknownId`] if no such unit exists.
    pub fn write_interval(&self, id: &str, ms: u32) -> Result<(), SensorError> {
        let clamped = ms.max(MIN_INTERVAL_MS);
        let mut guard = self.state.lock();
        let unit = guard
            .units
            .get_mut(id)
            .ok_or_else(|| SensorError::UnknownId(id.to_string()))?;
        unit.interval_ms = clamped;
        if let Some(w) = &unit.worker {
            let _ = w.signal.send(WorkerSignal::Interval(clamped));
        }
        debug!(unit = id, interval_ms = clamped, "interval set");
        Ok(())
    }

    /// Forward a fire-and-forget wake request to the reporting channel.
    ///
    /// Does not touch the unit's state.
    ///
    /// # Errors
    /// [`SensorError::UnknownId`] if no such unit exists.
    pub fn write_wake(&self, id: &str) -> Result<(), SensorError> {
        let guard = self.state.lock();
        if !guard.units.contains_key(id) {
            return Err(SensorError::UnknownId(id.to_string()));
        }
        drop(guard);
        let _ = self.reports.send(Report::Wake {
            unit: id.to_string(),
        });
        Ok(())
    }

    /// Read the cached last sample. Never blocks on the worker; a torn
    /// read across axes is acceptable.
    ///
    /// # Errors
    /// [`SensorError::UnknownId`] if no such unit exists.
    pub fn read_last_sample(&self, id: &str) -> Result<Sample, SensorError> {
        let guard = self.state.lock();
        let cell = guard
            .units
            .get(id)
            .map(|u| std::sync::Arc::clone(&u.last))
            .ok_or_else(|| SensorError::UnknownId(id.to_string()))?;
        drop(guard);
        Ok(cell.load())
    }

    /// Read the reserved status attribute. Always `Unknown`.
    ///
    /// # Errors
    /// [`SensorError::UnknownId`] if no such unit exists.
    pub fn read_status(&self, id: &str) -> Result<UnitStatus, SensorError> {
        let guard = self.state.lock();
        if !guard.units.contains_key(id) {
            return Err(SensorError::UnknownId(id.to_string()));
        }
        Ok(UnitStatus::Unknown)
    }
}
