//! The sensor registry.
//!
//! `SensorHub` owns the set of registered units and the single exclusion
//! domain serializing register/deregister/open/close and attribute writes
//! against each other and against the sample workers. Workers never block
//! on the domain (they `try_lock` and skip a tick), so critical sections
//! here stay short: state mutation and driver power callbacks, no I/O.
//!
//! # Edges
//!
//! A unit is powered iff `open_count > 0` or its manual enable toggle is
//! set. Crossing into that condition powers the driver on and spawns a
//! worker; leaving it signals the worker, joins it, then powers off.
//! Power faults roll the triggering bookkeeping back so refcount and
//! hardware state never disagree.

use crate::power;
use crate::unit::SensorUnit;
use crate::worker::{self, WorkerContext, WorkerHandle, WorkerSignal};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, MutexGuard};
use sensmux_common::driver::{SensorDriver, SensorError};
use sensmux_common::types::{Sample, SensorKind};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// An event delivered to the consumer of the shared reporting channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    /// A readout produced by a sample worker.
    Sample { unit: String, sample: Sample },
    /// A fire-and-forget wake request from the attribute surface.
    Wake { unit: String },
}

/// What a consumer opens: one specific unit, or all of them behind the
/// aggregate channel.
#[derive(Debug, Clone, Copy)]
pub enum OpenTarget<'a> {
    /// A specific unit by name.
    Unit(&'a str),
    /// The aggregate logical channel.
    Aggregate,
}

/// Shared mutable state behind the exclusion domain.
pub(crate) struct HubState {
    pub(crate) units: HashMap<String, SensorUnit>,
    /// Outstanding opens against the aggregate channel.
    pub(crate) aggregate_open: u32,
    /// Set while the hub is suspended; power edges are deferred.
    pub(crate) suspended: bool,
}

/// The sensor registry and lifecycle engine.
pub struct SensorHub {
    pub(crate) state: Arc<Mutex<HubState>>,
    pub(crate) reports: Sender<Report>,
}

impl SensorHub {
    /// Create an empty hub and the receiver half of its reporting channel.
    pub fn new() -> (Self, Receiver<Report>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let hub = Self {
            state: Arc::new(Mutex::new(HubState {
                units: HashMap::new(),
                aggregate_open: 0,
                suspended: false,
            })),
            reports: tx,
        };
        (hub, rx)
    }

    // ─── Registration ───────────────────────────────────────────────

    /// Register a new unit under `name` with its driver callbacks.
    ///
    /// The unit starts unpowered with the default interval, unless an
    /// aggregate-mode consumer is already active, in which case it is
    /// powered on immediately to match the open aggregate session.
    ///
    /// # Errors
    /// - [`SensorError::DuplicateId`] if `name` is taken; no state change.
    /// - [`SensorError::PowerFault`] / [`SensorError::Worker`] if joining
    ///   an open aggregate session fails; the unit is not registered.
    pub fn register(
        &self,
        name: &str,
        kind: SensorKind,
        driver: Box<dyn SensorDriver>,
    ) -> Result<(), SensorError> {
        let mut guard = self.state.lock();
        if guard.units.contains_key(name) {
            return Err(SensorError::DuplicateId(name.to_string()));
        }

        let mut unit = SensorUnit::new(name.to_string(), kind, driver);
        if guard.aggregate_open > 0 {
            // Join the already-open aggregate session.
            unit.open_count = 1;
            if guard.suspended {
                unit.suspended = true;
            } else {
                self.power_up(&mut unit)?;
            }
        }

        info!(unit = name, kind = %kind, "registered sensor unit");
        guard.units.insert(name.to_string(), unit);
        Ok(())
    }

    /// Remove a unit. Fails while the unit has outstanding opens.
    ///
    /// A manually-enabled unit is stopped and powered off first (the
    /// toggle does not block removal, only opens do); its worker runs
    /// the `on_unregister` callback before the unit is freed.
    ///
    /// # Errors
    /// - [`SensorError::UnknownId`] if no such unit exists.
    /// - [`SensorError::Busy`] while `open_count > 0`; the unit remains
    ///   registered and fully functional.
    /// - [`SensorError::PowerFault`] if powering off failed; the unit
    ///   remains registered and on.
    pub fn deregister(&self, name: &str) -> Result<(), SensorError> {
        let mut guard = self.state.lock();
        let was_manual;
        {
            let unit = guard
                .units
                .get_mut(name)
                .ok_or_else(|| SensorError::UnknownId(name.to_string()))?;
            if unit.open_count > 0 {
                return Err(SensorError::Busy(name.to_string(), unit.open_count));
            }
            was_manual = unit.manual_enable;
            unit.manual_enable = false;
        }

        if let Err(e) = self.power_down(&mut guard, name) {
            if was_manual {
                if let Some(unit) = guard.units.get_mut(name) {
                    unit.manual_enable = true;
                }
            }
            return Err(e);
        }

        // The domain was released while joining the worker; a consumer
        // may have re-opened the unit in that window.
        if let Some(unit) = guard.units.get_mut(name) {
            if unit.open_count > 0 {
                if was_manual {
                    unit.manual_enable = true;
                }
                return Err(SensorError::Busy(name.to_string(), unit.open_count));
            }
        }
        guard.units.remove(name);
        info!(unit = name, "deregistered sensor unit");
        Ok(())
    }

    // ─── Open / close ───────────────────────────────────────────────

    /// Open a unit or the aggregate channel.
    ///
    /// On the powered 0→1 edge the driver is powered on and a sample
    /// worker spawned. Aggregate open on its 0→1 edge does this for every
    /// registered unit, contributing one open to each.
    ///
    /// # Errors
    /// [`SensorError::UnknownId`], [`SensorError::PowerFault`] or
    /// [`SensorError::Worker`]; on error the refcounts are rolled back to
    /// their pre-call values.
    pub fn open(&self, target: OpenTarget<'_>) -> Result<(), SensorError> {
        match target {
            OpenTarget::Unit(id) => {
                let mut guard = self.state.lock();
                let suspended = guard.suspended;
                let unit = guard
                    .units
                    .get_mut(id)
                    .ok_or_else(|| SensorError::UnknownId(id.to_string()))?;
                unit.open_count += 1;
                if unit.open_count == 1 && !unit.powered {
                    if suspended {
                        unit.suspended = true;
                    } else if let Err(e) = self.power_up(unit) {
                        unit.open_count -= 1;
                        return Err(e);
                    }
                }
                Ok(())
            }
            OpenTarget::Aggregate => self.open_aggregate(),
        }
    }

    /// Close a unit or the aggregate channel.
    ///
    /// On the powered 1→0 edge the worker is signaled, joined, and the
    /// driver powered off; the call returns only after the worker has
    /// fully stopped.
    ///
    /// # Errors
    /// [`SensorError::UnknownId`] or [`SensorError::PowerFault`]; a
    /// power-off fault leaves the unit on with its refcount restored. On
    /// an aggregate close the whole edge is rolled back: units already
    /// closed are reopened and the session stays open.
    pub fn close(&self, target: OpenTarget<'_>) -> Result<(), SensorError> {
        match target {
            OpenTarget::Unit(id) => {
                let mut guard = self.state.lock();
                self.close_unit(&mut guard, id)
            }
            OpenTarget::Aggregate => self.close_aggregate(),
        }
    }

    fn open_aggregate(&self) -> Result<(), SensorError> {
        let mut guard = self.state.lock();
        guard.aggregate_open += 1;
        if guard.aggregate_open > 1 {
            return Ok(());
        }

        let suspended = guard.suspended;
        let ids: Vec<String> = guard.units.keys().cloned().collect();
        let mut opened: Vec<String> = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.open_unit(&mut guard, id, suspended) {
                Ok(()) => opened.push(id.clone()),
                Err(e) => {
                    // Roll the aggregate edge back: close what we opened.
                    for prev in opened.iter().rev() {
                        if let Err(re) = self.close_unit(&mut guard, prev) {
                            warn!(unit = %prev, error = %re, "aggregate open rollback failed");
                        }
                    }
                    guard.aggregate_open -= 1;
                    return Err(e);
                }
            }
        }
        info!(units = ids.len(), "aggregate channel opened");
        Ok(())
    }

    fn close_aggregate(&self) -> Result<(), SensorError> {
        let mut guard = self.state.lock();
        if guard.aggregate_open == 0 {
            warn!("aggregate close without matching open");
            return Ok(());
        }
        guard.aggregate_open -= 1;
        if guard.aggregate_open > 0 {
            return Ok(());
        }

        let suspended = guard.suspended;
        let ids: Vec<String> = guard.units.keys().cloned().collect();
        let mut closed: Vec<String> = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.close_unit(&mut guard, id) {
                Ok(()) => closed.push(id.clone()),
                Err(e) => {
                    warn!(unit = %id, error = %e, "aggregate close: unit close failed");
                    // Roll the aggregate edge back: reopen what we
                    // closed, so the session stays open and every unit
                    // keeps its pre-call refcount.
                    for prev in closed.iter().rev() {
                        if let Err(re) = self.open_unit(&mut guard, prev, suspended) {
                            warn!(unit = %prev, error = %re, "aggregate close rollback failed");
                        }
                    }
                    guard.aggregate_open += 1;
                    return Err(e);
                }
            }
        }
        info!(units = ids.len(), "aggregate channel closed");
        Ok(())
    }

    /// Increment one unit's refcount and power it up on the 0→1 edge.
    /// A missing unit is skipped, matching the aggregate iteration.
    fn open_unit(
        &self,
        guard: &mut MutexGuard<'_, HubState>,
        id: &str,
        suspended: bool,
    ) -> Result<(), SensorError> {
        let Some(unit) = guard.units.get_mut(id) else {
            return Ok(());
        };
        unit.open_count += 1;
        if unit.open_count == 1 && !unit.powered {
            if suspended {
                unit.suspended = true;
            } else if let Err(e) = self.power_up(unit) {
                unit.open_count -= 1;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Decrement one unit's refcount and power it down on the 1→0 edge.
    pub(crate) fn close_unit(
        &self,
        guard: &mut MutexGuard<'_, HubState>,
        id: &str,
    ) -> Result<(), SensorError> {
        {
            let unit = guard
                .units
                .get_mut(id)
                .ok_or_else(|| SensorError::UnknownId(id.to_string()))?;
            if unit.open_count == 0 {
                warn!(unit = id, "close without matching open");
                return Ok(());
            }
            unit.open_count -= 1;
            if unit.should_power() {
                return Ok(());
            }
        }
        match self.power_down(guard, id) {
            Ok(()) => Ok(()),
            Err(e) => {
                // Fail-safe: the unit is still on; restore the refcount.
                if let Some(unit) = guard.units.get_mut(id) {
                    unit.open_count += 1;
                }
                Err(e)
            }
        }
    }

    // ─── Suspend / resume ───────────────────────────────────────────

    /// Power every powered unit off without stopping its worker.
    ///
    /// Workers find their unit unpowered and skip sampling until
    /// [`resume`](Self::resume). Each affected unit is powered off/on as
    /// a matched pair, so strict power alternation is preserved.
    ///
    /// # Errors
    /// [`SensorError::Contended`] if the exclusion domain is held
    /// elsewhere; nothing is suspended.
    pub fn suspend(&self) -> Result<(), SensorError> {
        let mut guard = self.state.try_lock().ok_or(SensorError::Contended)?;
        if guard.suspended {
            return Ok(());
        }
        guard.suspended = true;

        let ids: Vec<String> = guard.units.keys().cloned().collect();
        for id in &ids {
            let Some(unit) = guard.units.get_mut(id) else {
                continue;
            };
            if !unit.powered {
                continue;
            }
            match power::power_off(unit) {
                Ok(()) => unit.suspended = true,
                Err(e) => warn!(unit = %id, error = %e, "suspend: power-off failed; unit stays on"),
            }
        }
        info!("hub suspended");
        Ok(())
    }

    /// Power back on every unit that [`suspend`](Self::suspend) (or an
    /// open made while suspended) marked for wake-up.
    pub fn resume(&self) -> Result<(), SensorError> {
        let mut guard = self.state.lock();
        if !guard.suspended {
            return Ok(());
        }
        guard.suspended = false;

        let ids: Vec<String> = guard.units.keys().cloned().collect();
        for id in &ids {
            let Some(unit) = guard.units.get_mut(id) else {
                continue;
            };
            if !unit.suspended {
                continue;
            }
            unit.suspended = false;
            if unit.powered || !unit.should_power() {
                continue;
            }
            let result = if unit.worker.is_some() {
                // Worker survived suspension; just restore power.
                power::power_on(unit)
            } else {
                // Unit was opened while suspended; full start.
                self.power_up(unit)
            };
            if let Err(e) = result {
                warn!(unit = %id, error = %e, "resume: power-on failed; unit stays off");
            }
        }
        info!("hub resumed");
        Ok(())
    }

    // ─── Introspection ──────────────────────────────────────────────

    /// Names of all registered units, sorted.
    pub fn unit_names(&self) -> Vec<String> {
        let guard = self.state.lock();
        let mut names: Vec<String> = guard.units.keys().cloned().collect();
        names.sort();
        names
    }

    /// `(name, enabled)` for every registered unit, sorted by name.
    pub fn list(&self) -> Vec<(String, bool)> {
        let guard = self.state.lock();
        let mut entries: Vec<(String, bool)> = guard
            .units
            .values()
            .map(|u| (u.id.clone(), u.powered))
            .collect();
        entries.sort();
        entries
    }

    /// Outstanding opens against one unit.
    ///
    /// # Errors
    /// [`SensorError::UnknownId`] if no such unit exists.
    pub fn open_count(&self, id: &str) -> Result<u32, SensorError> {
        let guard = self.state.lock();
        guard
            .units
            .get(id)
            .map(|u| u.open_count)
            .ok_or_else(|| SensorError::UnknownId(id.to_string()))
    }

    /// Outstanding opens against the aggregate channel.
    pub fn aggregate_open_count(&self) -> u32 {
        self.state.lock().aggregate_open
    }

    /// Number of registered units.
    pub fn len(&self) -> usize {
        self.state.lock().units.len()
    }

    /// True if no units are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop and remove every unit, discarding open counts and manual
    /// enables. Daemon shutdown path.
    pub fn shutdown_all(&self) {
        let mut guard = self.state.lock();
        guard.aggregate_open = 0;
        guard.suspended = false;
        let ids: Vec<String> = guard.units.keys().cloned().collect();
        for id in &ids {
            // The join window inside power_down releases the domain; a
            // concurrent open may re-power the unit, so force it down
            // again until it stays down.
            loop {
                match guard.units.get_mut(id) {
                    Some(unit) => {
                        unit.open_count = 0;
                        unit.manual_enable = false;
                    }
                    None => break,
                }
                match self.power_down(&mut guard, id) {
                    Ok(()) => {
                        let down = guard
                            .units
                            .get(id)
                            .is_none_or(|u| !u.powered && u.worker.is_none());
                        if down {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(unit = %id, error = %e, "shutdown: power-off failed");
                        // The fail-safe restarted the worker; stop it
                        // again before the unit record goes away.
                        self.stop_worker(&mut guard, id);
                        break;
                    }
                }
            }
            guard.units.remove(id);
        }
        info!(units = ids.len(), "all sensor units shut down");
    }

    // ─── Edge plumbing ──────────────────────────────────────────────

    /// Power a unit on and start its worker. On any failure the unit is
    /// left exactly as it was: off, with no worker.
    pub(crate) fn power_up(&self, unit: &mut SensorUnit) -> Result<(), SensorError> {
        power::power_on(unit)?;
        if let Err(e) = self.spawn_worker(unit) {
            // Keep strict power alternation intact before surfacing the
            // spawn failure.
            if let Err(off) = power::power_off(unit) {
                error!(unit = %unit.id, error = %off, "power-off after failed worker spawn also failed");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Stop the worker, join it, then power the unit off.
    ///
    /// Re-checks the merge rule after rejoining the exclusion domain: if
    /// the unit was re-opened while the worker was being joined, it stays
    /// powered and gets a fresh worker instead.
    pub(crate) fn power_down(
        &self,
        guard: &mut MutexGuard<'_, HubState>,
        id: &str,
    ) -> Result<(), SensorError> {
        self.stop_worker(guard, id);

        let Some(unit) = guard.units.get_mut(id) else {
            return Ok(());
        };
        unit.suspended = false;
        if !unit.powered {
            return Ok(());
        }
        if unit.should_power() {
            // Re-opened during the join window; no edge after all.
            return self.spawn_worker(unit);
        }
        match power::power_off(unit) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(unit = id, error = %e, "power-off failed; unit remains on");
                if let Err(we) = self.spawn_worker(unit) {
                    error!(unit = id, error = %we, "failed to restart worker after power-off fault");
                }
                Err(e)
            }
        }
    }

    /// Spawn the sample worker for a powered unit.
    pub(crate) fn spawn_worker(&self, unit: &mut SensorUnit) -> Result<(), SensorError> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let ctx = WorkerContext {
            id: unit.id.clone(),
            state: Arc::clone(&self.state),
            signals: rx,
            reports: self.reports.clone(),
            interval_ms: unit.interval_ms,
        };
        let join = worker::spawn(ctx).map_err(|e| SensorError::Worker {
            unit: unit.id.clone(),
            reason: e.to_string(),
        })?;
        unit.worker = Some(WorkerHandle { signal: tx, join });
        Ok(())
    }

    /// Signal the unit's worker (if any) to shut down and join it.
    ///
    /// The exclusion domain is released for the duration of the join so
    /// the worker can take it for its final `on_unregister` callback.
    pub(crate) fn stop_worker(&self, guard: &mut MutexGuard<'_, HubState>, id: &str) {
        let Some(handle) = guard.units.get_mut(id).and_then(|u| u.worker.take()) else {
            return;
        };
        let _ = handle.signal.send(WorkerSignal::Shutdown);
        MutexGuard::unlocked(guard, move || {
            if handle.join.join().is_err() {
                warn!(unit = id, "sample worker panicked during shutdown");
            }
        });
    }
}
