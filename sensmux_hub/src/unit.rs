//! The per-unit record managed by the registry.
//!
//! `SensorUnit` holds everything the registry tracks for one physical
//! sensor: identity, the driver callbacks, polling interval, refcount and
//! power state, the worker ownership token and the cached last sample.
//! All mutable fields are guarded by the registry's exclusion domain,
//! except the last-sample cell which is written by the unit's worker and
//! read lock-free by the attribute surface.

use crate::worker::WorkerHandle;
use sensmux_common::driver::SensorDriver;
use sensmux_common::types::{DEFAULT_INTERVAL_MS, Sample, SensorKind};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

/// Lock-free cell holding the most recent readout.
///
/// The worker stores each axis with relaxed ordering; a concurrent reader
/// may observe a torn sample (axes from two different readouts). That is
/// acceptable for telemetry readback.
#[derive(Debug, Default)]
pub struct LastSample {
    x: AtomicI32,
    y: AtomicI32,
    z: AtomicI32,
}

impl LastSample {
    /// Store a readout. Worker-only.
    pub fn store(&self, sample: Sample) {
        self.x.store(sample.x, Ordering::Relaxed);
        self.y.store(sample.y, Ordering::Relaxed);
        self.z.store(sample.z, Ordering::Relaxed);
    }

    /// Load the cached readout without taking any lock.
    pub fn load(&self) -> Sample {
        Sample {
            x: self.x.load(Ordering::Relaxed),
            y: self.y.load(Ordering::Relaxed),
            z: self.z.load(Ordering::Relaxed),
        }
    }
}

/// The record describing one physical sensor.
pub struct SensorUnit {
    /// Unique name, the registry lookup key.
    pub(crate) id: String,
    /// Physical channel capability set.
    pub(crate) kind: SensorKind,
    /// Collaborator-supplied callbacks. Invoked only under the exclusion
    /// domain (sample, power edges) or on the worker thread
    /// (on_unregister, also under the domain).
    pub(crate) driver: Box<dyn SensorDriver>,
    /// Sampling period [ms]. Floor-clamped on the attribute write path.
    pub(crate) interval_ms: u32,
    /// Outstanding opens against this specific unit. Aggregate opens
    /// contribute one per aggregate 0→1 edge.
    pub(crate) open_count: u32,
    /// Manual enable toggle, layered on top of refcounted open/close.
    pub(crate) manual_enable: bool,
    /// True while the driver is powered. Invariant: a worker handle is
    /// present iff this is set (transiently false only inside a stop
    /// sequence, which runs to completion under one caller).
    pub(crate) powered: bool,
    /// Set while the hub is suspended and this unit's power was taken
    /// away; resume powers exactly these units back on.
    pub(crate) suspended: bool,
    /// Ownership token for the running sample worker.
    pub(crate) worker: Option<WorkerHandle>,
    /// Most recent readout, shared with lock-free readers.
    pub(crate) last: Arc<LastSample>,
}

impl SensorUnit {
    /// Create a fresh, unpowered unit with the default interval.
    pub(crate) fn new(id: String, kind: SensorKind, driver: Box<dyn SensorDriver>) -> Self {
        Self {
            id,
            kind,
            driver,
            interval_ms: DEFAULT_INTERVAL_MS,
            open_count: 0,
            manual_enable: false,
            powered: false,
            suspended: false,
            worker: None,
            last: Arc::new(LastSample::default()),
        }
    }

    /// Merge rule for the two enable mechanisms: a unit is due power iff
    /// it has outstanding opens or the manual toggle is set.
    pub(crate) fn should_power(&self) -> bool {
        self.open_count > 0 || self.manual_enable
    }
}

impl std::fmt::Debug for SensorUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorUnit")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("interval_ms", &self.interval_ms)
            .field("open_count", &self.open_count)
            .field("manual_enable", &self.manual_enable)
            .field("powered", &self.powered)
            .field("worker", &self.worker.is_some())
            .finish()
    }
}
