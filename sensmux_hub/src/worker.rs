//! Per-unit sample worker.
//!
//! One worker thread exists per powered unit. The loop waits up to the
//! current interval for an interval-change or shutdown signal; on timeout
//! it attempts to take the registry's exclusion domain without blocking
//! and, if the unit is still powered, invokes the sample callback. A
//! contended domain means the tick is skipped silently: sampling is
//! best-effort, never blocking.
//!
//! Shutdown is always cooperative. The stopping caller sends
//! [`WorkerSignal::Shutdown`], releases the exclusion domain, and joins
//! the thread; the worker then runs the unit's `on_unregister` callback
//! under the domain and exits.

use crate::hub::{HubState, Report};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use sensmux_common::types::MIN_INTERVAL_MS;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::debug;

/// Signal delivered to a running worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerSignal {
    /// The unit's interval changed; takes effect on the next wait cycle.
    Interval(u32),
    /// Exit the loop, run the teardown callback and stop.
    Shutdown,
}

/// Ownership token for a running worker, held by its unit.
pub(crate) struct WorkerHandle {
    pub(crate) signal: Sender<WorkerSignal>,
    pub(crate) join: JoinHandle<()>,
}

/// Everything a worker needs, moved onto its thread at spawn.
pub(crate) struct WorkerContext {
    pub(crate) id: String,
    pub(crate) state: Arc<Mutex<HubState>>,
    pub(crate) signals: Receiver<WorkerSignal>,
    pub(crate) reports: Sender<Report>,
    pub(crate) interval_ms: u32,
}

/// Spawn the polling thread for one unit.
pub(crate) fn spawn(ctx: WorkerContext) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("sensmux-{}", ctx.id))
        .spawn(move || run(ctx))
}

fn run(ctx: WorkerContext) {
    let mut interval = ctx.interval_ms.max(MIN_INTERVAL_MS);
    debug!(unit = %ctx.id, interval_ms = interval, "sample worker started");

    loop {
        match ctx.signals.recv_timeout(Duration::from_millis(u64::from(interval))) {
            Ok(WorkerSignal::Interval(ms)) => {
                debug!(unit = %ctx.id, interval_ms = ms, "interval updated");
                interval = ms;
            }
            Ok(WorkerSignal::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => tick(&ctx),
        }
    }

    // Teardown callback runs on this thread, after the final loop
    // iteration. The stopping caller released the exclusion domain before
    // joining, so this acquisition cannot deadlock.
    let mut state = ctx.state.lock();
    if let Some(u) = state.units.get_mut(&ctx.id) {
        u.driver.on_unregister();
    }
    drop(state);

    debug!(unit = %ctx.id, "sample worker stopped");
}

/// One best-effort sampling tick.
fn tick(ctx: &WorkerContext) {
    // Skip the tick if the exclusion domain is held elsewhere.
    let Some(mut state) = ctx.state.try_lock() else {
        return;
    };
    let Some(u) = state.units.get_mut(&ctx.id) else {
        return;
    };
    if !u.powered {
        return;
    }
    if let Some(sample) = u.driver.sample() {
        u.last.store(sample);
        // A full report channel is the consumer's problem, not ours.
        let _ = ctx.reports.send(Report::Sample {
            unit: ctx.id.clone(),
            sample,
        });
    }
}
