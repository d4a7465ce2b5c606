//! Simulation driver backend.
//!
//! Software-emulated sensor readouts for development and testing without
//! physical hardware. Each kind produces a deterministic waveform so the
//! daemon runs end-to-end and readbacks are reproducible.

use sensmux_common::driver::{PowerFault, SensorDriver};
use sensmux_common::types::{Sample, SensorKind};
use tracing::debug;

/// Factory for the "simulation" backend.
pub fn factory(kind: SensorKind) -> Box<dyn SensorDriver> {
    Box::new(SimulationDriver::new(kind))
}

/// Deterministic waveform generator implementing the driver contract.
pub struct SimulationDriver {
    kind: SensorKind,
    tick: u32,
    powered: bool,
}

impl SimulationDriver {
    /// Create a simulation driver for the given kind.
    pub fn new(kind: SensorKind) -> Self {
        Self {
            kind,
            tick: 0,
            powered: false,
        }
    }
}

/// Symmetric triangle wave in `-amp..=amp` with the given period.
fn triangle(tick: u32, period: u32, amp: i32) -> i32 {
    let phase = tick % period;
    let half = period / 2;
    let ramp = if phase < half {
        phase
    } else {
        period - phase
    };
    // Map 0..=half onto -amp..=amp.
    (i64::from(ramp) * 2 * i64::from(amp) / i64::from(half) - i64::from(amp)) as i32
}

impl SensorDriver for SimulationDriver {
    fn sample(&mut self) -> Option<Sample> {
        if !self.powered {
            return None;
        }
        self.tick = self.tick.wrapping_add(1);
        let t = self.tick;
        let sample = match self.kind {
            SensorKind::Accelerometer => Sample::new(
                triangle(t, 64, 1000),
                triangle(t.wrapping_add(16), 64, 1000),
                981,
            ),
            SensorKind::Gyroscope => Sample::new(
                triangle(t, 32, 250),
                triangle(t.wrapping_add(8), 32, 250),
                triangle(t.wrapping_add(16), 32, 250),
            ),
            // Single-axis kinds report on x only.
            SensorKind::AmbientLight => Sample::new((t % 100) as i32 * 10, 0, 0),
            SensorKind::Proximity => {
                Sample::new(if (t / 16) % 2 == 0 { 65535 } else { 0 }, 0, 0)
            }
        };
        Some(sample)
    }

    fn power_on(&mut self) -> Result<(), PowerFault> {
        debug!(kind = %self.kind, "simulation power on");
        self.powered = true;
        Ok(())
    }

    fn power_off(&mut self) -> Result<(), PowerFault> {
        debug!(kind = %self.kind, "simulation power off");
        self.powered = false;
        Ok(())
    }

    fn on_unregister(&mut self) {
        debug!(kind = %self.kind, ticks = self.tick, "simulation teardown");
    }
}
