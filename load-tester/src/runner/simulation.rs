//! Load curves
//!
//! A `LoadPlan` is a sequence of phases. Each phase either ramps the number
//! of concurrent workers linearly from the previous phase's count to a new
//! target, or holds a fixed count for its duration.

use std::time::Duration;

/// One phase of a load plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSimulation {
    /// Move linearly from the previous count to `copies` over `during`
    Ramp { copies: usize, during: Duration },
    /// Keep `copies` workers running for `during`
    Hold { copies: usize, during: Duration },
}

impl LoadSimulation {
    pub fn copies(&self) -> usize {
        match self {
            LoadSimulation::Ramp { copies, .. } | LoadSimulation::Hold { copies, .. } => *copies,
        }
    }

    pub fn during(&self) -> Duration {
        match self {
            LoadSimulation::Ramp { during, .. } | LoadSimulation::Hold { during, .. } => *during,
        }
    }
}

/// Ordered phases driving a scenario's concurrency
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoadPlan {
    phases: Vec<LoadSimulation>,
}

impl LoadPlan {
    pub fn new(phases: Vec<LoadSimulation>) -> Self {
        Self { phases }
    }

    /// Ramp up to `copies` over `ramp`, then hold for `hold`
    pub fn ramp_then_hold(copies: usize, ramp: Duration, hold: Duration) -> Self {
        Self::new(vec![
            LoadSimulation::Ramp {
                copies,
                during: ramp,
            },
            LoadSimulation::Hold {
                copies,
                during: hold,
            },
        ])
    }

    pub fn phases(&self) -> &[LoadSimulation] {
        &self.phases
    }

    /// Sum of every phase, saturating at `Duration::MAX`
    pub fn total_duration(&self) -> Duration {
        self.phases
            .iter()
            .map(LoadSimulation::during)
            .fold(Duration::ZERO, Duration::saturating_add)
    }

    /// Highest worker count the plan ever asks for
    pub fn peak_copies(&self) -> usize {
        self.phases
            .iter()
            .map(LoadSimulation::copies)
            .max()
            .unwrap_or(0)
    }

    /// Target worker count at `elapsed`, or `None` once every phase is done.
    ///
    /// Zero-length phases take no time but still set the starting count of
    /// the phase after them.
    pub fn target_at(&self, elapsed: Duration) -> Option<usize> {
        let mut previous = 0usize;
        let mut phase_start = Duration::ZERO;

        for phase in &self.phases {
            let phase_end = phase_start.saturating_add(phase.during());
            if elapsed < phase_end {
                let into = elapsed.saturating_sub(phase_start);
                return Some(match *phase {
                    LoadSimulation::Hold { copies, .. } => copies,
                    LoadSimulation::Ramp { copies, during } => {
                        interpolate(previous, copies, into, during)
                    }
                });
            }
            previous = phase.copies();
            phase_start = phase_end;
        }

        None
    }
}

fn interpolate(from: usize, to: usize, into: Duration, during: Duration) -> usize {
    let fraction = into.as_secs_f64() / during.as_secs_f64();
    let value = from as f64 + (to as f64 - from as f64) * fraction;
    value.round().max(0.0) as usize
}
