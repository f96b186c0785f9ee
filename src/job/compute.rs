//! Long CPU-bound calculation, run off the sink so it stays responsive.

use tracing::{info, warn};

use crate::engine::{GroupHandler, GroupInfo, SinkState};
use crate::model::{GroupSummary, UnitReport, WorkUnit};

use super::Job;

/// Iteration count used when none is configured.
pub const DEFAULT_ITERATIONS: u64 = 10_000_000;

/// Adds one to a local total `iterations` times.
#[derive(Debug, Clone)]
pub struct ComputeJob {
    iterations: u64,
}

impl ComputeJob {
    pub fn new(iterations: u64) -> Self {
        Self { iterations }
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }
}

impl Default for ComputeJob {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATIONS)
    }
}

/// The calculation itself. Touches nothing but its own local.
pub fn accumulate(iterations: u64) -> u64 {
    let mut total: u64 = 0;
    for _ in 0..iterations {
        total = std::hint::black_box(total + 1);
    }
    total
}

impl Job<u64> for ComputeJob {
    fn name(&self) -> &str {
        "compute"
    }

    fn build(&self) -> Vec<WorkUnit<u64>> {
        let iterations = self.iterations;
        vec![WorkUnit::new(0, move || Ok(accumulate(iterations)))]
    }
}

impl GroupHandler<u64> for ComputeJob {
    fn on_group_start(&self, state: &mut SinkState, group: &GroupInfo) {
        state.begin_busy();
        info!(group = %group.id, iterations = self.iterations, "calculation started");
    }

    fn on_unit_done(&self, state: &mut SinkState, report: UnitReport<u64>) {
        match report.result {
            Ok(total) => {
                info!(group = %report.group, total, "calculation finished");
                state.record_compute(report.group, total);
            }
            Err(failure) => {
                warn!(group = %report.group, %failure, "calculation failed");
            }
        }
    }

    fn on_group_done(&self, state: &mut SinkState, _summary: &GroupSummary) {
        state.end_busy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulate_counts_every_iteration() {
        assert_eq!(accumulate(0), 0);
        assert_eq!(accumulate(1), 1);
        assert_eq!(accumulate(123_456), 123_456);
    }

    #[test]
    fn compute_job_builds_a_single_unit() {
        let units = ComputeJob::new(10).build();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].id.0, 0);
    }
}
