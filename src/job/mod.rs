//! Jobs: recipes that produce a work group and handle its completions.
//!
//! The queue knows nothing about individual jobs. A job builds its units and
//! receives their results on the sink through [`GroupHandler`].

pub mod compute;
pub mod fetch;

pub use compute::ComputeJob;
pub use fetch::FetchJob;

use std::sync::Arc;
use tracing::info;

use crate::engine::{BoundedWorkQueue, GroupHandler, GroupTicket, WorkGroup};
use crate::error::Result;
use crate::model::WorkUnit;

/// A job that can be launched on a [`JobRunner`].
pub trait Job<T>: GroupHandler<T> {
    /// Label used for the group, logs, and metrics.
    fn name(&self) -> &str;

    /// Produce the units of one run, in submission order.
    fn build(&self) -> Vec<WorkUnit<T>>;
}

/// Turns jobs into groups and submits them.
#[derive(Debug, Clone)]
pub struct JobRunner {
    queue: BoundedWorkQueue,
}

impl JobRunner {
    pub fn new(queue: BoundedWorkQueue) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &BoundedWorkQueue {
        &self.queue
    }

    /// Launch one run of `job`. Every call is an independent group, even if
    /// an earlier run of the same job is still in flight.
    pub fn launch<T, J>(&self, job: Arc<J>) -> Result<GroupTicket>
    where
        T: Send + 'static,
        J: Job<T>,
    {
        let units = job.build();
        info!(job = job.name(), units = units.len(), "launching job");
        let label = job.name().to_string();
        let group = WorkGroup::new(label, units, job);
        self.queue.submit(group)
    }
}
