//! Work groups and the sink-side handler that receives their completions.

use std::sync::Arc;
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::model::{GroupId, GroupSummary, UnitReport, WorkUnit};

use super::sink::SinkState;

/// Identity of a submitted group, as seen by handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    pub id: GroupId,
    pub label: String,
    pub total: usize,
}

/// Receives a group's lifecycle callbacks. Every method runs on the
/// completion sink, one callback at a time, and must not block.
pub trait GroupHandler<T>: Send + Sync + 'static {
    /// The group was registered with the sink. Runs before any unit report.
    fn on_group_start(&self, _state: &mut SinkState, _group: &GroupInfo) {}

    /// One unit reached a terminal state.
    fn on_unit_done(&self, state: &mut SinkState, report: UnitReport<T>);

    /// Every unit is done. Runs exactly once per group.
    fn on_group_done(&self, _state: &mut SinkState, _summary: &GroupSummary) {}
}

/// A fixed, ordered batch of units submitted together.
pub struct WorkGroup<T> {
    pub id: GroupId,
    pub label: String,
    units: Vec<WorkUnit<T>>,
    handler: Arc<dyn GroupHandler<T>>,
}

impl<T: Send + 'static> WorkGroup<T> {
    /// Units keep the order given here; their ids should be their indices.
    pub fn new(
        label: impl Into<String>,
        units: Vec<WorkUnit<T>>,
        handler: Arc<dyn GroupHandler<T>>,
    ) -> Self {
        Self {
            id: GroupId::new(),
            label: label.into(),
            units,
            handler,
        }
    }

    pub fn total(&self) -> usize {
        self.units.len()
    }

    pub fn info(&self) -> GroupInfo {
        GroupInfo {
            id: self.id,
            label: self.label.clone(),
            total: self.units.len(),
        }
    }

    pub(crate) fn into_parts(self) -> (GroupInfo, Vec<WorkUnit<T>>, Arc<dyn GroupHandler<T>>) {
        let info = self.info();
        (info, self.units, self.handler)
    }
}

impl<T> std::fmt::Debug for WorkGroup<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkGroup")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("units", &self.units)
            .finish_non_exhaustive()
    }
}

/// Handed back by `submit`. Resolves once the group's done-callback ran.
#[derive(Debug)]
pub struct GroupTicket {
    pub group: GroupId,
    pub total: usize,
    done: oneshot::Receiver<GroupSummary>,
}

impl GroupTicket {
    pub(crate) fn new(group: GroupId, total: usize, done: oneshot::Receiver<GroupSummary>) -> Self {
        Self { group, total, done }
    }

    /// Wait for the group to finish.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SinkClosed`] if the sink stopped before the group
    /// completed.
    pub async fn finished(self) -> Result<GroupSummary> {
        self.done.await.map_err(|_| Error::SinkClosed)
    }
}
