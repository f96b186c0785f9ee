//! Core data model.
//!
//! A work unit is one independently schedulable closure with an index inside
//! its group. Groups are the fixed-size batches submitted together; their
//! aggregate progress is tracked on the completion sink.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::error::UnitFailure;

/// Result of running a unit body.
pub type UnitResult<T> = std::result::Result<T, UnitFailure>;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Newtype for group IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub Uuid);

impl GroupId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

/// Index of a unit within its group. Submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitId(pub usize);

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle state of a work unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    /// Submitted, waiting for a free concurrency slot.
    Pending,
    /// Body executing on a worker thread.
    Running,
    /// Body returned a value.
    Completed,
    /// Body returned an error or panicked. Still counts as done.
    Failed,
}

impl UnitState {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: UnitState) -> bool {
        use UnitState::*;
        matches!(
            (self, to),
            (Pending, Running) | (Running, Completed) | (Running, Failed)
        )
    }

    /// Is this a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(self, UnitState::Completed | UnitState::Failed)
    }
}

impl std::fmt::Display for UnitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UnitState::Pending => "pending",
            UnitState::Running => "running",
            UnitState::Completed => "completed",
            UnitState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Work Unit
// ---------------------------------------------------------------------------

pub(crate) type Body<T> = Box<dyn FnOnce() -> UnitResult<T> + Send + 'static>;

/// A single closure plus its identity.
///
/// Every unit starts out [`UnitState::Pending`]; once submitted, the queue
/// owns it and tracks its state until the result reaches the sink as a
/// [`UnitReport`]. The body captures its own inputs by value; nothing is
/// borrowed from the submitting context.
pub struct WorkUnit<T> {
    pub id: UnitId,
    body: Body<T>,
}

impl<T> WorkUnit<T> {
    pub fn new<F>(index: usize, body: F) -> Self
    where
        F: FnOnce() -> UnitResult<T> + Send + 'static,
    {
        Self {
            id: UnitId(index),
            body: Box::new(body),
        }
    }

    pub(crate) fn into_parts(self) -> (UnitId, Body<T>) {
        (self.id, self.body)
    }
}

impl<T> std::fmt::Debug for WorkUnit<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkUnit")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// What a finished unit hands to the completion sink.
#[derive(Debug)]
pub struct UnitReport<T> {
    pub group: GroupId,
    pub unit: UnitId,
    pub state: UnitState,
    pub result: UnitResult<T>,
    pub elapsed: Duration,
    /// Units of the group done so far, including this one.
    pub completed: usize,
    pub total: usize,
}

/// Sink-side completion counters for one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupProgress {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl GroupProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            succeeded: 0,
            failed: 0,
        }
    }

    pub fn completed(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn is_done(&self) -> bool {
        self.completed() == self.total
    }

    /// Count one more finished unit. Returns `false` if the group was
    /// already done, leaving the counters unchanged.
    pub fn record(&mut self, success: bool) -> bool {
        if self.is_done() {
            return false;
        }
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        true
    }
}

/// Aggregate outcome of a group, delivered once on group completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub group: GroupId,
    pub label: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl GroupSummary {
    pub fn completed(&self) -> usize {
        self.succeeded + self.failed
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress bar state shown on the sink. Tracks one group at a time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    pub group: Option<GroupId>,
    pub counter: usize,
    pub total: usize,
}

impl ProgressState {
    pub fn idle() -> Self {
        Self {
            group: None,
            counter: 0,
            total: 0,
        }
    }

    pub fn start(group: GroupId, total: usize) -> Self {
        Self {
            group: Some(group),
            counter: 0,
            total,
        }
    }

    /// Advance by one, clamped to `total`.
    pub fn advance(&mut self) {
        if self.counter < self.total {
            self.counter += 1;
        }
    }

    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return if self.group.is_some() { 1.0 } else { 0.0 };
        }
        self.counter as f64 / self.total as f64
    }
}

impl Default for ProgressState {
    fn default() -> Self {
        Self::idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_transitions_follow_lifecycle() {
        use UnitState::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Pending));
        assert!(Completed.is_terminal());
        assert!(Failed.is_terminal());
        assert!(!Running.is_terminal());
    }

    #[test]
    fn group_progress_stops_at_total() {
        let mut progress = GroupProgress::new(2);
        assert!(progress.record(true));
        assert!(progress.record(false));
        assert!(progress.is_done());
        assert!(!progress.record(true));
        assert_eq!(progress.completed(), 2);
        assert_eq!(progress.succeeded, 1);
        assert_eq!(progress.failed, 1);
    }

    #[test]
    fn progress_fraction_is_clamped() {
        let mut progress = ProgressState::start(GroupId::new(), 4);
        assert_eq!(progress.fraction(), 0.0);
        for _ in 0..6 {
            progress.advance();
        }
        assert_eq!(progress.counter, 4);
        assert_eq!(progress.fraction(), 1.0);
    }

    #[test]
    fn empty_group_progress_is_complete() {
        assert_eq!(ProgressState::start(GroupId::new(), 0).fraction(), 1.0);
        assert_eq!(ProgressState::idle().fraction(), 0.0);
    }

    #[test]
    fn group_id_display_is_short() {
        assert_eq!(GroupId::new().to_string().len(), 8);
    }
}
