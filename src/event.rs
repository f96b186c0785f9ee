//! Structured events recorded by the completion sink.
//!
//! Every callback the sink runs appends to its journal, in the order the
//! callbacks were delivered. The journal is what tests and the CLI read to
//! see what the screen went through recently; it keeps a bounded window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::model::{GroupId, UnitId, UnitState};

/// A structured event recorded on the sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence number.
    pub seq: u64,
    /// When this event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    GroupRegistered {
        group: GroupId,
        label: String,
        total: usize,
    },
    UnitDone {
        group: GroupId,
        unit: UnitId,
        state: UnitState,
        error: Option<String>,
        elapsed_ms: u64,
    },
    ProgressUpdated {
        group: GroupId,
        counter: usize,
        total: usize,
        fraction: f64,
    },
    Rendered {
        group: GroupId,
        tag: String,
        bytes: usize,
        placeholder: bool,
    },
    ComputeFinished {
        group: GroupId,
        value: u64,
    },
    GroupDone {
        group: GroupId,
        completed: usize,
        succeeded: usize,
        failed: usize,
    },
    CounterIncremented {
        value: u64,
    },
}

/// Events kept on the sink when no capacity is configured.
pub const DEFAULT_JOURNAL_CAPACITY: usize = 10_000;

/// Bounded event log with monotonic sequence numbers.
///
/// Holds the most recent `capacity` events; older ones are evicted as new
/// ones arrive. Sequence numbers keep counting across evictions.
#[derive(Debug)]
pub struct Journal {
    next_seq: u64,
    capacity: usize,
    evicted: u64,
    events: VecDeque<Event>,
}

impl Default for Journal {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_JOURNAL_CAPACITY)
    }
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// A journal keeping at most `capacity` events (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            next_seq: 0,
            capacity,
            evicted: 0,
            events: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    pub fn record(&mut self, timestamp: DateTime<Utc>, kind: EventKind) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.evicted += 1;
        }
        self.next_seq += 1;
        self.events.push_back(Event {
            seq: self.next_seq,
            timestamp,
            kind,
        });
    }

    /// Retained events, oldest first.
    pub fn events(&self) -> &VecDeque<Event> {
        &self.events
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// How many events were dropped to stay within capacity.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
