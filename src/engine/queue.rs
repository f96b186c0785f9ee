//! Bounded work queue: runs units of any number of groups with at most
//! `max_concurrency` bodies in flight, refilling as units finish.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, ObservableGauge};
use serde::Serialize;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::error::{Error, Result, UnitFailure};
use crate::model::{GroupId, UnitId, UnitState, WorkUnit};
use crate::telemetry::metrics;
use crate::telemetry::work::{record_state_transition, start_unit_span};

use super::group::{GroupHandler, GroupTicket, WorkGroup};
use super::sink::{FinishedUnit, SinkCallback, SinkHandle, SinkState};

/// Concurrency bound used when none is configured.
pub const DEFAULT_MAX_CONCURRENCY: usize = 20;

/// Configuration for the work queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Maximum number of unit bodies running at once.
    pub max_concurrency: usize,
    /// Maximum number of units waiting for a slot. `None` = unbounded.
    pub max_pending: Option<usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_pending: None,
        }
    }
}

impl QueueConfig {
    pub fn with_max_concurrency(max_concurrency: usize) -> Self {
        Self {
            max_concurrency,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(Error::Config("max_concurrency must be positive".to_string()));
        }
        Ok(())
    }
}

/// Point-in-time view of the queue's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub max_concurrency: usize,
    pub active: usize,
    pub pending: usize,
    pub peak_active: usize,
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Type-erased unit waiting for a slot. Carries the unit's lifecycle state
/// from submission until its result is posted to the sink.
struct PendingUnit {
    group: GroupId,
    unit: UnitId,
    label: Arc<str>,
    state: UnitState,
    run: Box<dyn FnOnce() -> FinishedRun + Send + 'static>,
}

struct FinishedRun {
    state: UnitState,
    elapsed: Duration,
    deliver: SinkCallback,
}

#[derive(Default)]
struct Dispatch {
    pending: VecDeque<PendingUnit>,
    active: usize,
    peak_active: usize,
    dispatched: u64,
    succeeded: u64,
    failed: u64,
}

struct Instruments {
    dispatched: Counter<u64>,
    finished: Counter<u64>,
    duration_ms: Histogram<f64>,
    _active: ObservableGauge<u64>,
    _pending: ObservableGauge<u64>,
}

struct Inner {
    config: QueueConfig,
    dispatch: Mutex<Dispatch>,
    sink: SinkHandle,
    runtime: Handle,
    instruments: Instruments,
}

/// The bounded queue. Clones share the same slots and pending list.
#[derive(Clone)]
pub struct BoundedWorkQueue {
    inner: Arc<Inner>,
}

impl BoundedWorkQueue {
    /// Create a queue that runs bodies on the current tokio runtime's
    /// blocking pool and reports to `sink`.
    pub fn new(config: QueueConfig, sink: SinkHandle) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Other(format!("work queue needs a tokio runtime: {e}")))?;
        Self::with_runtime(config, sink, runtime)
    }

    pub fn with_runtime(config: QueueConfig, sink: SinkHandle, runtime: Handle) -> Result<Self> {
        config.validate()?;
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let active = weak.clone();
            let pending = weak.clone();
            Inner {
                config,
                dispatch: Mutex::new(Dispatch::default()),
                sink,
                runtime,
                instruments: Instruments {
                    dispatched: metrics::units_dispatched(),
                    finished: metrics::units_finished(),
                    duration_ms: metrics::unit_duration_ms(),
                    _active: metrics::units_active(move || {
                        active.upgrade().map(|inner| inner.lock().active as u64)
                    }),
                    _pending: metrics::units_pending(move || {
                        pending.upgrade().map(|inner| inner.lock().pending.len() as u64)
                    }),
                },
            }
        });
        Ok(Self { inner })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    pub fn sink(&self) -> &SinkHandle {
        &self.inner.sink
    }

    /// Submit a group. Returns immediately; units start as slots free up.
    ///
    /// The group is registered with the sink before any of its units can
    /// finish, so the sink always sees start, units, done in that order.
    /// An empty group completes on the sink with zero completions.
    ///
    /// # Errors
    ///
    /// [`Error::QueueSaturated`] if a pending bound is configured and the
    /// group does not fit; nothing is enqueued in that case.
    /// [`Error::SinkClosed`] if the sink is gone.
    pub fn submit<T: Send + 'static>(&self, group: WorkGroup<T>) -> Result<GroupTicket> {
        let (info, units, handler) = group.into_parts();
        let label: Arc<str> = Arc::from(info.label.as_str());
        let queued: Vec<PendingUnit> = units
            .into_iter()
            .map(|unit| prepare(info.id, Arc::clone(&label), unit, Arc::clone(&handler)))
            .collect();
        let requested = queued.len();

        let (done_tx, done_rx) = oneshot::channel();
        let ticket = GroupTicket::new(info.id, info.total, done_rx);

        {
            let mut dispatch = self.inner.lock();
            if let Some(capacity) = self.inner.config.max_pending {
                if dispatch.pending.len() + requested > capacity {
                    metrics::groups_submitted()
                        .add(1, &[KeyValue::new("result", "saturated")]);
                    warn!(
                        group = %info.id,
                        label = %info.label,
                        requested,
                        capacity,
                        "queue saturated, group rejected"
                    );
                    return Err(Error::QueueSaturated {
                        capacity,
                        requested,
                    });
                }
            }

            let registration = info.clone();
            self.inner.sink.post(move |state| {
                state.register_group(registration, &*handler, done_tx);
            })?;
            dispatch.pending.extend(queued);
        }

        metrics::groups_submitted().add(1, &[KeyValue::new("result", "ok")]);
        info!(group = %info.id, label = %info.label, units = requested, "group submitted");

        self.inner.refill();
        Ok(ticket)
    }

    pub fn stats(&self) -> QueueStats {
        let dispatch = self.inner.lock();
        QueueStats {
            max_concurrency: self.inner.config.max_concurrency,
            active: dispatch.active,
            pending: dispatch.pending.len(),
            peak_active: dispatch.peak_active,
            dispatched: dispatch.dispatched,
            succeeded: dispatch.succeeded,
            failed: dispatch.failed,
        }
    }
}

impl std::fmt::Debug for BoundedWorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedWorkQueue")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Erase a unit's output type. The returned closure runs the body, catching
/// panics, and packages the result as a sink callback for the group handler.
fn prepare<T: Send + 'static>(
    group: GroupId,
    label: Arc<str>,
    unit: WorkUnit<T>,
    handler: Arc<dyn GroupHandler<T>>,
) -> PendingUnit {
    let (id, body) = unit.into_parts();
    PendingUnit {
        group,
        unit: id,
        label,
        state: UnitState::Pending,
        run: Box::new(move || {
            let started = Instant::now();
            let result = match panic::catch_unwind(AssertUnwindSafe(body)) {
                Ok(result) => result,
                Err(payload) => Err(UnitFailure::from_panic(payload)),
            };
            let elapsed = started.elapsed();
            let state = if result.is_ok() {
                UnitState::Completed
            } else {
                UnitState::Failed
            };
            let finished = FinishedUnit {
                group,
                unit: id,
                result,
                elapsed,
            };
            FinishedRun {
                state,
                elapsed,
                deliver: Box::new(move |sink: &mut SinkState| {
                    sink.deliver_unit(&*handler, finished)
                }),
            }
        }),
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Dispatch> {
        self.dispatch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start pending units while slots are free.
    fn refill(self: &Arc<Self>) {
        let max = self.config.max_concurrency;
        let ready = {
            let mut dispatch = self.lock();
            let mut ready = Vec::new();
            while dispatch.active < max {
                let Some(unit) = dispatch.pending.pop_front() else {
                    break;
                };
                dispatch.active += 1;
                dispatch.dispatched += 1;
                dispatch.peak_active = dispatch.peak_active.max(dispatch.active);
                ready.push(unit);
            }
            if dispatch.active > max {
                let e = Error::InvariantViolation(format!(
                    "{} units active with a bound of {max}",
                    dispatch.active
                ));
                error!("{e}");
                debug_assert!(false, "{e}");
            }
            ready
        };

        for unit in ready {
            self.spawn(unit);
        }
    }

    fn spawn(self: &Arc<Self>, unit: PendingUnit) {
        self.instruments.dispatched.add(1, &[]);
        let inner = Arc::clone(self);
        self.runtime.spawn_blocking(move || inner.execute(unit));
    }

    /// Runs on a blocking worker thread.
    fn execute(self: &Arc<Self>, unit: PendingUnit) {
        let PendingUnit {
            group,
            unit: id,
            label,
            mut state,
            run,
        } = unit;
        let span = start_unit_span(&label, group, id);
        state = advance(&span, state, UnitState::Running);

        let finished = span.in_scope(run);

        state = advance(&span, state, finished.state);
        self.instruments
            .finished
            .add(1, &[KeyValue::new("status", state.to_string())]);
        self.instruments
            .duration_ms
            .record(finished.elapsed.as_secs_f64() * 1000.0, &[]);

        {
            let mut dispatch = self.lock();
            match dispatch.active.checked_sub(1) {
                Some(active) => dispatch.active = active,
                None => {
                    let e = Error::InvariantViolation(format!(
                        "unit {id} of group {group} finished with no active units"
                    ));
                    error!("{e}");
                    debug_assert!(false, "{e}");
                }
            }
            match state {
                UnitState::Completed => dispatch.succeeded += 1,
                _ => dispatch.failed += 1,
            }
        }

        if let Err(e) = self.sink.post_boxed(finished.deliver) {
            warn!(%group, unit = %id, "dropping unit result: {e}");
        }

        self.refill();
    }
}

fn advance(span: &tracing::Span, from: UnitState, to: UnitState) -> UnitState {
    record_state_transition(span, from, to);
    to
}
