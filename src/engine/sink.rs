//! Completion sink: the single serialized context all results are handed to.
//!
//! A tokio task drains an unbounded channel and runs one callback at a time
//! against [`SinkState`], in the order callbacks were posted. Sink state is
//! owned by that task, so nothing else ever reads or writes it directly.

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::event::{Event, EventKind, Journal};
use crate::model::{
    GroupId, GroupProgress, GroupSummary, ProgressState, UnitId, UnitReport, UnitResult, UnitState,
};
use crate::service::{Clock, LogRenderer, RenderSink, SystemClock};
use crate::telemetry::metrics;

use super::group::{GroupHandler, GroupInfo};

/// A callback run on the sink.
pub type SinkCallback = Box<dyn FnOnce(&mut SinkState) + Send + 'static>;

enum SinkMessage {
    Run(SinkCallback),
    Shutdown,
}

/// A unit result on its way to the sink.
pub(crate) struct FinishedUnit<T> {
    pub group: GroupId,
    pub unit: UnitId,
    pub result: UnitResult<T>,
    pub elapsed: Duration,
}

struct RegisteredGroup {
    label: String,
    progress: GroupProgress,
    ticket: Option<oneshot::Sender<GroupSummary>>,
}

/// Everything owned by the sink context.
pub struct SinkState {
    counter: u64,
    progress: ProgressState,
    busy: usize,
    last_rendered: Option<String>,
    last_compute: Option<u64>,
    fetch_started_at: Option<DateTime<Utc>>,
    fetch_finished_at: Option<DateTime<Utc>>,
    groups: HashMap<GroupId, RegisteredGroup>,
    journal: Journal,
    renderer: Box<dyn RenderSink>,
    clock: Arc<dyn Clock>,
}

impl SinkState {
    pub fn new(renderer: Box<dyn RenderSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            counter: 0,
            progress: ProgressState::idle(),
            busy: 0,
            last_rendered: None,
            last_compute: None,
            fetch_started_at: None,
            fetch_finished_at: None,
            groups: HashMap::new(),
            journal: Journal::new(),
            renderer,
            clock,
        }
    }

    /// Keep at most `capacity` events in the journal.
    pub fn with_journal_capacity(mut self, capacity: usize) -> Self {
        self.journal = Journal::with_capacity(capacity);
        self
    }

    // -- read side --------------------------------------------------------

    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn progress(&self) -> ProgressState {
        self.progress
    }

    pub fn is_busy(&self) -> bool {
        self.busy > 0
    }

    pub fn busy_jobs(&self) -> usize {
        self.busy
    }

    pub fn last_rendered(&self) -> Option<&str> {
        self.last_rendered.as_deref()
    }

    pub fn last_compute(&self) -> Option<u64> {
        self.last_compute
    }

    pub fn fetch_started_at(&self) -> Option<DateTime<Utc>> {
        self.fetch_started_at
    }

    pub fn fetch_finished_at(&self) -> Option<DateTime<Utc>> {
        self.fetch_finished_at
    }

    /// Progress of a group that has not finished yet.
    pub fn group_progress(&self, group: GroupId) -> Option<GroupProgress> {
        self.groups.get(&group).map(|g| g.progress)
    }

    pub fn active_groups(&self) -> usize {
        self.groups.len()
    }

    pub fn events(&self) -> &VecDeque<Event> {
        self.journal.events()
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // -- write side, used by job handlers ---------------------------------

    pub fn increment_counter(&mut self) -> u64 {
        self.counter += 1;
        let value = self.counter;
        self.record(EventKind::CounterIncremented { value });
        value
    }

    pub fn record(&mut self, kind: EventKind) {
        let now = self.clock.now();
        self.journal.record(now, kind);
    }

    pub fn begin_busy(&mut self) {
        self.busy += 1;
    }

    pub fn end_busy(&mut self) {
        self.busy = self.busy.saturating_sub(1);
    }

    pub fn record_compute(&mut self, group: GroupId, value: u64) {
        self.last_compute = Some(value);
        self.record(EventKind::ComputeFinished { group, value });
    }

    /// Point the progress display at `group`, starting from zero.
    pub fn start_progress(&mut self, group: GroupId, total: usize) {
        self.progress = ProgressState::start(group, total);
        self.record_progress(group);
    }

    /// Advance the progress display if it is showing `group`.
    pub fn advance_progress(&mut self, group: GroupId) {
        if self.progress.group != Some(group) {
            return;
        }
        self.progress.advance();
        self.record_progress(group);
    }

    fn record_progress(&mut self, group: GroupId) {
        let ProgressState { counter, total, .. } = self.progress;
        let fraction = self.progress.fraction();
        self.record(EventKind::ProgressUpdated {
            group,
            counter,
            total,
            fraction,
        });
    }

    pub fn render(&mut self, group: GroupId, payload: &[u8], tag: &str, placeholder: bool) {
        self.renderer.render(payload, tag);
        self.last_rendered = Some(tag.to_string());
        self.record(EventKind::Rendered {
            group,
            tag: tag.to_string(),
            bytes: payload.len(),
            placeholder,
        });
    }

    pub fn mark_fetch_started(&mut self) -> DateTime<Utc> {
        let now = self.clock.now();
        self.fetch_started_at = Some(now);
        now
    }

    pub fn mark_fetch_finished(&mut self) -> DateTime<Utc> {
        let now = self.clock.now();
        self.fetch_finished_at = Some(now);
        now
    }

    // -- group bookkeeping, driven by the queue ---------------------------

    pub(crate) fn register_group<T: Send + 'static>(
        &mut self,
        info: GroupInfo,
        handler: &dyn GroupHandler<T>,
        ticket: oneshot::Sender<GroupSummary>,
    ) {
        debug!(group = %info.id, label = %info.label, total = info.total, "group registered");
        self.groups.insert(
            info.id,
            RegisteredGroup {
                label: info.label.clone(),
                progress: GroupProgress::new(info.total),
                ticket: Some(ticket),
            },
        );
        self.record(EventKind::GroupRegistered {
            group: info.id,
            label: info.label.clone(),
            total: info.total,
        });
        handler.on_group_start(self, &info);
        if info.total == 0 {
            self.finish_group(info.id, handler);
        }
    }

    pub(crate) fn deliver_unit<T: Send + 'static>(
        &mut self,
        handler: &dyn GroupHandler<T>,
        unit: FinishedUnit<T>,
    ) {
        let FinishedUnit {
            group,
            unit,
            result,
            elapsed,
        } = unit;

        let Some(entry) = self.groups.get_mut(&group) else {
            let e = Error::InvariantViolation(format!("unit {unit} reported for unknown group {group}"));
            error!(%group, %unit, "{e}");
            return;
        };
        if !entry.progress.record(result.is_ok()) {
            let e = Error::InvariantViolation(format!(
                "unit {unit} reported after group {group} completed"
            ));
            error!(%group, %unit, "{e}");
            return;
        }
        let progress = entry.progress;

        let state = if result.is_ok() {
            UnitState::Completed
        } else {
            UnitState::Failed
        };
        self.record(EventKind::UnitDone {
            group,
            unit,
            state,
            error: result.as_ref().err().map(|f| f.message.clone()),
            elapsed_ms: elapsed.as_millis() as u64,
        });

        handler.on_unit_done(
            self,
            UnitReport {
                group,
                unit,
                state,
                result,
                elapsed,
                completed: progress.completed(),
                total: progress.total,
            },
        );

        if progress.is_done() {
            self.finish_group(group, handler);
        }
    }

    fn finish_group<T: Send + 'static>(&mut self, group: GroupId, handler: &dyn GroupHandler<T>) {
        let Some(mut entry) = self.groups.remove(&group) else {
            return;
        };
        let summary = GroupSummary {
            group,
            label: entry.label,
            total: entry.progress.total,
            succeeded: entry.progress.succeeded,
            failed: entry.progress.failed,
        };
        self.record(EventKind::GroupDone {
            group,
            completed: summary.completed(),
            succeeded: summary.succeeded,
            failed: summary.failed,
        });
        metrics::groups_finished().add(1, &[KeyValue::new("job", summary.label.clone())]);
        info!(
            %group,
            label = %summary.label,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "group done"
        );

        handler.on_group_done(self, &summary);

        if let Some(ticket) = entry.ticket.take() {
            // Receiver may have been dropped; nobody is waiting then.
            let _ = ticket.send(summary);
        }
    }
}

impl Default for SinkState {
    fn default() -> Self {
        Self::new(Box::new(LogRenderer::new()), Arc::new(SystemClock))
    }
}

/// Posts callbacks to the sink. Cheap to clone.
#[derive(Clone)]
pub struct SinkHandle {
    tx: mpsc::UnboundedSender<SinkMessage>,
}

impl SinkHandle {
    /// Queue `callback` behind everything already posted. Never blocks.
    pub fn post<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce(&mut SinkState) + Send + 'static,
    {
        self.post_boxed(Box::new(callback))
    }

    pub(crate) fn post_boxed(&self, callback: SinkCallback) -> Result<()> {
        self.tx
            .send(SinkMessage::Run(callback))
            .map_err(|_| Error::SinkClosed)
    }

    /// The "increment" button: bump the shared counter on the sink.
    pub fn increment_shared_counter(&self) -> Result<()> {
        self.post(|state| {
            state.increment_counter();
        })
    }

    /// Read sink state from outside, in turn with other callbacks.
    pub async fn query<R, F>(&self, read: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&SinkState) -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.post(move |state| {
            let _ = tx.send(read(state));
        })?;
        rx.await.map_err(|_| Error::SinkClosed)
    }

    /// Stop the sink after every callback posted before this call has run.
    pub fn shutdown(&self) -> Result<()> {
        self.tx
            .send(SinkMessage::Shutdown)
            .map_err(|_| Error::SinkClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl std::fmt::Debug for SinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkHandle")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// Spawns the sink task.
pub struct CompletionSink;

impl CompletionSink {
    /// Start the sink on the current tokio runtime.
    ///
    /// The join handle yields the final state once [`SinkHandle::shutdown`]
    /// has been processed or every handle was dropped.
    pub fn spawn(state: SinkState) -> (SinkHandle, JoinHandle<SinkState>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(state, rx));
        (SinkHandle { tx }, task)
    }
}

async fn run(mut state: SinkState, mut rx: mpsc::UnboundedReceiver<SinkMessage>) -> SinkState {
    info!("completion sink started");
    while let Some(message) = rx.recv().await {
        match message {
            SinkMessage::Run(callback) => callback(&mut state),
            SinkMessage::Shutdown => {
                info!("completion sink shutting down");
                break;
            }
        }
    }
    state
}
