//! Execution engine: bounded queue, work groups, completion sink.

pub mod group;
pub mod queue;
pub mod sink;

pub use group::{GroupHandler, GroupInfo, GroupTicket, WorkGroup};
pub use queue::{BoundedWorkQueue, DEFAULT_MAX_CONCURRENCY, QueueConfig, QueueStats};
pub use sink::{CompletionSink, SinkCallback, SinkHandle, SinkState};
