//! Error types for handoff.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("queue saturated: {requested} units requested, {capacity} pending slots")]
    QueueSaturated { capacity: usize, requested: usize },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("completion sink is closed")]
    SinkClosed,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("bad manifest {path}: {reason}")]
    Manifest { path: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why a single unit did not produce a value.
///
/// Captured on the worker thread and delivered to the completion sink with
/// the unit's report. Never propagated into the queue itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct UnitFailure {
    pub message: String,
}

impl UnitFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Build a failure from a caught panic payload.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let detail = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::new(format!("unit panicked: {detail}"))
    }
}

/// Failure reported by a [`FetchService`](crate::service::FetchService).
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} for {identifier}")]
    Status { identifier: String, status: u16 },

    #[error("{0}")]
    Other(String),
}

impl From<FetchError> for UnitFailure {
    fn from(e: FetchError) -> Self {
        Self::new(e.to_string())
    }
}
