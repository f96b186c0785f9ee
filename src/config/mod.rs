//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast on values that do not parse.
//! Every variable is optional; defaults reproduce the demo screen.

pub mod manifest;

pub use manifest::FetchManifest;

use crate::engine::{DEFAULT_MAX_CONCURRENCY, QueueConfig};
use crate::error::{Error, Result};
use crate::event::DEFAULT_JOURNAL_CAPACITY;
use crate::job::compute::DEFAULT_ITERATIONS;
use crate::telemetry::DEFAULT_METRIC_INTERVAL;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub max_concurrency: usize,
    pub max_pending: Option<usize>,
    pub compute_iterations: u64,
    pub journal_capacity: usize,
    pub otel_endpoint: Option<String>,
    pub metric_interval: Duration,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            max_concurrency: parsed_var("HANDOFF_MAX_CONCURRENCY")?
                .unwrap_or(DEFAULT_MAX_CONCURRENCY),
            max_pending: parsed_var("HANDOFF_MAX_PENDING")?,
            compute_iterations: parsed_var("HANDOFF_COMPUTE_ITERATIONS")?
                .unwrap_or(DEFAULT_ITERATIONS),
            journal_capacity: parsed_var("HANDOFF_JOURNAL_CAPACITY")?
                .unwrap_or(DEFAULT_JOURNAL_CAPACITY),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            metric_interval: parsed_var("HANDOFF_METRIC_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_METRIC_INTERVAL),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        };
        config.queue().validate()?;
        if config.journal_capacity == 0 {
            return Err(Error::Config(
                "HANDOFF_JOURNAL_CAPACITY must be positive".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn queue(&self) -> QueueConfig {
        QueueConfig {
            max_concurrency: self.max_concurrency,
            max_pending: self.max_pending,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_pending: None,
            compute_iterations: DEFAULT_ITERATIONS,
            journal_capacity: DEFAULT_JOURNAL_CAPACITY,
            otel_endpoint: None,
            metric_interval: DEFAULT_METRIC_INTERVAL,
            log_level: "info".to_string(),
        }
    }
}

fn parsed_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("environment variable {name}={raw:?}: {e}"))),
        Err(_) => Ok(None),
    }
}
