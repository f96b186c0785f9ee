//! Collaborators the core calls into: fetch, render, clock.
//!
//! Fetch runs on worker threads and may block. Render and clock are only
//! used from the completion sink.

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::error::{Error, FetchError, Result};

/// Display format for sink timestamps: `dd/MM/yyyy HH:mm:ss:SSS`.
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S:%3f";

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Retrieves the payload behind an identifier. Synchronous; may block.
pub trait FetchService: Send + Sync {
    fn fetch(&self, identifier: &str) -> std::result::Result<Vec<u8>, FetchError>;
}

/// Displays a payload. Owned by the completion sink, so it is never called
/// from two threads.
pub trait RenderSink: Send {
    fn render(&mut self, payload: &[u8], tag: &str);
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Render sink that logs what would have been displayed.
#[derive(Debug, Default)]
pub struct LogRenderer {
    rendered: usize,
}

impl LogRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rendered(&self) -> usize {
        self.rendered
    }
}

impl RenderSink for LogRenderer {
    fn render(&mut self, payload: &[u8], tag: &str) {
        self.rendered += 1;
        info!(tag, bytes = payload.len(), "rendered payload");
    }
}

/// HTTP GET fetch service.
///
/// `fetch` drives the request on the runtime behind `runtime`, so it must be
/// called from a blocking worker thread, never from an async task.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    runtime: Handle,
}

impl HttpFetcher {
    pub fn new(runtime: Handle) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("handoff/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Other(format!("failed to build http client: {e}")))?;
        Ok(Self { client, runtime })
    }

    /// Bind to the runtime of the calling context.
    pub fn current() -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Other(format!("no tokio runtime for http fetcher: {e}")))?;
        Self::new(runtime)
    }
}

impl FetchService for HttpFetcher {
    fn fetch(&self, identifier: &str) -> std::result::Result<Vec<u8>, FetchError> {
        debug!(identifier, "fetching");
        self.runtime.block_on(async {
            let response = self.client.get(identifier).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    identifier: identifier.to_string(),
                    status: status.as_u16(),
                });
            }
            Ok(response.bytes().await?.to_vec())
        })
    }
}
