//! Batch download: one unit per identifier, rendered as each one lands.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::engine::{GroupHandler, GroupInfo, SinkState};
use crate::error::UnitFailure;
use crate::model::{GroupSummary, UnitReport, WorkUnit};
use crate::service::{FetchService, format_timestamp};

use super::Job;

/// Fetches every identifier in order and renders the payloads on the sink.
pub struct FetchJob {
    identifiers: Vec<String>,
    fetcher: Arc<dyn FetchService>,
    placeholder: Option<Arc<[u8]>>,
}

impl FetchJob {
    pub fn new(identifiers: Vec<String>, fetcher: Arc<dyn FetchService>) -> Self {
        Self {
            identifiers,
            fetcher,
            placeholder: None,
        }
    }

    /// Render `payload` in place of units that failed to fetch.
    pub fn with_placeholder(mut self, payload: impl Into<Arc<[u8]>>) -> Self {
        self.placeholder = Some(payload.into());
        self
    }

    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }
}

impl std::fmt::Debug for FetchJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchJob")
            .field("identifiers", &self.identifiers)
            .field("placeholder", &self.placeholder.as_ref().map(|p| p.len()))
            .finish_non_exhaustive()
    }
}

impl Job<Vec<u8>> for FetchJob {
    fn name(&self) -> &str {
        "fetch"
    }

    fn build(&self) -> Vec<WorkUnit<Vec<u8>>> {
        self.identifiers
            .iter()
            .enumerate()
            .map(|(index, identifier)| {
                debug!(unit = index, identifier = %identifier, "queued for download");
                let identifier = identifier.clone();
                let fetcher = Arc::clone(&self.fetcher);
                WorkUnit::new(index, move || {
                    fetcher.fetch(&identifier).map_err(UnitFailure::from)
                })
            })
            .collect()
    }
}

impl GroupHandler<Vec<u8>> for FetchJob {
    fn on_group_start(&self, state: &mut SinkState, group: &GroupInfo) {
        state.start_progress(group.id, group.total);
        let started = state.mark_fetch_started();
        info!(
            group = %group.id,
            total = group.total,
            at = %format_timestamp(&started),
            "fetch started"
        );
    }

    fn on_unit_done(&self, state: &mut SinkState, report: UnitReport<Vec<u8>>) {
        state.advance_progress(report.group);
        let tag = report.unit.to_string();
        match report.result {
            Ok(payload) => {
                info!(group = %report.group, unit = %report.unit, bytes = payload.len(), "downloaded");
                state.render(report.group, &payload, &tag, false);
            }
            Err(failure) => {
                warn!(group = %report.group, unit = %report.unit, %failure, "download failed");
                if let Some(placeholder) = &self.placeholder {
                    state.render(report.group, placeholder, &tag, true);
                }
            }
        }
    }

    fn on_group_done(&self, state: &mut SinkState, summary: &GroupSummary) {
        let finished = state.mark_fetch_finished();
        info!(
            group = %summary.group,
            succeeded = summary.succeeded,
            failed = summary.failed,
            at = %format_timestamp(&finished),
            "fetch finished"
        );
    }
}
