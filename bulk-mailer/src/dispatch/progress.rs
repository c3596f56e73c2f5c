//! Progress reporting.
//!
//! Observers are called synchronously from the dispatch loop, so they must
//! return quickly.

use serde::Serialize;
use tracing::info;

use super::outcome::{FailedRecipient, RunSummary};

/// Snapshot emitted after each processed recipient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub processed: usize,
    pub total: usize,
    pub current: String,
    pub recent_sent: Vec<String>,
    pub recent_failed: Vec<FailedRecipient>,
}

pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);

    fn on_complete(&self, summary: &RunSummary);
}

/// Observer that writes the live tally to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ProgressObserver for LogObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        info!(
            processed = event.processed,
            total = event.total,
            current = %event.current,
            recent_failed = event.recent_failed.len(),
            "campaign_progress"
        );
    }

    fn on_complete(&self, summary: &RunSummary) {
        info!(
            sent = summary.sent_count,
            failed = summary.failed_count,
            cancelled = summary.cancelled,
            "campaign_summary"
        );
    }
}
