//! Live campaign status shared with the control plane.

use std::sync::Mutex;

use serde::Serialize;

use crate::dispatch::{
    EngineState, FailedRecipient, ProgressEvent, ProgressObserver, RunSummary,
};

/// Status snapshot returned by `GET /campaign`.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignStatus {
    pub state: EngineState,
    pub total: usize,
    pub processed: usize,
    pub current: Option<String>,
    pub recent_sent: Vec<String>,
    pub recent_failed: Vec<FailedRecipient>,
    /// Final report, present once the run has ended
    pub summary: Option<RunSummary>,
    /// Run-level error, e.g. a failed setup check
    pub error: Option<String>,
}

impl CampaignStatus {
    fn new(total: usize) -> Self {
        Self {
            state: EngineState::Idle,
            total,
            processed: 0,
            current: None,
            recent_sent: Vec::new(),
            recent_failed: Vec::new(),
            summary: None,
            error: None,
        }
    }
}

/// Progress observer that keeps the latest status for polling clients.
#[derive(Debug)]
pub struct StatusBoard {
    inner: Mutex<CampaignStatus>,
}

impl StatusBoard {
    pub fn new(total: usize) -> Self {
        Self {
            inner: Mutex::new(CampaignStatus::new(total)),
        }
    }

    /// Current status with the engine state filled in.
    pub fn snapshot(&self, state: EngineState) -> CampaignStatus {
        let mut status = self.lock().clone();
        status.state = state;
        status
    }

    pub fn set_error(&self, error: String) {
        self.lock().error = Some(error);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CampaignStatus> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ProgressObserver for StatusBoard {
    fn on_progress(&self, event: &ProgressEvent) {
        let mut status = self.lock();
        status.total = event.total;
        status.processed = event.processed;
        status.current = Some(event.current.clone());
        status.recent_sent = event.recent_sent.clone();
        status.recent_failed = event.recent_failed.clone();
    }

    fn on_complete(&self, summary: &RunSummary) {
        self.lock().summary = Some(summary.clone());
    }
}
