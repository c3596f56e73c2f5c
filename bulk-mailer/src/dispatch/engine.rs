//! Campaign dispatch loop.
//!
//! ## States
//!
//! ```text
//! Idle → Running → Completed
//!                ↘ Cancelled
//! ```
//!
//! For every recipient the engine checks the cancellation flag, renders the
//! templates, builds the message, waits for a rate-limit permit, sends, and
//! records the outcome. A failed recipient never stops the run; only a
//! failed transport setup check does, and that happens before any row.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::{future, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::limiter::RateLimiter;
use super::outcome::{DispatchOutcome, Outcomes, RunSummary};
use super::progress::{ProgressEvent, ProgressObserver};
use crate::campaign::{Campaign, RecipientRow};
use crate::message::{build_message, Sender};
use crate::transport::{TransportClient, TransportError};

/// Number of recent sent/failed recipients carried by progress events.
pub const RECENT_TAIL: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

impl EngineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, EngineState::Completed | EngineState::Cancelled)
    }
}

/// Run-level failures. Per-recipient failures are outcomes, not errors.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("transport setup failed: {0}")]
    Setup(#[source] TransportError),

    #[error("engine is {0:?}; a run can only start from Idle")]
    NotIdle(EngineState),
}

/// State shared by everything taking part in one run: the rate limiter,
/// the cancellation flag and the outcome accumulators.
#[derive(Debug, Clone)]
pub struct RunContext {
    limiter: Arc<RateLimiter>,
    cancel: CancellationToken,
    outcomes: Arc<Mutex<Outcomes>>,
    concurrency: usize,
}

impl RunContext {
    pub fn new(rate_per_second: usize, concurrency: usize) -> Self {
        Self::with_limiter(RateLimiter::per_second(rate_per_second), concurrency)
    }

    pub fn with_limiter(limiter: RateLimiter, concurrency: usize) -> Self {
        Self {
            limiter: Arc::new(limiter),
            cancel: CancellationToken::new(),
            outcomes: Arc::new(Mutex::new(Outcomes::default())),
            concurrency: concurrency.max(1),
        }
    }

    /// Handle the controlling context uses to stop the run.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn request_cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Copy of the accumulated outcomes.
    pub fn outcomes(&self) -> Outcomes {
        self.lock_outcomes().clone()
    }

    async fn reset(&self) {
        self.lock_outcomes().clear();
        self.limiter.reset().await;
    }

    /// Record an outcome and notify the observer while holding the lock, so
    /// observers see a strictly increasing processed count.
    fn record(&self, outcome: DispatchOutcome, total: usize, observer: &dyn ProgressObserver) {
        let mut outcomes = self.lock_outcomes();
        let current = outcome.recipient().to_string();
        outcomes.record(outcome);

        let event = ProgressEvent {
            processed: outcomes.processed(),
            total,
            current,
            recent_sent: outcomes.recent_sent(RECENT_TAIL),
            recent_failed: outcomes.recent_failed(RECENT_TAIL),
        };
        observer.on_progress(&event);
    }

    fn lock_outcomes(&self) -> MutexGuard<'_, Outcomes> {
        self.outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Drives one campaign through the transport.
pub struct DispatchEngine {
    transport: Arc<dyn TransportClient>,
    sender: Sender,
    context: RunContext,
    observer: Arc<dyn ProgressObserver>,
    state: Mutex<EngineState>,
}

impl DispatchEngine {
    pub fn new(
        transport: Arc<dyn TransportClient>,
        sender: Sender,
        context: RunContext,
        observer: Arc<dyn ProgressObserver>,
    ) -> Self {
        Self {
            transport,
            sender,
            context,
            observer,
            state: Mutex::new(EngineState::Idle),
        }
    }

    pub fn state(&self) -> EngineState {
        *self.lock_state()
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// Ask the run to stop before its next recipient.
    pub fn request_cancel(&self) {
        info!(state = ?self.state(), "campaign_cancel_requested");
        self.context.request_cancel();
    }

    /// Dispatch every recipient of `campaign`.
    ///
    /// Recipients are attempted in table order when concurrency is 1. With a
    /// larger pool they start in order but may finish out of order.
    pub async fn run(&self, campaign: Campaign) -> Result<RunSummary, DispatchError> {
        let state = self.state();
        if state != EngineState::Idle {
            return Err(DispatchError::NotIdle(state));
        }

        if let Err(e) = self.transport.verify().await {
            error!(
                transport = self.transport.name(),
                code = %e.code(),
                error = %e,
                "campaign_setup_failed"
            );
            return Err(DispatchError::Setup(e));
        }

        self.transition(EngineState::Idle, EngineState::Running)?;
        self.context.reset().await;

        let total = campaign.len();
        info!(
            transport = self.transport.name(),
            recipients = total,
            rate_per_second = self.context.limiter.permits(),
            concurrency = self.context.concurrency,
            "campaign_started"
        );

        let recipients = campaign.recipients();
        let skipped = futures::stream::iter(0..total)
            .map(|i| self.process_row(&campaign, &recipients[i], total))
            .buffer_unordered(self.context.concurrency)
            .filter(|attempted| future::ready(!*attempted))
            .count()
            .await;

        let cancelled = skipped > 0;
        let final_state = if cancelled {
            EngineState::Cancelled
        } else {
            EngineState::Completed
        };
        self.transition(EngineState::Running, final_state)?;

        let summary = RunSummary::new(total, self.context.outcomes(), cancelled);
        self.observer.on_complete(&summary);

        info!(
            state = ?final_state,
            sent = summary.sent_count,
            failed = summary.failed_count,
            unprocessed = summary.unprocessed(),
            "campaign_finished"
        );

        Ok(summary)
    }

    /// Returns false when the row was skipped because of cancellation.
    async fn process_row(&self, campaign: &Campaign, row: &RecipientRow, total: usize) -> bool {
        if self.context.is_cancelled() {
            debug!(recipient = row.email(), "recipient_skipped_cancelled");
            return false;
        }

        let outcome = self.dispatch_one(campaign, row).await;
        self.context.record(outcome, total, self.observer.as_ref());
        true
    }

    async fn dispatch_one(&self, campaign: &Campaign, row: &RecipientRow) -> DispatchOutcome {
        let recipient = row.email().to_string();
        let content = campaign.render_for(row);

        let attachment = match (row.attachment(), campaign.attachments()) {
            (Some(name), Some(dir)) => dir.load(name).await,
            (Some(name), None) => {
                warn!(
                    recipient = %recipient,
                    filename = name,
                    "attachment_dir_not_configured"
                );
                None
            }
            (None, _) => None,
        };

        let message = match build_message(&self.sender, &recipient, &content, attachment) {
            Ok(message) => message,
            Err(e) => {
                warn!(recipient = %recipient, error = %e, "recipient_message_invalid");
                return DispatchOutcome::Failed {
                    recipient,
                    error: e.to_string(),
                };
            }
        };
        let raw = message.formatted();

        self.context.limiter.acquire().await;

        match self
            .transport
            .send(&self.sender.formatted(), &[recipient.clone()], &raw)
            .await
        {
            Ok(delivery_id) => {
                info!(
                    recipient = %recipient,
                    delivery_id = %delivery_id,
                    "recipient_sent"
                );
                DispatchOutcome::Sent {
                    recipient,
                    delivery_id,
                }
            }
            Err(e) => {
                error!(
                    recipient = %recipient,
                    code = %e.code(),
                    error = %e,
                    "recipient_failed"
                );
                DispatchOutcome::Failed {
                    recipient,
                    error: e.to_string(),
                }
            }
        }
    }

    fn transition(&self, from: EngineState, to: EngineState) -> Result<(), DispatchError> {
        let mut state = self.lock_state();
        if *state != from {
            return Err(DispatchError::NotIdle(*state));
        }
        debug!(from = ?from, to = ?to, "engine_transition");
        *state = to;
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
