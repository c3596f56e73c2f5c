//! Per-recipient outcomes and the run summary.

use serde::Serialize;

/// Result of one recipient's dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Sent { recipient: String, delivery_id: String },
    Failed { recipient: String, error: String },
}

impl DispatchOutcome {
    pub fn recipient(&self) -> &str {
        match self {
            DispatchOutcome::Sent { recipient, .. } | DispatchOutcome::Failed { recipient, .. } => {
                recipient
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentRecipient {
    pub email: String,
    pub delivery_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedRecipient {
    pub email: String,
    pub error: String,
}

/// Ordered sent/failed accumulators for one run.
#[derive(Debug, Clone, Default)]
pub struct Outcomes {
    pub sent: Vec<SentRecipient>,
    pub failed: Vec<FailedRecipient>,
}

impl Outcomes {
    pub fn record(&mut self, outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::Sent {
                recipient,
                delivery_id,
            } => self.sent.push(SentRecipient {
                email: recipient,
                delivery_id,
            }),
            DispatchOutcome::Failed { recipient, error } => self.failed.push(FailedRecipient {
                email: recipient,
                error,
            }),
        }
    }

    pub fn processed(&self) -> usize {
        self.sent.len() + self.failed.len()
    }

    /// Addresses of the last `n` sent recipients.
    pub fn recent_sent(&self, n: usize) -> Vec<String> {
        let start = self.sent.len().saturating_sub(n);
        self.sent[start..].iter().map(|s| s.email.clone()).collect()
    }

    /// The last `n` failures.
    pub fn recent_failed(&self, n: usize) -> Vec<FailedRecipient> {
        let start = self.failed.len().saturating_sub(n);
        self.failed[start..].to_vec()
    }

    pub fn clear(&mut self) {
        self.sent.clear();
        self.failed.clear();
    }
}

/// Final report of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub sent_count: usize,
    pub failed_count: usize,
    pub cancelled: bool,
    pub sent: Vec<SentRecipient>,
    pub failed: Vec<FailedRecipient>,
}

impl RunSummary {
    pub fn new(total: usize, outcomes: Outcomes, cancelled: bool) -> Self {
        Self {
            total,
            sent_count: outcomes.sent.len(),
            failed_count: outcomes.failed.len(),
            cancelled,
            sent: outcomes.sent,
            failed: outcomes.failed,
        }
    }

    /// Recipients never attempted because the run was cancelled.
    pub fn unprocessed(&self) -> usize {
        self.total - self.sent_count - self.failed_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sent(email: &str) -> DispatchOutcome {
        DispatchOutcome::Sent {
            recipient: email.to_string(),
            delivery_id: format!("id-{email}"),
        }
    }

    #[test]
    fn test_recent_tails_are_bounded() {
        let mut outcomes = Outcomes::default();
        for i in 0..15 {
            outcomes.record(sent(&format!("r{i}@x.com")));
        }
        outcomes.record(DispatchOutcome::Failed {
            recipient: "bad@x.com".to_string(),
            error: "rejected".to_string(),
        });

        let recent = outcomes.recent_sent(10);
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0], "r5@x.com");
        assert_eq!(recent[9], "r14@x.com");
        assert_eq!(outcomes.recent_failed(10).len(), 1);
        assert_eq!(outcomes.processed(), 16);
    }

    #[test]
    fn test_summary_counts() {
        let mut outcomes = Outcomes::default();
        outcomes.record(sent("a@x.com"));
        outcomes.record(DispatchOutcome::Failed {
            recipient: "b@x.com".to_string(),
            error: "boom".to_string(),
        });

        let summary = RunSummary::new(5, outcomes, true);
        assert_eq!(summary.sent_count, 1);
        assert_eq!(summary.failed_count, 1);
        assert_eq!(summary.unprocessed(), 3);
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(sent("a@x.com")).unwrap();
        assert_eq!(json["status"], "sent");
        assert_eq!(json["recipient"], "a@x.com");
        assert_eq!(json["delivery_id"], "id-a@x.com");
    }
}
