//! Transport behind the CLI `--dry-run` flag.
//!
//! Nothing leaves the process and nothing is retained: each message is
//! logged and answered with a synthetic delivery id.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::info;

use super::{TransportClient, TransportError};

#[derive(Debug, Default)]
pub struct DryRunTransport {
    sent: AtomicUsize,
}

impl DryRunTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages accepted so far.
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TransportClient for DryRunTransport {
    async fn verify(&self) -> Result<(), TransportError> {
        info!("dry_run_verify");
        Ok(())
    }

    async fn send(
        &self,
        source: &str,
        destinations: &[String],
        raw_message: &[u8],
    ) -> Result<String, TransportError> {
        let sequence = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
        let delivery_id = format!("dry-run-{:06}", sequence);
        info!(
            source = source,
            destinations = ?destinations,
            delivery_id = %delivery_id,
            raw_length = raw_message.len(),
            "dry_run_send"
        );
        Ok(delivery_id)
    }

    fn name(&self) -> &'static str {
        "dry-run"
    }
}
