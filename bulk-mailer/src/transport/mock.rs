//! Recording transport for tests.
//!
//! Every attempt is kept, raw message included, and failures can be
//! scripted per recipient.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};
use tracing::info;

use super::{TransportClient, TransportError};

/// One recorded send attempt.
#[derive(Debug, Clone)]
pub struct SendAttempt {
    pub source: String,
    pub destinations: Vec<String>,
    pub raw_message: Vec<u8>,
    pub at: Instant,
}

/// Transport that never leaves the process.
#[derive(Debug, Default)]
pub struct MockTransport {
    attempts: Mutex<Vec<SendAttempt>>,
    failures: HashMap<String, TransportError>,
    verify_error: Option<TransportError>,
    latency: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every send addressed to `recipient` with `error`.
    pub fn fail_for(mut self, recipient: impl Into<String>, error: TransportError) -> Self {
        self.failures.insert(recipient.into(), error);
        self
    }

    /// Make the setup check fail.
    pub fn fail_verify(mut self, error: TransportError) -> Self {
        self.verify_error = Some(error);
        self
    }

    /// Simulated network latency per send.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn attempts(&self) -> Vec<SendAttempt> {
        self.lock().clone()
    }

    /// First destination of every attempt, in attempt order.
    pub fn attempted_recipients(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|a| a.destinations.first().cloned())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SendAttempt>> {
        self.attempts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl TransportClient for MockTransport {
    async fn verify(&self) -> Result<(), TransportError> {
        match &self.verify_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn send(
        &self,
        source: &str,
        destinations: &[String],
        raw_message: &[u8],
    ) -> Result<String, TransportError> {
        let sequence = {
            let mut attempts = self.lock();
            attempts.push(SendAttempt {
                source: source.to_string(),
                destinations: destinations.to_vec(),
                raw_message: raw_message.to_vec(),
                at: Instant::now(),
            });
            attempts.len()
        };

        if let Some(latency) = self.latency {
            sleep(latency).await;
        }

        if let Some(err) = destinations.iter().find_map(|d| self.failures.get(d)) {
            return Err(err.clone());
        }

        let delivery_id = format!("mock-{:06}", sequence);
        info!(
            destinations = ?destinations,
            delivery_id = %delivery_id,
            raw_length = raw_message.len(),
            "mock_send"
        );
        Ok(delivery_id)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_attempts() {
        let transport = MockTransport::new();
        let id = transport
            .send("team@example.com", &["ann@example.com".to_string()], b"raw")
            .await
            .unwrap();

        assert_eq!(id, "mock-000001");
        assert_eq!(transport.attempted_recipients(), vec!["ann@example.com"]);
        assert_eq!(transport.attempts()[0].raw_message, b"raw");
    }

    #[tokio::test]
    async fn test_mock_scripted_failure_still_recorded() {
        let transport = MockTransport::new().fail_for(
            "bad@example.com",
            TransportError::Network("connection reset".to_string()),
        );
        let err = transport
            .send("team@example.com", &["bad@example.com".to_string()], b"raw")
            .await
            .unwrap_err();

        assert_eq!(err, TransportError::Network("connection reset".to_string()));
        assert_eq!(transport.attempts().len(), 1);
    }
}
