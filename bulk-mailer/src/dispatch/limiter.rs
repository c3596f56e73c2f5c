//! Rolling-window rate limiter.
//!
//! At most `permits` acquisitions succeed within any window. A caller that
//! finds the window full sleeps until the oldest permit ages out. Permits are
//! never returned: a failed send still used its slot with the provider.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Shared "N permits per rolling window" gate.
#[derive(Debug)]
pub struct RateLimiter {
    permits: usize,
    window: Duration,
    issued: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Limiter allowing `permits` acquisitions per `window` (at least one).
    pub fn new(permits: usize, window: Duration) -> Self {
        let permits = permits.max(1);
        Self {
            permits,
            window,
            issued: Mutex::new(VecDeque::with_capacity(permits)),
        }
    }

    /// Limiter allowing `rate` acquisitions per second.
    pub fn per_second(rate: usize) -> Self {
        Self::new(rate, Duration::from_secs(1))
    }

    pub fn permits(&self) -> usize {
        self.permits
    }

    /// Wait until a permit is available, then consume it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut issued = self.issued.lock().await;
                let now = Instant::now();

                while let Some(&oldest) = issued.front() {
                    if now.duration_since(oldest) >= self.window {
                        issued.pop_front();
                    } else {
                        break;
                    }
                }

                match issued.front() {
                    Some(&oldest) if issued.len() >= self.permits => {
                        self.window - now.duration_since(oldest)
                    }
                    _ => {
                        issued.push_back(now);
                        return;
                    }
                }
            };

            debug!(wait_ms = wait.as_millis() as u64, "rate_limit_wait");
            sleep(wait).await;
        }
    }

    /// Forget every issued permit.
    pub async fn reset(&self) {
        self.issued.lock().await.clear();
    }
}
