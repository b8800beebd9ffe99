use std::{future::Future, time::Duration};

use tokio_retry::strategy::jitter;
use tracing::debug;

/// Explicit retry schedule for a single blocking call: up to `max_retries`
/// re-attempts, delays scaling ×3 from `base_delay` with a small random
/// jitter added. The wrapped operation's own error is returned unchanged
/// once the budget is exhausted.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if (attempt as usize) < self.max_retries => {
                    let backoff = self.base_delay * 3u32.saturating_pow(attempt);
                    debug!(attempt, error = %err, backoff_ms = backoff.as_millis() as u64, "retrying after failure");
                    tokio::time::sleep(backoff + jitter(Duration::from_millis(100))).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
