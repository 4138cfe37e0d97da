//! Schema initialization with exponential backoff retry.
//!
//! Runs once at enable time. Transient failures (database still starting,
//! network blip) are retried; anything else fails immediately.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::infrastructure::ports::{PlaytimeRepo, RepoError};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries, just the initial attempt)
    pub max_retries: u32,
    /// Base delay in milliseconds before first retry
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds (caps exponential growth)
    pub max_delay_ms: u64,
    /// Jitter factor (0.0-1.0) applied around each delay
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_delay_ms: 500,
            max_delay_ms: 8000,
            jitter_factor: 0.2,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
        let capped = exponential.min(self.max_delay_ms);

        let jitter_range = (capped as f64 * self.jitter_factor) as i64;
        let millis = if jitter_range > 0 {
            let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
            (capped as i64 + jitter).max(0) as u64
        } else {
            capped
        };
        Duration::from_millis(millis)
    }
}

pub struct InitializeSchema {
    repo: Arc<dyn PlaytimeRepo>,
    retry: RetryConfig,
}

impl InitializeSchema {
    pub fn new(repo: Arc<dyn PlaytimeRepo>, retry: RetryConfig) -> Self {
        Self { repo, retry }
    }

    pub async fn execute(&self) -> Result<(), RepoError> {
        let mut attempt = 0;
        loop {
            match self.repo.ensure_schema().await {
                Ok(()) => {
                    if attempt > 0 {
                        tracing::info!(attempts = attempt + 1, "Schema ready after retry");
                    }
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        attempt,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Schema initialization failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!(attempts = attempt + 1, error = %e, "Schema initialization failed");
                    return Err(e);
                }
            }
        }
    }
}
