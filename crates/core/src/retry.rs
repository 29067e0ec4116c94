use crate::error::ServiceError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_RETRIES: u32 = 2;
pub const DEFAULT_BACKOFF_MS: u64 = 250;

/// Bounded retry for transient service failures; delay doubles per attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
    }

    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let mut retry = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && retry < self.max_retries => {
                    retry += 1;
                    let delay = self.delay_for(retry);
                    warn!(
                        operation,
                        attempt = retry,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "transient service failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
