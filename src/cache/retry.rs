//! Retrying Fetcher Module
//!
//! Runs a producer with bounded exponential-backoff retry.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

// == Retry Policy ==
/// How many times to retry and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; 0 means a single attempt
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each further retry
    pub base_backoff_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            base_backoff_ms,
        }
    }

    // == Backoff ==
    /// Delay after failed attempt number `attempt` (0-based): `base * 2^attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_backoff_ms.saturating_mul(factor))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_backoff_ms: 1000,
        }
    }
}

// == Fetch With Retry ==
/// Calls `producer` until it succeeds or the retries run out.
///
/// The error of the last attempt is returned as is. The producer is called
/// at most `max_retries + 1` times.
pub async fn fetch_with_retry<T, E, F, Fut>(mut producer: F, policy: RetryPolicy) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt: u32 = 0;

    loop {
        match producer().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_retries => {
                let delay = policy.backoff(attempt);
                warn!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Fetch failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                warn!(attempts = attempt + 1, error = %err, "Fetch failed, retries exhausted");
                return Err(err);
            }
        }
    }
}
