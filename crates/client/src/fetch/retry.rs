//! Bounded retry with exponential backoff.

use std::time::Duration;

use barrio_core::Error;
use barrio_core::config::RetryConfig;

use super::{FetchResponse, Fetcher};

/// How many times to retry and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Cap for a single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Request-time policy from configuration.
    pub fn request(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Install-time policy: priority 1 gets two retries, lower priorities one.
    pub fn precache(config: &RetryConfig, priority: u32) -> Self {
        Self {
            max_retries: 3u32.saturating_sub(priority).max(1),
            base_delay: Duration::from_millis(config.precache_base_delay_ms),
            max_delay: Duration::MAX,
        }
    }

    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self { max_retries: 0, base_delay: Duration::ZERO, max_delay: Duration::ZERO }
    }

    /// Delay after failed attempt number `attempt` (0-based): `min(base * 2^attempt, max)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Fetch `url`, retrying on any failure. Returns the last error once the
/// budget is spent.
pub async fn fetch_with_retry(
    fetcher: &dyn Fetcher, url: &url::Url, policy: RetryPolicy,
) -> Result<FetchResponse, Error> {
    let mut attempt = 0;
    loop {
        match fetcher.fetch(url).await {
            Ok(response) => return Ok(response),
            Err(e) if attempt < policy.max_retries => {
                let delay = policy.delay(attempt);
                tracing::debug!(url = %url, attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying fetch");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
