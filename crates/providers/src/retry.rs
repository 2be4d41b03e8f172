//! Bounded retry around a single provider.
//!
//! Transient failures (rate limits, timeouts, network errors, 5xx) are retried
//! with exponential backoff up to a fixed number of attempts. Anything else is
//! returned on the first failure.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use toolrelay_core::error::ProviderError;
use toolrelay_core::provider::*;
use tracing::{info, warn};

/// Upper bound on any single backoff sleep.
const MAX_DELAY: Duration = Duration::from_secs(30);

/// A provider that retries transient failures of an inner provider.
pub struct RetryProvider {
    inner: Arc<dyn Provider>,
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryProvider {
    /// Wrap `inner`, making at most `max_attempts` calls per request.
    pub fn new(inner: Arc<dyn Provider>, max_attempts: u32) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(500),
        }
    }

    /// Set the delay before the second attempt (doubled on each further one).
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn delay_for(&self, attempt: u32, error: &ProviderError) -> Duration {
        let backoff = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let delay = match error {
            ProviderError::RateLimited { retry_after_secs } => {
                backoff.max(Duration::from_secs(*retry_after_secs))
            }
            _ => backoff,
        };
        delay.min(MAX_DELAY)
    }
}

#[async_trait]
impl Provider for RetryProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let mut attempt = 1;
        loop {
            match self.inner.complete(request.clone()).await {
                Ok(response) => {
                    if attempt > 1 {
                        info!(provider = %self.inner.name(), attempt, "Retry: provider recovered");
                    }
                    return Ok(response);
                }
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt, &e);
                    warn!(
                        provider = %self.inner.name(),
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retry: transient provider failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        self.inner.health_check().await
    }
}
