//! Bounded retry with exponential backoff, keyed on error kind.
//!
//! Only two kinds of upstream failure are retried:
//!
//! - **Rate limited** (HTTP 429): backoff of `base_delay * 2^attempt`, up to
//!   [`RetryConfig::max_rate_limit_attempts`] attempts.
//! - **Timeout** (transport timeout, HTTP 408/504): retried immediately, up to
//!   [`RetryConfig::max_timeout_attempts`] attempts.
//!
//! Everything else is logged and returned on the first failure. A single
//! attempt counter is shared by both kinds. When the budget runs out the
//! caller gets [`GatewayError::RetriesExhausted`] carrying the last error.

use crate::error::{GatewayError, ProviderError};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Retry classification of a [`ProviderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    RateLimited,
    Timeout,
    Other,
}

impl ErrorKind {
    pub fn of(error: &ProviderError) -> Self {
        match error {
            ProviderError::RateLimited { .. } => ErrorKind::RateLimited,
            ProviderError::Timeout(_) => ErrorKind::Timeout,
            _ => ErrorKind::Other,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::RateLimited => write!(f, "rate_limited"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Other => write!(f, "other"),
        }
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempt count at which rate limiting is considered exhausted.
    pub max_rate_limit_attempts: u32,
    /// Attempt count at which timeouts are considered exhausted.
    pub max_timeout_attempts: u32,
    /// Base of the exponential backoff, in milliseconds.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_rate_limit_attempts: 6,
            max_timeout_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    /// Same attempt limits, no sleeping between rate-limit retries.
    pub fn without_delay() -> Self {
        Self {
            base_delay_ms: 0,
            ..Default::default()
        }
    }

    /// Backoff before the retry that follows failure number `attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

/// Runs a unit of work, retrying transient failures per [`RetryConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute `work`, calling it again after each retryable failure.
    pub async fn execute<T, F, Fut>(&self, mut work: F) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let err = match work().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("Upstream call succeeded after {} retries", attempt);
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            let kind = err.kind();
            let limit = match kind {
                ErrorKind::RateLimited => self.config.max_rate_limit_attempts,
                ErrorKind::Timeout => self.config.max_timeout_attempts,
                ErrorKind::Other => {
                    error!("Upstream call failed (not retried): {err}");
                    return Err(GatewayError::Provider(err));
                }
            };

            attempt += 1;
            if attempt >= limit {
                warn!("Giving up after {attempt} attempt(s), last {kind} error: {err}");
                return Err(GatewayError::RetriesExhausted {
                    kind,
                    attempts: attempt,
                    last: err,
                });
            }

            if kind == ErrorKind::RateLimited {
                let delay = self.config.delay_for_attempt(attempt);
                warn!("Rate limited (attempt {attempt}/{limit}): {err}. Retrying in {delay:?}...");
                tokio::time::sleep(delay).await;
            } else {
                warn!("Timed out (attempt {attempt}/{limit}): {err}. Retrying now...");
            }
        }
    }
}
