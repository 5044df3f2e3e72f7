//! Retry with exponential backoff for provider calls

use super::report::FailureKind;
use crate::provider::ProviderError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 200,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Never retry
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Retry without sleeping in between
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_ms = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let delay_ms = delay_ms.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(delay_ms as u64)
    }

    /// Run `operation` until it succeeds, fails permanently, or the retry
    /// budget is spent. Exhausting the budget escalates to a fatal failure.
    pub async fn run<T, F, Fut>(&self, what: &str, mut operation: F) -> Result<T, FailureKind>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(ProviderError::Permanent(message)) => {
                    return Err(FailureKind::Permanent { message })
                }
                Err(ProviderError::Transient(message)) => {
                    if attempt >= self.max_retries {
                        tracing::error!(
                            "{} failed after {} attempts: {}",
                            what,
                            attempt + 1,
                            message
                        );
                        return Err(FailureKind::RetriesExhausted {
                            attempts: attempt + 1,
                            message,
                        });
                    }
                    let delay = self.delay_for_attempt(attempt);
                    tracing::warn!(
                        "{} failed transiently ({}), retry {}/{} in {:?}",
                        what,
                        message,
                        attempt + 1,
                        self.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
