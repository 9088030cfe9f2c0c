//! Bounded exponential backoff for cheap, idempotent upstream calls.
//!
//! Only metadata and link-resolution calls go through here. The byte relay is
//! never retried: a second read against a throttled account doubles the
//! bandwidth spent for nothing.
//!
//! Delays follow `base_delay * 2^(attempt - 1) + jitter`, so with defaults the
//! waits are roughly 2s, 4s, 8s and 16s before the fifth and final attempt.

use std::future::Future;
use std::time::Duration;

use mediarelay_common::{Error, Result};
use rand::Rng;

use crate::config::RetryConfig;

/// Default maximum attempts (including the first).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_MAX_JITTER: Duration = Duration::from_secs(1);

/// Decision on whether to try a failed operation again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after `delay`; `attempt` is the 1-indexed number of the next try.
    Retry { delay: Duration, attempt: u32 },
    /// Give up and surface the error.
    DoNotRetry { reason: String },
}

/// Backoff settings.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, max_jitter: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_jitter,
        }
    }

    /// Default delays with a lower attempt ceiling.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// A policy that never waits; used by callers that must fail fast.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_jitter_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decide what to do after `attempt` (1-indexed) failed with `err`.
    pub fn should_retry(&self, err: &Error, attempt: u32) -> RetryDecision {
        if !err.is_retryable() {
            return RetryDecision::DoNotRetry {
                reason: format!("{} is not retryable", err.code()),
            };
        }

        if attempt >= self.max_attempts {
            tracing::debug!(attempt, max = self.max_attempts, "Max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        RetryDecision::Retry {
            delay: self.backoff(attempt) + self.jitter(),
            attempt: attempt + 1,
        }
    }

    /// Deterministic part of the delay after `attempt` failed.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the policy
/// runs out of attempts. The last error is returned unchanged.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(op = op_name, attempt, "Upstream call recovered after retry");
                }
                return Ok(value);
            }
            Err(err) => match policy.should_retry(&err, attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next,
                } => {
                    tracing::warn!(
                        op = op_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient upstream failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::DoNotRetry { reason } => {
                    tracing::debug!(op = op_name, attempt, %reason, "Not retrying");
                    return Err(err);
                }
            },
        }
    }
}
