//! Bounded retry with randomized exponential backoff.
//!
//! A [`RetryPolicy`] is a value: attempt cap, [`Backoff`] curve and a
//! retryable-error predicate. It is applied at the call site around a single
//! outbound call:
//!
//! ```rust,ignore
//! let reply = policy.run("disambiguation", || chat.complete(&request)).await?;
//! ```
//!
//! The delay before attempt `n + 1` is drawn uniformly from
//! `[0, min(max_delay, multiplier * 2^(n-1))]`.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::LlmError;

/// Default number of attempts (first call included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Randomized exponential backoff curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Base delay, doubled on each failed attempt.
    pub multiplier: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            multiplier: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl Backoff {
    /// Upper bound of the delay that follows failed attempt `attempt` (1-based).
    #[must_use]
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let exponent = f64::from(attempt.saturating_sub(1).min(63));
        let secs = self.multiplier.as_secs_f64() * 2f64.powf(exponent);
        Duration::try_from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
            .unwrap_or(self.max_delay)
    }

    /// Draw the delay that follows failed attempt `attempt`.
    pub fn delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let ceiling = self.ceiling(attempt);
        if ceiling.is_zero() {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(rng.gen_range(0.0..=ceiling.as_secs_f64()))
            .unwrap_or(ceiling)
    }
}

/// Retry policy for a fallible async operation.
pub struct RetryPolicy<E> {
    max_attempts: u32,
    backoff: Backoff,
    retryable: fn(&E) -> bool,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            retryable: self.retryable,
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl<E: fmt::Display> RetryPolicy<E> {
    /// Create a policy. `max_attempts` is clamped to at least one.
    #[must_use]
    pub fn new(max_attempts: u32, backoff: Backoff, retryable: fn(&E) -> bool) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            retryable,
        }
    }

    /// Total number of attempts, the first call included.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff curve used between attempts.
    #[must_use]
    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Run `call` until it succeeds, fails with a non-retryable error, or
    /// the attempt cap is reached. The last error is returned on exhaustion.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && (self.retryable)(&e) => {
                    let delay = self.backoff.delay(attempt, &mut rand::thread_rng());
                    tracing::warn!(
                        name: "llm.retry",
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if (self.retryable)(&e) {
                        tracing::error!(
                            name: "llm.retry.exhausted",
                            operation,
                            attempts = attempt,
                            error = %e,
                            "Giving up after repeated transient failures"
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}

impl RetryPolicy<LlmError> {
    /// Policy that retries [`LlmError::is_transient`] failures.
    #[must_use]
    pub fn transient(max_attempts: u32, backoff: Backoff) -> Self {
        Self::new(max_attempts, backoff, LlmError::is_transient)
    }
}

impl Default for RetryPolicy<LlmError> {
    fn default() -> Self {
        Self::transient(DEFAULT_MAX_ATTEMPTS, Backoff::default())
    }
}
