//! Retry logic with exponential backoff
//!
//! Retries are driven by an explicit [`RetryPolicy`] value rather than by error
//! propagation, so the number of attempts a check took is always observable in
//! its [`Retried`] result. Delays grow exponentially, are capped at
//! `max_delay`, and optionally carry jitter to avoid synchronized retries
//! against the same host.
//!
//! # Example
//!
//! ```no_run
//! use certkeeper::config::RetryConfig;
//! use certkeeper::retry::{IsRetryable, RetryPolicy, run_with_retry};
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() {
//! let policy = RetryPolicy::from_config(&RetryConfig::default());
//! let cancel = CancellationToken::new();
//! let outcome = run_with_retry(&policy, &cancel, || async {
//!     Ok::<_, MyError>(())
//! })
//! .await;
//! assert_eq!(outcome.attempts, 1);
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::CheckError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, connection resets, 5xx, rate limiting) return `true`.
/// Conclusive outcomes (404, malformed URL, cancellation) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for CheckError {
    fn is_retryable(&self) -> bool {
        match self {
            CheckError::Timeout => true,
            CheckError::Connect(_) => true,
            // 403 is retried before being recorded as blocked
            CheckError::Status(code) => matches!(code, 403 | 408 | 429 | 500..=599),
            CheckError::Request(_) => false,
            CheckError::Cancelled => false,
        }
    }
}

/// Backoff schedule consulted between attempts
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
    jitter: bool,
}

impl RetryPolicy {
    /// Build a policy from configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: config.initial_delay,
            max_delay: config.max_delay,
            backoff_multiplier: config.backoff_multiplier.max(1.0),
            jitter: config.jitter,
        }
    }

    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    /// Total attempts allowed, first attempt included
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Whether another attempt may follow the `attempt`-th (1-based) failure
    pub fn should_retry<E: IsRetryable>(&self, attempt: u32, error: &E) -> bool {
        error.is_retryable() && attempt <= self.max_retries
    }

    /// Un-jittered delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Delay actually slept before retry number `retry`, jitter applied
    pub fn sleep_for(&self, retry: u32) -> Duration {
        let delay = self.delay_for(retry);
        if self.jitter { add_jitter(delay) } else { delay }
    }
}

/// Outcome of an operation run under a [`RetryPolicy`]
#[derive(Debug)]
pub struct Retried<T, E> {
    /// Final result (success or the last error)
    pub result: Result<T, E>,
    /// Attempts made, first attempt included
    pub attempts: u32,
}

/// Execute an async operation under `policy`
///
/// The loop stops on success, on a non-retryable error, when retries are
/// exhausted, or when `cancel` fires (pending sleeps are interrupted).
pub async fn run_with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Retried<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(attempts = attempt, "Operation succeeded after retry");
                }
                return Retried {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(e) if policy.should_retry(attempt, &e) && !cancel.is_cancelled() => {
                let delay = policy.sleep_for(attempt);
                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = policy.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "Request failed, retrying"
                );

                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Retried { result: Err(e), attempts: attempt };
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::debug!(
                        error = %e,
                        attempts = attempt,
                        "Request failed after all retry attempts exhausted"
                    );
                }
                return Retried {
                    result: Err(e),
                    attempts: attempt,
                };
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay, so the
/// actual delay lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
