//! Retry with exponential backoff.
//!
//! A retry sequence is an explicit state machine:
//!
//! ```text
//! Attempt(n) --ok--> return value
//! Attempt(n) --err, transient, budget left--> Backoff(n, delay) --sleep--> Attempt(n + 1)
//! Attempt(n) --err, transient, budget spent--> Exhausted
//! Attempt(n) --err, permanent--> Rejected
//! ```
//!
//! The transition function [`RetryExecutor::after_failure`] is pure, so each
//! state can be tested without running the async loop.

use crate::backoff::{backoff_delay, can_retry};
use crate::classify::ErrorClassifier;
use crate::config::RetryConfig;
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Share of the backoff delay that jitter may add on top.
const MAX_JITTER: f64 = 0.25;

/// Position of a retry sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryState<E> {
    /// Run the operation; `attempt` counts retries so far (0 = first call).
    Attempt {
        /// Retries performed before this attempt.
        attempt: u32,
    },
    /// Sleep, then run attempt `attempt + 1`.
    Backoff {
        /// The attempt that just failed.
        attempt: u32,
        /// Delay before the next attempt, without jitter.
        delay: Duration,
        /// Error of the failed attempt.
        last_error: E,
    },
    /// Transient failure with no retries left.
    Exhausted {
        /// Total number of calls made.
        attempts: u32,
        /// Error of the final attempt.
        last_error: E,
    },
    /// Permanent failure; the remaining budget was not used.
    Rejected {
        /// Total number of calls made.
        attempts: u32,
        /// The permanent error.
        error: E,
    },
}

/// Runs async operations with retry and backoff.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Creates an executor with the given configuration.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns the retry configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Retries on every failure until the budget is spent.
    ///
    /// The operation is called at most `max_retries + 1` times; the last
    /// error is returned on exhaustion.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.execute_if(operation, &|_: &E| true).await
    }

    /// Retries only failures that `classifier` reports as transient.
    ///
    /// A permanent failure is returned immediately, without sleeping.
    pub async fn execute_if<F, Fut, T, E, C>(&self, mut operation: F, classifier: &C) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        C: ErrorClassifier<E> + ?Sized,
    {
        let mut state = RetryState::Attempt { attempt: 0 };

        loop {
            state = match state {
                RetryState::Attempt { attempt } => match operation().await {
                    Ok(value) => return Ok(value),
                    Err(err) => {
                        let retryable = classifier.is_retryable(&err);
                        self.after_failure(attempt, err, retryable)
                    }
                },
                RetryState::Backoff {
                    attempt,
                    delay,
                    last_error,
                } => {
                    let delay = self.jittered(delay);
                    debug!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %last_error,
                        "retrying after transient error"
                    );
                    drop(last_error);
                    tokio::time::sleep(delay).await;
                    RetryState::Attempt {
                        attempt: attempt + 1,
                    }
                }
                RetryState::Exhausted {
                    attempts,
                    last_error,
                } => {
                    warn!(
                        attempts,
                        max_retries = self.config.max_retries,
                        error = %last_error,
                        "retries exhausted"
                    );
                    return Err(last_error);
                }
                RetryState::Rejected { attempts, error } => {
                    debug!(attempts, error = %error, "non-retryable error, giving up");
                    return Err(error);
                }
            };
        }
    }

    /// Transition taken when attempt number `attempt` fails.
    pub fn after_failure<E>(&self, attempt: u32, error: E, retryable: bool) -> RetryState<E> {
        if !retryable {
            return RetryState::Rejected {
                attempts: attempt + 1,
                error,
            };
        }

        if can_retry(attempt, self.config.max_retries) {
            RetryState::Backoff {
                attempt,
                delay: backoff_delay(i64::from(attempt), &self.config),
                last_error: error,
            }
        } else {
            RetryState::Exhausted {
                attempts: attempt + 1,
                last_error: error,
            }
        }
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.config.jitter || delay.is_zero() {
            return delay;
        }
        let extra = rand::thread_rng().gen_range(0.0..MAX_JITTER);
        delay.mul_f64(1.0 + extra)
    }
}
