//! Exponential backoff policy.
//!
//! Pure functions: the same inputs always give the same delay. Jitter, when
//! enabled, is added by the retry executor on top of these values.

use crate::config::RetryConfig;
use std::time::Duration;

/// Computes the delay before retry number `attempt` (0-indexed).
///
/// The delay is `initial_delay * backoff_factor^attempt`, capped at
/// `max_delay`. Negative attempts are treated as zero.
///
/// # Example
///
/// ```rust
/// use notesync_engine::{backoff_delay, RetryConfig};
/// use std::time::Duration;
///
/// let config = RetryConfig::default();
/// assert_eq!(backoff_delay(2, &config), Duration::from_millis(4000));
/// assert_eq!(backoff_delay(10, &config), Duration::from_millis(10_000));
/// ```
pub fn backoff_delay(attempt: i64, config: &RetryConfig) -> Duration {
    let attempt = attempt.clamp(0, i64::from(i32::MAX)) as i32;
    let initial = config.initial_delay.as_secs_f64();
    let max = config.max_delay.as_secs_f64();

    let raw = initial * config.backoff_factor.powi(attempt);
    // powi overflows to infinity (or NaN for 0 * inf) on large attempts
    let secs = if raw.is_finite() { raw.min(max) } else { max };

    Duration::from_secs_f64(secs.max(0.0))
}

/// Returns true while `retry_count` is below `max_retries`.
pub fn can_retry(retry_count: u32, max_retries: u32) -> bool {
    retry_count < max_retries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn default_sequence() {
        let config = RetryConfig::default();
        let delays: Vec<_> = (0..5).map(|a| backoff_delay(a, &config)).collect();
        assert_eq!(delays, vec![ms(1000), ms(2000), ms(4000), ms(8000), ms(10_000)]);
    }

    #[test]
    fn negative_attempt_uses_initial_delay() {
        let config = RetryConfig::default();
        assert_eq!(backoff_delay(-1, &config), ms(1000));
        assert_eq!(backoff_delay(i64::MIN, &config), ms(1000));
    }

    #[test]
    fn huge_attempt_is_capped() {
        let config = RetryConfig::default();
        assert_eq!(backoff_delay(i64::MAX, &config), ms(10_000));
        assert_eq!(backoff_delay(5000, &config), ms(10_000));
    }

    #[test]
    fn never_exceeds_max_and_never_shrinks() {
        let config = RetryConfig::new(10)
            .with_initial_delay(ms(250))
            .with_max_delay(ms(7000))
            .with_backoff_factor(3.0);

        let mut previous = Duration::ZERO;
        for attempt in 0..40 {
            let delay = backoff_delay(attempt, &config);
            assert!(delay <= ms(7000));
            assert!(delay >= previous);
            previous = delay;
        }
    }

    #[test]
    fn factor_one_is_constant() {
        let config = RetryConfig::default().with_backoff_factor(1.0);
        for attempt in 0..10 {
            assert_eq!(backoff_delay(attempt, &config), ms(1000));
        }
    }

    #[test]
    fn can_retry_boundaries() {
        assert!(can_retry(0, 3));
        assert!(can_retry(2, 3));
        assert!(!can_retry(3, 3));
        assert!(!can_retry(0, 0));
    }
}
