//! Configuration for the sync engine.

use std::time::Duration;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum number of changes requested per pull.
    pub pull_batch_size: u32,
    /// Retry configuration applied to push and pull calls.
    pub retry: RetryConfig,
    /// How long a success status stays visible before reverting to idle.
    pub success_reset_delay: Duration,
    /// Interval for periodic sync, if any.
    pub sync_interval: Option<Duration>,
    /// Initial value of the user-facing auto-sync toggle.
    pub auto_sync_enabled: bool,
}

impl SyncConfig {
    /// Creates a configuration with the default values.
    pub fn new() -> Self {
        Self {
            pull_batch_size: 100,
            retry: RetryConfig::default(),
            success_reset_delay: Duration::from_millis(3000),
            sync_interval: None,
            auto_sync_enabled: true,
        }
    }

    /// Sets the pull batch size.
    pub fn with_pull_batch_size(mut self, size: u32) -> Self {
        self.pull_batch_size = size.max(1);
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets how long a success status is shown.
    pub fn with_success_reset_delay(mut self, delay: Duration) -> Self {
        self.success_reset_delay = delay;
        self
    }

    /// Sets the sync interval for periodic sync.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Sets the initial auto-sync toggle.
    pub fn with_auto_sync(mut self, enabled: bool) -> Self {
        self.auto_sync_enabled = enabled;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for retry behavior.
///
/// With the defaults a failing call is attempted four times in total,
/// waiting 1s, 2s and 4s between attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Multiplier applied per retry.
    pub backoff_factor: f64,
    /// Whether the executor adds up to 25% random jitter to each delay.
    pub jitter: bool,
}

impl RetryConfig {
    /// Creates a retry configuration with the given retry budget.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            backoff_factor: 2.0,
            jitter: false,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_factor: 1.0,
            jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff factor.
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `attempt` (0-indexed), without jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        crate::backoff::backoff_delay(i64::from(attempt), self)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}
