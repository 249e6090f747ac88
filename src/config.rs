//! Poll and retry settings
//!
//! Defaults come from `constants`; the builder methods exist so tests and
//! embedders can shorten the interval or the backoff.

use crate::{
    constants::{INITIAL_BACKOFF_MS, MAX_BACKOFF_MS, MAX_RETRIES, REFETCH_INTERVAL_SECS},
    error::FetchError,
};
use std::time::Duration;

/// Retry policy applied by the poll controller after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Automatic retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Decides whether to retry after `failures_so_far` previous failures
    /// (zero on the first failure).
    pub fn should_retry(&self, failures_so_far: u32, error: &FetchError) -> bool {
        if error.is_rate_limited() {
            return false;
        }
        failures_so_far < self.max_retries
    }

    /// Delay before retry number `retry` (zero-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
        }
    }
}

/// Settings for the poll controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Time between automatic refetches
    pub refetch_interval: Duration,
    pub retry: RetryPolicy,
}

impl PollConfig {
    pub fn with_refetch_interval(mut self, interval: Duration) -> Self {
        self.refetch_interval = interval;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Age after which cached data counts as stale for health checks
    pub fn stale_after(&self) -> Duration {
        self.refetch_interval * 2
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            refetch_interval: Duration::from_secs(REFETCH_INTERVAL_SECS),
            retry: RetryPolicy::default(),
        }
    }
}
