//! Retry helpers for object store calls and local writes.

use crate::config::RetryConfig;
use crate::error::CoreResult;
use std::time::Duration;
use tracing::{debug, warn};

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// attempt budget of `retry` is spent.
///
/// The delay before attempt `n` is [`RetryConfig::delay_for_attempt`].
///
/// # Errors
///
/// Returns the last error produced by `op`.
pub fn with_retries<T, F>(retry: &RetryConfig, what: &str, mut op: F) -> CoreResult<T>
where
    F: FnMut() -> CoreResult<T>,
{
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        if attempt > 0 {
            std::thread::sleep(retry.delay_for_attempt(attempt));
        }
        match op() {
            Ok(value) => {
                if attempt > 0 {
                    debug!(op = what, attempts = attempt + 1, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                warn!(op = what, attempt = attempt + 1, error = %e, "retrying");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Capped exponential backoff for retrying indefinitely.
///
/// Counts consecutive failures so callers can log on the first one and
/// every tenth thereafter instead of on every attempt.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
    failures: u32,
}

impl Backoff {
    /// How often a persisting failure is logged.
    pub const LOG_EVERY: u32 = 10;

    /// Creates a backoff starting at `initial` and capped at `max`.
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            next: initial,
            failures: 0,
        }
    }

    /// Records a failure and returns how long to wait before the next attempt.
    pub fn fail(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let delay = self.next.min(self.max);
        self.next = self.next.saturating_mul(2).min(self.max);
        delay
    }

    /// Consecutive failures since the last reset.
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Whether the most recent failure should be logged.
    #[must_use]
    pub fn should_log(&self) -> bool {
        self.failures == 1 || (self.failures > 1 && (self.failures - 1) % Self::LOG_EVERY == 0)
    }

    /// Resets after a success.
    pub fn reset(&mut self) {
        self.next = self.initial;
        self.failures = 0;
    }
}
