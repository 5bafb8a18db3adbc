//! WAL configuration.

use crate::error::{CoreError, CoreResult};
use crate::wal::HEADER_LEN;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for opening a WAL.
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// Directory holding local segment files and the LOCK file.
    pub cache_dir: PathBuf,

    /// Maximum size of a segment file, header included.
    pub max_segment_size: u64,

    /// Prefix prepended to remote segment keys.
    pub remote_prefix: String,

    /// Retry policy for object store calls.
    pub retry: RetryConfig,

    /// Segment index used when neither tier holds any segment.
    pub suggested_first_index: u64,

    /// Whether to fsync a local segment after every write.
    pub sync_on_write: bool,

    /// First delay after a failed local write.
    pub writer_initial_backoff: Duration,

    /// Upper bound for the local write retry delay.
    pub writer_max_backoff: Duration,

    /// Pause before re-attempting a push whose retries were exhausted.
    pub push_failure_delay: Duration,

    /// Pending push count above which the writer logs a lag warning.
    pub pending_push_warn_threshold: usize,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./tablewal_cache"),
            max_segment_size: 8 * 1024 * 1024, // 8 MiB
            remote_prefix: String::new(),
            retry: RetryConfig::default(),
            suggested_first_index: 0,
            sync_on_write: true,
            writer_initial_backoff: Duration::from_millis(50),
            writer_max_backoff: Duration::from_secs(10),
            push_failure_delay: Duration::from_secs(1),
            pending_push_warn_threshold: 8,
        }
    }
}

impl WalConfig {
    /// Creates a configuration with default values and the given cache directory.
    #[must_use]
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Self::default()
        }
    }

    /// Sets the maximum segment size.
    #[must_use]
    pub const fn max_segment_size(mut self, size: u64) -> Self {
        self.max_segment_size = size;
        self
    }

    /// Sets the remote key prefix.
    #[must_use]
    pub fn remote_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.remote_prefix = prefix.into();
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the maximum number of attempts for object store calls.
    #[must_use]
    pub fn max_retries(mut self, attempts: u32) -> Self {
        self.retry.max_attempts = attempts;
        self
    }

    /// Sets the first segment index for an empty WAL.
    #[must_use]
    pub const fn suggested_first_index(mut self, index: u64) -> Self {
        self.suggested_first_index = index;
        self
    }

    /// Sets whether to fsync after every local write.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets the local write backoff bounds.
    #[must_use]
    pub const fn writer_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.writer_initial_backoff = initial;
        self.writer_max_backoff = max;
        self
    }

    /// Sets the delay before re-attempting a failed push.
    #[must_use]
    pub const fn push_failure_delay(mut self, delay: Duration) -> Self {
        self.push_failure_delay = delay;
        self
    }

    /// Sets the pending push warning threshold.
    #[must_use]
    pub const fn pending_push_warn_threshold(mut self, threshold: usize) -> Self {
        self.pending_push_warn_threshold = threshold;
        self
    }

    /// Largest delimited entry that fits in one segment.
    #[must_use]
    pub fn segment_capacity(&self) -> usize {
        usize::try_from(self.max_segment_size.saturating_sub(HEADER_LEN as u64))
            .unwrap_or(usize::MAX)
    }

    /// Checks the configuration for values the WAL cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_segment_size <= HEADER_LEN as u64 {
            return Err(CoreError::invalid_config(format!(
                "max_segment_size must exceed the {HEADER_LEN}-byte segment header, got {}",
                self.max_segment_size
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(CoreError::invalid_config("retry.max_attempts must be at least 1"));
        }
        if self.writer_initial_backoff > self.writer_max_backoff {
            return Err(CoreError::invalid_config(
                "writer_initial_backoff must not exceed writer_max_backoff",
            ));
        }
        Ok(())
    }
}

/// Configuration for retrying object store calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Creates a retry configuration with the given attempt budget.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }

    /// Creates a configuration with a single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculates the delay before a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let base_delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        Duration::from_secs_f64(delay_secs.max(0.0))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(5)
    }
}
