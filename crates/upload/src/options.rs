//! Upload tuning knobs.

use std::time::Duration;

use psyhub_transfer::DEFAULT_CHUNK_SIZE;

/// Default number of chunks in flight.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Per-chunk retry behaviour for failed existence checks and uploads.
///
/// `max_attempts: None` retries forever, which is what the web uploader
/// did; the default caps it so a permanently broken chunk ends the session.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per chunk, including the first (`None` = unbounded).
    pub max_attempts: Option<u32>,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (backoff cap).
    pub max_delay: Duration,
    /// Multiplier for each subsequent retry.
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(5),
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Retries forever with the default backoff.
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            ..Self::default()
        }
    }

    /// Retries up to `max_attempts` times without waiting.
    pub fn immediate(max_attempts: Option<u32>) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_factor: 1.0,
        }
    }

    /// Whether another attempt is allowed after `failures` failed attempts.
    pub fn allows_retry(&self, failures: u32) -> bool {
        self.max_attempts.is_none_or(|max| failures < max)
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        if retry == 0 || self.initial_delay.is_zero() {
            return Duration::ZERO;
        }
        let exp = retry.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Options for one [`UploadManager`](crate::UploadManager).
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOptions {
    /// Chunk size in bytes (0 selects the 5 MiB default).
    pub chunk_size: u64,
    /// Maximum chunks in flight.
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
        }
    }
}

impl UploadOptions {
    /// Effective concurrency (never zero).
    pub fn concurrency(&self) -> usize {
        self.concurrency.max(1)
    }
}
