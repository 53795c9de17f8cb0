//! File lock with exponential-backoff retries

use crate::error::CacheResult;
use crate::lock::file_lock::{FileLock, LockGuard, DEFAULT_POLL_INTERVAL, DEFAULT_STALE_AFTER};
use crate::lock::probe::{ProcessProbe, SystemProbe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// A [`FileLock`] acquired with bounded retries
///
/// Each attempt is a full blocking acquisition with its own timeout. Timeouts
/// and I/O failures are retried after `retry_delay`, doubling per attempt;
/// lock state errors are returned immediately.
#[derive(Debug, Clone)]
pub struct RetryableLock {
    path: PathBuf,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
    stale_after: Duration,
    poll_interval: Duration,
    probe: Arc<dyn ProcessProbe>,
}

impl RetryableLock {
    /// Create with defaults: 30s per attempt, 3 retries, 500ms initial delay
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
            stale_after: DEFAULT_STALE_AFTER,
            poll_interval: DEFAULT_POLL_INTERVAL,
            probe: Arc::new(SystemProbe),
        }
    }

    /// Timeout of each individual attempt
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retries after the first attempt
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay before the first retry
    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn probe(mut self, probe: Arc<dyn ProcessProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Lock file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire, retrying until the budget is spent
    pub async fn acquire(&self) -> CacheResult<LockGuard> {
        let mut delay = self.retry_delay;
        let mut attempt = 0;

        loop {
            let lock = FileLock::new(&self.path, self.timeout)
                .with_stale_after(self.stale_after)
                .with_poll_interval(self.poll_interval)
                .with_probe(Arc::clone(&self.probe));

            match lock.into_guard().await {
                Ok(guard) => return Ok(guard),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "Failed to acquire lock {} (attempt {}/{}), retrying in {:?}: {}",
                        self.path.display(),
                        attempt,
                        self.max_retries + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                Err(e) => {
                    if e.is_retryable() {
                        error!(
                            "Failed to acquire lock {} after {} retries",
                            self.path.display(),
                            self.max_retries
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}
