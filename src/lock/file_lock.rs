//! Exclusive advisory lock over a single file path

use crate::error::{CacheError, CacheResult};
use crate::lock::probe::{ProcessProbe, SystemProbe};
use chrono::Utc;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Locks older than this are reclaimed regardless of holder liveness
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(300);

/// Sleep between attempts on a contended lock
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A lock body that does not parse is only reclaimed once it is this old,
/// so a holder that has created the file but not yet written it is safe.
const UNPARSED_GRACE: Duration = Duration::from_secs(2);

/// Holder information recorded in a lock file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LockInfo {
    /// Process id of the holder
    pub holder_pid: u32,
    /// Acquisition time in seconds since the Unix epoch
    pub acquired_at: f64,
}

impl LockInfo {
    /// Holder information for the calling process, stamped now
    pub fn current() -> Self {
        Self {
            holder_pid: std::process::id(),
            acquired_at: Utc::now().timestamp() as f64,
        }
    }

    /// Parse a `"<pid>\n<unix_timestamp>\n"` body
    ///
    /// Fractional timestamps are accepted.
    pub fn parse(body: &str) -> Option<Self> {
        let mut lines = body.lines();
        let holder_pid = lines.next()?.trim().parse().ok()?;
        let acquired_at: f64 = lines.next()?.trim().parse().ok()?;
        if !acquired_at.is_finite() {
            return None;
        }
        Some(Self {
            holder_pid,
            acquired_at,
        })
    }

    /// Render the on-disk lock body
    pub fn render(&self) -> String {
        format!("{}\n{}\n", self.holder_pid, self.acquired_at.trunc() as i64)
    }

    /// Time since acquisition; zero when the stamp lies in the future
    pub fn age(&self) -> Duration {
        let now = Utc::now().timestamp_millis() as f64 / 1000.0;
        Duration::try_from_secs_f64(now - self.acquired_at).unwrap_or(Duration::ZERO)
    }
}

/// What a contender found at the lock path
enum Holder {
    /// Released between our create attempt and the inspection
    Gone,
    /// Held by a live process
    Live,
    /// Created but not yet written, or unparsable but recent
    Unsettled,
    /// Eligible for reclamation
    Stale { reason: String, body: Option<String> },
}

/// Advisory exclusive lock backed by a lock file
///
/// Acquisition is a create-if-absent of the lock file. Dropping a held lock
/// releases it; prefer [`FileLock::lock`] for scoped use.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    timeout: Duration,
    stale_after: Duration,
    poll_interval: Duration,
    probe: Arc<dyn ProcessProbe>,
    body: Option<String>,
}

impl FileLock {
    /// Create an unheld lock for `path` waiting at most `timeout` when blocking
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
            stale_after: DEFAULT_STALE_AFTER,
            poll_interval: DEFAULT_POLL_INTERVAL,
            probe: Arc::new(SystemProbe),
            body: None,
        }
    }

    /// Use a custom liveness probe
    pub fn with_probe(mut self, probe: Arc<dyn ProcessProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Override the age after which a lock is considered abandoned
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Override the polling interval used while blocked
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Acquire `path` in blocking mode and return a guard releasing it on drop
    pub async fn lock(path: impl Into<PathBuf>, timeout: Duration) -> CacheResult<LockGuard> {
        Self::new(path, timeout).into_guard().await
    }

    /// Acquire in blocking mode, consuming the lock into a guard
    pub async fn into_guard(mut self) -> CacheResult<LockGuard> {
        self.acquire(true).await?;
        Ok(LockGuard { lock: self })
    }

    /// Lock file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this instance currently holds the lock
    pub fn is_held(&self) -> bool {
        self.body.is_some()
    }

    /// Acquire the lock
    ///
    /// Returns `Ok(false)` on contention in non-blocking mode. In blocking
    /// mode, stale locks are reclaimed and live ones are polled until the
    /// timeout, which yields [`CacheError::LockTimeout`].
    pub async fn acquire(&mut self, blocking: bool) -> CacheResult<bool> {
        if self.is_held() {
            return Err(CacheError::LockState(format!(
                "lock {} is already held by this instance",
                self.path.display()
            )));
        }

        trace!("Attempting to acquire lock: {}", self.path.display());

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                CacheError::io(format!("creating lock directory {}", parent.display()), e)
            })?;
        }

        let started = Instant::now();

        loop {
            if let Some(body) = self.try_create().await? {
                self.body = Some(body);
                debug!("Acquired lock: {}", self.path.display());
                return Ok(true);
            }

            if !blocking {
                trace!("Lock unavailable (non-blocking): {}", self.path.display());
                return Ok(false);
            }

            match self.inspect().await {
                Holder::Gone => continue,
                Holder::Stale { reason, body } => {
                    info!("Removing stale lock {} ({})", self.path.display(), reason);
                    if self.remove_stale(body.as_deref()) {
                        continue;
                    }
                }
                Holder::Live | Holder::Unsettled => {}
            }

            let waited = started.elapsed();
            if waited >= self.timeout {
                warn!(
                    "Failed to acquire lock within {:?}: {}",
                    self.timeout,
                    self.path.display()
                );
                return Err(CacheError::LockTimeout {
                    path: self.path.clone(),
                    waited,
                });
            }

            tokio::time::sleep(self.poll_interval.min(self.timeout - waited)).await;
        }
    }

    /// Release the lock and delete the lock file
    ///
    /// If the file was meanwhile reclaimed by another holder, it is left in
    /// place.
    pub fn release(&mut self) -> CacheResult<()> {
        let Some(body) = self.body.take() else {
            return Err(CacheError::LockState(format!(
                "lock {} is not held by this instance",
                self.path.display()
            )));
        };

        match fs::read_to_string(&self.path) {
            Ok(current) if current != body => {
                warn!(
                    "Lock {} was reclaimed by another holder, leaving it in place",
                    self.path.display()
                );
                return Ok(());
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Lock {} disappeared before release", self.path.display());
                return Ok(());
            }
            _ => {}
        }

        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Released lock: {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(
                format!("removing lock file {}", self.path.display()),
                e,
            )),
        }
    }

    /// Exclusive create; `None` when the file already exists
    async fn try_create(&self) -> CacheResult<Option<String>> {
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = match options.open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => {
                return Err(CacheError::io(
                    format!("creating lock file {}", self.path.display()),
                    e,
                ))
            }
        };

        let body = LockInfo::current().render();
        let written = match file.write_all(body.as_bytes()).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            let _ = fs::remove_file(&self.path);
            return Err(CacheError::io(
                format!("writing lock file {}", self.path.display()),
                e,
            ));
        }

        Ok(Some(body))
    }

    async fn inspect(&self) -> Holder {
        let body = match tokio::fs::read_to_string(&self.path).await {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => return Holder::Gone,
            Err(e) => {
                warn!("Error reading lock file {}: {}", self.path.display(), e);
                return Holder::Stale {
                    reason: format!("unreadable: {}", e),
                    body: None,
                };
            }
        };

        let Some(info) = LockInfo::parse(&body) else {
            let settled = fs::metadata(&self.path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| SystemTime::now().duration_since(modified).ok())
                .is_some_and(|age| age >= UNPARSED_GRACE);

            if !settled {
                return Holder::Unsettled;
            }
            warn!("Invalid lock file format: {}", self.path.display());
            return Holder::Stale {
                reason: "invalid lock file format".to_string(),
                body: Some(body),
            };
        };

        if info.age() > self.stale_after {
            return Holder::Stale {
                reason: format!("older than {:?}", self.stale_after),
                body: Some(body),
            };
        }

        if !self.probe.is_alive(info.holder_pid) {
            return Holder::Stale {
                reason: format!("holder process {} no longer exists", info.holder_pid),
                body: Some(body),
            };
        }

        Holder::Live
    }

    /// Remove a lock judged stale, unless it changed since it was judged
    ///
    /// The lock is first renamed to a private name, so the body check and the
    /// unlink see the same file. A lock rewritten by another contender before
    /// the rename is linked back into place. If yet another contender created
    /// a new lock in that gap, the restore fails and both believe they hold
    /// it; this needs two reclaims of one stale lock within microseconds.
    ///
    /// Returns whether acquisition should be retried immediately.
    fn remove_stale(&self, judged: Option<&str>) -> bool {
        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("lock");
        let claimed = self
            .path
            .with_file_name(format!("{}.stale-{}", file_name, Uuid::new_v4()));

        match fs::rename(&self.path, &claimed) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return true,
            Err(e) => {
                warn!("Failed to remove stale lock {}: {}", self.path.display(), e);
                return false;
            }
        }

        let unchanged = match judged {
            None => true,
            Some(judged) => fs::read_to_string(&claimed).is_ok_and(|current| current == judged),
        };

        if !unchanged {
            debug!(
                "Lock {} changed after it was judged stale, restoring it",
                self.path.display()
            );
            if let Err(e) = fs::hard_link(&claimed, &self.path) {
                warn!("Failed to restore lock {}: {}", self.path.display(), e);
            }
        }

        match fs::remove_file(&claimed) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", claimed.display(), e),
        }
        true
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if self.is_held() {
            if let Err(e) = self.release() {
                warn!("Failed to release lock {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Scoped lock ownership; releases on drop
#[must_use = "the lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct LockGuard {
    lock: FileLock,
}

impl LockGuard {
    /// Lock file path
    pub fn path(&self) -> &Path {
        self.lock.path()
    }

    /// Release explicitly, surfacing any error instead of logging it
    pub fn release(mut self) -> CacheResult<()> {
        self.lock.release()
    }
}
