//! Cross-process advisory locking
//!
//! Locks are plain files created with `O_CREAT | O_EXCL`. The body records
//! the holder so a crashed holder can be detected and its lock reclaimed:
//!
//! ```text
//! <pid>\n<unix_timestamp>\n
//! ```
//!
//! A lock is stale when it is older than the staleness threshold, when its
//! holder pid is no longer alive, or when its body cannot be parsed. There is
//! no janitor process; contenders reclaim stale locks themselves.

pub mod file_lock;
pub mod probe;
pub mod retry;

pub use file_lock::{FileLock, LockGuard, LockInfo, DEFAULT_POLL_INTERVAL, DEFAULT_STALE_AFTER};
pub use probe::{ProcessProbe, SystemProbe};
pub use retry::RetryableLock;
