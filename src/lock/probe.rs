//! Process liveness probing for stale-lock detection

use std::fmt;

/// Answers whether the process that wrote a lock file is still running
///
/// Implementations must be cheap; the probe runs on every poll of a
/// contended lock.
pub trait ProcessProbe: Send + Sync + fmt::Debug {
    /// Whether a process with this pid currently exists
    fn is_alive(&self, pid: u32) -> bool;
}

/// Probe backed by the host operating system
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl ProcessProbe for SystemProbe {
    #[cfg(unix)]
    fn is_alive(&self, pid: u32) -> bool {
        // pid 0 and negative values address process groups, never a holder
        let pid = match libc::pid_t::try_from(pid) {
            Ok(pid) if pid > 0 => pid,
            _ => return false,
        };

        // SAFETY: signal 0 performs the existence and permission checks only,
        // no signal is delivered.
        let rc = unsafe { libc::kill(pid, 0) };
        if rc == 0 {
            return true;
        }

        // EPERM: the process exists but belongs to another user
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }

    #[cfg(not(unix))]
    fn is_alive(&self, _pid: u32) -> bool {
        // No portable probe; the age threshold alone decides staleness
        true
    }
}
