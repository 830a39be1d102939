//! Signal delivery and liveness checks.
//!
//! [`ProcessSignaller`] is the seam between the two-phase protocol and the
//! OS. [`LibcSignaller`] is the real implementation; tests substitute fakes.

use thiserror::Error;
use tracing::trace;

/// Signals the executor sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Graceful: SIGTERM.
    Term,
    /// Forced: SIGKILL.
    Kill,
}

impl Signal {
    pub fn as_raw(self) -> libc::c_int {
        match self {
            Signal::Term => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Signal::Term => "SIGTERM",
            Signal::Kill => "SIGKILL",
        }
    }
}

/// Signal delivery errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignalError {
    #[error("process not found")]
    NotFound,

    #[error("permission denied")]
    PermissionDenied,

    #[error("signal failed: {0}")]
    Failed(String),
}

/// Delivers signals and checks liveness.
pub trait ProcessSignaller {
    fn send(&self, pid: u32, signal: Signal) -> Result<(), SignalError>;

    /// True while the process exists and has not exited.
    fn is_alive(&self, pid: u32) -> bool;

    /// Kernel start time of `pid`, for the PID-reuse guard. `None` when the
    /// platform cannot tell, in which case the guard is skipped.
    fn start_time(&self, _pid: u32) -> Option<u64> {
        None
    }
}

impl<S: ProcessSignaller + ?Sized> ProcessSignaller for &S {
    fn send(&self, pid: u32, signal: Signal) -> Result<(), SignalError> {
        (**self).send(pid, signal)
    }

    fn is_alive(&self, pid: u32) -> bool {
        (**self).is_alive(pid)
    }

    fn start_time(&self, pid: u32) -> Option<u64> {
        (**self).start_time(pid)
    }
}

/// Real signaller backed by `kill(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibcSignaller;

impl LibcSignaller {
    #[cfg(target_os = "linux")]
    fn read_stat(pid: u32) -> Option<crate::collect::proc_stat::StatFields> {
        let content = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
        crate::collect::proc_stat::parse_stat_content(&content)
    }
}

impl ProcessSignaller for LibcSignaller {
    fn send(&self, pid: u32, signal: Signal) -> Result<(), SignalError> {
        // pid 0 and negative pids address process groups.
        if pid == 0 || pid > i32::MAX as u32 {
            return Err(SignalError::Failed(format!("refusing to signal pid {pid}")));
        }
        trace!(pid, signal = signal.name(), "sending signal");
        // SAFETY: kill has no memory-safety preconditions.
        let rc = unsafe { libc::kill(pid as libc::pid_t, signal.as_raw()) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::ESRCH) => Err(SignalError::NotFound),
            Some(libc::EPERM) => Err(SignalError::PermissionDenied),
            _ => Err(SignalError::Failed(err.to_string())),
        }
    }

    fn is_alive(&self, pid: u32) -> bool {
        if pid == 0 || pid > i32::MAX as u32 {
            return false;
        }
        // SAFETY: signal 0 only checks for existence.
        let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
        let exists = rc == 0
            || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM);
        if !exists {
            return false;
        }

        // A zombie has exited; it only waits to be reaped.
        #[cfg(target_os = "linux")]
        {
            if let Some(stat) = Self::read_stat(pid) {
                return stat.state != 'Z' && stat.state != 'X';
            }
        }
        true
    }

    fn start_time(&self, pid: u32) -> Option<u64> {
        #[cfg(target_os = "linux")]
        {
            Self::read_stat(pid).map(|s| s.starttime)
        }
        #[cfg(not(target_os = "linux"))]
        {
            let _ = pid;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use std::time::{Duration, Instant};

    fn wait_until_dead(signaller: &LibcSignaller, pid: u32) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if !signaller.is_alive(pid) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn test_signal_names() {
        assert_eq!(Signal::Term.name(), "SIGTERM");
        assert_eq!(Signal::Kill.as_raw(), libc::SIGKILL);
    }

    #[test]
    fn test_refuses_group_pids() {
        assert!(matches!(
            LibcSignaller.send(0, Signal::Term),
            Err(SignalError::Failed(_))
        ));
        assert!(!LibcSignaller.is_alive(0));
    }

    #[test]
    fn test_self_is_alive() {
        assert!(LibcSignaller.is_alive(std::process::id()));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_self_start_time() {
        assert!(LibcSignaller.start_time(std::process::id()).is_some());
    }

    #[test]
    fn test_term_kills_sleep() {
        let mut child = Command::new("sleep").arg("60").spawn().expect("spawn sleep");
        let pid = child.id();
        assert!(LibcSignaller.is_alive(pid));

        LibcSignaller.send(pid, Signal::Term).expect("deliver SIGTERM");
        let _ = child.wait();
        assert!(wait_until_dead(&LibcSignaller, pid));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_zombie_counts_as_dead() {
        let child = Command::new("sleep").arg("60").spawn().expect("spawn sleep");
        let pid = child.id();
        LibcSignaller.send(pid, Signal::Kill).expect("deliver SIGKILL");
        // Not reaped yet: a zombie.
        assert!(wait_until_dead(&LibcSignaller, pid));
        drop(child);
    }
}
