//! Two-phase termination executor.
//!
//! Protocol for one victim:
//! 1. identity guard: if the snapshot recorded a start time and the pid now
//!    has a different one, the original process is gone (`NotFound`)
//! 2. SIGTERM
//! 3. poll liveness every `poll_interval` for up to `grace`
//! 4. still alive: SIGKILL, then re-check liveness for up to `verify_timeout`
//!
//! A failure is recorded for that victim only. The pass moves on.

use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use pc_config::Guardrails;

use super::signal::{ProcessSignaller, Signal, SignalError};

/// Raw result of a termination attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationOutcome {
    /// The process exited after our signal(s).
    Succeeded,
    /// The process was already gone, or its pid now belongs to another process.
    NotFound,
    /// Signal delivery was refused, or the process survived SIGKILL.
    Failed,
}

impl TerminationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationOutcome::Succeeded => "succeeded",
            TerminationOutcome::NotFound => "not_found",
            TerminationOutcome::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TerminationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationTarget {
    pub pid: u32,
    /// Start time observed in the snapshot, if any.
    pub start_time: Option<u64>,
}

impl TerminationTarget {
    pub fn new(pid: u32) -> Self {
        TerminationTarget {
            pid,
            start_time: None,
        }
    }
}

/// Outcome plus what it took to get there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminationResult {
    pub outcome: TerminationOutcome,
    /// SIGKILL was sent.
    pub forced: bool,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Anything that can carry out a termination.
pub trait Terminator {
    fn terminate(&self, target: TerminationTarget) -> TerminationResult;
}

/// Timing of the two-phase protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationConfig {
    pub grace: Duration,
    pub poll_interval: Duration,
    pub verify_timeout: Duration,
}

impl Default for TerminationConfig {
    fn default() -> Self {
        TerminationConfig {
            grace: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(50),
            verify_timeout: Duration::from_millis(500),
        }
    }
}

impl From<&Guardrails> for TerminationConfig {
    fn from(guardrails: &Guardrails) -> Self {
        TerminationConfig {
            grace: Duration::from_millis(guardrails.grace_ms),
            ..TerminationConfig::default()
        }
    }
}

/// SIGTERM, grace window, SIGKILL.
#[derive(Debug, Clone)]
pub struct TwoPhaseTerminator<S> {
    signaller: S,
    config: TerminationConfig,
}

impl<S: ProcessSignaller> TwoPhaseTerminator<S> {
    pub fn new(signaller: S, config: TerminationConfig) -> Self {
        TwoPhaseTerminator { signaller, config }
    }

    pub fn signaller(&self) -> &S {
        &self.signaller
    }

    /// Poll until the process is gone or `timeout` elapses.
    fn wait_for_exit(&self, pid: u32, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            if !self.signaller.is_alive(pid) {
                return true;
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return false;
            }
            thread::sleep(self.config.poll_interval.min(timeout - elapsed));
        }
    }
}

fn result(
    outcome: TerminationOutcome,
    forced: bool,
    started: Instant,
    detail: Option<String>,
) -> TerminationResult {
    TerminationResult {
        outcome,
        forced,
        elapsed_ms: started.elapsed().as_millis() as u64,
        detail,
    }
}

impl<S: ProcessSignaller> Terminator for TwoPhaseTerminator<S> {
    fn terminate(&self, target: TerminationTarget) -> TerminationResult {
        let started = Instant::now();
        let pid = target.pid;

        if let Some(expected) = target.start_time {
            match self.signaller.start_time(pid) {
                Some(actual) if actual != expected => {
                    debug!(pid, expected, actual, "pid reused since snapshot; not signalling");
                    return result(
                        TerminationOutcome::NotFound,
                        false,
                        started,
                        Some("pid reused since snapshot".to_string()),
                    );
                }
                None if !self.signaller.is_alive(pid) => {
                    return result(TerminationOutcome::NotFound, false, started, None);
                }
                _ => {}
            }
        }

        match self.signaller.send(pid, Signal::Term) {
            Ok(()) => {}
            Err(SignalError::NotFound) => {
                return result(TerminationOutcome::NotFound, false, started, None);
            }
            Err(e) => {
                warn!(pid, error = %e, "graceful signal failed");
                return result(TerminationOutcome::Failed, false, started, Some(e.to_string()));
            }
        }

        if self.wait_for_exit(pid, self.config.grace) {
            return result(TerminationOutcome::Succeeded, false, started, None);
        }

        debug!(pid, grace_ms = self.config.grace.as_millis() as u64, "grace window elapsed, escalating");
        match self.signaller.send(pid, Signal::Kill) {
            Ok(()) => {}
            // Exited between the last liveness check and the forced signal.
            Err(SignalError::NotFound) => {
                return result(TerminationOutcome::Succeeded, false, started, None);
            }
            Err(e) => {
                warn!(pid, error = %e, "forced signal failed");
                return result(TerminationOutcome::Failed, true, started, Some(e.to_string()));
            }
        }

        if self.wait_for_exit(pid, self.config.verify_timeout) {
            result(TerminationOutcome::Succeeded, true, started, None)
        } else {
            warn!(pid, "process survived SIGKILL");
            result(
                TerminationOutcome::Failed,
                true,
                started,
                Some("process still alive after SIGKILL".to_string()),
            )
        }
    }
}
