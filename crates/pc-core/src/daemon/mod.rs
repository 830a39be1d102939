//! Periodic watcher.
//!
//! Runs one pass per interval on the calling thread, so passes never overlap
//! within the watcher. A pass that terminated something opens a cooldown
//! window during which ticks are recorded but no pass runs. Each pass takes
//! the host-wide [`PassLock`] when a lock path is configured.
//!
//! [`process_tick`] is the testable unit; [`run_watch`] adds the sleep loop.

pub mod shutdown;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use pc_config::Guardrails;

use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};
use crate::pass::{CancelFlag, CleanupReport, Orchestrator, PassError, PassLock, PassOptions};

pub use shutdown::install_shutdown_handler;

/// Events kept in [`WatchState::recent_events`].
pub const EVENT_RING_CAPACITY: usize = 100;

/// Granularity of the cancellable sleep.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Watcher settings.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchConfig {
    pub interval: Duration,
    pub cooldown: Duration,
    /// Stop after this many ticks. `None` runs until cancelled.
    pub max_ticks: Option<u64>,
    pub dry_run: bool,
    pub lock_path: Option<PathBuf>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        WatchConfig {
            interval: Duration::from_secs(120),
            cooldown: Duration::from_secs(180),
            max_ticks: None,
            dry_run: false,
            lock_path: None,
        }
    }
}

impl WatchConfig {
    /// Interval from the caller, cooldown from the policy.
    pub fn from_guardrails(guardrails: &Guardrails, interval: Duration) -> Self {
        WatchConfig {
            interval,
            cooldown: Duration::from_secs(guardrails.cooldown_seconds),
            ..WatchConfig::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchEventKind {
    Started,
    Tick,
    Gated,
    Cooldown,
    LockContention,
    PassCompleted,
    InventoryFailed,
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub struct WatchEvent {
    pub at: DateTime<Utc>,
    pub kind: WatchEventKind,
    pub detail: String,
}

/// Running state of the watcher.
#[derive(Debug, Clone, Serialize)]
pub struct WatchState {
    pub started_at: DateTime<Utc>,
    pub ticks: u64,
    pub passes_run: u64,
    pub total_terminated: u64,
    pub last_termination_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    last_termination: Option<Instant>,
    pub recent_events: VecDeque<WatchEvent>,
}

impl Default for WatchState {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchState {
    pub fn new() -> Self {
        WatchState {
            started_at: Utc::now(),
            ticks: 0,
            passes_run: 0,
            total_terminated: 0,
            last_termination_at: None,
            last_termination: None,
            recent_events: VecDeque::with_capacity(EVENT_RING_CAPACITY),
        }
    }

    pub fn record_event(&mut self, kind: WatchEventKind, detail: impl Into<String>) {
        if self.recent_events.len() >= EVENT_RING_CAPACITY {
            self.recent_events.pop_front();
        }
        self.recent_events.push_back(WatchEvent {
            at: Utc::now(),
            kind,
            detail: detail.into(),
        });
    }

    /// Remaining cooldown at `now`, if any.
    pub fn cooldown_remaining(&self, now: Instant, cooldown: Duration) -> Option<Duration> {
        let last = self.last_termination?;
        let until = last + cooldown;
        (now < until).then(|| until - now)
    }

    fn note_report(&mut self, report: &CleanupReport, now: Instant) {
        self.passes_run += 1;
        let terminated = report.counts.terminated as u64;
        if terminated > 0 {
            self.total_terminated += terminated;
            self.last_termination = Some(now);
            self.last_termination_at = Some(report.finished_at);
        }
    }
}

/// Result of one tick.
#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// A pass ran (it may still have been gated or failed).
    Ran(Box<CleanupReport>),
    Cooldown(Duration),
    LockContention,
    LockFailed(String),
}

/// One watcher tick: cooldown check, lock, pass, bookkeeping.
pub fn process_tick(
    orchestrator: &Orchestrator<'_>,
    config: &WatchConfig,
    state: &mut WatchState,
    ctx: &LogContext,
) -> TickOutcome {
    state.ticks += 1;
    let tick = state.ticks;
    state.record_event(WatchEventKind::Tick, format!("tick {tick}"));
    log_event!(ctx, DEBUG, event_names::WATCH_TICK, Stage::Watch, "tick", tick = tick);

    let now = Instant::now();
    if let Some(remaining) = state.cooldown_remaining(now, config.cooldown) {
        let secs = remaining.as_secs();
        state.record_event(WatchEventKind::Cooldown, format!("{secs}s remaining"));
        log_event!(
            ctx,
            INFO,
            event_names::WATCH_COOLDOWN,
            Stage::Watch,
            "in cooldown; pass skipped",
            remaining_secs = secs
        );
        return TickOutcome::Cooldown(remaining);
    }

    let _lock = match &config.lock_path {
        Some(path) => match PassLock::acquire(path) {
            Ok(lock) => Some(lock),
            Err(PassError::LockUnavailable { path }) => {
                state.record_event(
                    WatchEventKind::LockContention,
                    format!("{} held elsewhere", path.display()),
                );
                return TickOutcome::LockContention;
            }
            Err(err) => {
                let message = err.to_string();
                state.record_event(WatchEventKind::LockContention, message.clone());
                return TickOutcome::LockFailed(message);
            }
        },
        None => None,
    };

    let report = orchestrator.run_pass(PassOptions {
        mode: None,
        force: false,
        dry_run: config.dry_run,
    });
    state.note_report(&report, Instant::now());

    if let Some(err) = &report.error {
        state.record_event(WatchEventKind::InventoryFailed, err.message.clone());
    } else if report.skipped_gated_by_policy {
        state.record_event(WatchEventKind::Gated, report.summary_line());
    } else {
        state.record_event(WatchEventKind::PassCompleted, report.summary_line());
    }
    TickOutcome::Ran(Box::new(report))
}

/// Sleep for `total`, waking early when `cancel` is set. Returns false if
/// cancelled.
pub fn sleep_cancellable(total: Duration, cancel: &CancelFlag) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}

/// Run ticks until the orchestrator's cancel flag is set or `max_ticks` is
/// reached.
///
/// `before_tick` runs ahead of every tick with mutable access (policy
/// reload); `on_report` sees every report produced.
pub fn run_watch<B, R>(
    orchestrator: &mut Orchestrator<'_>,
    config: &WatchConfig,
    ctx: &LogContext,
    mut before_tick: B,
    mut on_report: R,
) -> WatchState
where
    B: FnMut(&mut Orchestrator<'_>),
    R: FnMut(&CleanupReport),
{
    let mut state = WatchState::new();
    let cancel = orchestrator.cancel_flag().clone();
    state.record_event(
        WatchEventKind::Started,
        format!("interval {}s", config.interval.as_secs()),
    );
    log_event!(
        ctx,
        INFO,
        event_names::WATCH_STARTED,
        Stage::Watch,
        "watcher started",
        interval_secs = config.interval.as_secs(),
        cooldown_secs = config.cooldown.as_secs()
    );

    while !cancel.is_cancelled() {
        before_tick(orchestrator);
        if let TickOutcome::Ran(report) = process_tick(orchestrator, config, &mut state, ctx) {
            on_report(&report);
        }
        if config.max_ticks.is_some_and(|max| state.ticks >= max) {
            break;
        }
        if !sleep_cancellable(config.interval, &cancel) {
            break;
        }
    }

    state.record_event(WatchEventKind::Stopped, format!("after {} ticks", state.ticks));
    log_event!(
        ctx,
        INFO,
        event_names::WATCH_STOPPED,
        Stage::Watch,
        "watcher stopped",
        ticks = state.ticks,
        passes = state.passes_run,
        terminated = state.total_terminated
    );
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{TerminationOutcome, TerminationResult, TerminationTarget, Terminator};
    use crate::collect::{ProcessSnapshot, StaticInventory};
    use pc_common::ProcessId;
    use pc_config::{Policy, PolicyMode};

    struct AlwaysGone;

    impl Terminator for AlwaysGone {
        fn terminate(&self, _target: TerminationTarget) -> TerminationResult {
            TerminationResult {
                outcome: TerminationOutcome::Succeeded,
                forced: false,
                elapsed_ms: 0,
                detail: None,
            }
        }
    }

    fn hot_inventory() -> StaticInventory {
        StaticInventory::new(vec![ProcessSnapshot::new(10, 1, "Chrome Helper")
            .with_cpu(95.0)
            .with_memory(10.0)])
    }

    fn ctx() -> LogContext {
        LogContext::new("run-test", "host-test")
    }

    #[test]
    fn test_event_ring_is_bounded() {
        let mut state = WatchState::new();
        for i in 0..150 {
            state.record_event(WatchEventKind::Tick, format!("tick {i}"));
        }
        assert_eq!(state.recent_events.len(), EVENT_RING_CAPACITY);
        assert_eq!(state.recent_events[0].detail, "tick 50");
    }

    #[test]
    fn test_cooldown_after_termination() {
        let inv = hot_inventory();
        let orch = Orchestrator::new(Policy::default().with_mode(PolicyMode::Balanced), &inv, &AlwaysGone)
            .unwrap()
            .with_session(ProcessId(999_999), None);
        let config = WatchConfig {
            cooldown: Duration::from_secs(600),
            ..WatchConfig::default()
        };
        let mut state = WatchState::new();

        let first = process_tick(&orch, &config, &mut state, &ctx());
        assert!(matches!(first, TickOutcome::Ran(ref r) if r.counts.terminated == 1));
        let second = process_tick(&orch, &config, &mut state, &ctx());
        assert!(matches!(second, TickOutcome::Cooldown(_)));
        assert_eq!(state.passes_run, 1);
        assert_eq!(state.ticks, 2);
        assert_eq!(state.total_terminated, 1);
    }

    #[test]
    fn test_lock_contention_skips_pass() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("pass.lock");
        let _held = PassLock::acquire(&lock_path).unwrap();

        let inv = hot_inventory();
        let orch = Orchestrator::new(Policy::default(), &inv, &AlwaysGone).unwrap();
        let config = WatchConfig {
            lock_path: Some(lock_path),
            ..WatchConfig::default()
        };
        let mut state = WatchState::new();
        let outcome = process_tick(&orch, &config, &mut state, &ctx());
        assert!(matches!(outcome, TickOutcome::LockContention));
        assert_eq!(state.passes_run, 0);
    }

    #[test]
    fn test_run_watch_stops_at_max_ticks() {
        let inv = hot_inventory();
        let mut orch = Orchestrator::new(Policy::default(), &inv, &AlwaysGone).unwrap();
        let config = WatchConfig {
            interval: Duration::from_millis(1),
            max_ticks: Some(3),
            ..WatchConfig::default()
        };
        let mut reloads = 0;
        let mut reports = 0;
        let state = run_watch(&mut orch, &config, &ctx(), |_| reloads += 1, |_| reports += 1);
        assert_eq!(state.ticks, 3);
        assert_eq!(reloads, 3);
        // Mode off: every pass is gated but still reported.
        assert_eq!(reports, 3);
        assert_eq!(state.total_terminated, 0);
    }

    #[test]
    fn test_cancel_interrupts_sleep() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let start = Instant::now();
        assert!(!sleep_cancellable(Duration::from_secs(30), &cancel));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
