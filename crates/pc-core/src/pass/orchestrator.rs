//! Pass orchestrator.
//!
//! A pass is one synchronous sequence over a single inventory:
//!
//! 1. pull the inventory (failure aborts the pass with `error` set)
//! 2. gate on system load unless forced
//! 3. classify every process; protected ones are skipped unscored
//! 4. score the rest and order them by score, then CPU, then pid
//! 5. scored tier: allowlisted processes above the CPU gate are terminated,
//!    within the per-pass budget
//! 6. sweep tier: known-safe helpers are terminated regardless of score
//!
//! Cancellation is checked before every termination; a cancelled pass still
//! returns its partial report.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use pc_common::{PassId, ProcessCategory, ProcessId, StructuredError};
use pc_config::{Policy, PolicyMode};

use super::report::{ActionReason, CleanupAction, CleanupReport, Decision, DecisionCounts};
use super::CancelFlag;
use crate::action::{TerminationTarget, Terminator};
use crate::collect::{InventoryError, InventorySource, ProcessSnapshot, SystemLoad};
use crate::decision::{
    classify, Killability, PatternError, PatternTable, PolicyController,
    ProtectionReason, RiskScorer, SessionContext,
};
use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};

/// Per-invocation switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassOptions {
    /// Overrides the policy's mode for this pass.
    pub mode: Option<PolicyMode>,
    /// Skip the load gate. Protection and killability still apply.
    pub force: bool,
    /// Decide everything, signal nothing.
    pub dry_run: bool,
}

/// One row of the read-only assessment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsumerRow {
    pub pid: u32,
    pub command: String,
    pub category: ProcessCategory,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    /// `None` when protected.
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protected: Option<ProtectionReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub killability: Option<Killability>,
    pub safe_sweep: bool,
}

/// What a pass would see right now. Nothing is signalled.
#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    pub mode: PolicyMode,
    pub would_run: bool,
    pub captured_at: DateTime<Utc>,
    pub inventory_source: String,
    pub load: SystemLoad,
    pub process_count: usize,
    pub protected_count: usize,
    pub by_reason: BTreeMap<ProtectionReason, usize>,
    pub by_category: BTreeMap<ProcessCategory, usize>,
    pub top_consumers: Vec<ConsumerRow>,
}

/// Number of rows in [`Assessment::top_consumers`].
pub const TOP_CONSUMERS: usize = 10;

/// Runs passes against one inventory source and one terminator.
pub struct Orchestrator<'a> {
    policy: Policy,
    patterns: PatternTable,
    inventory: &'a dyn InventorySource,
    terminator: &'a dyn Terminator,
    cancel: CancelFlag,
    self_pid: ProcessId,
    fallback_parent: Option<ProcessId>,
    log_ctx: LogContext,
    config_id: Option<String>,
}

impl<'a> Orchestrator<'a> {
    /// Compiles the policy's pattern tables; an invalid pattern is an error.
    pub fn new(
        policy: Policy,
        inventory: &'a dyn InventorySource,
        terminator: &'a dyn Terminator,
    ) -> Result<Self, PatternError> {
        let patterns = PatternTable::compile(&policy)?;
        Ok(Orchestrator {
            policy,
            patterns,
            inventory,
            terminator,
            cancel: CancelFlag::new(),
            self_pid: ProcessId(std::process::id()),
            fallback_parent: Some(ProcessId(std::os::unix::process::parent_id())),
            log_ctx: LogContext::current(),
            config_id: None,
        })
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Whose ancestry is protected. Defaults to the running process.
    pub fn with_session(mut self, self_pid: ProcessId, fallback_parent: Option<ProcessId>) -> Self {
        self.self_pid = self_pid;
        self.fallback_parent = fallback_parent;
        self
    }

    pub fn with_log_context(mut self, ctx: LogContext) -> Self {
        self.log_ctx = ctx;
        self
    }

    /// Policy provenance id copied into every report.
    pub fn with_config_id(mut self, id: impl Into<String>) -> Self {
        self.config_id = Some(id.into());
        self
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Swap in a new policy. On error the current one stays.
    pub fn set_policy(&mut self, policy: Policy, config_id: Option<String>) -> Result<(), PatternError> {
        let patterns = PatternTable::compile(&policy)?;
        self.policy = policy;
        self.patterns = patterns;
        self.config_id = config_id;
        Ok(())
    }

    fn controller(&self, mode: Option<PolicyMode>) -> PolicyController {
        PolicyController::new(&self.policy, mode.unwrap_or(self.policy.mode))
    }

    /// Run one pass. Never fails: every outcome is in the report.
    pub fn run_pass(&self, options: PassOptions) -> CleanupReport {
        let pass_id = PassId::new();
        let ctx = self.log_ctx.with_pass_id(pass_id.0.clone());
        let controller = self.controller(options.mode);
        let mode = controller.mode();
        let dry_run = options.dry_run || !self.inventory.is_live();

        let mut report = CleanupReport {
            schema_version: pc_common::SCHEMA_VERSION.to_string(),
            pass_id,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            mode,
            forced: options.force,
            dry_run,
            inventory_source: Some(self.inventory.name().to_string()),
            process_count: 0,
            system_cpu_percent: 0.0,
            system_memory_percent: 0.0,
            total_cpu_before: 0.0,
            skipped_gated_by_policy: false,
            cancelled: false,
            error: None,
            config_id: self.config_id.clone(),
            counts: DecisionCounts::default(),
            actions: Vec::new(),
        };

        log_event!(
            ctx,
            INFO,
            event_names::PASS_STARTED,
            Stage::Inventory,
            "pass started",
            mode = mode.as_str(),
            forced = options.force,
            dry_run = dry_run
        );
        if dry_run && !options.dry_run {
            log_event!(
                ctx,
                WARN,
                event_names::PASS_DRY_RUN_FORCED,
                Stage::Inventory,
                "inventory source is not live; nothing will be signalled",
                source = self.inventory.name()
            );
        }

        let inventory = match self.inventory.pull() {
            Ok(inventory) => inventory,
            Err(err) => {
                let message = err.to_string();
                log_event!(
                    ctx,
                    ERROR,
                    event_names::INVENTORY_FAILED,
                    Stage::Inventory,
                    "inventory pull failed",
                    error = message.as_str()
                );
                report.error = Some(
                    StructuredError::from(&pc_common::Error::from(err))
                        .with_context("source", self.inventory.name()),
                );
                return finish(report, &ctx);
            }
        };

        report.process_count = inventory.processes.len();
        report.system_cpu_percent = inventory.load.cpu_percent;
        report.system_memory_percent = inventory.load.memory_percent;
        report.total_cpu_before = inventory.load.total_cpu_percent;
        log_event!(
            ctx,
            DEBUG,
            event_names::INVENTORY_PULLED,
            Stage::Inventory,
            "inventory pulled",
            processes = inventory.processes.len(),
            cpu_percent = inventory.load.cpu_percent,
            memory_percent = inventory.load.memory_percent
        );

        if !options.force
            && !controller.should_run_pass(inventory.load.cpu_percent, inventory.load.memory_percent)
        {
            report.skipped_gated_by_policy = true;
            log_event!(
                ctx,
                INFO,
                event_names::PASS_GATED,
                Stage::Decide,
                "below activation thresholds",
                mode = mode.as_str()
            );
            return finish(report, &ctx);
        }

        let session =
            SessionContext::resolve(self.self_pid, self.fallback_parent, &inventory.processes);
        let scorer = RiskScorer::new(&self.policy.scoring, &self.patterns);

        let mut candidates: Vec<(f64, &ProcessSnapshot)> = Vec::new();
        for snapshot in &inventory.processes {
            let verdict = classify(snapshot, &session, &self.patterns);
            if verdict.protected {
                report.actions.push(self.action(
                    snapshot,
                    Decision::Skipped,
                    None,
                    ActionReason::Protected(verdict.reason),
                ));
            } else {
                candidates.push((scorer.score(snapshot), snapshot));
            }
        }
        candidates.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| b.1.cpu_percent.total_cmp(&a.1.cpu_percent))
                .then_with(|| a.1.pid.cmp(&b.1.pid))
        });
        let (sweep, scored): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|(_, s)| self.patterns.is_safe_sweep(&s.command));

        log_event!(
            ctx,
            DEBUG,
            event_names::CLASSIFY_FINISHED,
            Stage::Classify,
            "classification finished",
            protected = report.actions.len(),
            scored = scored.len(),
            sweep = sweep.len()
        );

        let budget = self.policy.guardrails.max_terminations_per_pass as usize;
        let mut attempted = 0usize;
        let mut budget_logged = false;

        for (score, snapshot) in scored {
            let killability = controller.assess(snapshot, &self.patterns);
            let action = if self.cancel.is_cancelled() {
                report.cancelled = true;
                self.action(snapshot, Decision::Monitored, Some(score), ActionReason::Cancelled)
            } else if !killability.is_killable() {
                self.action(snapshot, Decision::Monitored, Some(score), killability.into())
            } else if attempted >= budget {
                if !budget_logged {
                    log_event!(
                        ctx,
                        INFO,
                        event_names::DECIDE_BUDGET_EXHAUSTED,
                        Stage::Decide,
                        "termination budget exhausted",
                        budget = budget
                    );
                    budget_logged = true;
                }
                self.action(snapshot, Decision::Monitored, Some(score), ActionReason::BudgetExhausted)
            } else {
                // Dry-run selections count against the budget too.
                attempted += 1;
                if dry_run {
                    self.action(snapshot, Decision::Monitored, Some(score), ActionReason::DryRun)
                } else {
                    self.terminate(&ctx, snapshot, score, ActionReason::Allowlisted)
                }
            };
            report.actions.push(action);
        }

        for (score, snapshot) in sweep {
            let action = if self.cancel.is_cancelled() {
                report.cancelled = true;
                self.action(snapshot, Decision::Monitored, Some(score), ActionReason::Cancelled)
            } else if dry_run {
                self.action(snapshot, Decision::Monitored, Some(score), ActionReason::DryRun)
            } else {
                self.terminate(&ctx, snapshot, score, ActionReason::SafeSweep)
            };
            report.actions.push(action);
        }

        if report.cancelled {
            log_event!(
                ctx,
                WARN,
                event_names::PASS_CANCELLED,
                Stage::Apply,
                "pass cancelled; remaining candidates left running"
            );
        }

        finish(report, &ctx)
    }

    fn action(
        &self,
        snapshot: &ProcessSnapshot,
        decision: Decision,
        score: Option<f64>,
        reason: ActionReason,
    ) -> CleanupAction {
        CleanupAction {
            pid: snapshot.pid.0,
            command: snapshot.command.clone(),
            decision,
            score_at_decision: score,
            category: self.patterns.resolve(&snapshot.command),
            reason,
            cpu_percent: snapshot.cpu_percent,
            memory_percent: snapshot.memory_percent,
            termination: None,
        }
    }

    fn terminate(
        &self,
        ctx: &LogContext,
        snapshot: &ProcessSnapshot,
        score: f64,
        reason: ActionReason,
    ) -> CleanupAction {
        let result = self.terminator.terminate(TerminationTarget {
            pid: snapshot.pid.0,
            start_time: snapshot.start_time_ticks,
        });
        let decision = Decision::from_outcome(result.outcome);
        log_event!(
            ctx,
            INFO,
            event_names::APPLY_ACTION_RESULT,
            Stage::Apply,
            "termination attempted",
            pid = snapshot.pid.0,
            command = snapshot.command.as_str(),
            score = score,
            decision = decision.as_str(),
            outcome = result.outcome.as_str(),
            forced = result.forced
        );
        let mut action = self.action(snapshot, decision, Some(score), reason);
        action.termination = Some(result);
        action
    }

    /// Classify and score the current inventory without acting on it.
    pub fn assess(&self, mode: Option<PolicyMode>) -> Result<Assessment, InventoryError> {
        let controller = self.controller(mode);
        let inventory = self.inventory.pull()?;
        let session =
            SessionContext::resolve(self.self_pid, self.fallback_parent, &inventory.processes);
        let scorer = RiskScorer::new(&self.policy.scoring, &self.patterns);

        let mut by_reason = BTreeMap::new();
        let mut by_category = BTreeMap::new();
        let mut rows = Vec::with_capacity(inventory.processes.len());
        for snapshot in &inventory.processes {
            let category = self.patterns.resolve(&snapshot.command);
            *by_category.entry(category).or_insert(0) += 1;

            let verdict = classify(snapshot, &session, &self.patterns);
            let (score, protected, killability) = if verdict.protected {
                *by_reason.entry(verdict.reason).or_insert(0) += 1;
                (None, Some(verdict.reason), None)
            } else {
                (
                    Some(scorer.score(snapshot)),
                    None,
                    Some(controller.assess(snapshot, &self.patterns)),
                )
            };
            rows.push(ConsumerRow {
                pid: snapshot.pid.0,
                command: snapshot.command.clone(),
                category,
                cpu_percent: snapshot.cpu_percent,
                memory_percent: snapshot.memory_percent,
                score,
                protected,
                killability,
                safe_sweep: self.patterns.is_safe_sweep(&snapshot.command),
            });
        }

        rows.sort_by(|a, b| {
            b.cpu_percent
                .total_cmp(&a.cpu_percent)
                .then_with(|| b.memory_percent.total_cmp(&a.memory_percent))
                .then_with(|| a.pid.cmp(&b.pid))
        });
        rows.truncate(TOP_CONSUMERS);

        Ok(Assessment {
            mode: controller.mode(),
            would_run: controller
                .should_run_pass(inventory.load.cpu_percent, inventory.load.memory_percent),
            captured_at: inventory.metadata.captured_at,
            inventory_source: inventory.metadata.source.clone(),
            load: inventory.load,
            process_count: inventory.processes.len(),
            protected_count: by_reason.values().sum(),
            by_reason,
            by_category,
            top_consumers: rows,
        })
    }
}

fn finish(mut report: CleanupReport, ctx: &LogContext) -> CleanupReport {
    report.counts = DecisionCounts::tally(&report.actions);
    report.finished_at = Utc::now();
    log_event!(
        ctx,
        INFO,
        event_names::PASS_FINISHED,
        Stage::Report,
        report.summary_line(),
        terminated = report.counts.terminated,
        failed = report.counts.termination_failed,
        cancelled = report.cancelled
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{TerminationOutcome, TerminationResult};
    use crate::collect::{StaticInventory, UnavailableInventory};
    use std::cell::RefCell;

    struct Recorder {
        calls: RefCell<Vec<u32>>,
    }

    impl Recorder {
        fn new() -> Self {
            Recorder {
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl Terminator for Recorder {
        fn terminate(&self, target: TerminationTarget) -> TerminationResult {
            self.calls.borrow_mut().push(target.pid);
            TerminationResult {
                outcome: TerminationOutcome::Succeeded,
                forced: false,
                elapsed_ms: 0,
                detail: None,
            }
        }
    }

    fn busy(pid: u32, command: &str, cpu: f64) -> ProcessSnapshot {
        ProcessSnapshot::new(pid, 1, command).with_cpu(cpu).with_memory(5.0)
    }

    fn policy() -> Policy {
        Policy::default().with_mode(PolicyMode::Balanced)
    }

    fn orchestrator<'a>(inv: &'a StaticInventory, term: &'a Recorder) -> Orchestrator<'a> {
        Orchestrator::new(policy(), inv, term)
            .unwrap()
            .with_session(ProcessId(999_999), None)
    }

    #[test]
    fn test_gated_pass_touches_nothing() {
        let inv = StaticInventory::new(vec![busy(10, "Chrome Helper", 5.0)]);
        let term = Recorder::new();
        let report = orchestrator(&inv, &term).run_pass(PassOptions::default());
        assert!(report.skipped_gated_by_policy);
        assert!(report.actions.is_empty());
        assert!(term.calls.borrow().is_empty());
    }

    #[test]
    fn test_forced_pass_kills_allowlisted_only() {
        let inv = StaticInventory::new(vec![
            busy(10, "Chrome Helper", 50.0),
            busy(11, "mystery-daemon", 90.0),
        ]);
        let term = Recorder::new();
        let report = orchestrator(&inv, &term).run_pass(PassOptions {
            force: true,
            ..PassOptions::default()
        });
        assert_eq!(*term.calls.borrow(), vec![10]);
        assert_eq!(report.action_for(10).unwrap().decision, Decision::Terminated);
        let unknown = report.action_for(11).unwrap();
        assert_eq!(unknown.decision, Decision::Monitored);
        assert_eq!(unknown.reason, ActionReason::NotAllowlisted);
    }

    #[test]
    fn test_replayed_inventory_is_never_signalled() {
        let inv = StaticInventory::from_json(
            r#"[ { "pid": 10, "ppid": 1, "command": "Chrome Helper", "cpu_percent": 50.0 },
                 { "pid": 11, "ppid": 1, "command": "ReportCrash", "cpu_percent": 1.0 } ]"#,
        )
        .unwrap();
        let term = Recorder::new();
        let report = orchestrator(&inv, &term).run_pass(PassOptions {
            force: true,
            ..PassOptions::default()
        });
        assert!(report.dry_run);
        assert!(term.calls.borrow().is_empty());
        assert_eq!(report.action_for(10).unwrap().reason, ActionReason::DryRun);
        assert_eq!(report.action_for(11).unwrap().reason, ActionReason::DryRun);
    }

    #[test]
    fn test_inventory_failure_sets_error() {
        let inv = UnavailableInventory("no procfs".to_string());
        let term = Recorder::new();
        let orch = Orchestrator::new(policy(), &inv, &term).unwrap();
        let report = orch.run_pass(PassOptions {
            force: true,
            ..PassOptions::default()
        });
        assert!(report.error.is_some());
        assert!(report.actions.is_empty());
        assert!(orch.assess(None).is_err());
    }

    #[test]
    fn test_set_policy_keeps_old_on_bad_pattern() {
        let inv = StaticInventory::new(vec![]);
        let term = Recorder::new();
        let mut orch = orchestrator(&inv, &term);
        let mut bad = policy();
        bad.never_kill.push(pc_config::PatternEntry::new(
            "(",
            pc_config::PatternKind::Regex,
            ProcessCategory::Unknown,
        ));
        assert!(orch.set_policy(bad, None).is_err());
        assert_eq!(orch.policy().mode, PolicyMode::Balanced);
    }
}
