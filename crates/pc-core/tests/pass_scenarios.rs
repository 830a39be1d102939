//! End-to-end pass scenarios over injected inventories.
//!
//! The terminator is a recording fake, so nothing is signalled. Every
//! orchestrator uses a session pid that no scenario process carries.

use std::cell::RefCell;
use std::collections::HashMap;

use pc_common::{ProcessCategory, ProcessId};
use pc_config::{PatternEntry, Policy, PolicyMode};
use pc_core::action::{TerminationOutcome, TerminationResult, TerminationTarget, Terminator};
use pc_core::collect::{ProcessSnapshot, StaticInventory, UnavailableInventory};
use pc_core::decision::ProtectionReason;
use pc_core::exit_codes::ExitCode;
use pc_core::pass::{ActionReason, CancelFlag, Decision, Orchestrator, PassOptions};

const OUTSIDE_SESSION: ProcessId = ProcessId(4_000_000);

/// Records every target; answers with a scripted outcome per pid.
#[derive(Default)]
struct RecordingTerminator {
    calls: RefCell<Vec<u32>>,
    outcomes: HashMap<u32, TerminationOutcome>,
    cancel_after_first: Option<CancelFlag>,
}

impl RecordingTerminator {
    fn calls(&self) -> Vec<u32> {
        self.calls.borrow().clone()
    }
}

impl Terminator for RecordingTerminator {
    fn terminate(&self, target: TerminationTarget) -> TerminationResult {
        self.calls.borrow_mut().push(target.pid);
        if let Some(cancel) = &self.cancel_after_first {
            cancel.cancel();
        }
        let outcome = self
            .outcomes
            .get(&target.pid)
            .copied()
            .unwrap_or(TerminationOutcome::Succeeded);
        TerminationResult {
            outcome,
            forced: false,
            elapsed_ms: 1,
            detail: None,
        }
    }
}

fn helper_policy(mode: PolicyMode) -> Policy {
    let mut policy = Policy::default().with_mode(mode);
    policy.allowlist = vec![PatternEntry::literal("helper", ProcessCategory::Browser)];
    policy
}

fn proc(pid: u32, command: &str, cpu: f64) -> ProcessSnapshot {
    ProcessSnapshot::new(pid, 0, command).with_cpu(cpu).with_memory(2.0)
}

fn forced() -> PassOptions {
    PassOptions {
        force: true,
        ..PassOptions::default()
    }
}

fn orchestrator<'a>(
    policy: Policy,
    inventory: &'a StaticInventory,
    terminator: &'a RecordingTerminator,
) -> Orchestrator<'a> {
    Orchestrator::new(policy, inventory, terminator)
        .expect("policy compiles")
        .with_session(OUTSIDE_SESSION, None)
}

#[test]
fn mixed_snapshot_skips_terminates_and_monitors() {
    let inventory = StaticInventory::new(vec![
        proc(1, "Terminal", 95.0),
        proc(2, "helper", 85.0),
        proc(3, "unknownTool", 90.0),
    ]);
    let terminator = RecordingTerminator::default();
    let report = orchestrator(helper_policy(PolicyMode::Balanced), &inventory, &terminator)
        .run_pass(PassOptions::default());

    assert!(!report.skipped_gated_by_policy);
    assert_eq!(terminator.calls(), vec![2]);

    let terminal = report.action_for(1).unwrap();
    assert_eq!(terminal.decision, Decision::Skipped);
    assert_eq!(
        terminal.reason,
        ActionReason::Protected(ProtectionReason::NeverKillList)
    );
    assert!(terminal.score_at_decision.is_none());

    let helper = report.action_for(2).unwrap();
    assert_eq!(helper.decision, Decision::Terminated);
    assert_eq!(helper.reason, ActionReason::Allowlisted);
    assert_eq!(helper.outcome(), Some(TerminationOutcome::Succeeded));

    let unknown = report.action_for(3).unwrap();
    assert_eq!(unknown.decision, Decision::Monitored);
    assert_eq!(unknown.reason, ActionReason::NotAllowlisted);
    assert!(unknown.score_at_decision.unwrap() > helper.score_at_decision.unwrap());

    assert_eq!(report.counts.skipped, 1);
    assert_eq!(report.counts.terminated, 1);
    assert_eq!(report.counts.monitored, 1);
    assert_eq!(ExitCode::for_report(&report), ExitCode::ActionsOk);
}

#[test]
fn low_load_is_gated_unless_forced() {
    let inventory = StaticInventory::new(vec![proc(2, "helper", 40.0)]).with_logical_cpus(8);
    let terminator = RecordingTerminator::default();
    let orch = orchestrator(helper_policy(PolicyMode::Aggressive), &inventory, &terminator);

    let gated = orch.run_pass(PassOptions::default());
    assert!(gated.skipped_gated_by_policy);
    assert!(gated.actions.is_empty());
    assert_eq!(ExitCode::for_report(&gated), ExitCode::Gated);
    assert!(terminator.calls().is_empty());

    let forced = orch.run_pass(forced());
    assert!(forced.forced);
    assert_eq!(terminator.calls(), vec![2]);
}

#[test]
fn off_mode_only_runs_when_forced() {
    let inventory = StaticInventory::new(vec![proc(2, "helper", 99.0)]);
    let terminator = RecordingTerminator::default();
    let orch = orchestrator(helper_policy(PolicyMode::Off), &inventory, &terminator);

    assert!(orch.run_pass(PassOptions::default()).skipped_gated_by_policy);
    let report = orch.run_pass(forced());
    assert_eq!(report.mode, PolicyMode::Off);
    assert_eq!(report.action_for(2).unwrap().decision, Decision::Terminated);
}

#[test]
fn mode_override_applies_its_cpu_gate() {
    // 25% clears the off/aggressive gate (20) but not balanced (30).
    let inventory = StaticInventory::new(vec![proc(2, "helper", 25.0)]);
    let terminator = RecordingTerminator::default();
    let orch = orchestrator(helper_policy(PolicyMode::Balanced), &inventory, &terminator);

    let balanced = orch.run_pass(forced());
    assert_eq!(
        balanced.action_for(2).unwrap().reason,
        ActionReason::BelowCpuThreshold
    );

    let aggressive = orch.run_pass(PassOptions {
        mode: Some(PolicyMode::Aggressive),
        force: true,
        dry_run: false,
    });
    assert_eq!(aggressive.mode, PolicyMode::Aggressive);
    assert_eq!(
        aggressive.action_for(2).unwrap().decision,
        Decision::Terminated
    );
}

#[test]
fn budget_caps_scored_terminations_in_score_order() {
    let mut policy = helper_policy(PolicyMode::Balanced);
    policy.guardrails.max_terminations_per_pass = 2;
    let inventory = StaticInventory::new(vec![
        proc(10, "helper a", 50.0),
        proc(11, "helper b", 90.0),
        proc(12, "helper c", 70.0),
        proc(13, "helper d", 60.0),
    ]);
    let terminator = RecordingTerminator::default();
    let report = orchestrator(policy, &inventory, &terminator).run_pass(forced());

    assert_eq!(terminator.calls(), vec![11, 12]);
    for pid in [10, 13] {
        let action = report.action_for(pid).unwrap();
        assert_eq!(action.decision, Decision::Monitored);
        assert_eq!(action.reason, ActionReason::BudgetExhausted);
    }
}

#[test]
fn dry_run_preview_respects_the_budget() {
    let mut policy = helper_policy(PolicyMode::Balanced);
    policy.guardrails.max_terminations_per_pass = 2;
    let inventory = StaticInventory::new(vec![
        proc(10, "helper a", 50.0),
        proc(11, "helper b", 90.0),
        proc(12, "helper c", 70.0),
        proc(13, "helper d", 60.0),
    ]);
    let terminator = RecordingTerminator::default();
    let report = orchestrator(policy, &inventory, &terminator).run_pass(PassOptions {
        dry_run: true,
        ..forced()
    });

    assert!(terminator.calls().is_empty());
    for pid in [11, 12] {
        assert_eq!(report.action_for(pid).unwrap().reason, ActionReason::DryRun);
    }
    for pid in [10, 13] {
        assert_eq!(
            report.action_for(pid).unwrap().reason,
            ActionReason::BudgetExhausted
        );
    }
}

#[test]
fn safe_sweep_bypasses_scoring_and_budget() {
    let mut policy = helper_policy(PolicyMode::Balanced);
    policy.guardrails.max_terminations_per_pass = 0;
    let inventory = StaticInventory::new(vec![
        proc(20, "ReportCrash", 0.1),
        proc(21, "helper", 80.0),
        proc(22, "spindump", 0.0),
    ]);
    let terminator = RecordingTerminator::default();
    let report = orchestrator(policy, &inventory, &terminator).run_pass(forced());

    assert_eq!(
        report.action_for(21).unwrap().reason,
        ActionReason::BudgetExhausted
    );
    let mut swept = terminator.calls();
    swept.sort_unstable();
    assert_eq!(swept, vec![20, 22]);
    assert_eq!(report.action_for(20).unwrap().reason, ActionReason::SafeSweep);
}

#[test]
fn dry_run_signals_nothing() {
    let inventory = StaticInventory::new(vec![
        proc(2, "helper", 85.0),
        proc(20, "ReportCrash", 1.0),
    ]);
    let terminator = RecordingTerminator::default();
    let report = orchestrator(helper_policy(PolicyMode::Balanced), &inventory, &terminator)
        .run_pass(PassOptions {
            dry_run: true,
            ..forced()
        });

    assert!(terminator.calls().is_empty());
    assert!(report.dry_run);
    for action in &report.actions {
        assert_eq!(action.decision, Decision::Monitored);
        assert_eq!(action.reason, ActionReason::DryRun);
    }
    assert_eq!(ExitCode::for_report(&report), ExitCode::Clean);
}

#[test]
fn protection_rules_beat_allowlist() {
    let inventory = StaticInventory::new(vec![
        ProcessSnapshot::new(30, 0, "helper parent").with_cpu(90.0),
        ProcessSnapshot::new(31, 30, "helper child").with_cpu(5.0),
        ProcessSnapshot::new(32, 0, "helper editing")
            .with_cpu(90.0)
            .with_home_files(true),
    ]);
    let terminator = RecordingTerminator::default();
    let report = orchestrator(helper_policy(PolicyMode::Balanced), &inventory, &terminator)
        .run_pass(forced());

    assert_eq!(
        report.action_for(30).unwrap().reason,
        ActionReason::Protected(ProtectionReason::HasChildren)
    );
    assert_eq!(
        report.action_for(32).unwrap().reason,
        ActionReason::Protected(ProtectionReason::HasHomeFiles)
    );
    assert!(!terminator.calls().contains(&30));
    assert!(!terminator.calls().contains(&32));
}

#[test]
fn own_ancestry_is_never_touched() {
    let inventory = StaticInventory::new(vec![
        ProcessSnapshot::new(100, 0, "helper launcher").with_cpu(99.0),
        ProcessSnapshot::new(101, 100, "helper self").with_cpu(99.0),
    ]);
    let terminator = RecordingTerminator::default();
    let policy = helper_policy(PolicyMode::Balanced);
    let report = Orchestrator::new(policy, &inventory, &terminator)
        .unwrap()
        .with_session(ProcessId(101), None)
        .run_pass(forced());

    assert!(terminator.calls().is_empty());
    for action in &report.actions {
        assert_eq!(
            action.reason,
            ActionReason::Protected(ProtectionReason::CurrentSessionAncestor)
        );
    }
}

#[test]
fn failed_and_vanished_outcomes() {
    let inventory = StaticInventory::new(vec![
        proc(40, "helper stubborn", 90.0),
        proc(41, "helper gone", 80.0),
    ]);
    let terminator = RecordingTerminator {
        outcomes: HashMap::from([
            (40, TerminationOutcome::Failed),
            (41, TerminationOutcome::NotFound),
        ]),
        ..RecordingTerminator::default()
    };
    let report = orchestrator(helper_policy(PolicyMode::Balanced), &inventory, &terminator)
        .run_pass(forced());

    assert_eq!(
        report.action_for(40).unwrap().decision,
        Decision::TerminationFailed
    );
    let gone = report.action_for(41).unwrap();
    assert_eq!(gone.decision, Decision::Terminated);
    assert_eq!(gone.outcome(), Some(TerminationOutcome::NotFound));
    assert_eq!(ExitCode::for_report(&report), ExitCode::PartialFail);
}

#[test]
fn cancellation_returns_partial_report() {
    let cancel = CancelFlag::new();
    let inventory = StaticInventory::new(vec![
        proc(50, "helper one", 90.0),
        proc(51, "helper two", 80.0),
        proc(52, "ReportCrash", 1.0),
    ]);
    let terminator = RecordingTerminator {
        cancel_after_first: Some(cancel.clone()),
        ..RecordingTerminator::default()
    };
    let report = orchestrator(helper_policy(PolicyMode::Balanced), &inventory, &terminator)
        .with_cancel(cancel)
        .run_pass(forced());

    assert_eq!(terminator.calls(), vec![50]);
    assert!(report.cancelled);
    assert_eq!(report.action_for(50).unwrap().decision, Decision::Terminated);
    for pid in [51, 52] {
        assert_eq!(report.action_for(pid).unwrap().reason, ActionReason::Cancelled);
    }
    assert_eq!(ExitCode::for_report(&report), ExitCode::Interrupted);
}

#[test]
fn inventory_failure_aborts_pass() {
    let inventory = UnavailableInventory("procfs not mounted".to_string());
    let terminator = RecordingTerminator::default();
    let report = Orchestrator::new(helper_policy(PolicyMode::Balanced), &inventory, &terminator)
        .unwrap()
        .run_pass(forced());

    let error = report.error.as_ref().expect("error recorded");
    assert_eq!(error.code, 20);
    assert!(report.actions.is_empty());
    assert_eq!(ExitCode::for_report(&report), ExitCode::InventoryError);
}

#[test]
fn report_renders_in_every_format() {
    let inventory = StaticInventory::new(vec![
        proc(1, "Terminal", 95.0),
        proc(2, "helper", 85.0),
    ]);
    let terminator = RecordingTerminator::default();
    let report = orchestrator(helper_policy(PolicyMode::Balanced), &inventory, &terminator)
        .with_config_id("abc123")
        .run_pass(forced());

    let json: serde_json::Value = serde_json::from_str(&serde_json::to_string(&report).unwrap()).unwrap();
    assert_eq!(json["config_id"], "abc123");
    assert_eq!(json["actions"][0]["reason"], "protected(never_kill_list)");
    assert_eq!(json["counts"]["terminated"], 1);

    let md = report.render_markdown();
    assert!(md.contains("| 2 | helper |"));
    assert!(!md.contains("| 1 | Terminal |"));
    assert!(report.summary_line().contains("1 terminated"));
}

#[test]
fn assess_counts_without_signalling() {
    let inventory = StaticInventory::new(vec![
        proc(1, "Terminal", 95.0),
        proc(2, "helper", 85.0),
        proc(3, "unknownTool", 90.0),
        proc(20, "ReportCrash", 1.0),
    ]);
    let terminator = RecordingTerminator::default();
    let orch = orchestrator(helper_policy(PolicyMode::Balanced), &inventory, &terminator);
    let assessment = orch.assess(None).unwrap();

    assert!(terminator.calls().is_empty());
    assert!(assessment.would_run);
    assert_eq!(assessment.process_count, 4);
    assert_eq!(assessment.protected_count, 1);
    assert_eq!(assessment.by_reason[&ProtectionReason::NeverKillList], 1);
    assert_eq!(assessment.by_category[&ProcessCategory::Terminal], 1);
    assert_eq!(assessment.top_consumers[0].pid, 1);
    assert!(assessment.top_consumers.iter().any(|r| r.safe_sweep && r.pid == 20));
}
