//! Cleanup report: the only artifact a pass produces.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use pc_common::{PassId, ProcessCategory, StructuredError};
use pc_config::PolicyMode;

use crate::action::{TerminationOutcome, TerminationResult};
use crate::decision::{Killability, ProtectionReason};

/// Per-process decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Protected; never scored.
    Skipped,
    /// Scored, left running.
    Monitored,
    /// Signalled and gone (or already gone).
    Terminated,
    /// Signalled and still there, or signalling was refused.
    TerminationFailed,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Skipped => "skipped",
            Decision::Monitored => "monitored",
            Decision::Terminated => "terminated",
            Decision::TerminationFailed => "termination_failed",
        }
    }

    /// `NotFound` still counts as terminated: the process is gone.
    pub fn from_outcome(outcome: TerminationOutcome) -> Self {
        match outcome {
            TerminationOutcome::Succeeded | TerminationOutcome::NotFound => Decision::Terminated,
            TerminationOutcome::Failed => Decision::TerminationFailed,
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a decision was taken. Serialized as a short string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionReason {
    Protected(ProtectionReason),
    NotAllowlisted,
    BelowCpuThreshold,
    Allowlisted,
    SafeSweep,
    BudgetExhausted,
    DryRun,
    Cancelled,
}

impl From<Killability> for ActionReason {
    fn from(k: Killability) -> Self {
        match k {
            Killability::Killable => ActionReason::Allowlisted,
            Killability::NotAllowlisted => ActionReason::NotAllowlisted,
            Killability::BelowCpuThreshold => ActionReason::BelowCpuThreshold,
        }
    }
}

impl std::fmt::Display for ActionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionReason::Protected(r) => write!(f, "protected({})", r),
            ActionReason::NotAllowlisted => f.write_str("not_allowlisted"),
            ActionReason::BelowCpuThreshold => f.write_str("below_cpu_threshold"),
            ActionReason::Allowlisted => f.write_str("allowlisted"),
            ActionReason::SafeSweep => f.write_str("safe_sweep"),
            ActionReason::BudgetExhausted => f.write_str("budget_exhausted"),
            ActionReason::DryRun => f.write_str("dry_run"),
            ActionReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

impl Serialize for ActionReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One process considered in a pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupAction {
    pub pid: u32,
    pub command: String,
    pub decision: Decision,
    /// `None` for protected processes, which are never scored.
    pub score_at_decision: Option<f64>,
    pub category: ProcessCategory,
    pub reason: ActionReason,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    /// Present when a signal was attempted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination: Option<TerminationResult>,
}

impl CleanupAction {
    pub fn outcome(&self) -> Option<TerminationOutcome> {
        self.termination.as_ref().map(|t| t.outcome)
    }
}

/// Counts by decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecisionCounts {
    pub skipped: usize,
    pub monitored: usize,
    pub terminated: usize,
    pub termination_failed: usize,
}

impl DecisionCounts {
    pub fn tally(actions: &[CleanupAction]) -> Self {
        let mut counts = DecisionCounts::default();
        for action in actions {
            match action.decision {
                Decision::Skipped => counts.skipped += 1,
                Decision::Monitored => counts.monitored += 1,
                Decision::Terminated => counts.terminated += 1,
                Decision::TerminationFailed => counts.termination_failed += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.skipped + self.monitored + self.terminated + self.termination_failed
    }
}

/// Result of one pass. Immutable once returned.
#[derive(Debug, Clone, Serialize)]
pub struct CleanupReport {
    pub schema_version: String,
    pub pass_id: PassId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub mode: PolicyMode,
    pub forced: bool,
    pub dry_run: bool,
    pub inventory_source: Option<String>,
    pub process_count: usize,
    pub system_cpu_percent: f64,
    pub system_memory_percent: f64,
    pub total_cpu_before: f64,
    pub skipped_gated_by_policy: bool,
    pub cancelled: bool,
    /// Set when the inventory could not be pulled; `actions` is then empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StructuredError>,
    /// Short id of the policy the pass ran under.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_id: Option<String>,
    pub counts: DecisionCounts,
    pub actions: Vec<CleanupAction>,
}

impl CleanupReport {
    pub fn action_for(&self, pid: u32) -> Option<&CleanupAction> {
        self.actions.iter().find(|a| a.pid == pid)
    }

    pub fn with_decision(&self, decision: Decision) -> impl Iterator<Item = &CleanupAction> {
        self.actions.iter().filter(move |a| a.decision == decision)
    }

    /// One line for logs and `--format summary`.
    pub fn summary_line(&self) -> String {
        if let Some(err) = &self.error {
            return format!("[{}] pass aborted: {}", self.pass_id.0, err.message);
        }
        if self.skipped_gated_by_policy {
            return format!(
                "[{}] {}: gated (cpu {:.1}%, mem {:.1}%), nothing done",
                self.pass_id.0, self.mode, self.system_cpu_percent, self.system_memory_percent
            );
        }
        let mut line = format!(
            "[{}] {}: {} processes, {} skipped, {} monitored, {} terminated, {} failed",
            self.pass_id.0,
            self.mode,
            self.process_count,
            self.counts.skipped,
            self.counts.monitored,
            self.counts.terminated,
            self.counts.termination_failed
        );
        if self.dry_run {
            line.push_str(" (dry run)");
        }
        if self.cancelled {
            line.push_str(" (cancelled)");
        }
        line
    }

    /// Markdown rendering for humans. Skipped processes are counted, not listed.
    pub fn render_markdown(&self) -> String {
        let mut md = String::new();
        let _ = writeln!(md, "# Cleanup pass {}\n", self.pass_id.0);
        let _ = writeln!(md, "- Mode: {}", self.mode);
        let _ = writeln!(
            md,
            "- System load: cpu {:.1}%, memory {:.1}%",
            self.system_cpu_percent, self.system_memory_percent
        );
        let _ = writeln!(md, "- Total CPU before: {:.1}%", self.total_cpu_before);
        if self.forced {
            let _ = writeln!(md, "- Forced: yes");
        }
        if self.dry_run {
            let _ = writeln!(md, "- Dry run: yes");
        }
        if self.cancelled {
            let _ = writeln!(md, "- Cancelled: yes (partial report)");
        }
        if let Some(err) = &self.error {
            let _ = writeln!(md, "\n**Pass aborted:** {}", err.message);
            return md;
        }
        if self.skipped_gated_by_policy {
            let _ = writeln!(md, "\nBelow activation thresholds. Nothing done.");
            return md;
        }

        let _ = writeln!(
            md,
            "\n| Decision | Count |\n|---|---|\n| skipped | {} |\n| monitored | {} |\n| terminated | {} |\n| termination_failed | {} |",
            self.counts.skipped,
            self.counts.monitored,
            self.counts.terminated,
            self.counts.termination_failed
        );

        let listed: Vec<&CleanupAction> = self
            .actions
            .iter()
            .filter(|a| a.decision != Decision::Skipped)
            .collect();
        if !listed.is_empty() {
            let _ = writeln!(
                md,
                "\n| PID | Command | Score | CPU % | Decision | Reason |\n|---|---|---|---|---|---|"
            );
            for a in listed {
                let score = a
                    .score_at_decision
                    .map(|s| format!("{:.1}", s))
                    .unwrap_or_else(|| "-".to_string());
                let _ = writeln!(
                    md,
                    "| {} | {} | {} | {:.1} | {} | {} |",
                    a.pid,
                    a.command.replace('|', "\\|"),
                    score,
                    a.cpu_percent,
                    a.decision,
                    a.reason
                );
            }
        }
        md
    }
}
