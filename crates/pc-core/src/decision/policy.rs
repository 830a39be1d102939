//! Policy controller: pass gating and per-process killability.

use serde::Serialize;

use pc_config::{PolicyMode, Policy, ThresholdPair};

use super::patterns::PatternTable;
use crate::collect::ProcessSnapshot;

/// Why a non-exempt process may or may not be terminated by the scored tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Killability {
    Killable,
    /// Not in the allowlist. Unknown processes are never killed by score.
    NotAllowlisted,
    /// Allowlisted, but its own CPU is at or below the mode's threshold.
    BelowCpuThreshold,
}

impl Killability {
    pub fn is_killable(self) -> bool {
        self == Killability::Killable
    }
}

/// Active mode plus its thresholds. Read-only for the duration of a pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyController {
    mode: PolicyMode,
    activation: Option<ThresholdPair>,
    individual_cpu_threshold: f64,
}

impl PolicyController {
    /// Controller for `mode`, using the thresholds configured in `policy`.
    pub fn new(policy: &Policy, mode: PolicyMode) -> Self {
        PolicyController {
            mode,
            activation: policy.thresholds.for_mode(mode),
            individual_cpu_threshold: policy.individual_cpu_threshold.for_mode(mode),
        }
    }

    pub fn mode(&self) -> PolicyMode {
        self.mode
    }

    pub fn activation(&self) -> Option<ThresholdPair> {
        self.activation
    }

    pub fn individual_cpu_threshold(&self) -> f64 {
        self.individual_cpu_threshold
    }

    /// `Off` never auto-runs. Otherwise either metric strictly above its
    /// threshold activates the pass.
    pub fn should_run_pass(&self, system_cpu_percent: f64, system_memory_percent: f64) -> bool {
        match self.activation {
            None => false,
            Some(t) => system_cpu_percent > t.cpu_percent || system_memory_percent > t.memory_percent,
        }
    }

    /// Allowlist membership first, then the process's own CPU.
    pub fn assess(&self, snapshot: &ProcessSnapshot, patterns: &PatternTable) -> Killability {
        if !patterns.is_allowlisted(&snapshot.command) {
            Killability::NotAllowlisted
        } else if snapshot.cpu_percent > self.individual_cpu_threshold {
            Killability::Killable
        } else {
            Killability::BelowCpuThreshold
        }
    }

    pub fn is_killable(&self, snapshot: &ProcessSnapshot, patterns: &PatternTable) -> bool {
        self.assess(snapshot, patterns).is_killable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(mode: PolicyMode) -> PolicyController {
        PolicyController::new(&Policy::default(), mode)
    }

    #[test]
    fn test_off_never_runs() {
        let c = controller(PolicyMode::Off);
        assert!(!c.should_run_pass(100.0, 100.0));
        assert!(!c.should_run_pass(f64::INFINITY, 0.0));
    }

    #[test]
    fn test_aggressive_gate() {
        let c = controller(PolicyMode::Aggressive);
        assert!(c.should_run_pass(55.0, 10.0));
        assert!(!c.should_run_pass(40.0, 40.0));
        assert!(c.should_run_pass(0.0, 71.0));
        assert!(!c.should_run_pass(50.0, 70.0));
    }

    #[test]
    fn test_mode_table() {
        let c = controller(PolicyMode::Conservative);
        assert!(!c.should_run_pass(90.0, 95.0));
        assert!(c.should_run_pass(90.1, 0.0));
        let b = controller(PolicyMode::Balanced);
        assert!(b.should_run_pass(71.0, 0.0));
        assert!(b.should_run_pass(0.0, 86.0));
    }

    #[test]
    fn test_killability() {
        let policy = Policy::default();
        let patterns = PatternTable::compile(&policy).unwrap();
        let c = PolicyController::new(&policy, PolicyMode::Balanced);

        let hot_helper = ProcessSnapshot::new(1, 0, "Chrome Helper (Renderer)").with_cpu(85.0);
        assert_eq!(c.assess(&hot_helper, &patterns), Killability::Killable);

        let cool_helper = ProcessSnapshot::new(2, 0, "Chrome Helper").with_cpu(30.0);
        assert_eq!(c.assess(&cool_helper, &patterns), Killability::BelowCpuThreshold);

        let hot_unknown = ProcessSnapshot::new(3, 0, "unknownTool").with_cpu(99.0);
        assert_eq!(c.assess(&hot_unknown, &patterns), Killability::NotAllowlisted);
        assert!(!c.is_killable(&hot_unknown, &patterns));
    }
}
