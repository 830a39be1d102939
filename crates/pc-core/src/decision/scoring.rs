//! Risk scorer: cleanup eligibility in [0, 100].
//!
//! ```text
//! score = 0.40 * normalize(cpu, 100)
//!       + 0.30 * normalize(memory, 100)
//!       + 0.10 * normalize(open_fds, fd_cap)
//!       + 0.10 * normalize(age, age_cap)
//!       + 0.10 * category_weight
//! ```
//!
//! Monotonic in every input and bounded, so thresholds mean the same thing
//! from pass to pass.

use serde::Serialize;

use pc_config::ScoringConfig;

use super::patterns::PatternTable;
use crate::collect::ProcessSnapshot;

pub const CPU_WEIGHT: f64 = 0.40;
pub const MEMORY_WEIGHT: f64 = 0.30;
pub const FD_WEIGHT: f64 = 0.10;
pub const AGE_WEIGHT: f64 = 0.10;
pub const CATEGORY_WEIGHT: f64 = 0.10;

/// Clamp `x` into `[0, cap]` and map linearly onto `[0, 100]`.
///
/// Non-finite inputs and non-positive caps contribute nothing.
pub fn normalize(x: f64, cap: f64) -> f64 {
    if !x.is_finite() || !cap.is_finite() || cap <= 0.0 {
        return 0.0;
    }
    x.clamp(0.0, cap) / cap * 100.0
}

/// Per-term contributions, each already weighted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub cpu: f64,
    pub memory: f64,
    pub fds: f64,
    pub age: f64,
    pub category: f64,
    pub total: f64,
}

/// Scores non-exempt processes.
#[derive(Debug, Clone, Copy)]
pub struct RiskScorer<'a> {
    config: &'a ScoringConfig,
    patterns: &'a PatternTable,
}

impl<'a> RiskScorer<'a> {
    pub fn new(config: &'a ScoringConfig, patterns: &'a PatternTable) -> Self {
        RiskScorer { config, patterns }
    }

    /// Constant for known background helpers, zero otherwise.
    pub fn category_weight(&self, command: &str) -> f64 {
        if self.patterns.is_background_helper(command) {
            self.config.helper_weight.clamp(0.0, 100.0)
        } else {
            0.0
        }
    }

    pub fn breakdown(&self, snapshot: &ProcessSnapshot) -> ScoreBreakdown {
        let cpu = CPU_WEIGHT * normalize(snapshot.cpu_percent, 100.0);
        let memory = MEMORY_WEIGHT * normalize(snapshot.memory_percent, 100.0);
        let fds = FD_WEIGHT
            * normalize(
                f64::from(snapshot.open_fd_count),
                f64::from(self.config.fd_cap),
            );
        let age = AGE_WEIGHT
            * normalize(
                snapshot.age_seconds as f64,
                self.config.age_cap_seconds as f64,
            );
        let category = CATEGORY_WEIGHT * self.category_weight(&snapshot.command);
        let total = (cpu + memory + fds + age + category).clamp(0.0, 100.0);
        ScoreBreakdown {
            cpu,
            memory,
            fds,
            age,
            category,
            total,
        }
    }

    pub fn score(&self, snapshot: &ProcessSnapshot) -> f64 {
        self.breakdown(snapshot).total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pc_config::Policy;

    #[test]
    fn test_weights_sum_to_one() {
        let sum = CPU_WEIGHT + MEMORY_WEIGHT + FD_WEIGHT + AGE_WEIGHT + CATEGORY_WEIGHT;
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(50.0, 100.0), 50.0);
        assert_eq!(normalize(300.0, 100.0), 100.0);
        assert_eq!(normalize(-5.0, 100.0), 0.0);
        assert_eq!(normalize(128.0, 256.0), 50.0);
        assert_eq!(normalize(f64::NAN, 100.0), 0.0);
        assert_eq!(normalize(10.0, 0.0), 0.0);
    }

    #[test]
    fn test_maxed_helper_scores_100() {
        let policy = Policy::default();
        let patterns = PatternTable::compile(&policy).unwrap();
        let scorer = RiskScorer::new(&policy.scoring, &patterns);
        let snap = ProcessSnapshot::new(1, 0, "mds_stores")
            .with_cpu(400.0)
            .with_memory(100.0)
            .with_fds(10_000)
            .with_age(10 * 86_400);
        let b = scorer.breakdown(&snap);
        assert!((b.total - 100.0).abs() < 1e-9);
        assert!((b.category - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_idle_unknown_scores_zero() {
        let policy = Policy::default();
        let patterns = PatternTable::compile(&policy).unwrap();
        let scorer = RiskScorer::new(&policy.scoring, &patterns);
        assert_eq!(scorer.score(&ProcessSnapshot::new(1, 0, "unknownTool")), 0.0);
    }

    #[test]
    fn test_cpu_only() {
        let policy = Policy::default();
        let patterns = PatternTable::compile(&policy).unwrap();
        let scorer = RiskScorer::new(&policy.scoring, &patterns);
        let snap = ProcessSnapshot::new(1, 0, "unknownTool").with_cpu(90.0);
        assert!((scorer.score(&snap) - 36.0).abs() < 1e-9);
    }
}
