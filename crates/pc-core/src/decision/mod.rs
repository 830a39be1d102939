//! Decision layer: pattern tables, protection, scoring and policy gating.
//!
//! Everything here is pure over an already-captured inventory.

pub mod patterns;
pub mod policy;
pub mod protection;
pub mod scoring;

pub use patterns::{CompiledPattern, PatternError, PatternTable};
pub use policy::{Killability, PolicyController};
pub use protection::{
    classify, ProtectionReason, ProtectionVerdict, SessionContext,
};
pub use scoring::{normalize, RiskScorer, ScoreBreakdown};
