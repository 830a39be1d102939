//! Process Cleanup configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for policy.json
//! - Config resolution (CLI → env → XDG → /etc → defaults)
//! - Threshold clamping and semantic validation
//! - Config snapshots for report provenance

pub mod policy;
pub mod resolve;
pub mod snapshot;
pub mod validate;

use std::path::Path;

pub use policy::{
    Guardrails, MatchingMode, PatternEntry, PatternKind, Policy, PolicyMode, ScoringConfig,
    ThresholdPair,
};
pub use resolve::{resolve_config, ConfigPaths, ConfigSource};
pub use snapshot::ConfigSnapshot;
pub use validate::{Clamped, ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";

/// A validated policy plus where it came from.
#[derive(Debug, Clone)]
pub struct LoadedPolicy {
    pub policy: Policy,
    pub snapshot: ConfigSnapshot,
    /// Thresholds that were out of range and pulled back into [0, 100].
    pub clamped: Vec<Clamped>,
}

/// Resolve, read, clamp and validate the policy.
///
/// Falls back to built-in defaults when no file is found anywhere in the
/// resolution chain.
pub fn load_policy(cli_policy: Option<&Path>) -> ValidationResult<LoadedPolicy> {
    let paths = resolve_config(cli_policy);
    load_from_paths(&paths)
}

/// Load the policy from already-resolved paths.
pub fn load_from_paths(paths: &ConfigPaths) -> ValidationResult<LoadedPolicy> {
    match &paths.policy {
        Some(path) => {
            let content = std::fs::read_to_string(path).map_err(|e| {
                ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
            })?;
            let parsed = Policy::parse_json(&content)?;
            let (policy, clamped) = validate::sanitize_policy(parsed)?;
            let snapshot = ConfigSnapshot::new(&policy, paths, Some(&content));
            Ok(LoadedPolicy {
                policy,
                snapshot,
                clamped,
            })
        }
        None => {
            let policy = Policy::default();
            let snapshot = ConfigSnapshot::defaults_only(&policy);
            Ok(LoadedPolicy {
                policy,
                snapshot,
                clamped: Vec::new(),
            })
        }
    }
}
