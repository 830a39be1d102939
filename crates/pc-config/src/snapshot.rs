//! Configuration snapshots for report provenance.
//!
//! A snapshot records which policy file a pass ran under, where it came from
//! and its SHA-256, so any report can be traced back to the exact configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::policy::{MatchingMode, Policy, PolicyMode};
use crate::resolve::{ConfigPaths, ConfigSource};

/// A frozen snapshot of configuration state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// When this snapshot was taken.
    pub timestamp: DateTime<Utc>,

    /// Schema version of the configuration.
    pub schema_version: String,

    /// SHA-256 of the policy file content (None for built-in defaults).
    #[serde(default)]
    pub policy_hash: Option<String>,

    /// Path where the policy was loaded from.
    #[serde(default)]
    pub policy_path: Option<String>,

    /// Source of the policy configuration.
    pub policy_source: String,

    /// Key configuration values for quick reference.
    pub summary: ConfigSummary,
}

/// Summary of key configuration values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub mode: PolicyMode,
    pub matching: MatchingMode,
    pub never_kill_count: usize,
    pub allowlist_count: usize,
    pub background_helper_count: usize,
    pub safe_sweep_count: usize,
    pub max_terminations_per_pass: u32,
    pub grace_ms: u64,
}

impl ConfigSummary {
    fn of(policy: &Policy) -> Self {
        Self {
            mode: policy.mode,
            matching: policy.matching.mode,
            never_kill_count: policy.never_kill.len(),
            allowlist_count: policy.allowlist.len(),
            background_helper_count: policy.background_helpers.len(),
            safe_sweep_count: policy.safe_sweep.len(),
            max_terminations_per_pass: policy.guardrails.max_terminations_per_pass,
            grace_ms: policy.guardrails.grace_ms,
        }
    }
}

impl ConfigSnapshot {
    /// Create a snapshot for a policy loaded from `paths`.
    pub fn new(policy: &Policy, paths: &ConfigPaths, policy_json: Option<&str>) -> Self {
        ConfigSnapshot {
            timestamp: Utc::now(),
            schema_version: policy.schema_version.clone(),
            policy_hash: policy_json.map(hash_content),
            policy_path: paths.policy.as_ref().map(|p| p.display().to_string()),
            policy_source: paths.policy_source.to_string(),
            summary: ConfigSummary::of(policy),
        }
    }

    /// Create a snapshot with only defaults (no config file loaded).
    pub fn defaults_only(policy: &Policy) -> Self {
        ConfigSnapshot {
            timestamp: Utc::now(),
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            policy_hash: None,
            policy_path: None,
            policy_source: ConfigSource::BuiltinDefault.to_string(),
            summary: ConfigSummary::of(policy),
        }
    }

    /// Check if this snapshot was built from the same file content as another.
    pub fn matches(&self, other: &ConfigSnapshot) -> bool {
        self.policy_hash == other.policy_hash
    }

    /// Short identifier (first 12 chars of the hash, or "defaults").
    pub fn short_id(&self) -> &str {
        match &self.policy_hash {
            Some(hash) => &hash[..12.min(hash.len())],
            None => "defaults",
        }
    }
}

/// Hash content with SHA-256 and return hex string.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
