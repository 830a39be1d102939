//! Configuration as seen by the engine.
//!
//! Loading, clamping and semantic checks live in `pc-config`. This module
//! adds what only the engine can check (patterns compile against the matcher)
//! and keeps the last-known-good policy when a candidate is rejected.

use std::path::Path;

use thiserror::Error;

pub use pc_config::{ConfigSnapshot, LoadedPolicy, Policy, ValidationError};

use crate::decision::{PatternError, PatternTable};
use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};

/// Why a policy candidate was not accepted.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Pattern(#[from] PatternError),
}

impl From<ConfigError> for pc_common::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation(e) => e.into(),
            ConfigError::Pattern(e) => e.into(),
        }
    }
}

/// Resolve, load and fully check a policy.
pub fn load_checked(cli_policy: Option<&Path>) -> Result<LoadedPolicy, ConfigError> {
    let loaded = pc_config::load_policy(cli_policy)?;
    PatternTable::compile(&loaded.policy)?;
    Ok(loaded)
}

/// The active policy and its provenance.
#[derive(Debug, Clone)]
pub struct PolicyStore {
    current: LoadedPolicy,
    rejected: u32,
}

impl PolicyStore {
    /// Start from a candidate that has already passed [`load_checked`].
    pub fn new(loaded: LoadedPolicy) -> Self {
        PolicyStore {
            current: loaded,
            rejected: 0,
        }
    }

    /// Built-in defaults.
    pub fn defaults() -> Self {
        let policy = Policy::default();
        let snapshot = ConfigSnapshot::defaults_only(&policy);
        Self::new(LoadedPolicy {
            policy,
            snapshot,
            clamped: Vec::new(),
        })
    }

    pub fn policy(&self) -> &Policy {
        &self.current.policy
    }

    pub fn snapshot(&self) -> &ConfigSnapshot {
        &self.current.snapshot
    }

    /// Candidates rejected since the store was created.
    pub fn rejected_count(&self) -> u32 {
        self.rejected
    }

    /// Replace the active policy. Returns `Ok(false)` when the candidate's
    /// content is identical to the active one. On error nothing changes.
    pub fn apply(&mut self, candidate: LoadedPolicy) -> Result<bool, ConfigError> {
        let checked = pc_config::validate::validate_policy(&candidate.policy)
            .map_err(ConfigError::from)
            .and_then(|()| PatternTable::compile(&candidate.policy).map_err(ConfigError::from));
        if let Err(err) = checked {
            self.rejected += 1;
            return Err(err);
        }
        if candidate.snapshot.matches(&self.current.snapshot)
            && candidate.snapshot.policy_path == self.current.snapshot.policy_path
        {
            return Ok(false);
        }
        self.current = candidate;
        Ok(true)
    }

    /// Re-resolve and re-read the policy; a failure keeps the active one.
    pub fn reload(&mut self, cli_policy: Option<&Path>, ctx: &LogContext) -> Result<bool, ConfigError> {
        let result = match pc_config::load_policy(cli_policy) {
            Ok(candidate) => self.apply(candidate),
            Err(err) => {
                self.rejected += 1;
                Err(err.into())
            }
        };
        match &result {
            Ok(true) => {
                log_event!(
                    ctx,
                    INFO,
                    event_names::CONFIG_LOADED,
                    Stage::Init,
                    "policy reloaded",
                    source = self.current.snapshot.policy_source.as_str(),
                    config_id = self.current.snapshot.short_id()
                );
            }
            Ok(false) => {}
            Err(err) => {
                let message = err.to_string();
                log_event!(
                    ctx,
                    WARN,
                    event_names::CONFIG_REJECTED,
                    Stage::Init,
                    "policy rejected; keeping last-known-good",
                    error = message.as_str(),
                    config_id = self.current.snapshot.short_id()
                );
            }
        }
        result
    }
}
