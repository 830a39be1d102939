//! Structured event vocabulary for logging.
//!
//! Every pass-lifecycle event carries the same correlation fields
//! (run_id, pass_id, host_id, stage) so JSONL logs can be grouped per pass.

use serde::{Deserialize, Serialize};

/// Log levels for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Stages of a cleanup pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup and policy loading.
    Init,
    /// Inventory pull.
    Inventory,
    /// Protection classification.
    Classify,
    /// Risk scoring.
    Score,
    /// Killability and budget decisions.
    Decide,
    /// Signal delivery.
    Apply,
    /// Report assembly.
    Report,
    /// Periodic watcher.
    Watch,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Inventory => "inventory",
            Stage::Classify => "classify",
            Stage::Score => "score",
            Stage::Decide => "decide",
            Stage::Apply => "apply",
            Stage::Report => "report",
            Stage::Watch => "watch",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event names. These become the `event` key in JSONL output.
pub mod event_names {
    // Pass lifecycle
    pub const PASS_STARTED: &str = "pass.started";
    pub const PASS_GATED: &str = "pass.gated";
    pub const PASS_DRY_RUN_FORCED: &str = "pass.dry_run_forced";
    pub const PASS_CANCELLED: &str = "pass.cancelled";
    pub const PASS_FINISHED: &str = "pass.finished";

    // Inventory
    pub const INVENTORY_PULLED: &str = "inventory.pulled";
    pub const INVENTORY_FAILED: &str = "inventory.failed";

    // Classify / decide
    pub const CLASSIFY_FINISHED: &str = "classify.finished";
    pub const DECIDE_BUDGET_EXHAUSTED: &str = "decide.budget_exhausted";

    // Apply
    pub const APPLY_ACTION_RESULT: &str = "apply.action_result";

    // Watcher
    pub const WATCH_STARTED: &str = "watch.started";
    pub const WATCH_TICK: &str = "watch.tick";
    pub const WATCH_COOLDOWN: &str = "watch.cooldown";
    pub const WATCH_STOPPED: &str = "watch.stopped";

    // Config
    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_DEFAULT_USED: &str = "config.default_used";
    pub const CONFIG_REJECTED: &str = "config.rejected";
}

/// Correlation IDs shared by every event of one invocation.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub run_id: String,
    pub pass_id: Option<String>,
    pub host_id: String,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>, host_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            pass_id: None,
            host_id: host_id.into(),
        }
    }

    /// Context for the current process: fresh run ID, stable host ID.
    pub fn current() -> Self {
        LogContext::new(super::generate_run_id(), super::get_host_id())
    }

    /// Same run and host, scoped to one pass.
    pub fn with_pass_id(&self, pass_id: impl Into<String>) -> Self {
        LogContext {
            run_id: self.run_id.clone(),
            pass_id: Some(pass_id.into()),
            host_id: self.host_id.clone(),
        }
    }
}
