//! Error types for Process Cleanup.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Recoverability hints for automation
//! - Remediation suggestions for humans
//!
//! Only `InventoryUnavailable` aborts a cleanup pass. Termination failures are
//! recorded per action, and configuration errors are rejected at load time
//! while the last-known-good policy stays in effect.
//!
//! # Agent-Facing Output
//!
//! Errors serialize to structured JSON:
//! ```json
//! {
//!   "code": 20,
//!   "category": "inventory",
//!   "message": "process inventory unavailable: /proc not mounted",
//!   "recoverable": true
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for Process Cleanup operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Policy file, mode, threshold or pattern errors.
    Config,
    /// Process inventory collection errors.
    Inventory,
    /// Termination errors.
    Action,
    /// Pass coordination errors (locking, cancellation).
    Pass,
    /// File I/O and serialization errors.
    Io,
    /// Platform compatibility errors.
    Platform,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Inventory => write!(f, "inventory"),
            ErrorCategory::Action => write!(f, "action"),
            ErrorCategory::Pass => write!(f, "pass"),
            ErrorCategory::Io => write!(f, "io"),
            ErrorCategory::Platform => write!(f, "platform"),
        }
    }
}

/// Unified error type for Process Cleanup.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration invalid: {0}")]
    ConfigurationInvalid(String),

    #[error("policy file not found: {path}")]
    PolicyNotFound { path: String },

    // Inventory errors (20-29)
    #[error("process inventory unavailable: {0}")]
    InventoryUnavailable(String),

    // Action errors (30-39)
    #[error("termination of process {pid} failed: {reason}")]
    TerminationFailed { pid: u32, reason: String },

    #[error("permission denied signalling process {pid}")]
    PermissionDenied { pid: u32 },

    // Pass errors (40-49)
    #[error("another cleanup pass is already running")]
    PassInProgress,

    #[error("cleanup pass cancelled")]
    Cancelled,

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Platform errors (70-79)
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Inventory errors
    /// - 30-39: Action errors
    /// - 40-49: Pass errors
    /// - 60-69: I/O errors
    /// - 70-79: Platform errors
    pub fn code(&self) -> u32 {
        match self {
            Error::ConfigurationInvalid(_) => 10,
            Error::PolicyNotFound { .. } => 11,
            Error::InventoryUnavailable(_) => 20,
            Error::TerminationFailed { .. } => 30,
            Error::PermissionDenied { .. } => 31,
            Error::PassInProgress => 40,
            Error::Cancelled => 41,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
            Error::UnsupportedPlatform(_) => 70,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::ConfigurationInvalid(_) | Error::PolicyNotFound { .. } => ErrorCategory::Config,
            Error::InventoryUnavailable(_) => ErrorCategory::Inventory,
            Error::TerminationFailed { .. } | Error::PermissionDenied { .. } => {
                ErrorCategory::Action
            }
            Error::PassInProgress | Error::Cancelled => ErrorCategory::Pass,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
            Error::UnsupportedPlatform(_) => ErrorCategory::Platform,
        }
    }

    /// Returns whether this error is potentially recoverable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::ConfigurationInvalid(_) => true,
            Error::PolicyNotFound { .. } => true,
            // Next pass gets a fresh inventory
            Error::InventoryUnavailable(_) => true,
            Error::TerminationFailed { .. } => true,
            Error::PermissionDenied { .. } => true,
            Error::PassInProgress => true,
            Error::Cancelled => false,
            Error::Io(_) => true,
            Error::Json(_) => true,
            Error::UnsupportedPlatform(_) => false,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::ConfigurationInvalid(_) => {
                "Run 'pc-core config validate' and fix the reported field. The previous policy stays active."
            }
            Error::PolicyNotFound { .. } => {
                "Check the --policy path or PC_POLICY, or remove it to use the built-in defaults."
            }
            Error::InventoryUnavailable(_) => {
                "Retry the pass. If persistent, check /proc permissions or that 'ps' is on PATH."
            }
            Error::TerminationFailed { .. } => {
                "The process could not be stopped. It may be in uninterruptible sleep; retry later."
            }
            Error::PermissionDenied { .. } => {
                "The process belongs to another user. Run with elevated privileges to clean it up."
            }
            Error::PassInProgress => {
                "Wait for the running pass to finish, or remove a stale lock file if no pass is running."
            }
            Error::Cancelled => "The pass was interrupted; terminations already issued remain in effect.",
            Error::Io(_) => "Check disk space and permissions, then retry the operation.",
            Error::Json(_) => "Invalid JSON. Check syntax with 'jq . <file>' or restore from backup.",
            Error::UnsupportedPlatform(_) => {
                "This feature is not available on your platform. Linux and macOS are supported."
            }
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::ConfigurationInvalid(_) => "Invalid Configuration",
            Error::PolicyNotFound { .. } => "Policy Not Found",
            Error::InventoryUnavailable(_) => "Inventory Unavailable",
            Error::TerminationFailed { .. } => "Termination Failed",
            Error::PermissionDenied { .. } => "Permission Denied",
            Error::PassInProgress => "Pass Already Running",
            Error::Cancelled => "Pass Cancelled",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Parse Error",
            Error::UnsupportedPlatform(_) => "Unsupported Platform",
        }
    }

    /// Format for terminal output: headline, reason and fix.
    pub fn format_human(&self) -> String {
        format!(
            "✗ {}\n  Reason: {}\n  Fix: {}",
            self.headline(),
            self,
            self.remediation()
        )
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable.
    pub recoverable: bool,

    /// Additional structured context (e.g., pid, file path).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::TerminationFailed { pid, .. } | Error::PermissionDenied { pid } => {
                context.insert("pid".to_string(), serde_json::json!(pid));
            }
            Error::PolicyNotFound { path } => {
                context.insert("path".to_string(), serde_json::json!(path));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            context,
        }
    }
}

impl StructuredError {
    /// Add additional context to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}
