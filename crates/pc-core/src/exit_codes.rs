//! Exit codes for the pc-core CLI.
//!
//! Automation reads the pass outcome from the exit code alone:
//! - 0-9: operational outcomes of a pass (not errors)
//! - 10-19: user/environment errors (fixable by the operator)
//! - 20-29: internal errors

use pc_common::Error;

use crate::pass::CleanupReport;

/// Exit codes for pc-core operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Pass ran and terminated nothing
    Clean = 0,

    /// Pass skipped because the system is below the mode's activation thresholds
    Gated = 1,

    /// Every attempted termination succeeded
    ActionsOk = 2,

    /// At least one termination failed
    PartialFail = 3,

    /// Pass cancelled by a shutdown signal; partial report emitted
    Interrupted = 6,

    /// Invalid arguments
    ArgsError = 10,

    /// Policy file missing or rejected
    ConfigError = 11,

    /// Permission denied while signalling
    PermissionError = 12,

    /// Another pass holds the pass lock
    LockError = 14,

    /// Process inventory could not be collected
    InventoryError = 15,

    /// Internal error (bug)
    InternalError = 20,

    /// I/O error
    IoError = 21,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Codes 0-2: the pass did what it was asked to do.
    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean | ExitCode::Gated | ExitCode::ActionsOk)
    }

    pub fn is_operational(self) -> bool {
        (self as i32) < 10
    }

    pub fn is_user_error(self) -> bool {
        (10..20).contains(&(self as i32))
    }

    pub fn is_internal_error(self) -> bool {
        (self as i32) >= 20
    }

    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Stable name for JSON output.
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::Gated => "OK_GATED",
            ExitCode::ActionsOk => "OK_APPLIED",
            ExitCode::PartialFail => "ERR_PARTIAL",
            ExitCode::Interrupted => "ERR_INTERRUPTED",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::PermissionError => "ERR_PERMISSION",
            ExitCode::LockError => "ERR_LOCK",
            ExitCode::InventoryError => "ERR_INVENTORY",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }

    /// Outcome of a finished pass.
    ///
    /// Precedence: inventory failure, cancellation, failed terminations,
    /// gating, then terminations.
    pub fn for_report(report: &CleanupReport) -> ExitCode {
        if report.error.is_some() {
            ExitCode::InventoryError
        } else if report.cancelled {
            ExitCode::Interrupted
        } else if report.counts.termination_failed > 0 {
            ExitCode::PartialFail
        } else if report.skipped_gated_by_policy {
            ExitCode::Gated
        } else if report.counts.terminated > 0 {
            ExitCode::ActionsOk
        } else {
            ExitCode::Clean
        }
    }

    /// Exit code for an error surfaced at the CLI seam.
    pub fn for_error(err: &Error) -> ExitCode {
        match err {
            Error::ConfigurationInvalid(_) | Error::PolicyNotFound { .. } => ExitCode::ConfigError,
            Error::InventoryUnavailable(_) => ExitCode::InventoryError,
            Error::PermissionDenied { .. } => ExitCode::PermissionError,
            Error::TerminationFailed { .. } => ExitCode::PartialFail,
            Error::PassInProgress => ExitCode::LockError,
            Error::Cancelled => ExitCode::Interrupted,
            Error::Io(_) | Error::Json(_) => ExitCode::IoError,
            Error::UnsupportedPlatform(_) => ExitCode::InventoryError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges() {
        assert!(ExitCode::Gated.is_success());
        assert!(ExitCode::PartialFail.is_operational());
        assert!(!ExitCode::PartialFail.is_success());
        assert!(ExitCode::LockError.is_user_error());
        assert!(ExitCode::IoError.is_internal_error());
        assert!(!ExitCode::Interrupted.is_error());
    }

    #[test]
    fn test_display() {
        assert_eq!(ExitCode::LockError.to_string(), "ERR_LOCK (14)");
        assert_eq!(i32::from(ExitCode::InventoryError), 15);
    }

    #[test]
    fn test_for_error() {
        assert_eq!(
            ExitCode::for_error(&Error::PassInProgress),
            ExitCode::LockError
        );
        assert_eq!(
            ExitCode::for_error(&Error::ConfigurationInvalid("x".into())),
            ExitCode::ConfigError
        );
    }
}
