//! One cleanup pass: inventory, classify, score, decide, terminate, report.

pub mod lock;
pub mod orchestrator;
pub mod report;

pub use lock::{default_lock_path, PassLock, LOCK_FILE_NAME};
pub use orchestrator::{Assessment, ConsumerRow, Orchestrator, PassOptions};
pub use report::{ActionReason, CleanupAction, CleanupReport, Decision, DecisionCounts};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

/// Errors around running a pass (not inside one: those land in the report).
#[derive(Debug, Error)]
pub enum PassError {
    #[error("another pass holds {path}")]
    LockUnavailable { path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<PassError> for pc_common::Error {
    fn from(err: PassError) -> Self {
        match err {
            PassError::LockUnavailable { .. } => pc_common::Error::PassInProgress,
            PassError::Io(e) => pc_common::Error::Io(e),
        }
    }
}

/// Shared cancellation request, checked before each termination.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
