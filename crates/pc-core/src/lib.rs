//! Process Cleanup Core Library
//!
//! This library provides the decision engine behind `pc-core`:
//! - Process inventory adapters (procfs, ps, static replays)
//! - Protection classification, risk scoring and policy gating
//! - Two-phase termination
//! - The pass orchestrator and its report
//! - The periodic watcher
//! - Logging and exit codes
//!
//! The binary entry point is in `main.rs`.

pub mod action;
pub mod collect;
pub mod config;
pub mod daemon;
pub mod decision;
pub mod exit_codes;
pub mod logging;
pub mod pass;

pub use action::{TerminationOutcome, Terminator, TwoPhaseTerminator};
pub use collect::{InventorySource, ProcessSnapshot};
pub use decision::{ProtectionReason, ProtectionVerdict};
pub use exit_codes::ExitCode;
pub use pass::{CancelFlag, CleanupReport, Decision, Orchestrator, PassOptions};
