//! Termination: signal delivery and the two-phase executor.

pub mod executor;
pub mod signal;

pub use executor::{
    TerminationConfig, TerminationOutcome, TerminationResult, TerminationTarget, Terminator,
    TwoPhaseTerminator,
};
pub use signal::{LibcSignaller, ProcessSignaller, Signal, SignalError};

/// The production terminator: libc signals, timings from the policy.
pub fn system_terminator(guardrails: &pc_config::Guardrails) -> TwoPhaseTerminator<LibcSignaller> {
    TwoPhaseTerminator::new(LibcSignaller, TerminationConfig::from(guardrails))
}
