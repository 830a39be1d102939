//! Fuzz target for `--inventory` replay files.
//!
//! Whatever parses must survive a pull and a dry-run pass.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pc_config::Policy;
use pc_core::action::{TerminationOutcome, TerminationResult, TerminationTarget, Terminator};
use pc_core::collect::StaticInventory;
use pc_core::pass::{Orchestrator, PassOptions};

struct Refuse;

impl Terminator for Refuse {
    fn terminate(&self, _target: TerminationTarget) -> TerminationResult {
        TerminationResult {
            outcome: TerminationOutcome::Failed,
            forced: false,
            elapsed_ms: 0,
            detail: None,
        }
    }
}

fuzz_target!(|data: &str| {
    let Ok(inventory) = StaticInventory::from_json(data) else {
        return;
    };
    let Ok(orchestrator) = Orchestrator::new(Policy::default(), &inventory, &Refuse) else {
        return;
    };
    let report = orchestrator.run_pass(PassOptions {
        mode: None,
        force: true,
        dry_run: true,
    });
    assert_eq!(report.counts.terminated, 0);
});
