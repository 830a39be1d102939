//! Fuzz target for policy.json configuration parsing.
//!
//! Parsing, clamping and pattern compilation must reject bad input with an
//! error, never a panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pc_config::policy::Policy;
use pc_config::validate::sanitize_policy;
use pc_core::decision::PatternTable;

fuzz_target!(|data: &str| {
    let Ok(policy) = Policy::parse_json(data) else {
        return;
    };
    if let Ok((policy, _clamped)) = sanitize_policy(policy) {
        let _ = PatternTable::compile(&policy);
    }
});
