//! Fuzz target for /proc/[pid]/stat parsing.
//!
//! Tests that `parse_stat_content` handles arbitrary input without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pc_core::collect::proc_stat::parse_stat_content;

fuzz_target!(|data: &str| {
    // The parser should never panic, only return None for malformed input
    let _ = parse_stat_content(data);
});
