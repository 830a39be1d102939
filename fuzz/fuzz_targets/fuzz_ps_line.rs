//! Fuzz target for `ps` output rows and elapsed-time fields.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pc_core::collect::ps_inventory::{parse_etime, parse_ps_line};

fuzz_target!(|data: &str| {
    for (n, line) in data.lines().enumerate() {
        let _ = parse_ps_line(line, n + 1);
    }
    let _ = parse_etime(data);
});
