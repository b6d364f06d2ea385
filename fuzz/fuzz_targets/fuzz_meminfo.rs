//! Fuzz target for /proc/meminfo parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use vmkit_core::collect::system::parse_meminfo_content;

fuzz_target!(|data: &str| {
    if let Some(info) = parse_meminfo_content(data) {
        // derived values must not overflow or go out of range
        let _ = info.used_kb();
        let _ = info.swap_used_kb();
        let pct = info.usage_percent();
        assert!(pct.is_finite());
    }
});
