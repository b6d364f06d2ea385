//! Fuzz target for `df -P -k` output parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use vmkit_core::collect::system::parse_df_content;

fuzz_target!(|data: &str| {
    if let Some(disk) = parse_df_content(data) {
        let pct = disk.usage_percent();
        assert!((0.0..=100.0).contains(&pct));
    }
});
