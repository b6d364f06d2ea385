//! Fuzz target for /proc/stat, /proc/loadavg and /proc/uptime parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use vmkit_core::collect::system::{
    parse_cpu_count_content, parse_loadavg_content, parse_proc_stat_content,
    parse_stat_state_content, parse_uptime_content,
};

fuzz_target!(|data: &str| {
    if let Some(times) = parse_proc_stat_content(data) {
        let usage = vmkit_core::collect::system::cpu_usage_percent(&times, &times);
        assert!((0.0..=100.0).contains(&usage));
    }
    let _ = parse_cpu_count_content(data);
    let _ = parse_loadavg_content(data);
    let _ = parse_uptime_content(data);
    let _ = parse_stat_state_content(data);
});
