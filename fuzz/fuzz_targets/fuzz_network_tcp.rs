//! Fuzz target for /proc/net/tcp and /proc/net/tcp6 parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use vmkit_core::collect::network::{parse_proc_net_tcp_content, ConnectionSummary};

fuzz_target!(|data: &str| {
    let v4 = parse_proc_net_tcp_content(data, false);
    let v6 = parse_proc_net_tcp_content(data, true);
    let summary = ConnectionSummary::from_sockets(&v4);
    assert_eq!(summary.total, v4.len());
    let _ = ConnectionSummary::from_sockets(&v6);
});
