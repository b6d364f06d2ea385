//! Who is listening on a port.

use crate::collect::tool_runner::{command_exists, ToolError, ToolRunner};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;
use vmkit_common::{Error, Result};

/// A process holding a TCP LISTEN socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listener {
    pub pid: u32,
    /// Short command name, when readable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// What a probe saw on one port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortScan {
    /// Processes listening on the port, ordered by PID.
    pub listeners: Vec<Listener>,
    /// Listening sockets whose owner could not be identified.
    pub hidden: usize,
}

impl PortScan {
    pub fn is_free(&self) -> bool {
        self.listeners.is_empty() && self.hidden == 0
    }

    pub fn pids(&self) -> Vec<u32> {
        self.listeners.iter().map(|l| l.pid).collect()
    }
}

/// Source of listener information.
pub trait ListenerProbe {
    fn scan(&self, port: u16) -> Result<PortScan>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Reads `/proc/net/tcp{,6}` and `/proc/<pid>/fd` directly.
#[cfg(target_os = "linux")]
#[derive(Debug, Default)]
pub struct ProcProbe {
    net: crate::collect::network::ProcNet,
}

#[cfg(target_os = "linux")]
impl ProcProbe {
    pub fn new(net: crate::collect::network::ProcNet) -> Self {
        Self { net }
    }

    /// Usable when the TCP table can be read.
    pub fn available(&self) -> bool {
        self.net.root().join("net/tcp").exists()
    }
}

#[cfg(target_os = "linux")]
impl ListenerProbe for ProcProbe {
    fn scan(&self, port: u16) -> Result<PortScan> {
        let sockets = self.net.listening_sockets(port)?;
        Ok(PortScan {
            listeners: sockets
                .pids
                .into_iter()
                .map(|pid| Listener {
                    pid,
                    name: self.net.process_name(pid),
                })
                .collect(),
            hidden: sockets.unowned,
        })
    }

    fn name(&self) -> &'static str {
        "procfs"
    }
}

/// Falls back to `lsof -t -iTCP:<port> -sTCP:LISTEN`.
#[derive(Debug)]
pub struct LsofProbe {
    runner: ToolRunner,
}

impl LsofProbe {
    pub fn new(runner: ToolRunner) -> Self {
        Self { runner }
    }

    fn command_name(&self, pid: u32) -> Option<String> {
        let pid = pid.to_string();
        let output = self
            .runner
            .run_tool("ps", &["-p", &pid, "-o", "comm="])
            .ok()?;
        let name = output.stdout_str().trim().to_string();
        (output.success() && !name.is_empty()).then_some(name)
    }
}

impl ListenerProbe for LsofProbe {
    /// lsof shows nothing for sockets it cannot attribute, so `hidden` stays 0.
    fn scan(&self, port: u16) -> Result<PortScan> {
        let filter = format!("-iTCP:{port}");
        let output = self
            .runner
            .run_tool("lsof", &["-t", &filter, "-sTCP:LISTEN"])
            .map_err(|e| match e {
                ToolError::CommandNotFound(cmd) => Error::CommandMissing(cmd),
                other => Error::Collection(format!("lsof failed: {other}")),
            })?;

        // lsof exits 1 with empty output when nothing matches
        let stdout = output.stdout_str();
        if !output.success() && !(output.exit_code == Some(1) && stdout.trim().is_empty()) {
            return Err(Error::Collection(format!(
                "lsof for port {port}: {}",
                output.failure_hint()
            )));
        }

        let listeners = parse_lsof_pids(&stdout)
            .into_iter()
            .map(|pid| Listener {
                pid,
                name: self.command_name(pid),
            })
            .collect();
        Ok(PortScan {
            listeners,
            hidden: 0,
        })
    }

    fn name(&self) -> &'static str {
        "lsof"
    }
}

/// PIDs from `lsof -t` output (one per line), deduplicated and sorted.
pub fn parse_lsof_pids(output: &str) -> Vec<u32> {
    output
        .lines()
        .filter_map(|l| l.trim().parse::<u32>().ok())
        .filter(|&pid| pid > 0)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Pick the probe for this host: procfs when readable, otherwise lsof.
///
/// Fails with `CommandMissing("lsof")` when neither works.
pub fn default_probe(runner: ToolRunner) -> Result<Box<dyn ListenerProbe>> {
    #[cfg(target_os = "linux")]
    {
        let probe = ProcProbe::default();
        if probe.available() {
            debug!(probe = probe.name(), "listener probe selected");
            return Ok(Box::new(probe));
        }
    }

    if command_exists("lsof") {
        debug!(probe = "lsof", "listener probe selected");
        return Ok(Box::new(LsofProbe::new(runner)));
    }
    Err(Error::CommandMissing("lsof".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_lsof_pids_dedupes_and_sorts() {
        assert_eq!(parse_lsof_pids("4242\n17\n4242\n\n"), vec![17, 4242]);
        assert!(parse_lsof_pids("").is_empty());
        assert_eq!(parse_lsof_pids("abc\n0\n9\n"), vec![9]);
    }

    #[test]
    fn listener_json_omits_missing_name() {
        let json = serde_json::to_string(&Listener { pid: 7, name: None }).unwrap();
        assert_eq!(json, r#"{"pid":7}"#);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn proc_probe_finds_own_listener() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = ProcProbe::default();
        assert!(probe.available());
        let scan = probe.scan(port).unwrap();
        assert!(scan.pids().contains(&std::process::id()));
        assert_eq!(scan.hidden, 0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn proc_probe_reports_listener_it_cannot_attribute() {
        use std::os::unix::fs::symlink;

        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("net")).unwrap();
        std::fs::write(
            root.join("net/tcp"),
            "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode\n   0: 00000000:0BB8 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1001        0 41001 1 0000000000000000 100 0 0 10 0\n",
        )
        .unwrap();
        // pid 100 exists but its fd table is unreadable
        std::fs::create_dir_all(root.join("100")).unwrap();
        // pid 200 is ours and holds an unrelated socket
        std::fs::create_dir_all(root.join("200/fd")).unwrap();
        symlink("socket:[99999]", root.join("200/fd/3")).unwrap();

        let probe = ProcProbe::new(crate::collect::network::ProcNet::new(root));
        let scan = probe.scan(3000).unwrap();
        assert!(scan.listeners.is_empty());
        assert_eq!(scan.hidden, 1);
        assert!(!scan.is_free());
    }
}
