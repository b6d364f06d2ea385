//! TCP socket table readers.
//!
//! Used by the port killer (which PIDs listen on a port) and by the
//! monitor (connection counts by state).
//!
//! # Data Sources
//! - `/proc/net/tcp`, `/proc/net/tcp6` - raw socket tables
//! - `/proc/[pid]/fd/` - socket inode to PID mapping

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use vmkit_common::{Error, Result};

/// One row of `/proc/net/tcp{,6}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TcpSocket {
    pub local_addr: String,
    pub local_port: u16,
    pub remote_addr: String,
    pub remote_port: u16,
    pub state: TcpState,
    /// Socket inode number.
    pub inode: u64,
    pub is_ipv6: bool,
}

/// TCP connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TcpState {
    Established,
    SynSent,
    SynRecv,
    FinWait1,
    FinWait2,
    TimeWait,
    Close,
    CloseWait,
    LastAck,
    Listen,
    Closing,
    Unknown,
}

impl TcpState {
    /// Parse TCP state from /proc/net/tcp hex value.
    pub fn from_hex(hex: u8) -> Self {
        match hex {
            0x01 => TcpState::Established,
            0x02 => TcpState::SynSent,
            0x03 => TcpState::SynRecv,
            0x04 => TcpState::FinWait1,
            0x05 => TcpState::FinWait2,
            0x06 => TcpState::TimeWait,
            0x07 => TcpState::Close,
            0x08 => TcpState::CloseWait,
            0x09 => TcpState::LastAck,
            0x0A => TcpState::Listen,
            0x0B => TcpState::Closing,
            _ => TcpState::Unknown,
        }
    }

    pub fn is_listen(&self) -> bool {
        matches!(self, TcpState::Listen)
    }
}

/// Connection counts shown by the monitor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSummary {
    pub established: usize,
    pub listening: usize,
    pub time_wait: usize,
    /// Every socket in the tables, any state.
    pub total: usize,
}

impl ConnectionSummary {
    pub fn from_sockets(sockets: &[TcpSocket]) -> Self {
        let mut summary = ConnectionSummary {
            total: sockets.len(),
            ..Default::default()
        };
        for socket in sockets {
            match socket.state {
                TcpState::Established => summary.established += 1,
                TcpState::Listen => summary.listening += 1,
                TcpState::TimeWait => summary.time_wait += 1,
                _ => {}
            }
        }
        summary
    }
}

/// LISTEN sockets on one port, split by whether their owner was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortSockets {
    /// Processes holding one of the sockets, ascending.
    pub pids: Vec<u32>,
    /// Sockets no readable `/proc/<pid>/fd` points at. Non-zero when
    /// another user's process listens and we are not root.
    pub unowned: usize,
}

/// Reader over a procfs mount. Tests point `root` at a fixture tree.
#[derive(Debug, Clone)]
pub struct ProcNet {
    root: PathBuf,
}

impl Default for ProcNet {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcNet {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// All TCP sockets, IPv4 then IPv6.
    ///
    /// A missing `tcp6` table (IPv6 disabled) is not an error.
    pub fn tcp_sockets(&self) -> Result<Vec<TcpSocket>> {
        let v4_path = self.root.join("net/tcp");
        let content = fs::read_to_string(&v4_path).map_err(|e| {
            Error::Collection(format!("cannot read {}: {}", v4_path.display(), e))
        })?;
        let mut sockets = parse_proc_net_tcp_content(&content, false);

        if let Ok(content) = fs::read_to_string(self.root.join("net/tcp6")) {
            sockets.extend(parse_proc_net_tcp_content(&content, true));
        }
        Ok(sockets)
    }

    pub fn connection_summary(&self) -> Result<ConnectionSummary> {
        Ok(ConnectionSummary::from_sockets(&self.tcp_sockets()?))
    }

    /// Owners of the TCP LISTEN sockets on `port`.
    ///
    /// Processes whose fd table cannot be read are skipped; sockets only
    /// they hold are counted in `unowned`.
    pub fn listening_sockets(&self, port: u16) -> Result<PortSockets> {
        let inodes: HashSet<u64> = self
            .tcp_sockets()?
            .into_iter()
            .filter(|s| s.state.is_listen() && s.local_port == port && s.inode != 0)
            .map(|s| s.inode)
            .collect();

        trace!(port, inodes = inodes.len(), "listen sockets found");
        if inodes.is_empty() {
            return Ok(PortSockets::default());
        }

        let mut pids = BTreeSet::new();
        let mut seen = HashSet::new();
        for pid in self.pids()? {
            if let Some(owned) = self.socket_inodes(pid) {
                let hits: Vec<u64> = owned.intersection(&inodes).copied().collect();
                if !hits.is_empty() {
                    pids.insert(pid);
                    seen.extend(hits);
                }
            }
        }

        let unowned = inodes.len() - seen.len();
        debug!(port, pids = ?pids, unowned, "resolved listening pids");
        Ok(PortSockets {
            pids: pids.into_iter().collect(),
            unowned,
        })
    }

    /// Short command name from `/proc/<pid>/comm`.
    pub fn process_name(&self, pid: u32) -> Option<String> {
        fs::read_to_string(self.root.join(pid.to_string()).join("comm"))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Numeric entries of the proc root.
    pub fn pids(&self) -> Result<Vec<u32>> {
        let entries = fs::read_dir(&self.root).map_err(|e| {
            Error::Collection(format!("cannot list {}: {}", self.root.display(), e))
        })?;
        Ok(entries
            .flatten()
            .filter_map(|e| e.file_name().to_str().and_then(|n| n.parse().ok()))
            .collect())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Socket inode numbers held open by a process.
    fn socket_inodes(&self, pid: u32) -> Option<HashSet<u64>> {
        let fd_path = self.root.join(pid.to_string()).join("fd");
        let mut inodes = HashSet::new();

        for entry in fs::read_dir(fd_path).ok()?.flatten() {
            if let Ok(target) = fs::read_link(entry.path()) {
                if let Some(inode) = parse_socket_link(&target.to_string_lossy()) {
                    inodes.insert(inode);
                }
            }
        }
        Some(inodes)
    }
}

/// Socket links look like "socket:[12345]".
fn parse_socket_link(target: &str) -> Option<u64> {
    target
        .strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

/// Parse TCP table content.
pub fn parse_proc_net_tcp_content(content: &str, is_ipv6: bool) -> Vec<TcpSocket> {
    let mut sockets = Vec::new();

    for line in content.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 10 {
            continue;
        }

        // sl local_address rem_address st tx_queue:rx_queue tr:tm->when retrnsmt uid timeout inode
        let (local_addr, local_port) = parse_addr_port(parts[1], is_ipv6);
        let (remote_addr, remote_port) = parse_addr_port(parts[2], is_ipv6);
        let state = u8::from_str_radix(parts[3], 16)
            .map(TcpState::from_hex)
            .unwrap_or(TcpState::Unknown);
        let inode = parts[9].parse().unwrap_or(0);

        sockets.push(TcpSocket {
            local_addr,
            local_port,
            remote_addr,
            remote_port,
            state,
            inode,
            is_ipv6,
        });
    }

    sockets
}

/// Parse address:port from /proc/net format (hex encoded).
fn parse_addr_port(addr_port: &str, is_ipv6: bool) -> (String, u16) {
    let Some((addr_hex, port_hex)) = addr_port.split_once(':') else {
        return (String::new(), 0);
    };

    let port = u16::from_str_radix(port_hex, 16).unwrap_or(0);
    let addr = if is_ipv6 {
        parse_ipv6_addr(addr_hex)
    } else {
        parse_ipv4_addr(addr_hex)
    };

    (addr, port)
}

/// IPv4 is stored as one little-endian 32-bit word.
fn parse_ipv4_addr(hex: &str) -> String {
    match u32::from_str_radix(hex, 16) {
        Ok(word) if hex.len() == 8 => Ipv4Addr::from(word.swap_bytes()).to_string(),
        _ => "0.0.0.0".to_string(),
    }
}

/// IPv6 is stored as four little-endian 32-bit words.
fn parse_ipv6_addr(hex: &str) -> String {
    if hex.len() != 32 || !hex.is_ascii() {
        return "::".to_string();
    }

    let mut segments = [0u16; 8];
    for i in 0..4 {
        if let Ok(word) = u32::from_str_radix(&hex[i * 8..(i + 1) * 8], 16) {
            let word = word.swap_bytes();
            segments[i * 2] = (word >> 16) as u16;
            segments[i * 2 + 1] = (word & 0xFFFF) as u16;
        }
    }

    Ipv6Addr::from(segments).to_string()
}
