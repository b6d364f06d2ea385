//! Signal delivery with staged escalation (SIGTERM → SIGKILL).

use crate::config::PortSettings;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use vmkit_common::{Error, Result};

/// Escalation timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalConfig {
    /// Grace period after SIGTERM before escalating to SIGKILL.
    pub term_grace_ms: u64,
    /// Polling interval when waiting for a process to exit.
    pub poll_interval_ms: u64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self::from(&PortSettings::default())
    }
}

impl From<&PortSettings> for SignalConfig {
    fn from(settings: &PortSettings) -> Self {
        Self {
            term_grace_ms: settings.term_grace_ms,
            poll_interval_ms: settings.poll_interval_ms.max(1),
        }
    }
}

/// How a process ended up gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Exited within the grace period after SIGTERM.
    Graceful,
    /// Needed SIGKILL.
    Forced,
    /// Was not running when we got to it.
    AlreadyGone,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Graceful => "graceful",
            Termination::Forced => "forced",
            Termination::AlreadyGone => "already_gone",
        }
    }

    pub fn was_forced(&self) -> bool {
        matches!(self, Termination::Forced)
    }
}

/// Process termination seam. The port killer only talks to this.
pub trait Signaller {
    /// Whether the process is still running (zombies count as gone).
    fn is_alive(&self, pid: u32) -> bool;

    /// Stop a process, escalating to SIGKILL after the grace period.
    fn terminate(&self, pid: u32) -> Result<Termination>;
}

/// Send a raw signal.
///
/// ESRCH maps to `ProcessNotFound`, EPERM to `PermissionDenied`.
/// PIDs 0 and 1 and values outside `pid_t` are refused: `kill(0, ..)`
/// would hit our own process group.
pub fn send_signal(pid: u32, signal: i32) -> Result<()> {
    if pid <= 1 || pid > i32::MAX as u32 {
        return Err(Error::SignalFailed(format!("refusing to signal pid {pid}")));
    }

    let result = unsafe { libc::kill(pid as i32, signal) };
    if result == 0 {
        return Ok(());
    }

    let err = std::io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::ESRCH) => Err(Error::ProcessNotFound { pid }),
        Some(libc::EPERM) => Err(Error::PermissionDenied { pid }),
        Some(libc::EINVAL) => Err(Error::SignalFailed(format!("invalid signal {signal}"))),
        _ => Err(Error::SignalFailed(err.to_string())),
    }
}

/// Check if a process exists with `kill(pid, 0)`.
///
/// EPERM means it exists but belongs to someone else.
pub fn process_exists(pid: u32) -> bool {
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }
    let result = unsafe { libc::kill(pid as i32, 0) };
    if result == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// State letter from /proc/[pid]/stat.
#[cfg(target_os = "linux")]
fn process_state(pid: u32) -> Option<char> {
    let content = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    crate::collect::system::parse_stat_state_content(&content)
}

#[cfg(not(target_os = "linux"))]
fn process_state(_pid: u32) -> Option<char> {
    None
}

/// Live signaller using `libc::kill`.
#[derive(Debug, Default)]
pub struct SignalRunner {
    config: SignalConfig,
}

impl SignalRunner {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    /// Poll until the process is gone or `timeout` elapses.
    fn wait_for_exit(&self, pid: u32, timeout: Duration) -> bool {
        let start = Instant::now();
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        loop {
            if !self.is_alive(pid) {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            thread::sleep(poll);
        }
    }
}

impl Signaller for SignalRunner {
    fn is_alive(&self, pid: u32) -> bool {
        // An unreaped zombie still answers kill(pid, 0)
        process_exists(pid) && !matches!(process_state(pid), Some('Z') | Some('X'))
    }

    fn terminate(&self, pid: u32) -> Result<Termination> {
        if !self.is_alive(pid) {
            return Ok(Termination::AlreadyGone);
        }

        match send_signal(pid, libc::SIGTERM) {
            Ok(()) => debug!(pid, "sent SIGTERM"),
            Err(Error::ProcessNotFound { .. }) => return Ok(Termination::AlreadyGone),
            Err(e) => return Err(e),
        }

        let grace = Duration::from_millis(self.config.term_grace_ms);
        if self.wait_for_exit(pid, grace) {
            return Ok(Termination::Graceful);
        }

        warn!(
            pid,
            grace_ms = self.config.term_grace_ms,
            "still alive after SIGTERM, sending SIGKILL"
        );
        match send_signal(pid, libc::SIGKILL) {
            Ok(()) => {}
            Err(Error::ProcessNotFound { .. }) => return Ok(Termination::Graceful),
            Err(e) => return Err(e),
        }

        if self.wait_for_exit(pid, grace) {
            Ok(Termination::Forced)
        } else {
            Err(Error::SignalFailed(format!("process {pid} survived SIGKILL")))
        }
    }
}
