//! Host-wide resource readers for the monitor.
//!
//! # Data Sources
//! - `/proc/stat`: aggregate CPU ticks, core count
//! - `/proc/loadavg`, `/proc/uptime`, `/proc/meminfo`
//! - `/proc/[pid]/stat`: process state letter
//! - `df -P -k <mount>`: filesystem usage
//!
//! Each reader has a pure `parse_*_content` variant so the parsing can be
//! tested and fuzzed without a live system.

use super::tool_runner::{ToolError, ToolRunner};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::{debug, trace};
use vmkit_common::{Error, Result};

/// Aggregate CPU tick counters from the `cpu` line of `/proc/stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTimes {
    pub fn total(&self) -> u64 {
        [
            self.user,
            self.nice,
            self.system,
            self.idle,
            self.iowait,
            self.irq,
            self.softirq,
            self.steal,
        ]
        .iter()
        .fold(0u64, |acc, v| acc.saturating_add(*v))
    }

    /// Idle plus iowait ticks.
    pub fn idle_all(&self) -> u64 {
        self.idle.saturating_add(self.iowait)
    }

    pub fn busy(&self) -> u64 {
        self.total().saturating_sub(self.idle_all())
    }
}

/// CPU usage percent between two samples (busy delta / total delta).
///
/// Returns 0.0 when no ticks elapsed or the counters went backwards.
pub fn cpu_usage_percent(before: &CpuTimes, after: &CpuTimes) -> f64 {
    let total = after.total().saturating_sub(before.total());
    if total == 0 {
        return 0.0;
    }
    let busy = after.busy().saturating_sub(before.busy());
    (busy as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// Parse the aggregate `cpu` line of `/proc/stat`.
///
/// Older kernels omit trailing columns; missing ones count as zero.
pub fn parse_proc_stat_content(content: &str) -> Option<CpuTimes> {
    let line = content
        .lines()
        .find(|l| l.split_whitespace().next() == Some("cpu"))?;

    let values: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(|v| v.parse::<u64>())
        .collect::<std::result::Result<_, _>>()
        .ok()?;

    if values.len() < 4 {
        return None;
    }
    let at = |i: usize| values.get(i).copied().unwrap_or(0);

    Some(CpuTimes {
        user: at(0),
        nice: at(1),
        system: at(2),
        idle: at(3),
        iowait: at(4),
        irq: at(5),
        softirq: at(6),
        steal: at(7),
    })
}

/// Number of per-core `cpuN` lines in `/proc/stat`.
pub fn parse_cpu_count_content(content: &str) -> u32 {
    content
        .lines()
        .filter_map(|l| l.split_whitespace().next())
        .filter(|name| {
            name.strip_prefix("cpu")
                .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        })
        .count() as u32
}

/// Load averages over 1, 5 and 15 minutes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

pub fn parse_loadavg_content(content: &str) -> Option<LoadAverage> {
    let mut parts = content.split_whitespace();
    Some(LoadAverage {
        one: parts.next()?.parse().ok()?,
        five: parts.next()?.parse().ok()?,
        fifteen: parts.next()?.parse().ok()?,
    })
}

/// Memory counters from `/proc/meminfo`, in KiB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemInfo {
    pub total_kb: u64,
    pub available_kb: u64,
    pub swap_total_kb: u64,
    pub swap_free_kb: u64,
}

impl MemInfo {
    pub fn used_kb(&self) -> u64 {
        self.total_kb.saturating_sub(self.available_kb)
    }

    pub fn swap_used_kb(&self) -> u64 {
        self.swap_total_kb.saturating_sub(self.swap_free_kb)
    }

    pub fn usage_percent(&self) -> f64 {
        if self.total_kb == 0 {
            return 0.0;
        }
        self.used_kb() as f64 / self.total_kb as f64 * 100.0
    }
}

/// Parse `/proc/meminfo`.
///
/// Kernels before 3.14 lack `MemAvailable`; free + buffers + cached is
/// used instead.
pub fn parse_meminfo_content(content: &str) -> Option<MemInfo> {
    let mut total = None;
    let mut available = None;
    let mut free = 0u64;
    let mut buffers = 0u64;
    let mut cached = 0u64;
    let mut info = MemInfo::default();

    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let Some(value) = rest.split_whitespace().next().and_then(|v| v.parse::<u64>().ok())
        else {
            continue;
        };

        match key.trim() {
            "MemTotal" => total = Some(value),
            "MemAvailable" => available = Some(value),
            "MemFree" => free = value,
            "Buffers" => buffers = value,
            "Cached" => cached = value,
            "SwapTotal" => info.swap_total_kb = value,
            "SwapFree" => info.swap_free_kb = value,
            _ => {}
        }
    }

    info.total_kb = total?;
    info.available_kb = available
        .unwrap_or(free.saturating_add(buffers).saturating_add(cached))
        .min(info.total_kb);
    Some(info)
}

/// Filesystem usage from `df -P -k`, in KiB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskUsage {
    pub filesystem: String,
    pub mount: String,
    pub total_kb: u64,
    pub used_kb: u64,
    pub available_kb: u64,
}

impl DiskUsage {
    /// Used share of the space available to unprivileged users, the way
    /// `df` computes its Capacity column.
    pub fn usage_percent(&self) -> f64 {
        let usable = self.used_kb.saturating_add(self.available_kb);
        if usable == 0 {
            return 0.0;
        }
        self.used_kb as f64 / usable as f64 * 100.0
    }
}

/// Parse POSIX `df -P -k` output (header plus one line per filesystem).
///
/// Returns the first data line.
pub fn parse_df_content(content: &str) -> Option<DiskUsage> {
    let line = content.lines().skip(1).find(|l| !l.trim().is_empty())?;
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 6 {
        return None;
    }

    Some(DiskUsage {
        filesystem: parts[0].to_string(),
        total_kb: parts[1].parse().ok()?,
        used_kb: parts[2].parse().ok()?,
        available_kb: parts[3].parse().ok()?,
        // Mount points may contain spaces
        mount: parts[5..].join(" "),
    })
}

/// Process counts by scheduler state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessCounts {
    pub total: usize,
    pub running: usize,
    pub sleeping: usize,
    pub zombie: usize,
}

impl ProcessCounts {
    pub fn record(&mut self, state: char) {
        self.total += 1;
        match state {
            'R' => self.running += 1,
            'S' | 'D' | 'I' => self.sleeping += 1,
            'Z' => self.zombie += 1,
            _ => {}
        }
    }
}

/// State letter from `/proc/[pid]/stat`.
///
/// The command name is parenthesised and may itself contain spaces or
/// parentheses, so the state is read after the last `)`.
pub fn parse_stat_state_content(content: &str) -> Option<char> {
    let close = content.rfind(')')?;
    content[close + 1..].split_whitespace().next()?.chars().next()
}

/// Seconds since boot from `/proc/uptime`.
pub fn parse_uptime_content(content: &str) -> Option<f64> {
    content.split_whitespace().next()?.parse().ok()
}

/// CPU figures gathered over one sample window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuSample {
    pub usage_percent: f64,
    pub cores: u32,
}

/// Reads system state from procfs and `df`.
#[derive(Debug)]
pub struct SystemReader {
    proc_root: PathBuf,
    runner: ToolRunner,
}

impl Default for SystemReader {
    fn default() -> Self {
        Self::new("/proc", ToolRunner::with_defaults())
    }
}

impl SystemReader {
    pub fn new(proc_root: impl Into<PathBuf>, runner: ToolRunner) -> Self {
        Self {
            proc_root: proc_root.into(),
            runner,
        }
    }

    fn read(&self, name: &str) -> Result<String> {
        let path = self.proc_root.join(name);
        fs::read_to_string(&path)
            .map_err(|e| Error::Collection(format!("cannot read {}: {}", path.display(), e)))
    }

    fn cpu_times(&self) -> Result<(CpuTimes, u32)> {
        let content = self.read("stat")?;
        let times = parse_proc_stat_content(&content)
            .ok_or_else(|| Error::Collection("no aggregate cpu line in /proc/stat".into()))?;
        Ok((times, parse_cpu_count_content(&content).max(1)))
    }

    /// CPU usage over `window`. Blocks for the window duration.
    pub fn cpu_sample(&self, window: Duration) -> Result<CpuSample> {
        let (before, cores) = self.cpu_times()?;
        thread::sleep(window);
        let (after, _) = self.cpu_times()?;

        let usage_percent = cpu_usage_percent(&before, &after);
        trace!(usage_percent, cores, "cpu sampled");
        Ok(CpuSample {
            usage_percent,
            cores,
        })
    }

    pub fn load_average(&self) -> Result<LoadAverage> {
        parse_loadavg_content(&self.read("loadavg")?)
            .ok_or_else(|| Error::Collection("malformed /proc/loadavg".into()))
    }

    pub fn memory(&self) -> Result<MemInfo> {
        parse_meminfo_content(&self.read("meminfo")?)
            .ok_or_else(|| Error::Collection("MemTotal missing from /proc/meminfo".into()))
    }

    pub fn uptime_secs(&self) -> Result<u64> {
        parse_uptime_content(&self.read("uptime")?)
            .map(|s| s as u64)
            .ok_or_else(|| Error::Collection("malformed /proc/uptime".into()))
    }

    /// Counts every numeric `/proc` entry whose stat file is readable.
    ///
    /// Processes that exit between listing and reading are skipped.
    pub fn process_counts(&self) -> Result<ProcessCounts> {
        let entries = fs::read_dir(&self.proc_root).map_err(|e| {
            Error::Collection(format!("cannot list {}: {}", self.proc_root.display(), e))
        })?;

        let mut counts = ProcessCounts::default();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }
            if let Ok(stat) = fs::read_to_string(entry.path().join("stat")) {
                if let Some(state) = parse_stat_state_content(&stat) {
                    counts.record(state);
                }
            }
        }
        Ok(counts)
    }

    /// Usage of the filesystem holding `mount`, via `df -P -k`.
    pub fn disk(&self, mount: &str) -> Result<DiskUsage> {
        let output = self
            .runner
            .run_tool("df", &["-P", "-k", mount])
            .map_err(|e| match e {
                ToolError::CommandNotFound(cmd) => Error::CommandMissing(cmd),
                other => Error::Collection(format!("df failed: {}", other)),
            })?;

        if !output.success() {
            return Err(Error::Collection(format!(
                "df {}: {}",
                mount,
                output.failure_hint()
            )));
        }

        let usage = parse_df_content(&output.stdout_str())
            .ok_or_else(|| Error::Collection(format!("unparseable df output for {}", mount)))?;
        debug!(mount, used_kb = usage.used_kb, total_kb = usage.total_kb, "disk sampled");
        Ok(usage)
    }

    pub fn hostname(&self) -> String {
        self.read("sys/kernel/hostname")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(crate::logging::hostname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PROC_STAT: &str = "cpu  4705 356 584 3699 23 0 27 0 0 0
cpu0 1393 280 290 1817 5 0 24 0 0 0
cpu1 3312 76 294 1882 18 0 3 0 0 0
intr 114930548 113199788 3 0 5 263 0 4 [... lots more numbers ...]
ctxt 1990473
btime 1062191376
processes 2915
procs_running 1
procs_blocked 0
";

    const MEMINFO: &str = "MemTotal:        8000000 kB
MemFree:          500000 kB
MemAvailable:    2000000 kB
Buffers:          100000 kB
Cached:          1000000 kB
SwapCached:            0 kB
SwapTotal:       2097148 kB
SwapFree:        1048574 kB
";

    const DF_OUTPUT: &str = "Filesystem     1024-blocks     Used Available Capacity Mounted on
/dev/sda1         41152736 29154488  9884172      75% /
";

    #[test]
    fn test_parse_proc_stat() {
        let times = parse_proc_stat_content(PROC_STAT).unwrap();
        assert_eq!(times.user, 4705);
        assert_eq!(times.idle, 3699);
        assert_eq!(times.iowait, 23);
        assert_eq!(times.total(), 4705 + 356 + 584 + 3699 + 23 + 27);
        assert_eq!(parse_cpu_count_content(PROC_STAT), 2);
    }

    #[test]
    fn test_parse_proc_stat_short_line() {
        let times = parse_proc_stat_content("cpu 10 0 5 85\n").unwrap();
        assert_eq!(times.total(), 100);
        assert_eq!(times.steal, 0);
        assert!(parse_proc_stat_content("cpu 1 2\n").is_none());
        assert!(parse_proc_stat_content("cpu0 1 2 3 4\n").is_none());
    }

    #[test]
    fn test_cpu_usage_percent() {
        let before = CpuTimes {
            user: 100,
            idle: 900,
            ..Default::default()
        };
        let after = CpuTimes {
            user: 180,
            idle: 920,
            ..Default::default()
        };
        assert_eq!(cpu_usage_percent(&before, &after), 80.0);
        assert_eq!(cpu_usage_percent(&after, &after), 0.0);
        // counters reset
        assert_eq!(cpu_usage_percent(&after, &before), 0.0);
    }

    #[test]
    fn test_iowait_counts_as_idle() {
        let before = CpuTimes::default();
        let after = CpuTimes {
            user: 50,
            iowait: 50,
            ..Default::default()
        };
        assert_eq!(cpu_usage_percent(&before, &after), 50.0);
    }

    #[test]
    fn test_parse_loadavg() {
        let load = parse_loadavg_content("0.52 0.58 0.59 2/1234 56789\n").unwrap();
        assert_eq!(load.one, 0.52);
        assert_eq!(load.fifteen, 0.59);
        assert!(parse_loadavg_content("0.5").is_none());
    }

    #[test]
    fn test_parse_meminfo() {
        let mem = parse_meminfo_content(MEMINFO).unwrap();
        assert_eq!(mem.total_kb, 8_000_000);
        assert_eq!(mem.used_kb(), 6_000_000);
        assert_eq!(mem.usage_percent(), 75.0);
        assert_eq!(mem.swap_used_kb(), 1_048_574);
    }

    #[test]
    fn test_parse_meminfo_without_available() {
        let content = "MemTotal: 1000 kB\nMemFree: 100 kB\nBuffers: 50 kB\nCached: 250 kB\n";
        let mem = parse_meminfo_content(content).unwrap();
        assert_eq!(mem.available_kb, 400);
        assert!(parse_meminfo_content("MemFree: 100 kB\n").is_none());
    }

    #[test]
    fn test_parse_df() {
        let disk = parse_df_content(DF_OUTPUT).unwrap();
        assert_eq!(disk.filesystem, "/dev/sda1");
        assert_eq!(disk.mount, "/");
        assert_eq!(disk.total_kb, 41_152_736);
        assert_eq!(disk.used_kb, 29_154_488);
        let pct = disk.usage_percent();
        assert!((pct - 74.7).abs() < 0.1, "pct = {pct}");
    }

    #[test]
    fn test_parse_df_mount_with_space() {
        let out = "Filesystem 1024-blocks Used Available Capacity Mounted on\n\
                   /dev/sdb1 100 40 60 40% /mnt/my disk\n";
        assert_eq!(parse_df_content(out).unwrap().mount, "/mnt/my disk");
        assert!(parse_df_content("Filesystem\n").is_none());
    }

    #[test]
    fn test_parse_stat_state() {
        assert_eq!(
            parse_stat_state_content("1234 (my (weird) proc) S 1 1234 1234 0 -1"),
            Some('S')
        );
        assert_eq!(parse_stat_state_content("42 (bash) R 1"), Some('R'));
        assert_eq!(parse_stat_state_content("garbage"), None);
    }

    #[test]
    fn test_process_counts_from_fixture() {
        let dir = TempDir::new().unwrap();
        for (pid, state) in [(1, 'S'), (2, 'R'), (3, 'Z'), (4, 'I'), (5, 'T')] {
            let p = dir.path().join(pid.to_string());
            fs::create_dir_all(&p).unwrap();
            fs::write(p.join("stat"), format!("{pid} (p{pid}) {state} 0 0")).unwrap();
        }
        fs::create_dir_all(dir.path().join("net")).unwrap();

        let reader = SystemReader::new(dir.path(), ToolRunner::with_defaults());
        let counts = reader.process_counts().unwrap();
        assert_eq!(
            counts,
            ProcessCounts {
                total: 5,
                running: 1,
                sleeping: 2,
                zombie: 1,
            }
        );
    }

    #[test]
    fn test_reader_from_fixture() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("stat"), PROC_STAT).unwrap();
        fs::write(dir.path().join("meminfo"), MEMINFO).unwrap();
        fs::write(dir.path().join("uptime"), "3600.52 7000.10\n").unwrap();
        fs::write(dir.path().join("loadavg"), "1.00 0.50 0.25 1/100 999\n").unwrap();

        let reader = SystemReader::new(dir.path(), ToolRunner::with_defaults());
        let cpu = reader.cpu_sample(Duration::from_millis(1)).unwrap();
        // identical samples: no ticks elapsed
        assert_eq!(cpu.usage_percent, 0.0);
        assert_eq!(cpu.cores, 2);
        assert_eq!(reader.uptime_secs().unwrap(), 3600);
        assert_eq!(reader.load_average().unwrap().one, 1.0);
        assert_eq!(reader.memory().unwrap().available_kb, 2_000_000);
    }

    #[test]
    fn test_missing_file_is_collection_error() {
        let dir = TempDir::new().unwrap();
        let reader = SystemReader::new(dir.path(), ToolRunner::with_defaults());
        assert!(matches!(reader.memory(), Err(Error::Collection(_))));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_live_disk_root() {
        let disk = SystemReader::default().disk("/").unwrap();
        assert!(disk.total_kb > 0);
        assert!(disk.usage_percent() <= 100.0);
    }
}
