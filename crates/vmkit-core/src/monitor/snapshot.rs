//! One sample of host resources, and the thresholds applied to it.

use crate::config::MonitorSettings;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vmkit_common::Result;

pub use crate::collect::system::ProcessCounts;

/// Round to one decimal place.
///
/// Applied once at sampling time so every renderer shows the same value.
pub fn round1(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value * 10.0).round() / 10.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuStats {
    pub usage_percent: f64,
    pub cores: u32,
    pub load_1: f64,
    pub load_5: f64,
    pub load_15: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_mb: f64,
    pub used_mb: f64,
    pub available_mb: f64,
    pub usage_percent: f64,
    pub swap_total_mb: f64,
    pub swap_used_mb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskStats {
    pub mount: String,
    pub total_gb: f64,
    pub used_gb: f64,
    pub available_gb: f64,
    pub usage_percent: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub established: usize,
    pub listening: usize,
    pub time_wait: usize,
}

/// Which resources are at or over their threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alerts {
    pub cpu: bool,
    pub memory: bool,
    pub disk: bool,
}

impl Alerts {
    pub fn any(&self) -> bool {
        self.cpu || self.memory || self.disk
    }

    /// Short names of raised alerts, in fixed order.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.cpu {
            names.push("CPU");
        }
        if self.memory {
            names.push("MEM");
        }
        if self.disk {
            names.push("DISK");
        }
        names
    }
}

/// Alert thresholds in percent. Comparisons are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from(&MonitorSettings::default())
    }
}

impl From<&MonitorSettings> for Thresholds {
    fn from(settings: &MonitorSettings) -> Self {
        Self {
            cpu: settings.cpu_threshold,
            memory: settings.memory_threshold,
            disk: settings.disk_threshold,
        }
    }
}

impl Thresholds {
    pub fn evaluate(&self, cpu: f64, memory: f64, disk: f64) -> Alerts {
        Alerts {
            cpu: cpu >= self.cpu,
            memory: memory >= self.memory,
            disk: disk >= self.disk,
        }
    }
}

/// Everything the monitor prints for one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub hostname: String,
    pub uptime_secs: u64,
    pub cpu: CpuStats,
    pub memory: MemoryStats,
    pub disk: DiskStats,
    pub network: NetworkStats,
    pub processes: ProcessCounts,
    pub alerts: Alerts,
}

impl Snapshot {
    /// Recompute alerts from the (already rounded) percentages.
    pub fn apply_thresholds(&mut self, thresholds: &Thresholds) {
        self.alerts = thresholds.evaluate(
            self.cpu.usage_percent,
            self.memory.usage_percent,
            self.disk.usage_percent,
        );
    }
}

/// Produces snapshots. The live implementation reads /proc and `df`.
pub trait Sampler {
    fn sample(&self) -> Result<Snapshot>;
}

#[cfg(target_os = "linux")]
pub use live::LiveSampler;

#[cfg(target_os = "linux")]
mod live {
    use super::*;
    use crate::collect::network::ProcNet;
    use crate::collect::system::SystemReader;
    use std::time::Duration;
    use tracing::trace;

    const KB_PER_MB: f64 = 1024.0;
    const KB_PER_GB: f64 = 1024.0 * 1024.0;

    pub struct LiveSampler {
        reader: SystemReader,
        net: ProcNet,
        settings: MonitorSettings,
    }

    impl LiveSampler {
        pub fn new(reader: SystemReader, net: ProcNet, settings: MonitorSettings) -> Self {
            Self {
                reader,
                net,
                settings,
            }
        }
    }

    impl Sampler for LiveSampler {
        fn sample(&self) -> Result<Snapshot> {
            let cpu = self
                .reader
                .cpu_sample(Duration::from_millis(self.settings.cpu_sample_ms))?;
            let load = self.reader.load_average()?;
            let mem = self.reader.memory()?;
            let disk = self.reader.disk(&self.settings.disk_mount)?;
            let net = self.net.connection_summary()?;
            let processes = self.reader.process_counts()?;

            let mut snapshot = Snapshot {
                timestamp: Utc::now(),
                hostname: self.reader.hostname(),
                uptime_secs: self.reader.uptime_secs()?,
                cpu: CpuStats {
                    usage_percent: round1(cpu.usage_percent),
                    cores: cpu.cores,
                    load_1: load.one,
                    load_5: load.five,
                    load_15: load.fifteen,
                },
                memory: MemoryStats {
                    total_mb: round1(mem.total_kb as f64 / KB_PER_MB),
                    used_mb: round1(mem.used_kb() as f64 / KB_PER_MB),
                    available_mb: round1(mem.available_kb as f64 / KB_PER_MB),
                    usage_percent: round1(mem.usage_percent()),
                    swap_total_mb: round1(mem.swap_total_kb as f64 / KB_PER_MB),
                    swap_used_mb: round1(mem.swap_used_kb() as f64 / KB_PER_MB),
                },
                disk: DiskStats {
                    mount: self.settings.disk_mount.clone(),
                    total_gb: round1(disk.total_kb as f64 / KB_PER_GB),
                    used_gb: round1(disk.used_kb as f64 / KB_PER_GB),
                    available_gb: round1(disk.available_kb as f64 / KB_PER_GB),
                    usage_percent: round1(disk.usage_percent()),
                },
                network: NetworkStats {
                    established: net.established,
                    listening: net.listening,
                    time_wait: net.time_wait,
                },
                processes,
                alerts: Alerts::default(),
            };
            snapshot.apply_thresholds(&Thresholds::from(&self.settings));
            trace!(alerts = ?snapshot.alerts, "snapshot taken");
            Ok(snapshot)
        }
    }
}
