//! Snapshot renderers: human, JSON, single line, alert-only.
//!
//! All numeric values are printed with `{:.1}` from the already rounded
//! snapshot, so the human text and the JSON document agree.

use super::snapshot::{Snapshot, Thresholds};
use crate::style::Palette;

/// Share of the threshold at which a value turns yellow.
const WARN_FRACTION: f64 = 0.7;

fn colored_percent(value: f64, threshold: f64, palette: &Palette) -> String {
    let text = format!("{value:.1}%");
    if value >= threshold {
        palette.red(&text)
    } else if value >= threshold * WARN_FRACTION {
        palette.yellow(&text)
    } else {
        palette.green(&text)
    }
}

/// `3d 4h 12m`, `4h 12m`, `12m`.
pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

pub fn render_human(snap: &Snapshot, thresholds: &Thresholds, palette: &Palette) -> String {
    let mut lines = Vec::new();
    lines.push(palette.bold(&format!(
        "=== {} @ {} ===",
        snap.hostname,
        snap.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    )));
    lines.push(format!("Uptime:     {}", format_uptime(snap.uptime_secs)));
    lines.push(format!(
        "CPU:        {}  ({} cores, load {:.2} {:.2} {:.2})",
        colored_percent(snap.cpu.usage_percent, thresholds.cpu, palette),
        snap.cpu.cores,
        snap.cpu.load_1,
        snap.cpu.load_5,
        snap.cpu.load_15
    ));
    lines.push(format!(
        "Memory:     {}  ({:.1} / {:.1} MB used, {:.1} MB available, swap {:.1} / {:.1} MB)",
        colored_percent(snap.memory.usage_percent, thresholds.memory, palette),
        snap.memory.used_mb,
        snap.memory.total_mb,
        snap.memory.available_mb,
        snap.memory.swap_used_mb,
        snap.memory.swap_total_mb
    ));
    lines.push(format!(
        "Disk {}:{} {}  ({:.1} / {:.1} GB used, {:.1} GB available)",
        snap.disk.mount,
        " ".repeat(5usize.saturating_sub(snap.disk.mount.len())),
        colored_percent(snap.disk.usage_percent, thresholds.disk, palette),
        snap.disk.used_gb,
        snap.disk.total_gb,
        snap.disk.available_gb
    ));
    lines.push(format!(
        "Network:    {} established, {} listening, {} time-wait",
        snap.network.established, snap.network.listening, snap.network.time_wait
    ));
    let zombies = if snap.processes.zombie > 0 {
        palette.yellow(&format!("{} zombie", snap.processes.zombie))
    } else {
        format!("{} zombie", snap.processes.zombie)
    };
    lines.push(format!(
        "Processes:  {} total, {} running, {} sleeping, {}",
        snap.processes.total, snap.processes.running, snap.processes.sleeping, zombies
    ));
    lines.push(String::new());
    lines.extend(alert_lines(snap, thresholds, palette));
    lines.join("\n")
}

/// One line per raised alert, or a single all-clear line.
pub fn alert_lines(snap: &Snapshot, thresholds: &Thresholds, palette: &Palette) -> Vec<String> {
    if !snap.alerts.any() {
        return vec![format!(
            "{} All resources within limits",
            palette.ok()
        )];
    }

    let mut lines = Vec::new();
    let mut push = |name: &str, value: f64, threshold: f64| {
        lines.push(format!(
            "{} ALERT: {} usage {:.1}% >= {:.1}% threshold",
            palette.fail(),
            name,
            value,
            threshold
        ));
    };
    if snap.alerts.cpu {
        push("CPU", snap.cpu.usage_percent, thresholds.cpu);
    }
    if snap.alerts.memory {
        push("Memory", snap.memory.usage_percent, thresholds.memory);
    }
    if snap.alerts.disk {
        push("Disk", snap.disk.usage_percent, thresholds.disk);
    }
    lines
}

/// `host | CPU x% | MEM y% | DISK z% | NET n | PROCS p | ALERTS ...`
pub fn render_simple(snap: &Snapshot) -> String {
    let alerts = snap.alerts.names();
    format!(
        "{} | CPU {:.1}% | MEM {:.1}% | DISK {:.1}% | NET {} | PROCS {} | ALERTS {}",
        snap.hostname,
        snap.cpu.usage_percent,
        snap.memory.usage_percent,
        snap.disk.usage_percent,
        snap.network.established,
        snap.processes.total,
        if alerts.is_empty() {
            "none".to_string()
        } else {
            alerts.join(",")
        }
    )
}

pub fn render_json(snap: &Snapshot, pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(snap)
    } else {
        serde_json::to_string(snap)
    }
}
