//! Per-port results and their renderings.

use super::probe::Listener;
use crate::style::Palette;
use serde::{Deserialize, Serialize};

/// What happened to one port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PortOutcome {
    /// Nothing was listening.
    Free,
    /// Listeners were terminated and the port re-checked free.
    Freed {
        pids: Vec<u32>,
        /// Subset of `pids` that needed SIGKILL.
        forced: Vec<u32>,
    },
    /// The user declined to kill the listeners.
    Skipped,
    /// Listeners remain after the kill attempt.
    StillBusy { pids: Vec<u32> },
    /// Listeners reported without killing (`--list`).
    InUse,
    /// Only sockets with no visible owner are left; nothing we can signal.
    Unattributed { sockets: usize },
}

impl PortOutcome {
    /// Whether this outcome makes the run a partial failure.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            PortOutcome::StillBusy { .. } | PortOutcome::Unattributed { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            PortOutcome::Free => "free",
            PortOutcome::Freed { .. } => "freed",
            PortOutcome::Skipped => "skipped",
            PortOutcome::StillBusy { .. } => "still in use",
            PortOutcome::InUse => "in use",
            PortOutcome::Unattributed { .. } => "in use by an unknown process",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortReport {
    pub port: u16,
    pub listeners: Vec<Listener>,
    /// Listening sockets whose owner could not be identified.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub hidden: usize,
    #[serde(flatten)]
    pub outcome: PortOutcome,
    /// Per-PID signal errors (permission denied and the like).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSummary {
    pub checked: usize,
    pub free: usize,
    pub freed: usize,
    pub skipped: usize,
    pub still_busy: usize,
    pub in_use: usize,
}

impl PortSummary {
    pub fn from_reports(reports: &[PortReport]) -> Self {
        let mut summary = PortSummary {
            checked: reports.len(),
            ..Default::default()
        };
        for report in reports {
            match report.outcome {
                PortOutcome::Free => summary.free += 1,
                PortOutcome::Freed { .. } => summary.freed += 1,
                PortOutcome::Skipped => summary.skipped += 1,
                PortOutcome::StillBusy { .. } | PortOutcome::Unattributed { .. } => {
                    summary.still_busy += 1
                }
                PortOutcome::InUse => summary.in_use += 1,
            }
        }
        summary
    }
}

/// The JSON document printed by `vmkit ports --json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortsRun {
    pub run_id: String,
    pub ports: Vec<PortReport>,
    pub summary: PortSummary,
}

/// One status line for a finished port.
pub fn format_outcome_line(report: &PortReport, palette: &Palette) -> String {
    let port = format!("Port {}", report.port);
    match &report.outcome {
        PortOutcome::Free => format!("{} {}: {}", palette.ok(), port, palette.green("free")),
        PortOutcome::Freed { pids, forced } if forced.is_empty() => format!(
            "{} {}: {} ({} process(es) terminated)",
            palette.ok(),
            port,
            palette.green("freed"),
            pids.len()
        ),
        PortOutcome::Freed { pids, forced } => format!(
            "{} {}: {} ({} process(es) terminated, {} force-killed)",
            palette.ok(),
            port,
            palette.green("freed"),
            pids.len(),
            forced.len()
        ),
        PortOutcome::Skipped => format!("{} {}: {}", palette.warn(), port, palette.yellow("skipped")),
        PortOutcome::StillBusy { pids } => format!(
            "{} {}: {} (PID {})",
            palette.fail(),
            port,
            palette.red("still in use"),
            join_pids(pids)
        ),
        PortOutcome::InUse if report.hidden > 0 => format!(
            "{} {}: {} by {} process(es) and {} socket(s) with no visible owner",
            palette.warn(),
            port,
            palette.yellow("in use"),
            report.listeners.len(),
            report.hidden
        ),
        PortOutcome::InUse => format!(
            "{} {}: {} by {} process(es)",
            palette.warn(),
            port,
            palette.yellow("in use"),
            report.listeners.len()
        ),
        PortOutcome::Unattributed { sockets } => format!(
            "{} {}: {} ({} socket(s) with no visible owner)",
            palette.fail(),
            port,
            palette.red("still in use"),
            sockets
        ),
    }
}

/// Printed under a port whose listeners could not all be identified.
pub const HIDDEN_OWNER_HINT: &str =
    "    owner not visible (another user's process?); run as root to see and stop it";

/// `  PID 1234  node` lines shown before the kill prompt.
pub fn format_listener_lines(listeners: &[Listener]) -> Vec<String> {
    listeners
        .iter()
        .map(|l| format!("    PID {:<8} {}", l.pid, l.name.as_deref().unwrap_or("?")))
        .collect()
}

pub fn format_summary_line(summary: &PortSummary) -> String {
    let mut line = format!(
        "Checked {} port(s): {} free, {} freed, {} skipped, {} still in use",
        summary.checked, summary.free, summary.freed, summary.skipped, summary.still_busy
    );
    if summary.in_use > 0 {
        line.push_str(&format!(", {} in use", summary.in_use));
    }
    line
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

fn join_pids(pids: &[u32]) -> String {
    pids.iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(port: u16, outcome: PortOutcome) -> PortReport {
        PortReport {
            port,
            listeners: vec![Listener {
                pid: 4242,
                name: Some("node".into()),
            }],
            hidden: 0,
            outcome,
            errors: Vec::new(),
        }
    }

    #[test]
    fn free_line() {
        let mut r = report(3000, PortOutcome::Free);
        r.listeners.clear();
        assert_eq!(format_outcome_line(&r, &Palette::plain()), "✓ Port 3000: free");
    }

    #[test]
    fn freed_line_mentions_forced() {
        let r = report(
            8080,
            PortOutcome::Freed {
                pids: vec![4242],
                forced: vec![4242],
            },
        );
        assert_eq!(
            format_outcome_line(&r, &Palette::plain()),
            "✓ Port 8080: freed (1 process(es) terminated, 1 force-killed)"
        );
    }

    #[test]
    fn still_busy_line_lists_pids() {
        let r = report(5173, PortOutcome::StillBusy { pids: vec![1, 2] });
        assert_eq!(
            format_outcome_line(&r, &Palette::plain()),
            "✗ Port 5173: still in use (PID 1, 2)"
        );
    }

    #[test]
    fn unattributed_line_and_failure() {
        let mut r = report(3000, PortOutcome::Unattributed { sockets: 1 });
        r.listeners.clear();
        r.hidden = 1;
        assert_eq!(
            format_outcome_line(&r, &Palette::plain()),
            "✗ Port 3000: still in use (1 socket(s) with no visible owner)"
        );
        assert!(r.outcome.is_failure());
        let value = serde_json::to_value(&r).unwrap();
        assert_eq!(value["status"], "unattributed");
        assert_eq!(value["hidden"], 1);
        assert_eq!(PortSummary::from_reports(&[r]).still_busy, 1);
    }

    #[test]
    fn json_shape_is_flat() {
        let r = report(
            3000,
            PortOutcome::Freed {
                pids: vec![4242],
                forced: vec![],
            },
        );
        let value = serde_json::to_value(&r).unwrap();
        assert_eq!(value["port"], 3000);
        assert_eq!(value["status"], "freed");
        assert_eq!(value["pids"][0], 4242);
        assert_eq!(value["listeners"][0]["name"], "node");
        assert!(value.get("errors").is_none());
        assert!(value.get("hidden").is_none());

        let back: PortReport = serde_json::from_value(value).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn summary_counts() {
        let reports = vec![
            report(1, PortOutcome::Free),
            report(2, PortOutcome::Skipped),
            report(3, PortOutcome::StillBusy { pids: vec![9] }),
        ];
        let summary = PortSummary::from_reports(&reports);
        assert_eq!(summary.checked, 3);
        assert_eq!(summary.still_busy, 1);
        assert_eq!(
            format_summary_line(&summary),
            "Checked 3 port(s): 1 free, 0 freed, 1 skipped, 1 still in use"
        );
    }
}
