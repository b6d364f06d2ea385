//! Resource monitor: sample, render, optionally repeat.

pub mod render;
pub mod snapshot;

#[cfg(target_os = "linux")]
pub use snapshot::LiveSampler;
pub use snapshot::{Alerts, Sampler, Snapshot, Thresholds};

use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};
use crate::style::Palette;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use vmkit_common::{OutputFormat, Result};

/// Sleep slice while waiting for the next sample; bounds Ctrl+C latency.
const STOP_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub format: OutputFormat,
    /// Print only alert lines (human/simple formats).
    pub alert_only: bool,
    pub continuous: bool,
    pub interval: Duration,
    /// Stop after this many samples in continuous mode.
    pub count: Option<u64>,
    pub thresholds: Thresholds,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Human,
            alert_only: false,
            continuous: false,
            interval: Duration::from_secs(5),
            count: None,
            thresholds: Thresholds::default(),
        }
    }
}

/// How a monitor run ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorSummary {
    pub samples: u64,
    /// At least one sample raised an alert.
    pub alert_raised: bool,
    /// Stopped by Ctrl+C.
    pub interrupted: bool,
}

/// Render one snapshot in the selected mode.
pub fn render(snap: &Snapshot, options: &MonitorOptions, palette: &Palette) -> Result<String> {
    let text = match options.format {
        OutputFormat::Json => render::render_json(snap, !options.continuous)?,
        _ if options.alert_only => {
            render::alert_lines(snap, &options.thresholds, palette).join("\n")
        }
        OutputFormat::Simple => render::render_simple(snap),
        OutputFormat::Human => render::render_human(snap, &options.thresholds, palette),
    };
    Ok(text)
}

/// Sleep up to `total`, returning early (true) once `stop` is set.
/// A `total` past the end of the clock waits for `stop` alone.
fn interruptible_sleep(total: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now().checked_add(total);
    loop {
        if stop.load(Ordering::SeqCst) {
            return true;
        }
        let slice = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return false;
                }
                STOP_POLL.min(deadline - now)
            }
            None => STOP_POLL,
        };
        thread::sleep(slice);
    }
}

/// Run the monitor until one sample is printed, `count` is reached, or
/// `stop` is set.
pub fn run_monitor(
    sampler: &dyn Sampler,
    options: &MonitorOptions,
    palette: &Palette,
    out: &mut dyn Write,
    stop: &AtomicBool,
    ctx: &LogContext,
) -> Result<MonitorSummary> {
    let mut summary = MonitorSummary::default();

    loop {
        let snap = sampler.sample()?;
        summary.samples += 1;
        log_event!(
            ctx,
            DEBUG,
            event_names::MONITOR_SAMPLED,
            Stage::Monitor,
            "snapshot sampled",
            cpu = snap.cpu.usage_percent,
            memory = snap.memory.usage_percent,
            disk = snap.disk.usage_percent
        );
        if snap.alerts.any() {
            summary.alert_raised = true;
            log_event!(
                ctx,
                WARN,
                event_names::MONITOR_ALERT,
                Stage::Monitor,
                "threshold reached",
                alerts = snap.alerts.names().join(",").as_str()
            );
        }

        if options.continuous && options.format == OutputFormat::Human && palette.is_enabled() {
            // Redraw in place on a terminal
            write!(out, "\x1b[2J\x1b[H")?;
        }
        writeln!(out, "{}", render(&snap, options, palette)?)?;
        out.flush()?;

        if !options.continuous {
            break;
        }
        if options.count.is_some_and(|n| summary.samples >= n) {
            break;
        }
        if interruptible_sleep(options.interval, stop) {
            summary.interrupted = true;
            break;
        }
    }

    if summary.interrupted {
        writeln!(out, "\nMonitoring stopped")?;
        log_event!(
            ctx,
            INFO,
            event_names::MONITOR_STOPPED,
            Stage::Monitor,
            "monitoring stopped",
            samples = summary.samples
        );
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::snapshot::tests::sample_snapshot;
    use std::cell::Cell;
    use std::sync::Arc;

    struct FixedSampler {
        snap: Snapshot,
        calls: Cell<u64>,
    }

    impl FixedSampler {
        fn new(snap: Snapshot) -> Self {
            Self {
                snap,
                calls: Cell::new(0),
            }
        }
    }

    impl Sampler for FixedSampler {
        fn sample(&self) -> Result<Snapshot> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.snap.clone())
        }
    }

    fn ctx() -> LogContext {
        LogContext::new("run-test", "host-test")
    }

    #[test]
    fn single_shot_json_is_valid() {
        let sampler = FixedSampler::new(sample_snapshot());
        let options = MonitorOptions {
            format: OutputFormat::Json,
            ..Default::default()
        };
        let mut out = Vec::new();
        let stop = AtomicBool::new(false);

        let summary =
            run_monitor(&sampler, &options, &Palette::plain(), &mut out, &stop, &ctx()).unwrap();

        assert_eq!(summary.samples, 1);
        assert!(summary.alert_raised);
        let parsed: Snapshot = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed, sample_snapshot());
    }

    #[test]
    fn alert_only_prints_alert_lines() {
        let sampler = FixedSampler::new(sample_snapshot());
        let options = MonitorOptions {
            alert_only: true,
            ..Default::default()
        };
        let mut out = Vec::new();
        let stop = AtomicBool::new(false);
        run_monitor(&sampler, &options, &Palette::plain(), &mut out, &stop, &ctx()).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "✗ ALERT: CPU usage 80.0% >= 80.0% threshold\n");
    }

    #[test]
    fn continuous_stops_after_count() {
        let sampler = FixedSampler::new(sample_snapshot());
        let options = MonitorOptions {
            format: OutputFormat::Simple,
            continuous: true,
            interval: Duration::from_millis(10),
            count: Some(3),
            ..Default::default()
        };
        let mut out = Vec::new();
        let stop = AtomicBool::new(false);
        let summary =
            run_monitor(&sampler, &options, &Palette::plain(), &mut out, &stop, &ctx()).unwrap();

        assert_eq!(summary.samples, 3);
        assert!(!summary.interrupted);
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 3);
    }

    #[test]
    fn continuous_stops_on_flag() {
        let sampler = FixedSampler::new(sample_snapshot());
        let options = MonitorOptions {
            format: OutputFormat::Simple,
            continuous: true,
            interval: Duration::from_secs(30),
            ..Default::default()
        };
        let stop = Arc::new(AtomicBool::new(false));
        let setter = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            setter.store(true, Ordering::SeqCst);
        });

        let started = Instant::now();
        let mut out = Vec::new();
        let summary =
            run_monitor(&sampler, &options, &Palette::plain(), &mut out, &stop, &ctx()).unwrap();
        handle.join().unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.samples, 1);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(String::from_utf8(out).unwrap().ends_with("Monitoring stopped\n"));
    }

    #[test]
    fn unbounded_interval_waits_for_stop() {
        let sampler = FixedSampler::new(sample_snapshot());
        let options = MonitorOptions {
            format: OutputFormat::Simple,
            continuous: true,
            interval: Duration::from_secs(u64::MAX),
            ..Default::default()
        };
        let stop = Arc::new(AtomicBool::new(false));
        let setter = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            setter.store(true, Ordering::SeqCst);
        });

        let mut out = Vec::new();
        let summary =
            run_monitor(&sampler, &options, &Palette::plain(), &mut out, &stop, &ctx()).unwrap();
        handle.join().unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.samples, 1);
    }

    #[test]
    fn continuous_json_is_one_document_per_line() {
        let sampler = FixedSampler::new(sample_snapshot());
        let options = MonitorOptions {
            format: OutputFormat::Json,
            continuous: true,
            interval: Duration::from_millis(1),
            count: Some(2),
            ..Default::default()
        };
        let mut out = Vec::new();
        let stop = AtomicBool::new(false);
        run_monitor(&sampler, &options, &Palette::plain(), &mut out, &stop, &ctx()).unwrap();

        let text = String::from_utf8(out).unwrap();
        for line in text.lines() {
            serde_json::from_str::<Snapshot>(line).unwrap();
        }
        assert_eq!(sampler.calls.get(), 2);
    }
}
