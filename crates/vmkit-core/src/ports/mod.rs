//! Port killer: free development server ports.
//!
//! For every targeted port:
//! 1. Ask the [`ListenerProbe`] which processes listen on it
//! 2. Nothing listening → `free`
//! 3. Only sockets with no visible owner → `still in use`, with a root hint
//! 4. Otherwise list them, confirm unless `-y`, terminate each PID with
//!    SIGTERM → grace → SIGKILL escalation
//! 5. Re-check the port → `freed` or `still in use`

pub mod probe;
pub mod report;

pub use probe::{default_probe, parse_lsof_pids, Listener, ListenerProbe, LsofProbe, PortScan};
#[cfg(target_os = "linux")]
pub use probe::ProcProbe;
pub use report::{PortOutcome, PortReport, PortSummary, PortsRun};

use crate::action::{Signaller, Termination};
use crate::config::{validate_port_range, PortSettings, ValidationError};
use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};
use crate::prompt::Confirm;
use crate::style::Palette;
use std::collections::BTreeSet;
use std::io::Write;
use vmkit_common::Result;

/// Which ports to look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSelection {
    /// `-p PORT`
    Single(u16),
    /// Every base port expanded by `range`: `base ..= base + range - 1`.
    Families { bases: Vec<u16>, range: u16 },
}

impl PortSelection {
    /// Build from CLI flags, falling back to configured families.
    pub fn from_args(
        port: Option<u16>,
        range: Option<u16>,
        settings: &PortSettings,
    ) -> std::result::Result<Self, ValidationError> {
        if let Some(port) = port {
            return Ok(PortSelection::Single(port));
        }
        let range = range.unwrap_or(settings.default_range);
        validate_port_range(range)?;
        Ok(PortSelection::Families {
            bases: settings.base_ports.clone(),
            range,
        })
    }
}

/// Expand a selection into distinct ports, ascending.
///
/// Ports past 65535 and port 0 are dropped.
pub fn target_ports(selection: &PortSelection) -> Vec<u16> {
    let set: BTreeSet<u16> = match selection {
        PortSelection::Single(port) => std::iter::once(*port).collect(),
        PortSelection::Families { bases, range } => bases
            .iter()
            .flat_map(|&base| (0..*range).filter_map(move |i| base.checked_add(i)))
            .collect(),
    };
    set.into_iter().filter(|&p| p != 0).collect()
}

/// Options for one `vmkit ports` invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct KillOptions {
    /// Skip the confirmation prompt.
    pub assume_yes: bool,
    /// Only report listeners.
    pub list_only: bool,
}

/// Drives probe, prompt and signaller over the targeted ports.
pub struct PortKiller<'a> {
    probe: &'a dyn ListenerProbe,
    signaller: &'a dyn Signaller,
    prompt: &'a mut dyn Confirm,
    out: &'a mut dyn Write,
    palette: Palette,
    ctx: &'a LogContext,
    options: KillOptions,
}

impl<'a> PortKiller<'a> {
    pub fn new(
        probe: &'a dyn ListenerProbe,
        signaller: &'a dyn Signaller,
        prompt: &'a mut dyn Confirm,
        out: &'a mut dyn Write,
        ctx: &'a LogContext,
    ) -> Self {
        Self {
            probe,
            signaller,
            prompt,
            out,
            palette: Palette::plain(),
            ctx,
            options: KillOptions::default(),
        }
    }

    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = palette;
        self
    }

    pub fn with_options(mut self, options: KillOptions) -> Self {
        self.options = options;
        self
    }

    /// Process every port in order. Probe failures abort the run.
    pub fn run(&mut self, ports: &[u16]) -> Result<Vec<PortReport>> {
        let mut reports = Vec::with_capacity(ports.len());
        for &port in ports {
            let report = self.handle_port(port)?;
            writeln!(
                self.out,
                "{}",
                report::format_outcome_line(&report, &self.palette)
            )?;
            if report.outcome == PortOutcome::InUse {
                for line in report::format_listener_lines(&report.listeners) {
                    writeln!(self.out, "{line}")?;
                }
            }
            if report.hidden > 0 {
                writeln!(self.out, "{}", report::HIDDEN_OWNER_HINT)?;
            }
            for err in &report.errors {
                writeln!(self.out, "    {}", self.palette.red(err))?;
            }
            reports.push(report);
        }
        Ok(reports)
    }

    fn handle_port(&mut self, port: u16) -> Result<PortReport> {
        let scan = self.probe.scan(port)?;
        log_event!(
            self.ctx,
            DEBUG,
            event_names::PORT_SCANNED,
            Stage::Scan,
            "port scanned",
            port = port,
            listeners = scan.listeners.len(),
            hidden = scan.hidden,
            probe = self.probe.name()
        );

        let free = scan.is_free();
        let mut report = PortReport {
            port,
            listeners: scan.listeners,
            hidden: scan.hidden,
            outcome: PortOutcome::Free,
            errors: Vec::new(),
        };
        if free {
            return Ok(report);
        }
        if self.options.list_only {
            report.outcome = PortOutcome::InUse;
            return Ok(report);
        }
        if report.listeners.is_empty() {
            log_event!(
                self.ctx,
                WARN,
                event_names::PORT_VERIFIED,
                Stage::Scan,
                "listener owner not visible",
                port = port,
                hidden = report.hidden
            );
            report.outcome = PortOutcome::Unattributed {
                sockets: report.hidden,
            };
            return Ok(report);
        }

        if !self.options.assume_yes {
            writeln!(
                self.out,
                "{} Port {}: {} by {} process(es)",
                self.palette.warn(),
                port,
                self.palette.yellow("in use"),
                report.listeners.len()
            )?;
            for line in report::format_listener_lines(&report.listeners) {
                writeln!(self.out, "{line}")?;
            }
            self.out.flush()?;

            let question = format!(
                "Kill {} process(es) on port {}?",
                report.listeners.len(),
                port
            );
            if !self.prompt.confirm(&question, false) {
                report.outcome = PortOutcome::Skipped;
                return Ok(report);
            }
        }

        let mut terminated = Vec::new();
        let mut forced = Vec::new();
        for listener in &report.listeners {
            let pid = listener.pid;
            log_event!(
                self.ctx,
                INFO,
                event_names::PORT_KILL_ATTEMPTED,
                Stage::Kill,
                "terminating listener",
                port = port,
                pid = pid
            );
            match self.signaller.terminate(pid) {
                Ok(outcome) => {
                    log_event!(
                        self.ctx,
                        INFO,
                        event_names::PORT_KILL_RESULT,
                        Stage::Kill,
                        "listener terminated",
                        port = port,
                        pid = pid,
                        outcome = outcome.as_str()
                    );
                    if outcome == Termination::Forced {
                        forced.push(pid);
                    }
                    terminated.push(pid);
                }
                Err(e) => {
                    log_event!(
                        self.ctx,
                        WARN,
                        event_names::PORT_KILL_RESULT,
                        Stage::Kill,
                        "termination failed",
                        port = port,
                        pid = pid,
                        error = e.to_string().as_str()
                    );
                    report.errors.push(format!("PID {pid}: {e}"));
                }
            }
        }

        let remaining = self.probe.scan(port)?;
        log_event!(
            self.ctx,
            INFO,
            event_names::PORT_VERIFIED,
            Stage::Verify,
            "port re-checked",
            port = port,
            remaining = remaining.listeners.len(),
            hidden = remaining.hidden
        );

        report.hidden = remaining.hidden;
        report.outcome = if remaining.is_free() {
            PortOutcome::Freed {
                pids: terminated,
                forced,
            }
        } else if remaining.listeners.is_empty() {
            PortOutcome::Unattributed {
                sockets: remaining.hidden,
            }
        } else {
            PortOutcome::StillBusy {
                pids: remaining.pids(),
            }
        };
        Ok(report)
    }
}

/// Exit classification: any port still busy is a partial failure.
pub fn has_failures(reports: &[PortReport]) -> bool {
    reports.iter().any(|r| r.outcome.is_failure())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{AssumeYes, ScriptedPrompt};
    use std::cell::RefCell;
    use std::collections::{HashMap, HashSet, VecDeque};
    use vmkit_common::Error;

    /// Returns queued listener lists per port; the last one repeats.
    #[derive(Default)]
    struct MockProbe {
        answers: RefCell<HashMap<u16, VecDeque<Vec<u32>>>>,
        hidden: HashMap<u16, usize>,
    }

    impl MockProbe {
        fn with(mut self, port: u16, calls: &[&[u32]]) -> Self {
            self.answers
                .get_mut()
                .insert(port, calls.iter().map(|c| c.to_vec()).collect());
            self
        }

        fn with_hidden(mut self, port: u16, sockets: usize) -> Self {
            self.hidden.insert(port, sockets);
            self
        }
    }

    impl ListenerProbe for MockProbe {
        fn scan(&self, port: u16) -> Result<PortScan> {
            let mut answers = self.answers.borrow_mut();
            let queue = answers.entry(port).or_default();
            let pids = if queue.len() > 1 {
                queue.pop_front().unwrap_or_default()
            } else {
                queue.front().cloned().unwrap_or_default()
            };
            Ok(PortScan {
                listeners: pids
                    .into_iter()
                    .map(|pid| Listener {
                        pid,
                        name: Some("node".into()),
                    })
                    .collect(),
                hidden: self.hidden.get(&port).copied().unwrap_or(0),
            })
        }

        fn name(&self) -> &'static str {
            "mock"
        }
    }

    #[derive(Default)]
    struct MockSignaller {
        stubborn: HashSet<u32>,
        denied: HashSet<u32>,
        terminated: RefCell<Vec<u32>>,
    }

    impl Signaller for MockSignaller {
        fn is_alive(&self, pid: u32) -> bool {
            !self.terminated.borrow().contains(&pid)
        }

        fn terminate(&self, pid: u32) -> Result<Termination> {
            if self.denied.contains(&pid) {
                return Err(Error::PermissionDenied { pid });
            }
            self.terminated.borrow_mut().push(pid);
            if self.stubborn.contains(&pid) {
                Ok(Termination::Forced)
            } else {
                Ok(Termination::Graceful)
            }
        }
    }

    fn ctx() -> LogContext {
        LogContext::new("run-test", "host-test")
    }

    #[test]
    fn selection_prefers_explicit_port() {
        let settings = PortSettings::default();
        let sel = PortSelection::from_args(Some(9999), Some(5), &settings).unwrap();
        assert_eq!(target_ports(&sel), vec![9999]);
    }

    #[test]
    fn selection_uses_default_families() {
        let settings = PortSettings::default();
        let sel = PortSelection::from_args(None, None, &settings).unwrap();
        assert_eq!(
            target_ports(&sel),
            vec![3000, 4000, 5000, 5173, 8000, 8080, 8888]
        );
    }

    #[test]
    fn selection_rejects_bad_range() {
        let settings = PortSettings::default();
        assert_eq!(
            PortSelection::from_args(None, Some(21), &settings),
            Err(ValidationError::PortRange(21))
        );
    }

    #[test]
    fn families_expand_and_dedupe() {
        let sel = PortSelection::Families {
            bases: vec![8000, 8001, 3000],
            range: 3,
        };
        assert_eq!(
            target_ports(&sel),
            vec![3000, 3001, 3002, 8000, 8001, 8002, 8003]
        );
    }

    #[test]
    fn expansion_stops_at_max_port() {
        let sel = PortSelection::Families {
            bases: vec![65534],
            range: 5,
        };
        assert_eq!(target_ports(&sel), vec![65534, 65535]);
    }

    #[test]
    fn free_port_reports_free() {
        let probe = MockProbe::default();
        let signaller = MockSignaller::default();
        let mut prompt = ScriptedPrompt::default();
        let mut out = Vec::new();
        let ctx = ctx();

        let reports = PortKiller::new(&probe, &signaller, &mut prompt, &mut out, &ctx)
            .run(&[3000])
            .unwrap();

        assert_eq!(reports[0].outcome, PortOutcome::Free);
        assert!(prompt.asked.is_empty());
        assert!(!has_failures(&reports));
        assert_eq!(String::from_utf8(out).unwrap(), "✓ Port 3000: free\n");
    }

    #[test]
    fn busy_port_is_freed_after_confirmation() {
        let probe = MockProbe::default().with(3000, &[&[4242], &[]]);
        let signaller = MockSignaller::default();
        let mut prompt = ScriptedPrompt::new([true]);
        let mut out = Vec::new();
        let ctx = ctx();

        let reports = PortKiller::new(&probe, &signaller, &mut prompt, &mut out, &ctx)
            .run(&[3000])
            .unwrap();

        assert_eq!(prompt.asked, vec!["Kill 1 process(es) on port 3000?"]);
        assert_eq!(*signaller.terminated.borrow(), vec![4242]);
        assert_eq!(
            reports[0].outcome,
            PortOutcome::Freed {
                pids: vec![4242],
                forced: vec![],
            }
        );
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("PID 4242"));
        assert!(text.contains("Port 3000: freed"));
    }

    #[test]
    fn declined_prompt_skips() {
        let probe = MockProbe::default().with(8080, &[&[10, 11]]);
        let signaller = MockSignaller::default();
        let mut prompt = ScriptedPrompt::new([false]);
        let mut out = Vec::new();
        let ctx = ctx();

        let reports = PortKiller::new(&probe, &signaller, &mut prompt, &mut out, &ctx)
            .run(&[8080])
            .unwrap();

        assert_eq!(reports[0].outcome, PortOutcome::Skipped);
        assert!(signaller.terminated.borrow().is_empty());
        assert!(!has_failures(&reports));
    }

    #[test]
    fn assume_yes_skips_prompt_and_records_forced() {
        let probe = MockProbe::default().with(5173, &[&[7, 8], &[]]);
        let signaller = MockSignaller {
            stubborn: [8].into_iter().collect(),
            ..Default::default()
        };
        let mut prompt = AssumeYes;
        let mut out = Vec::new();
        let ctx = ctx();

        let reports = PortKiller::new(&probe, &signaller, &mut prompt, &mut out, &ctx)
            .with_options(KillOptions {
                assume_yes: true,
                list_only: false,
            })
            .run(&[5173])
            .unwrap();

        assert_eq!(
            reports[0].outcome,
            PortOutcome::Freed {
                pids: vec![7, 8],
                forced: vec![8],
            }
        );
        let text = String::from_utf8(out).unwrap();
        assert!(!text.contains("PID 7"), "no listener listing with -y: {text}");
    }

    #[test]
    fn permission_denied_leaves_port_busy() {
        let probe = MockProbe::default().with(8000, &[&[1234]]);
        let signaller = MockSignaller {
            denied: [1234].into_iter().collect(),
            ..Default::default()
        };
        let mut prompt = AssumeYes;
        let mut out = Vec::new();
        let ctx = ctx();

        let reports = PortKiller::new(&probe, &signaller, &mut prompt, &mut out, &ctx)
            .with_options(KillOptions {
                assume_yes: true,
                list_only: false,
            })
            .run(&[8000])
            .unwrap();

        assert_eq!(
            reports[0].outcome,
            PortOutcome::StillBusy { pids: vec![1234] }
        );
        assert_eq!(reports[0].errors.len(), 1);
        assert!(has_failures(&reports));
    }

    #[test]
    fn list_only_never_signals() {
        let probe = MockProbe::default().with(3000, &[&[42]]);
        let signaller = MockSignaller::default();
        let mut prompt = ScriptedPrompt::default();
        let mut out = Vec::new();
        let ctx = ctx();

        let reports = PortKiller::new(&probe, &signaller, &mut prompt, &mut out, &ctx)
            .with_options(KillOptions {
                assume_yes: false,
                list_only: true,
            })
            .run(&[3000, 3001])
            .unwrap();

        assert_eq!(reports[0].outcome, PortOutcome::InUse);
        assert_eq!(reports[1].outcome, PortOutcome::Free);
        assert!(signaller.terminated.borrow().is_empty());
        assert!(prompt.asked.is_empty());
    }

    #[test]
    fn unattributed_listener_is_not_reported_free() {
        let probe = MockProbe::default().with_hidden(3000, 1);
        let signaller = MockSignaller::default();
        let mut prompt = ScriptedPrompt::default();
        let mut out = Vec::new();
        let ctx = ctx();

        let reports = PortKiller::new(&probe, &signaller, &mut prompt, &mut out, &ctx)
            .run(&[3000])
            .unwrap();

        assert_eq!(
            reports[0].outcome,
            PortOutcome::Unattributed { sockets: 1 }
        );
        assert!(prompt.asked.is_empty());
        assert!(signaller.terminated.borrow().is_empty());
        assert!(has_failures(&reports));
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Port 3000: still in use"), "{text}");
        assert!(text.contains("run as root"), "{text}");
    }

    #[test]
    fn hidden_socket_left_after_kill_is_a_failure() {
        let probe = MockProbe::default()
            .with(8080, &[&[42], &[]])
            .with_hidden(8080, 1);
        let signaller = MockSignaller::default();
        let mut prompt = AssumeYes;
        let mut out = Vec::new();
        let ctx = ctx();

        let reports = PortKiller::new(&probe, &signaller, &mut prompt, &mut out, &ctx)
            .with_options(KillOptions {
                assume_yes: true,
                list_only: false,
            })
            .run(&[8080])
            .unwrap();

        assert_eq!(*signaller.terminated.borrow(), vec![42]);
        assert_eq!(
            reports[0].outcome,
            PortOutcome::Unattributed { sockets: 1 }
        );
        assert!(has_failures(&reports));
    }

    #[test]
    fn list_mode_counts_hidden_sockets() {
        let probe = MockProbe::default().with_hidden(5173, 2);
        let signaller = MockSignaller::default();
        let mut prompt = ScriptedPrompt::default();
        let mut out = Vec::new();
        let ctx = ctx();

        let reports = PortKiller::new(&probe, &signaller, &mut prompt, &mut out, &ctx)
            .with_options(KillOptions {
                assume_yes: false,
                list_only: true,
            })
            .run(&[5173])
            .unwrap();

        assert_eq!(reports[0].outcome, PortOutcome::InUse);
        assert_eq!(reports[0].hidden, 2);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("2 socket(s) with no visible owner"), "{text}");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn live_listener_is_killed_and_port_freed() {
        use crate::action::{SignalConfig, SignalRunner};
        use std::process::Command;

        // Reserve a free port, then hand it to a child listener
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let script = format!(
            "import socket,time\ns=socket.socket()\ns.setsockopt(socket.SOL_SOCKET,socket.SO_REUSEADDR,1)\ns.bind(('127.0.0.1',{port}))\ns.listen(1)\ntime.sleep(60)\n"
        );
        let Ok(mut child) = Command::new("python3").args(["-c", &script]).spawn() else {
            eprintln!("python3 not available, skipping");
            return;
        };

        let probe = ProcProbe::default();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while probe.scan(port).unwrap().listeners.is_empty() {
            assert!(std::time::Instant::now() < deadline, "listener never appeared");
            std::thread::sleep(std::time::Duration::from_millis(50));
        }

        let signaller = SignalRunner::new(SignalConfig {
            term_grace_ms: 1_000,
            poll_interval_ms: 20,
        });
        let mut prompt = AssumeYes;
        let mut out = Vec::new();
        let ctx = ctx();
        let reports = PortKiller::new(&probe, &signaller, &mut prompt, &mut out, &ctx)
            .with_options(KillOptions {
                assume_yes: true,
                list_only: false,
            })
            .run(&[port])
            .unwrap();

        let _ = child.kill();
        let _ = child.wait();
        assert!(
            matches!(&reports[0].outcome, PortOutcome::Freed { pids, .. } if pids.contains(&child.id())),
            "unexpected outcome: {:?}",
            reports[0]
        );
    }
}
