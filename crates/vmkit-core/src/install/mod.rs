//! Installer: profiles of modules, each a list of check-then-install steps.
//!
//! A run goes through four phases:
//! 1. Module confirmation (`Install core? [Y/n]`) unless `-y`
//! 2. Planning: every step's check is evaluated against the host
//! 3. Preflight: privileges and required tools for the pending steps
//! 4. Execution: one step at a time; failures are recorded, the run goes on
//!
//! `--dry-run` stops after planning and prints the plan.

pub mod preflight;
pub mod shell;
pub mod steps;

pub use shell::{Shell, SystemShell};
pub use steps::{Check, InstallModule, Method, Profile, Step};

use crate::collect::tool_runner::ToolSpec;
use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};
use crate::prompt::Confirm;
use crate::style::Palette;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use vmkit_common::Result;

/// Invalid module selection on the command line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("--modules only applies to the custom profile")]
    ModulesWithoutCustom,
    #[error("the custom profile needs --modules when running non-interactively")]
    CustomNeedsModules,
}

/// Modules to offer for a profile, in canonical order, deduplicated.
pub fn resolve_modules(
    profile: Profile,
    requested: &[InstallModule],
    interactive: bool,
) -> std::result::Result<Vec<InstallModule>, SelectionError> {
    match profile.modules() {
        Some(_) if !requested.is_empty() => Err(SelectionError::ModulesWithoutCustom),
        Some(modules) => Ok(modules),
        None if requested.is_empty() && !interactive => Err(SelectionError::CustomNeedsModules),
        None if requested.is_empty() => Ok(InstallModule::ALL.to_vec()),
        None => Ok(InstallModule::ALL
            .into_iter()
            .filter(|m| requested.contains(m))
            .collect()),
    }
}

#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Skip steps whose check already passes.
    pub skip_existing: bool,
    /// Print the plan only.
    pub dry_run: bool,
    /// Answer yes to module prompts.
    pub assume_yes: bool,
    /// Target home directory for templates.
    pub home: PathBuf,
    /// Prefix apt commands with `sudo -n` when not root.
    pub use_sudo: bool,
}

/// A step with its planning decision.
#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub module: InstallModule,
    pub step: &'static Step,
    /// Check passed at planning time.
    pub present: bool,
    /// Will be executed.
    pub pending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Installed,
    Skipped { reason: String },
    Failed { reason: String },
    WouldInstall,
    WouldSkip { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub module: InstallModule,
    pub step: &'static str,
    pub method: &'static str,
    #[serde(flatten)]
    pub status: StepStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InstallReport {
    pub steps: Vec<StepRecord>,
    pub declined: Vec<InstallModule>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallCounts {
    pub installed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl InstallReport {
    pub fn counts(&self) -> InstallCounts {
        let mut counts = InstallCounts::default();
        for record in &self.steps {
            match record.status {
                StepStatus::Installed | StepStatus::WouldInstall => counts.installed += 1,
                StepStatus::Skipped { .. } | StepStatus::WouldSkip { .. } => counts.skipped += 1,
                StepStatus::Failed { .. } => counts.failed += 1,
            }
        }
        counts
    }

    pub fn has_failures(&self) -> bool {
        self.counts().failed > 0
    }
}

/// Shell-like description of what a step does, for plans and logs.
pub fn describe_method(method: &Method, home: &Path) -> String {
    match method {
        Method::Apt { packages } => format!("apt-get install -y {}", packages.join(" ")),
        Method::Npm { package } => format!("npm install -g {package}"),
        Method::Script { url, args } => {
            let mut text = format!("curl -fsSL {url} | sh");
            if !args.is_empty() {
                text.push_str(&format!(" -s -- {}", args.join(" ")));
            }
            text
        }
        Method::Cargo { crate_name } => format!("cargo install --locked {crate_name}"),
        Method::Template { path, .. } => format!("write {}", home.join(path).display()),
    }
}

/// Write `contents` to `path` unless it exists. Returns false when the
/// file was already there.
pub fn write_template(path: &Path, contents: &str) -> io::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            file.write_all(contents.as_bytes())?;
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}

pub struct Installer<'a> {
    shell: &'a mut dyn Shell,
    prompt: &'a mut dyn Confirm,
    out: &'a mut dyn Write,
    palette: Palette,
    ctx: &'a LogContext,
    options: InstallOptions,
    apt_updated: bool,
}

impl<'a> Installer<'a> {
    pub fn new(
        shell: &'a mut dyn Shell,
        prompt: &'a mut dyn Confirm,
        out: &'a mut dyn Write,
        ctx: &'a LogContext,
        options: InstallOptions,
    ) -> Self {
        Self {
            shell,
            prompt,
            out,
            palette: Palette::plain(),
            ctx,
            options,
            apt_updated: false,
        }
    }

    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = palette;
        self
    }

    /// Confirm, plan, preflight and execute. Preflight failures are
    /// returned as errors; step failures end up in the report.
    pub fn run(&mut self, modules: &[InstallModule]) -> Result<InstallReport> {
        let mut report = InstallReport {
            dry_run: self.options.dry_run,
            ..Default::default()
        };

        let mut chosen = Vec::new();
        for &module in modules {
            if self.options.assume_yes
                || self.prompt.confirm(&format!("Install {module}?"), true)
            {
                chosen.push(module);
            } else {
                log_event!(
                    self.ctx,
                    INFO,
                    event_names::MODULE_DECLINED,
                    Stage::Install,
                    "module declined",
                    module = module.as_str()
                );
                report.declined.push(module);
            }
        }

        let plan = self.plan(&chosen);

        if self.options.dry_run {
            self.print_plan(&plan, &mut report)?;
            return Ok(report);
        }

        if let Err(e) = preflight::run_preflight(&plan, self.shell, self.options.use_sudo) {
            log_event!(
                self.ctx,
                ERROR,
                event_names::PREFLIGHT_FAILED,
                Stage::Preflight,
                "preflight failed",
                error = e.to_string().as_str()
            );
            return Err(e);
        }

        let mut current = None;
        for planned in &plan {
            if current != Some(planned.module) {
                current = Some(planned.module);
                writeln!(self.out, "{}", self.palette.bold(&format!("==> {}", planned.module)))?;
            }
            let status = self.execute(planned);
            self.print_status(planned.step.name, &status)?;
            report.steps.push(StepRecord {
                module: planned.module,
                step: planned.step.name,
                method: planned.step.method.kind(),
                status,
            });
        }

        let counts = report.counts();
        writeln!(
            self.out,
            "\nInstalled {}, skipped {}, failed {}",
            counts.installed, counts.skipped, counts.failed
        )?;
        Ok(report)
    }

    fn is_present(&self, check: &Check) -> bool {
        match check {
            Check::Command(name) => self.shell.command_exists(name),
            Check::Path(relative) => self.options.home.join(relative).exists(),
        }
    }

    fn plan(&self, modules: &[InstallModule]) -> Vec<PlannedStep> {
        modules
            .iter()
            .flat_map(|&module| module.steps().iter().map(move |step| (module, step)))
            .map(|(module, step)| {
                let present = self.is_present(&step.check);
                let pending = if step.method.is_template() {
                    !present
                } else {
                    !(present && self.options.skip_existing)
                };
                PlannedStep {
                    module,
                    step,
                    present,
                    pending,
                }
            })
            .collect()
    }

    fn print_plan(&mut self, plan: &[PlannedStep], report: &mut InstallReport) -> io::Result<()> {
        writeln!(self.out, "Dry run: nothing will be installed or written.")?;
        for planned in plan {
            let action = describe_method(&planned.step.method, &self.options.home);
            let status = if planned.pending {
                StepStatus::WouldInstall
            } else {
                StepStatus::WouldSkip {
                    reason: skip_reason(planned.step).to_string(),
                }
            };
            let verdict = match &status {
                StepStatus::WouldInstall => self.palette.green("would install"),
                _ => self.palette.yellow("would skip (present)"),
            };
            writeln!(
                self.out,
                "  [{}] {:<16} {:<52} {}",
                planned.module, planned.step.name, action, verdict
            )?;
            report.steps.push(StepRecord {
                module: planned.module,
                step: planned.step.name,
                method: planned.step.method.kind(),
                status,
            });
        }
        Ok(())
    }

    fn print_status(&mut self, name: &str, status: &StepStatus) -> io::Result<()> {
        let line = match status {
            StepStatus::Installed => format!("  {} {}", self.palette.ok(), name),
            StepStatus::Skipped { reason } => {
                format!("  - {} ({})", name, self.palette.yellow(reason))
            }
            StepStatus::Failed { reason } => {
                format!("  {} {}: {}", self.palette.fail(), name, self.palette.red(reason))
            }
            StepStatus::WouldInstall | StepStatus::WouldSkip { .. } => return Ok(()),
        };
        writeln!(self.out, "{line}")
    }

    fn execute(&mut self, planned: &PlannedStep) -> StepStatus {
        let step = planned.step;
        if !planned.pending {
            log_event!(
                self.ctx,
                DEBUG,
                event_names::STEP_SKIPPED,
                Stage::Install,
                "step skipped",
                step = step.name
            );
            return StepStatus::Skipped {
                reason: skip_reason(step).to_string(),
            };
        }

        log_event!(
            self.ctx,
            INFO,
            event_names::STEP_STARTED,
            Stage::Install,
            "step started",
            step = step.name,
            method = step.method.kind()
        );

        let status = match &step.method {
            Method::Template { path, contents } => {
                let target = self.options.home.join(path);
                match write_template(&target, contents) {
                    Ok(true) => StepStatus::Installed,
                    Ok(false) => StepStatus::Skipped {
                        reason: "file exists".into(),
                    },
                    Err(e) => StepStatus::Failed {
                        reason: format!("{}: {}", target.display(), e),
                    },
                }
            }
            Method::Apt { packages } => {
                self.ensure_apt_updated();
                let mut args = vec!["install".to_string(), "-y".to_string()];
                args.extend(packages.iter().map(|p| p.to_string()));
                self.run_command(self.apt_spec(args))
            }
            Method::Npm { package } => self.run_command(ToolSpec::new(
                "npm",
                vec!["install".into(), "-g".into(), package.to_string()],
            )),
            Method::Script { url, args } => {
                let mut pipeline = format!("curl -fsSL {url} | sh");
                if !args.is_empty() {
                    pipeline.push_str(" -s -- ");
                    pipeline.push_str(&args.join(" "));
                }
                self.run_command(ToolSpec::new("sh", vec!["-c".into(), pipeline]))
            }
            Method::Cargo { crate_name } => self.run_command(ToolSpec::new(
                "cargo",
                vec!["install".into(), "--locked".into(), crate_name.to_string()],
            )),
        };

        match &status {
            StepStatus::Failed { reason } => log_event!(
                self.ctx,
                WARN,
                event_names::STEP_RESULT,
                Stage::Install,
                "step failed",
                step = step.name,
                reason = reason.as_str()
            ),
            _ => log_event!(
                self.ctx,
                INFO,
                event_names::STEP_RESULT,
                Stage::Install,
                "step installed",
                step = step.name
            ),
        }
        status
    }

    fn run_command(&mut self, spec: ToolSpec) -> StepStatus {
        match self.shell.run(&spec) {
            Ok(output) if output.success() => StepStatus::Installed,
            Ok(output) => StepStatus::Failed {
                reason: output.failure_hint(),
            },
            Err(e) => StepStatus::Failed {
                reason: e.to_string(),
            },
        }
    }

    /// `apt-get <args>`, via `sudo -n env ...` when not root.
    fn apt_spec(&self, args: Vec<String>) -> ToolSpec {
        if self.shell.is_root() || !self.options.use_sudo {
            ToolSpec::new("apt-get", args).with_env("DEBIAN_FRONTEND", "noninteractive")
        } else {
            let mut full = vec![
                "-n".to_string(),
                "env".to_string(),
                "DEBIAN_FRONTEND=noninteractive".to_string(),
                "apt-get".to_string(),
            ];
            full.extend(args);
            ToolSpec::new("sudo", full)
        }
    }

    /// `apt-get update` at most once per run, right before the first apt install.
    fn ensure_apt_updated(&mut self) {
        if self.apt_updated {
            return;
        }
        self.apt_updated = true;
        let spec = self.apt_spec(vec!["update".to_string()]);
        match self.shell.run(&spec) {
            Ok(output) if output.success() => {}
            Ok(output) => tracing::warn!(reason = %output.failure_hint(), "apt-get update failed"),
            Err(e) => tracing::warn!(error = %e, "apt-get update failed"),
        }
    }
}

fn skip_reason(step: &Step) -> &'static str {
    if step.method.is_template() {
        "file exists"
    } else {
        "already installed"
    }
}
