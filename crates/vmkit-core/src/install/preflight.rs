//! Checks that must pass before anything is installed.

use super::shell::Shell;
use super::steps::{Check, Method};
use super::PlannedStep;
use crate::collect::tool_runner::ToolSpec;
use vmkit_common::{Error, Result};

/// Whether a command will be available by the time `index` runs:
/// present now, or provided by an earlier pending step.
fn available_before(plan: &[PlannedStep], index: usize, name: &str, shell: &dyn Shell) -> bool {
    shell.command_exists(name)
        || plan[..index]
            .iter()
            .any(|p| p.pending && matches!(p.step.check, Check::Command(c) if c == name))
}

/// Fail fast on missing privileges or tools for pending steps.
///
/// - apt steps need root, or passwordless `sudo` when `use_sudo` is set
/// - script steps need `curl`, npm steps `npm`, cargo steps `cargo`
pub fn run_preflight(plan: &[PlannedStep], shell: &mut dyn Shell, use_sudo: bool) -> Result<()> {
    for (index, planned) in plan.iter().enumerate() {
        if !planned.pending {
            continue;
        }
        let required = match planned.step.method {
            Method::Script { .. } => Some("curl"),
            Method::Npm { .. } => Some("npm"),
            Method::Cargo { .. } => Some("cargo"),
            Method::Apt { .. } | Method::Template { .. } => None,
        };
        if let Some(name) = required {
            if !available_before(plan, index, name, shell) {
                return Err(Error::CommandMissing(format!(
                    "{name} (needed by '{}')",
                    planned.step.name
                )));
            }
        }
    }

    let needs_apt = plan
        .iter()
        .any(|p| p.pending && matches!(p.step.method, Method::Apt { .. }));
    if needs_apt && !shell.is_root() {
        if !shell.command_exists("apt-get") {
            return Err(Error::UnsupportedPlatform(
                "apt-get not found; the installer targets Debian/Ubuntu".into(),
            ));
        }
        if !use_sudo || !sudo_usable(shell) {
            return Err(Error::PreconditionFailed(
                "root privilege required for apt packages (run as root or configure sudo)".into(),
            ));
        }
    }
    Ok(())
}

/// `sudo -n true` succeeds: sudo exists and will not prompt.
fn sudo_usable(shell: &mut dyn Shell) -> bool {
    if !shell.command_exists("sudo") {
        return false;
    }
    let spec = ToolSpec::new("sudo", vec!["-n".into(), "true".into()]);
    shell.run(&spec).map(|o| o.success()).unwrap_or(false)
}
