//! Structured event vocabulary for logging.
//!
//! Every event carries the run id and host id from a [`LogContext`] plus
//! the [`Stage`] it was emitted from.

use serde::{Deserialize, Serialize};

/// Command stages that emit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup and configuration.
    Init,
    /// Installer preflight checks.
    Preflight,
    /// Installer step execution.
    Install,
    /// Port listener discovery.
    Scan,
    /// Signal delivery to port holders.
    Kill,
    /// Post-action re-checks.
    Verify,
    /// Resource sampling.
    Monitor,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Preflight => "preflight",
            Stage::Install => "install",
            Stage::Scan => "scan",
            Stage::Kill => "kill",
            Stage::Verify => "verify",
            Stage::Monitor => "monitor",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Run lifecycle
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";

    // Config
    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_DEFAULT_USED: &str = "config.default_used";
    pub const CONFIG_ERROR: &str = "config.error";

    // Installer
    pub const PREFLIGHT_FAILED: &str = "install.preflight_failed";
    pub const MODULE_DECLINED: &str = "install.module_declined";
    pub const STEP_STARTED: &str = "install.step_started";
    pub const STEP_SKIPPED: &str = "install.step_skipped";
    pub const STEP_RESULT: &str = "install.step_result";

    // Port killer
    pub const PORT_SCANNED: &str = "ports.scanned";
    pub const PORT_KILL_ATTEMPTED: &str = "ports.kill_attempted";
    pub const PORT_KILL_RESULT: &str = "ports.kill_result";
    pub const PORT_VERIFIED: &str = "ports.verified";

    // Monitor
    pub const MONITOR_SAMPLED: &str = "monitor.sampled";
    pub const MONITOR_ALERT: &str = "monitor.alert";
    pub const MONITOR_STOPPED: &str = "monitor.stopped";

    // Error events
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// Correlation ids shared by all events of one invocation.
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Unique ID for this invocation.
    pub run_id: String,
    /// Host identifier.
    pub host_id: String,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>, host_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            host_id: host_id.into(),
        }
    }
}
