//! Error types for vmkit.
//!
//! Errors carry:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Recoverability hints
//! - Remediation suggestions for humans
//!
//! # Human-Facing Output
//!
//! ```text
//! ✗ Root Privilege Required
//!   Reason: precondition failed: apt packages need root or sudo
//!   Fix: Re-run with 'sudo vmkit install ...' or install sudo.
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for vmkit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration file errors.
    Config,
    /// Reading system state (/proc, df, lsof).
    Collection,
    /// Signal delivery and process control.
    Action,
    /// File I/O and serialization errors.
    Io,
    /// Platform compatibility and missing tools.
    Platform,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Collection => write!(f, "collection"),
            ErrorCategory::Action => write!(f, "action"),
            ErrorCategory::Io => write!(f, "io"),
            ErrorCategory::Platform => write!(f, "platform"),
        }
    }
}

/// Unified error type for vmkit.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // Preconditions (15-19)
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("required command not found: {0}")]
    CommandMissing(String),

    // Collection errors (20-29)
    #[error("system collection failed: {0}")]
    Collection(String),

    #[error("process {pid} not found")]
    ProcessNotFound { pid: u32 },

    #[error("permission denied signalling process {pid}")]
    PermissionDenied { pid: u32 },

    // Action errors (40-49)
    #[error("signal delivery failed: {0}")]
    SignalFailed(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Platform errors (70-79)
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

impl Error {
    /// Returns the stable error code for this error type.
    ///
    /// - 10-19: Configuration and preconditions
    /// - 20-29: Collection errors
    /// - 40-49: Action errors
    /// - 60-69: I/O errors
    /// - 70-79: Platform errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidConfig(_) => 11,
            Error::PreconditionFailed(_) => 15,
            Error::CommandMissing(_) => 16,
            Error::Collection(_) => 20,
            Error::ProcessNotFound { .. } => 21,
            Error::PermissionDenied { .. } => 23,
            Error::SignalFailed(_) => 40,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
            Error::UnsupportedPlatform(_) => 70,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::InvalidConfig(_) => ErrorCategory::Config,

            Error::Collection(_) | Error::ProcessNotFound { .. } => ErrorCategory::Collection,

            Error::PermissionDenied { .. } | Error::SignalFailed(_) => ErrorCategory::Action,

            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,

            Error::PreconditionFailed(_)
            | Error::CommandMissing(_)
            | Error::UnsupportedPlatform(_) => ErrorCategory::Platform,
        }
    }

    /// Whether the failure should abort the whole invocation.
    ///
    /// Per-item failures (one package, one PID) are not fatal; the caller
    /// records them and moves on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::PreconditionFailed(_)
                | Error::CommandMissing(_)
                | Error::UnsupportedPlatform(_)
                | Error::InvalidConfig(_)
                | Error::Config(_)
        )
    }

    /// Returns whether this error is potentially recoverable by retrying
    /// or by user action.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Config(_) | Error::InvalidConfig(_) => true,
            Error::PreconditionFailed(_) => true,
            Error::CommandMissing(_) => true,
            Error::Collection(_) => true,
            Error::ProcessNotFound { .. } => false,
            Error::PermissionDenied { .. } => true,
            Error::SignalFailed(_) => true,
            Error::Io(_) => true,
            Error::Json(_) => true,
            Error::UnsupportedPlatform(_) => false,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) => {
                "Run 'vmkit config validate' and check the syntax of config.toml."
            }
            Error::InvalidConfig(_) => {
                "Fix the reported value in config.toml or delete the file to use defaults."
            }
            Error::PreconditionFailed(_) => {
                "Re-run with 'sudo vmkit ...' or install the missing prerequisite first."
            }
            Error::CommandMissing(_) => {
                "Install the missing command (e.g. 'apt-get install lsof') and retry."
            }
            Error::Collection(_) => {
                "Retry. If persistent, check that /proc is mounted and readable."
            }
            Error::ProcessNotFound { .. } => {
                "The process exited on its own. Nothing else to do."
            }
            Error::PermissionDenied { .. } => {
                "The process belongs to another user. Re-run with 'sudo vmkit ports'."
            }
            Error::SignalFailed(_) => {
                "Retry. Check whether the process is stuck in uninterruptible sleep (D state)."
            }
            Error::Io(_) => "Check disk space and permissions, then retry.",
            Error::Json(_) => "Invalid JSON. Inspect the file with 'jq .' or restore it.",
            Error::UnsupportedPlatform(_) => {
                "This feature needs Linux (/proc). Run it inside the development VM."
            }
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::InvalidConfig(_) => "Invalid Configuration",
            Error::PreconditionFailed(_) => "Precondition Failed",
            Error::CommandMissing(_) => "Required Command Missing",
            Error::Collection(_) => "Collection Error",
            Error::ProcessNotFound { .. } => "Process Not Found",
            Error::PermissionDenied { .. } => "Permission Denied",
            Error::SignalFailed(_) => "Signal Failed",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Error",
            Error::UnsupportedPlatform(_) => "Unsupported Platform",
        }
    }
}

/// Format an error for human-readable stderr output.
///
/// Output format:
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        red = red,
        cyan = cyan,
        reset = reset,
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}
