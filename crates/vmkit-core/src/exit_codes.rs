//! Exit codes for the vmkit CLI.
//!
//! Exit codes communicate operation outcome without requiring output parsing.
//!
//! Exit code ranges:
//! - 0-4: Success/operational outcomes
//! - 10-19: User/environment errors (recoverable by user action)
//! - 20-29: Internal errors (bugs, should be reported)

use vmkit_common::Error;

/// Exit codes for vmkit operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    // ========================================================================
    // Operational Outcomes (0-4)
    // ========================================================================
    /// Success: everything done / nothing to do
    Clean = 0,

    /// Precondition failed (root required, required command missing)
    Failure = 1,

    /// Invalid arguments
    ArgsError = 2,

    /// Partial failure: some steps or ports failed
    PartialFail = 3,

    /// Monitor alert mode found a resource at or over its threshold
    AlertRaised = 4,

    // ========================================================================
    // User / Environment Errors (10-19)
    // ========================================================================
    /// Config file missing, unparsable, or semantically invalid
    ConfigError = 10,

    // ========================================================================
    // Internal Errors (20-29)
    // ========================================================================
    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O error
    IoError = 21,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check if this exit code indicates success.
    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean)
    }

    /// Check if this exit code is an internal error (codes 20-29).
    pub fn is_internal_error(self) -> bool {
        (20..30).contains(&(self as i32))
    }

    /// Get the code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::Failure => "ERR_PRECONDITION",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::PartialFail => "ERR_PARTIAL",
            ExitCode::AlertRaised => "ALERT_RAISED",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }

    /// Map a fatal error onto the exit code reported to the shell.
    pub fn for_error(err: &Error) -> Self {
        match err {
            Error::Config(_) | Error::InvalidConfig(_) => ExitCode::ConfigError,
            Error::PreconditionFailed(_)
            | Error::CommandMissing(_)
            | Error::UnsupportedPlatform(_) => ExitCode::Failure,
            Error::Io(_) => ExitCode::IoError,
            Error::PermissionDenied { .. }
            | Error::SignalFailed(_)
            | Error::ProcessNotFound { .. } => ExitCode::PartialFail,
            Error::Collection(_) | Error::Json(_) => ExitCode::InternalError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_errors_exit_one() {
        let err = Error::PreconditionFailed("root privilege required".into());
        assert_eq!(ExitCode::for_error(&err).as_i32(), 1);
        let err = Error::CommandMissing("curl".into());
        assert_eq!(ExitCode::for_error(&err), ExitCode::Failure);
    }

    #[test]
    fn config_errors_map_to_config_code() {
        let err = Error::InvalidConfig("range".into());
        assert_eq!(ExitCode::for_error(&err), ExitCode::ConfigError);
    }

    #[test]
    fn display_includes_name_and_number() {
        assert_eq!(ExitCode::AlertRaised.to_string(), "ALERT_RAISED (4)");
        assert!(ExitCode::Clean.is_success());
        assert!(!ExitCode::PartialFail.is_success());
        assert!(ExitCode::IoError.is_internal_error());
    }

    #[test]
    fn only_twenties_are_internal() {
        let internal: Vec<ExitCode> = [
            ExitCode::Clean,
            ExitCode::Failure,
            ExitCode::ArgsError,
            ExitCode::PartialFail,
            ExitCode::AlertRaised,
            ExitCode::ConfigError,
            ExitCode::InternalError,
            ExitCode::IoError,
        ]
        .into_iter()
        .filter(|c| c.is_internal_error())
        .collect();
        assert_eq!(internal, vec![ExitCode::InternalError, ExitCode::IoError]);
    }
}
