//! How much vmkit logs, and in which shape.
//!
//! Precedence, highest first: `-q`/`-v` flags, `VMKIT_LOG`, `RUST_LOG`
//! (applied as a raw filter in [`super::init_logging`]), then `warn`.
//! `VMKIT_LOG_FORMAT=json` switches stderr to JSON lines.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing_subscriber::filter::LevelFilter;

/// Shape of the log lines written to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Human,
    /// One JSON object per event, for piping into collectors.
    Jsonl,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" | "text" => Ok(LogFormat::Human),
            "json" | "jsonl" => Ok(LogFormat::Jsonl),
            other => Err(format!("unknown log format '{other}' (expected human or json)")),
        }
    }
}

/// Minimum level that reaches stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    /// Status lines are printed by the commands themselves, so logs stay quiet by default.
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Level selected by the global `-q` and repeated `-v` flags.
    /// `None` leaves the choice to the environment.
    pub fn from_flags(quiet: bool, verbose: u8) -> Option<Self> {
        if quiet {
            return Some(LogLevel::Error);
        }
        match verbose {
            0 => None,
            1 => Some(LogLevel::Info),
            2 => Some(LogLevel::Debug),
            _ => Some(LogLevel::Trace),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let level = match s.trim().to_ascii_lowercase().as_str() {
            "off" | "quiet" => LogLevel::Off,
            "error" => LogLevel::Error,
            "warn" | "warning" => LogLevel::Warn,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            other => return Err(format!("unknown log level '{other}'")),
        };
        Ok(level)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// Drop timestamps from human lines; set when stderr is not a terminal
    /// so captured output stays diffable.
    pub plain: bool,
}

impl LogConfig {
    /// Resolve from the environment, then let the CLI flag win.
    pub fn resolve(cli_level: Option<LogLevel>) -> Self {
        Self::resolve_with(cli_level, |key| std::env::var(key).ok())
    }

    fn resolve_with(cli_level: Option<LogLevel>, env: impl Fn(&str) -> Option<String>) -> Self {
        let env_level = env("VMKIT_LOG").and_then(|v| v.parse::<LogLevel>().ok());
        let format = env("VMKIT_LOG_FORMAT")
            .and_then(|v| v.parse::<LogFormat>().ok())
            .unwrap_or_default();
        LogConfig {
            format,
            level: cli_level.or(env_level).unwrap_or_default(),
            plain: false,
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn plain(mut self, plain: bool) -> Self {
        self.plain = plain;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn flags_map_to_levels() {
        assert_eq!(LogLevel::from_flags(false, 0), None);
        assert_eq!(LogLevel::from_flags(false, 1), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_flags(false, 2), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_flags(false, 9), Some(LogLevel::Trace));
        assert_eq!(LogLevel::from_flags(true, 3), Some(LogLevel::Error));
    }

    #[test]
    fn defaults_to_warn_human() {
        let config = LogConfig::resolve_with(None, env_of(&[]));
        assert_eq!(config.level, LogLevel::Warn);
        assert_eq!(config.format, LogFormat::Human);
    }

    #[test]
    fn env_sets_level_and_format() {
        let config = LogConfig::resolve_with(
            None,
            env_of(&[("VMKIT_LOG", "debug"), ("VMKIT_LOG_FORMAT", "json")]),
        );
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Jsonl);
    }

    #[test]
    fn cli_flag_beats_env() {
        let config = LogConfig::resolve_with(
            Some(LogLevel::Error),
            env_of(&[("VMKIT_LOG", "trace")]),
        );
        assert_eq!(config.level, LogLevel::Error);
    }

    #[test]
    fn bad_env_values_are_ignored() {
        let config = LogConfig::resolve_with(
            None,
            env_of(&[("VMKIT_LOG", "loud"), ("VMKIT_LOG_FORMAT", "xml")]),
        );
        assert_eq!(config.level, LogLevel::Warn);
        assert_eq!(config.format, LogFormat::Human);
    }

    #[test]
    fn level_display_parses_back() {
        for level in [LogLevel::Off, LogLevel::Warn, LogLevel::Trace] {
            assert_eq!(level.to_string().parse::<LogLevel>(), Ok(level));
        }
    }
}
