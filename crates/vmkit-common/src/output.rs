//! Output formats for command payloads.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Supported payload formats for command output on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Colored, multi-line text for terminals
    #[default]
    Human,

    /// Fixed-field JSON object
    Json,

    /// One-line summary for status bars and scripts
    Simple,
}

impl OutputFormat {
    /// Pick the format from the mutually exclusive `--json` / `--simple` flags.
    ///
    /// JSON wins when both are given.
    pub fn from_flags(json: bool, simple: bool) -> Self {
        if json {
            OutputFormat::Json
        } else if simple {
            OutputFormat::Simple
        } else {
            OutputFormat::Human
        }
    }

    /// Whether the payload is meant for machines.
    pub fn is_machine(self) -> bool {
        matches!(self, OutputFormat::Json)
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Human => write!(f, "human"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Simple => write!(f, "simple"),
        }
    }
}
