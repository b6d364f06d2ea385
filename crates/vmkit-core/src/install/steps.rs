//! Installation modules and their steps.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How to tell a step is already done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    /// Binary on PATH.
    Command(&'static str),
    /// File under the target home directory.
    Path(&'static str),
}

/// How to perform a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Apt { packages: &'static [&'static str] },
    Npm { package: &'static str },
    /// `curl -fsSL url | sh -s -- args`
    Script {
        url: &'static str,
        args: &'static [&'static str],
    },
    Cargo { crate_name: &'static str },
    /// Static file relative to the home directory. Never overwritten.
    Template {
        path: &'static str,
        contents: &'static str,
    },
}

impl Method {
    pub fn kind(&self) -> &'static str {
        match self {
            Method::Apt { .. } => "apt",
            Method::Npm { .. } => "npm",
            Method::Script { .. } => "script",
            Method::Cargo { .. } => "cargo",
            Method::Template { .. } => "template",
        }
    }

    pub fn is_template(&self) -> bool {
        matches!(self, Method::Template { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: &'static str,
    pub check: Check,
    pub method: Method,
}

impl Step {
    const fn new(name: &'static str, check: Check, method: Method) -> Self {
        Self {
            name,
            check,
            method,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum InstallModule {
    /// Base packages, shell aliases, tmux defaults.
    Core,
    /// Coding agent CLIs and their config.
    Agents,
    /// Modern replacements for classic Unix tools.
    ModernCli,
}

impl InstallModule {
    pub const ALL: [InstallModule; 3] = [
        InstallModule::Core,
        InstallModule::Agents,
        InstallModule::ModernCli,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InstallModule::Core => "core",
            InstallModule::Agents => "agents",
            InstallModule::ModernCli => "modern_cli",
        }
    }

    pub fn steps(&self) -> &'static [Step] {
        match self {
            InstallModule::Core => CORE_STEPS,
            InstallModule::Agents => AGENT_STEPS,
            InstallModule::ModernCli => MODERN_CLI_STEPS,
        }
    }
}

impl fmt::Display for InstallModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named bundle of modules chosen on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// core + agents
    #[default]
    Agent,
    /// core + agents + modern_cli
    Full,
    /// Modules picked with --modules or interactively
    Custom,
}

impl Profile {
    /// Fixed module list; `None` for `custom`.
    pub fn modules(&self) -> Option<Vec<InstallModule>> {
        match self {
            Profile::Agent => Some(vec![InstallModule::Core, InstallModule::Agents]),
            Profile::Full => Some(InstallModule::ALL.to_vec()),
            Profile::Custom => None,
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Profile::Agent => "agent",
            Profile::Full => "full",
            Profile::Custom => "custom",
        })
    }
}

const CORE_STEPS: &[Step] = &[
    Step::new(
        "build-essential",
        Check::Command("gcc"),
        Method::Apt {
            packages: &["build-essential"],
        },
    ),
    Step::new("git", Check::Command("git"), Method::Apt { packages: &["git"] }),
    Step::new("curl", Check::Command("curl"), Method::Apt { packages: &["curl"] }),
    Step::new("wget", Check::Command("wget"), Method::Apt { packages: &["wget"] }),
    Step::new("jq", Check::Command("jq"), Method::Apt { packages: &["jq"] }),
    Step::new("unzip", Check::Command("unzip"), Method::Apt { packages: &["unzip"] }),
    Step::new("htop", Check::Command("htop"), Method::Apt { packages: &["htop"] }),
    Step::new("lsof", Check::Command("lsof"), Method::Apt { packages: &["lsof"] }),
    Step::new("tmux", Check::Command("tmux"), Method::Apt { packages: &["tmux"] }),
    Step::new(
        "bash aliases",
        Check::Path(".bash_aliases"),
        Method::Template {
            path: ".bash_aliases",
            contents: include_str!("../../templates/bash_aliases"),
        },
    ),
    Step::new(
        "tmux config",
        Check::Path(".tmux.conf"),
        Method::Template {
            path: ".tmux.conf",
            contents: include_str!("../../templates/tmux.conf"),
        },
    ),
];

const AGENT_STEPS: &[Step] = &[
    Step::new(
        "claude-code",
        Check::Command("claude"),
        Method::Npm {
            package: "@anthropic-ai/claude-code",
        },
    ),
    Step::new(
        "codex",
        Check::Command("codex"),
        Method::Npm {
            package: "@openai/codex",
        },
    ),
    Step::new(
        "gemini-cli",
        Check::Command("gemini"),
        Method::Npm {
            package: "@google/gemini-cli",
        },
    ),
    Step::new(
        "agent aliases",
        Check::Path(".agent_aliases"),
        Method::Template {
            path: ".agent_aliases",
            contents: include_str!("../../templates/agent_aliases"),
        },
    ),
    Step::new(
        "CLAUDE.md",
        Check::Path(".claude/CLAUDE.md"),
        Method::Template {
            path: ".claude/CLAUDE.md",
            contents: include_str!("../../templates/CLAUDE.md"),
        },
    ),
    Step::new(
        "claude settings",
        Check::Path(".claude/settings.json"),
        Method::Template {
            path: ".claude/settings.json",
            contents: include_str!("../../templates/claude_settings.json"),
        },
    ),
];

const MODERN_CLI_STEPS: &[Step] = &[
    Step::new(
        "ripgrep",
        Check::Command("rg"),
        Method::Apt {
            packages: &["ripgrep"],
        },
    ),
    Step::new(
        "fd",
        Check::Command("fdfind"),
        Method::Apt {
            packages: &["fd-find"],
        },
    ),
    Step::new("bat", Check::Command("batcat"), Method::Apt { packages: &["bat"] }),
    Step::new("fzf", Check::Command("fzf"), Method::Apt { packages: &["fzf"] }),
    Step::new(
        "eza",
        Check::Command("eza"),
        Method::Cargo { crate_name: "eza" },
    ),
    Step::new(
        "delta",
        Check::Command("delta"),
        Method::Cargo {
            crate_name: "git-delta",
        },
    ),
    Step::new(
        "starship",
        Check::Command("starship"),
        Method::Script {
            url: "https://starship.rs/install.sh",
            args: &["-y"],
        },
    ),
    Step::new(
        "starship config",
        Check::Path(".config/starship.toml"),
        Method::Template {
            path: ".config/starship.toml",
            contents: include_str!("../../templates/starship.toml"),
        },
    ),
];
