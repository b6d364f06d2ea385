//! Configuration loading and validation for vmkit.
//!
//! This module handles:
//! - Loading `config.toml`
//! - Config resolution order (CLI > env > XDG > defaults)
//! - Semantic validation (threshold ranges, port families)

mod validation;

pub use validation::{
    validate_port_range, validate_settings, ValidationError, MAX_COMMAND_TIMEOUT_SECS,
    MAX_INTERVAL_SECS, MAX_PORT_RANGE,
};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default XDG config directory name.
const CONFIG_DIR_NAME: &str = "vmkit";

/// Config file name inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Environment variable pointing at an explicit config file.
pub const CONFIG_ENV_VAR: &str = "VMKIT_CONFIG";

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Invalid TOML in config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Cannot render config as TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Semantic validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("I/O error reading {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<ConfigError> for vmkit_common::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ValidationError(e) => vmkit_common::Error::InvalidConfig(e.to_string()),
            ConfigError::IoError { source, .. } => vmkit_common::Error::Io(source),
            other => vmkit_common::Error::Config(other.to_string()),
        }
    }
}

/// Resource monitor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorSettings {
    /// CPU usage percent at which the CPU alert fires (inclusive).
    pub cpu_threshold: f64,
    /// Memory usage percent at which the memory alert fires (inclusive).
    pub memory_threshold: f64,
    /// Disk usage percent at which the disk alert fires (inclusive).
    pub disk_threshold: f64,
    /// Seconds between samples in continuous mode.
    pub interval_secs: u64,
    /// Window between the two /proc/stat reads used for CPU usage.
    pub cpu_sample_ms: u64,
    /// Filesystem whose usage is reported.
    pub disk_mount: String,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            cpu_threshold: 80.0,
            memory_threshold: 85.0,
            disk_threshold: 90.0,
            interval_secs: 5,
            cpu_sample_ms: 500,
            disk_mount: "/".to_string(),
        }
    }
}

/// Port killer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PortSettings {
    /// First port of each development server family.
    pub base_ports: Vec<u16>,
    /// Ports per family when `-r` is not given.
    pub default_range: u16,
    /// Grace period between SIGTERM and SIGKILL.
    pub term_grace_ms: u64,
    /// Poll interval while waiting for a process to exit.
    pub poll_interval_ms: u64,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            base_ports: vec![3000, 4000, 5000, 5173, 8000, 8080, 8888],
            default_range: 1,
            term_grace_ms: 2_000,
            poll_interval_ms: 100,
        }
    }
}

/// Installer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstallSettings {
    /// Timeout for a single package manager invocation.
    pub command_timeout_secs: u64,
    /// Prefix apt commands with sudo when not running as root.
    pub use_sudo: bool,
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self {
            command_timeout_secs: 900,
            use_sudo: true,
        }
    }
}

/// Complete vmkit settings as stored in `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub monitor: MonitorSettings,
    pub ports: PortSettings,
    pub install: InstallSettings,
}

impl Settings {
    /// Parse and validate settings from TOML text.
    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        validate_settings(&settings)?;
        Ok(settings)
    }

    /// Render as TOML (used by `vmkit config show`).
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Resolved configuration with provenance information.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub settings: Settings,
    /// File the settings came from (None if using defaults).
    pub source_path: Option<PathBuf>,
    /// Location that was searched for the config file.
    pub config_path: PathBuf,
}

/// Configuration resolution options.
#[derive(Debug, Default)]
pub struct ConfigOptions {
    /// Explicit config file (highest priority). Must exist.
    pub config_path: Option<PathBuf>,
}

/// Load configuration with the standard resolution order.
///
/// Resolution order (highest to lowest priority):
/// 1. Explicit CLI flag (via ConfigOptions)
/// 2. Environment variable (VMKIT_CONFIG)
/// 3. XDG config home (~/.config/vmkit/config.toml)
/// 4. Built-in defaults
pub fn load_config(options: &ConfigOptions) -> Result<ResolvedConfig, ConfigError> {
    if let Some(path) = &options.config_path {
        let settings = load_settings_from_file(path)?;
        return Ok(ResolvedConfig {
            settings,
            source_path: Some(path.clone()),
            config_path: path.clone(),
        });
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        let path = PathBuf::from(path);
        let settings = load_settings_from_file(&path)?;
        return Ok(ResolvedConfig {
            settings,
            source_path: Some(path.clone()),
            config_path: path,
        });
    }

    let default_path = default_config_path();
    if default_path.exists() {
        let settings = load_settings_from_file(&default_path)?;
        return Ok(ResolvedConfig {
            settings,
            source_path: Some(default_path.clone()),
            config_path: default_path,
        });
    }

    Ok(ResolvedConfig {
        settings: Settings::default(),
        source_path: None,
        config_path: default_path,
    })
}

/// Path of the config file under the XDG config home.
pub fn default_config_path() -> PathBuf {
    let xdg_config = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config")
        });

    xdg_config.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME)
}

/// Read, parse and validate a settings file.
pub fn load_settings_from_file(path: &Path) -> Result<Settings, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;

    Settings::from_toml_str(&content, path)
}
