//! Semantic validation for settings that parse but make no sense.

use super::{MonitorSettings, PortSettings, Settings};
use thiserror::Error;

/// Largest family range accepted by `vmkit ports -r`.
pub const MAX_PORT_RANGE: u16 = 20;

/// Upper bound for `monitor.interval_secs` and `--interval` (one day).
pub const MAX_INTERVAL_SECS: u64 = 86_400;

/// Upper bound for `install.command_timeout_secs` (one day).
pub const MAX_COMMAND_TIMEOUT_SECS: u64 = 86_400;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("{field} must be in (0, 100], got {value}")]
    ThresholdOutOfRange { field: &'static str, value: f64 },

    #[error("{field} must be at least {min}, got {value}")]
    TooSmall {
        field: &'static str,
        min: u64,
        value: u64,
    },

    #[error("{field} must be at most {max}, got {value}")]
    TooLarge {
        field: &'static str,
        max: u64,
        value: u64,
    },

    #[error("port range must be between 1 and 20, got {0}")]
    PortRange(u16),

    #[error("base_ports must not be empty")]
    NoBasePorts,

    #[error("base port {0} is invalid (port 0 or family overflows 65535)")]
    BasePort(u16),

    #[error("disk_mount must be an absolute path, got '{0}'")]
    DiskMount(String),
}

impl From<ValidationError> for vmkit_common::Error {
    fn from(err: ValidationError) -> Self {
        vmkit_common::Error::InvalidConfig(err.to_string())
    }
}

/// Validate every section of the settings.
pub fn validate_settings(settings: &Settings) -> Result<(), ValidationError> {
    validate_monitor(&settings.monitor)?;
    validate_ports(&settings.ports)?;
    validate_bounded(
        "install.command_timeout_secs",
        settings.install.command_timeout_secs,
        1,
        MAX_COMMAND_TIMEOUT_SECS,
    )
}

fn validate_bounded(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), ValidationError> {
    if value < min {
        return Err(ValidationError::TooSmall { field, min, value });
    }
    if value > max {
        return Err(ValidationError::TooLarge { field, max, value });
    }
    Ok(())
}

fn validate_threshold(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !(value > 0.0 && value <= 100.0) {
        return Err(ValidationError::ThresholdOutOfRange { field, value });
    }
    Ok(())
}

fn validate_monitor(monitor: &MonitorSettings) -> Result<(), ValidationError> {
    validate_threshold("monitor.cpu_threshold", monitor.cpu_threshold)?;
    validate_threshold("monitor.memory_threshold", monitor.memory_threshold)?;
    validate_threshold("monitor.disk_threshold", monitor.disk_threshold)?;

    validate_bounded("monitor.interval_secs", monitor.interval_secs, 1, MAX_INTERVAL_SECS)?;
    if monitor.cpu_sample_ms < 50 {
        return Err(ValidationError::TooSmall {
            field: "monitor.cpu_sample_ms",
            min: 50,
            value: monitor.cpu_sample_ms,
        });
    }
    if !monitor.disk_mount.starts_with('/') {
        return Err(ValidationError::DiskMount(monitor.disk_mount.clone()));
    }
    Ok(())
}

/// Check a family range given on the command line or in the config.
pub fn validate_port_range(range: u16) -> Result<(), ValidationError> {
    if range == 0 || range > MAX_PORT_RANGE {
        return Err(ValidationError::PortRange(range));
    }
    Ok(())
}

fn validate_ports(ports: &PortSettings) -> Result<(), ValidationError> {
    validate_port_range(ports.default_range)?;

    if ports.base_ports.is_empty() {
        return Err(ValidationError::NoBasePorts);
    }
    for &base in &ports.base_ports {
        let last = base as u32 + MAX_PORT_RANGE as u32 - 1;
        if base == 0 || last > u16::MAX as u32 {
            return Err(ValidationError::BasePort(base));
        }
    }
    if ports.poll_interval_ms == 0 {
        return Err(ValidationError::TooSmall {
            field: "ports.poll_interval_ms",
            min: 1,
            value: 0,
        });
    }
    Ok(())
}
