//! vmkit core library
//!
//! Provides the pieces behind the `vmkit` binary:
//! - Installer profiles, modules and steps
//! - Port scanning and listener termination
//! - Host resource snapshots and threshold alerts
//! - Configuration, exit codes, logging
//!
//! The binary entry point is in `main.rs`.

#[cfg(unix)]
pub mod action;
pub mod collect;
pub mod config;
pub mod exit_codes;
pub mod install;
pub mod logging;
pub mod monitor;
#[cfg(unix)]
pub mod ports;
pub mod prompt;
pub mod style;

pub use exit_codes::ExitCode;
