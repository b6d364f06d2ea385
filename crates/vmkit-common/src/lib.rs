//! vmkit common types, ids, and errors.
//!
//! This crate provides foundational types shared across vmkit modules:
//! - Common error type with stable codes and remediation hints
//! - Output format selection for command payloads
//! - Run correlation ids

pub mod error;
pub mod id;
pub mod output;

pub use error::{format_error_human, Error, ErrorCategory, Result};
pub use id::RunId;
pub use output::OutputFormat;
