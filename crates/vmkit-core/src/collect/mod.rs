//! System state collection.
//!
//! - Tool runner for safe external command execution
//! - TCP socket tables and listener lookup (procfs)
//! - Host resource readers for the monitor (procfs, `df`)
//!
//! The procfs readers compile everywhere but only find data on Linux.

pub mod network;
pub mod system;
pub mod tool_runner;

pub use network::{ConnectionSummary, PortSockets, ProcNet, TcpState};
pub use system::{CpuSample, DiskUsage, LoadAverage, MemInfo, ProcessCounts, SystemReader};
pub use tool_runner::{
    command_exists, ToolConfig, ToolError, ToolOutput, ToolRunner,
    ToolRunnerBuilder, ToolSpec, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_TIMEOUT_SECS,
};
