//! Process control.

#[cfg(unix)]
pub mod signal;

#[cfg(unix)]
pub use signal::{process_exists, send_signal, SignalConfig, SignalRunner, Signaller, Termination};
