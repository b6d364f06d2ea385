//! Bounded execution of external commands.
//!
//! `df`, `lsof`, `ps`, `apt-get`, `npm`, `cargo` and the curl-piped
//! installers all run through [`ToolRunner`]. A child that outlives its
//! timeout gets SIGTERM, then SIGKILL. Captured output is capped, and by
//! default children see only PATH and a C locale so parsers get stable text.
//!
//! ```ignore
//! let output = ToolRunner::with_defaults().run_tool("df", &["-P", "-k", "/"])?;
//! println!("{}", output.stdout_str());
//! ```

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, instrument, trace, warn};

/// Default timeout per command in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default maximum output size in bytes (4MB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 4 * 1024 * 1024;

/// Grace period between SIGTERM and SIGKILL in milliseconds.
const SIGTERM_GRACE_MS: u64 = 500;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("command failed to spawn: {0}")]
    SpawnFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid command path: {0}")]
    InvalidPath(String),
}

/// What a finished (or timed out) command left behind.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub command: String,
    pub args: Vec<String>,
    /// Capped at the runner's output limit; see `truncated`.
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the child died from a signal.
    pub exit_code: Option<i32>,
    pub truncated: bool,
    pub duration: Duration,
    pub timed_out: bool,
}

impl ToolOutput {
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Exit status 0 within the deadline.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }

    /// Last non-empty line of stderr (or stdout), for one-line failure reports.
    pub fn failure_hint(&self) -> String {
        if self.timed_out {
            return format!("timed out after {:.0?}", self.duration);
        }
        let stderr = self.stderr_str();
        let stdout = self.stdout_str();
        let line = stderr
            .lines()
            .rev()
            .chain(stdout.lines().rev())
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("");
        match self.exit_code {
            Some(code) if line.is_empty() => format!("exit status {code}"),
            Some(code) => format!("exit status {code}: {line}"),
            None => "killed by signal".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub default_timeout: Duration,
    pub max_output_bytes: usize,
    /// Pass the caller's environment through (package managers need HOME,
    /// proxies and the like). When false only PATH and a C locale are set.
    pub inherit_env: bool,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            inherit_env: false,
        }
    }
}

/// One command line plus per-call overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub command: String,
    pub args: Vec<String>,
    /// Set on top of whatever environment the runner provides.
    pub env: Vec<(String, String)>,
    /// Overrides the runner's default when set.
    pub timeout: Option<Duration>,
}

impl ToolSpec {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            env: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Shell-like rendering for dry-run listings and logs.
    pub fn display(&self) -> String {
        let mut parts = vec![self.command.clone()];
        for arg in &self.args {
            if arg.contains(char::is_whitespace) || arg.contains('|') {
                parts.push(format!("'{}'", arg));
            } else {
                parts.push(arg.clone());
            }
        }
        parts.join(" ")
    }
}

/// Output captured from a child, before it is stamped with timing.
struct Captured {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: Option<i32>,
    truncated: bool,
    timed_out: bool,
}

#[derive(Debug)]
pub struct ToolRunner {
    config: ToolConfig,
}

impl ToolRunner {
    pub fn new(config: ToolConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(ToolConfig::default())
    }

    /// Shorthand for [`ToolRunner::run`] with borrowed arguments.
    pub fn run_tool(&self, cmd: &str, args: &[&str]) -> Result<ToolOutput, ToolError> {
        self.run(&ToolSpec::new(cmd, args.iter().map(|s| s.to_string()).collect()))
    }

    #[instrument(skip(self), fields(cmd = %spec.command))]
    pub fn run(&self, spec: &ToolSpec) -> Result<ToolOutput, ToolError> {
        validate_command(&spec.command)?;

        let timeout = spec.timeout.unwrap_or(self.config.default_timeout);
        let max_output = self.config.max_output_bytes;

        debug!(
            command = %spec.command,
            args = ?spec.args,
            timeout_ms = timeout.as_millis() as u64,
            max_output,
            "running tool"
        );

        let start = Instant::now();
        let mut command = self.build_command(spec);

        let mut child = match command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ToolError::CommandNotFound(spec.command.clone()));
            }
            Err(e) => {
                error!(command = %spec.command, error = %e, "failed to spawn");
                return Err(ToolError::SpawnFailed(e.to_string()));
            }
        };

        let captured = capture_with_deadline(&mut child, timeout, max_output);
        let duration = start.elapsed();

        let captured = captured.map_err(|e| {
            warn!(command = %spec.command, error = %e, "tool execution failed");
            e
        })?;
        debug!(
            command = %spec.command,
            duration_ms = duration.as_millis() as u64,
            exit_code = ?captured.exit_code,
            timed_out = captured.timed_out,
            "tool finished"
        );

        Ok(ToolOutput {
            command: spec.command.clone(),
            args: spec.args.clone(),
            stdout: captured.stdout,
            stderr: captured.stderr,
            exit_code: captured.exit_code,
            truncated: captured.truncated,
            duration,
            timed_out: captured.timed_out,
        })
    }

    fn build_command(&self, spec: &ToolSpec) -> Command {
        let mut command = Command::new(&spec.command);
        command.args(&spec.args);

        if !self.config.inherit_env {
            command.env_clear();
            if let Ok(path) = std::env::var("PATH") {
                command.env("PATH", path);
            }
            command.env("LC_ALL", "C");
            command.env("LANG", "C");
        }

        for (key, value) in &spec.env {
            command.env(key, value);
        }

        // Own process group, so a timeout also reaches pipelines like `curl | sh`.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        command
    }
}

/// Reject empty names, shell metacharacters, and absolute paths that do not exist.
fn validate_command(cmd: &str) -> Result<(), ToolError> {
    if cmd.is_empty() || cmd.contains(['|', '&', ';', '$', '`', '\n', '\r', ' ']) {
        return Err(ToolError::InvalidPath(format!(
            "command contains shell metacharacters: {cmd}"
        )));
    }
    if cmd.starts_with('/') && !Path::new(cmd).exists() {
        return Err(ToolError::CommandNotFound(cmd.to_string()));
    }
    Ok(())
}

/// Poll both pipes until the child exits or the deadline passes.
fn capture_with_deadline(
    child: &mut Child,
    timeout: Duration,
    max_output: usize,
) -> Result<Captured, ToolError> {
    // An unrepresentable deadline means no deadline.
    let deadline = Instant::now().checked_add(timeout);
    let mut captured = Captured {
        stdout: Vec::with_capacity(max_output.min(65536)),
        stderr: Vec::with_capacity(max_output.min(65536)),
        exit_code: None,
        truncated: false,
        timed_out: false,
    };
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let mut chunk = vec![0u8; 8192];

    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            captured.timed_out = true;
            warn!("command timed out, sending SIGTERM");
            kill_with_grace(child);
            captured.exit_code = child.wait().ok().and_then(|s| s.code());
            return Ok(captured);
        }

        let Captured {
            stdout: out_buf,
            stderr: err_buf,
            truncated,
            ..
        } = &mut captured;
        let read_out = pump(stdout.as_mut(), &mut chunk, out_buf, max_output, truncated);
        let read_err = pump(stderr.as_mut(), &mut chunk, err_buf, max_output, truncated);

        match child.try_wait() {
            Ok(Some(status)) => {
                if let Some(out) = stdout.as_mut() {
                    let _ = drain_to_limit(out, out_buf, max_output, truncated);
                }
                if let Some(err) = stderr.as_mut() {
                    let _ = drain_to_limit(err, err_buf, max_output, truncated);
                }
                captured.exit_code = status.code();
                trace!(exit_code = ?captured.exit_code, "process exited");
                return Ok(captured);
            }
            Ok(None) if !(read_out || read_err) => thread::sleep(Duration::from_millis(10)),
            Ok(None) => {}
            Err(e) => {
                error!(error = %e, "failed to wait for child");
                return Err(ToolError::Io(e));
            }
        }
    }
}

/// One non-blocking read from `pipe` into `buf`. True when bytes arrived.
fn pump<R: Read + AsFd>(
    pipe: Option<&mut R>,
    chunk: &mut [u8],
    buf: &mut Vec<u8>,
    max: usize,
    truncated: &mut bool,
) -> bool {
    match pipe.map(|p| try_read_nonblocking(p, chunk)) {
        Some(Ok(n)) if n > 0 => {
            append_capped(buf, &chunk[..n], max, truncated);
            true
        }
        _ => false,
    }
}

fn append_capped(buf: &mut Vec<u8>, data: &[u8], max: usize, truncated: &mut bool) {
    let space = max.saturating_sub(buf.len());
    if space > 0 {
        let to_copy = data.len().min(space);
        buf.extend_from_slice(&data[..to_copy]);
        if data.len() > space {
            *truncated = true;
        }
    } else {
        *truncated = true;
    }
}

/// Drain remaining data from a stream up to the limit.
///
/// Uses non-blocking reads so a grandchild still holding the pipe open
/// cannot hang us after the direct child exits.
fn drain_to_limit<R: Read + AsFd>(
    stream: &mut R,
    buf: &mut Vec<u8>,
    max: usize,
    truncated: &mut bool,
) -> std::io::Result<()> {
    let mut chunk = vec![0u8; 8192];
    loop {
        if *truncated {
            break;
        }
        match try_read_nonblocking(stream, &mut chunk) {
            Ok(0) => break,
            Ok(n) => append_capped(buf, &chunk[..n], max, truncated),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// SIGTERM the child's process group, then SIGKILL it after a grace period.
///
/// The group id equals the child pid (see `build_command`). Survivors in
/// the group are killed even when the direct child already exited.
#[cfg(unix)]
fn kill_with_grace(child: &mut Child) {
    let pid = child.id() as i32;

    unsafe {
        libc::kill(-pid, libc::SIGTERM);
    }
    debug!(pid, "sent SIGTERM to process group");

    thread::sleep(Duration::from_millis(SIGTERM_GRACE_MS));

    match child.try_wait() {
        Ok(Some(_)) => trace!(pid, "process exited after SIGTERM"),
        Ok(None) => warn!(pid, "process did not exit after SIGTERM, sending SIGKILL"),
        Err(e) => error!(pid, error = %e, "failed to check process status"),
    }
    // ESRCH here just means the whole group is gone.
    unsafe {
        libc::kill(-pid, libc::SIGKILL);
    }
    let _ = child.wait();
}

#[cfg(not(unix))]
fn kill_with_grace(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
use std::os::unix::io::AsRawFd as AsFd;

#[cfg(not(unix))]
trait AsFd {}
#[cfg(not(unix))]
impl<T> AsFd for T {}

/// Try to read from a stream without blocking.
///
/// Sets O_NONBLOCK on the descriptor for the duration of the read.
/// Returns Ok(0) if no data is available (EAGAIN/EWOULDBLOCK).
#[cfg(unix)]
fn try_read_nonblocking<R: Read + AsFd>(stream: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let fd = stream.as_raw_fd();

    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }

    let was_nonblocking = (flags & libc::O_NONBLOCK) != 0;
    if !was_nonblocking {
        let result = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        if result < 0 {
            return Err(std::io::Error::last_os_error());
        }
    }

    let result = stream.read(buf);

    if !was_nonblocking {
        unsafe {
            libc::fcntl(fd, libc::F_SETFL, flags);
        }
    }

    match result {
        Ok(n) => Ok(n),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn try_read_nonblocking<R: Read>(stream: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    stream.read(buf)
}

/// Builder for creating a tool runner with custom configuration.
#[derive(Debug, Default)]
pub struct ToolRunnerBuilder {
    config: ToolConfig,
}

impl ToolRunnerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout = timeout;
        self
    }

    /// Set the maximum output size.
    pub fn max_output(mut self, max_bytes: usize) -> Self {
        self.config.max_output_bytes = max_bytes;
        self
    }

    /// Pass the caller's environment to children.
    pub fn inherit_env(mut self, enable: bool) -> Self {
        self.config.inherit_env = enable;
        self
    }

    pub fn build(self) -> ToolRunner {
        ToolRunner::new(self.config)
    }
}

/// Whether `name` resolves to an executable, like `command -v`.
pub fn command_exists(name: &str) -> bool {
    which::which(name).is_ok()
}
