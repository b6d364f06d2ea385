//! The installer's view of the host: PATH lookups, privilege, commands.

use crate::collect::tool_runner::{
    command_exists, ToolError, ToolOutput, ToolRunner, ToolRunnerBuilder, ToolSpec,
};
use crate::config::InstallSettings;
use std::time::Duration;

pub trait Shell {
    fn command_exists(&self, name: &str) -> bool;

    /// Effective uid 0.
    fn is_root(&self) -> bool;

    fn run(&mut self, spec: &ToolSpec) -> Result<ToolOutput, ToolError>;
}

/// Runs commands for real, with the caller's environment.
#[derive(Debug)]
pub struct SystemShell {
    runner: ToolRunner,
}

impl SystemShell {
    pub fn new(settings: &InstallSettings) -> Self {
        let runner = ToolRunnerBuilder::new()
            .timeout(Duration::from_secs(settings.command_timeout_secs))
            .inherit_env(true)
            .build();
        Self { runner }
    }
}

impl Shell for SystemShell {
    fn command_exists(&self, name: &str) -> bool {
        command_exists(name)
    }

    #[cfg(unix)]
    fn is_root(&self) -> bool {
        unsafe { libc::geteuid() == 0 }
    }

    #[cfg(not(unix))]
    fn is_root(&self) -> bool {
        false
    }

    fn run(&mut self, spec: &ToolSpec) -> Result<ToolOutput, ToolError> {
        self.runner.run(spec)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashSet;

    /// Records commands instead of running them.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingShell {
        pub present: HashSet<String>,
        pub root: bool,
        pub failing: HashSet<String>,
        pub commands: Vec<String>,
    }

    impl RecordingShell {
        pub fn with_present(mut self, names: &[&str]) -> Self {
            self.present.extend(names.iter().map(|s| s.to_string()));
            self
        }
    }

    impl Shell for RecordingShell {
        fn command_exists(&self, name: &str) -> bool {
            self.present.contains(name)
        }

        fn is_root(&self) -> bool {
            self.root
        }

        fn run(&mut self, spec: &ToolSpec) -> Result<ToolOutput, ToolError> {
            let line = spec.display();
            self.commands.push(line.clone());
            let failed = self.failing.iter().any(|f| line.contains(f.as_str()));
            Ok(ToolOutput {
                command: spec.command.clone(),
                args: spec.args.clone(),
                stdout: Vec::new(),
                stderr: if failed {
                    b"E: Unable to locate package\n".to_vec()
                } else {
                    Vec::new()
                },
                exit_code: Some(if failed { 100 } else { 0 }),
                truncated: false,
                duration: Duration::from_millis(1),
                timed_out: false,
            })
        }
    }

    #[test]
    fn system_shell_finds_sh() {
        let shell = SystemShell::new(&InstallSettings::default());
        assert!(shell.command_exists("sh"));
        assert!(!shell.command_exists("vmkit-no-such-binary"));
    }
}
