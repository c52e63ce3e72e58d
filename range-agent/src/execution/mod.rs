//! External command execution for the network backends
//!
//! Every backend mutates the system through external tools (netsh, nmcli,
//! netplan, uci, systemctl...). They all go through `CommandRunner` so that:
//! - each invocation is bounded by a time limit and killed on expiry
//! - tests can record and interpret invocations instead of running them

use process_control::{ChildExt, Control};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::debug;

#[cfg(test)]
pub mod fake;

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },
    #[error("{command} failed: {output}")]
    Failed { command: String, output: String },
}

/// Captured result of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self { success: true, stdout: stdout.into(), stderr: String::new() }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self { success: false, stdout: String::new(), stderr: stderr.into() }
    }

    /// stdout and stderr joined, the way the tools print them on a terminal.
    pub fn combined(&self) -> String {
        match (self.stdout.trim(), self.stderr.trim()) {
            (out, "") => out.to_string(),
            ("", err) => err.to_string(),
            (out, err) => format!("{out}\n{err}"),
        }
    }
}

pub trait CommandRunner {
    /// Runs to completion (or time limit) and captures output. A non-zero
    /// exit is reported through `CommandOutput::success`, not as an error.
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ExecError>;

    /// Starts the program without waiting for it (reboot and friends).
    fn spawn_detached(&self, program: &str, args: &[&str]) -> Result<(), ExecError>;

    /// Like `run`, but a non-zero exit is an error carrying the tool's output.
    fn run_checked(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ExecError> {
        let output = self.run(program, args)?;
        if output.success {
            Ok(output)
        } else {
            Err(ExecError::Failed {
                command: display_command(program, args),
                output: output.combined(),
            })
        }
    }

    /// True when the program exits successfully; spawn failures count as false.
    fn succeeds(&self, program: &str, args: &[&str]) -> bool {
        matches!(self.run(program, args), Ok(output) if output.success)
    }
}

pub fn display_command(program: &str, args: &[&str]) -> String {
    std::iter::once(program).chain(args.iter().copied()).collect::<Vec<_>>().join(" ")
}

/// Runs real processes with a per-call time limit.
pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ExecError> {
        debug!("exec: {}", display_command(program, args));

        let spawn_error = |source| ExecError::Spawn { program: program.to_string(), source };
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        let output = child
            .controlled_with_output()
            .time_limit(self.timeout)
            .terminate_for_timeout()
            .wait()
            .map_err(spawn_error)?
            .ok_or_else(|| ExecError::Timeout { program: program.to_string(), timeout: self.timeout })?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn spawn_detached(&self, program: &str, args: &[&str]) -> Result<(), ExecError> {
        debug!("spawn: {}", display_command(program, args));
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(drop)
            .map_err(|source| ExecError::Spawn { program: program.to_string(), source })
    }
}

/// `which` / `where` lookup, as used for capability probing.
pub fn command_exists(runner: &dyn CommandRunner, command: &str) -> bool {
    if cfg!(target_os = "windows") {
        runner.succeeds("where", &[command])
    } else {
        runner.succeeds("which", &[command])
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_output_and_status() {
        let runner = SystemRunner::new(Duration::from_secs(5));
        let out = runner.run("sh", &["-c", "echo hello; echo oops >&2; exit 3"]).unwrap();
        assert!(!out.success);
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.combined(), "hello\noops");

        let err = runner.run_checked("sh", &["-c", "exit 1"]).unwrap_err();
        assert!(matches!(err, ExecError::Failed { .. }));
    }

    #[test]
    fn kills_on_time_limit() {
        let runner = SystemRunner::new(Duration::from_millis(200));
        let err = runner.run("sleep", &["10"]).unwrap_err();
        assert!(matches!(err, ExecError::Timeout { .. }));
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let runner = SystemRunner::new(Duration::from_secs(1));
        let err = runner.run("definitely-not-a-real-tool-42", &[]).unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
        assert!(!runner.succeeds("definitely-not-a-real-tool-42", &[]));
    }
}
