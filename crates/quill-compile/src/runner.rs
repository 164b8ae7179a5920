//! External tool invocation.
//!
//! The compiler never spawns processes directly: it describes each call as a
//! [`CliInstruction`] and hands it to a [`CommandRunner`]. [`ProcessRunner`]
//! is the real implementation; tests substitute their own.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::CompileError;

/// How often a running child is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One external tool call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CliInstruction {
    /// Program to run.
    pub command: String,
    /// Arguments, already substituted.
    pub args: Vec<String>,
    /// Working directory.
    pub cwd: PathBuf,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
}

/// Captured result of a finished tool call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the process exited successfully.
    pub success: bool,
    /// Exit code; `None` when killed by a signal.
    pub code: Option<i32>,
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

impl CommandOutput {
    /// Turn an unsuccessful exit into [`CompileError::Failed`].
    ///
    /// TeX engines print their errors to stdout, so stdout is reported when
    /// stderr is empty.
    pub fn into_result(self, command: &str) -> Result<Self, CompileError> {
        if self.success {
            return Ok(self);
        }
        let stderr = if self.stderr.trim().is_empty() {
            self.stdout
        } else {
            self.stderr
        };
        Err(CompileError::Failed {
            command: command.to_owned(),
            code: self.code,
            stderr: stderr.trim().to_owned(),
        })
    }
}

/// Runs [`CliInstruction`]s.
pub trait CommandRunner: Send + Sync {
    /// Run `instruction`, killing it after `timeout`.
    ///
    /// A non-zero exit is not an error at this level; see
    /// [`CommandOutput::into_result`].
    fn run(&self, instruction: &CliInstruction, timeout: Duration) -> Result<CommandOutput, CompileError>;
}

/// [`CommandRunner`] backed by [`std::process::Command`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, instruction: &CliInstruction, timeout: Duration) -> Result<CommandOutput, CompileError> {
        tracing::debug!(command = %instruction.command, args = ?instruction.args, "running");

        let mut child = Command::new(&instruction.command)
            .args(&instruction.args)
            .current_dir(&instruction.cwd)
            .envs(instruction.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CompileError::Spawn {
                command: instruction.command.clone(),
                source,
            })?;

        // Pipes are drained on their own threads so a chatty child never
        // blocks on a full buffer while we poll.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                // The drain threads are left detached: a grandchild may still
                // hold the pipes open, and they exit once it closes them.
                if let Err(e) = child.kill() {
                    tracing::debug!(command = %instruction.command, "failed to kill timed out process: {e}");
                }
                if let Err(e) = child.wait() {
                    tracing::debug!(command = %instruction.command, "failed to reap timed out process: {e}");
                }
                return Err(CompileError::Timeout {
                    command: instruction.command.clone(),
                    timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        Ok(CommandOutput {
            success: status.success(),
            code: status.code(),
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        })
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instruction(command: &str, args: &[&str]) -> CliInstruction {
        CliInstruction {
            command: command.to_owned(),
            args: args.iter().map(|s| (*s).to_owned()).collect(),
            cwd: std::env::temp_dir(),
            env: Vec::new(),
        }
    }

    #[test]
    fn test_into_result_success() {
        let output = CommandOutput {
            success: true,
            code: Some(0),
            ..CommandOutput::default()
        };
        assert!(output.into_result("tool").is_ok());
    }

    #[test]
    fn test_into_result_prefers_stderr() {
        let output = CommandOutput {
            success: false,
            code: Some(2),
            stdout: "log".to_owned(),
            stderr: "bad\n".to_owned(),
        };
        let err = output.into_result("tool").unwrap_err();
        assert!(matches!(err, CompileError::Failed { code: Some(2), ref stderr, .. } if stderr == "bad"));
    }

    #[test]
    fn test_into_result_falls_back_to_stdout() {
        let output = CommandOutput {
            success: false,
            code: Some(1),
            stdout: "! Missing $ inserted.".to_owned(),
            stderr: String::new(),
        };
        let err = output.into_result("lualatex").unwrap_err();
        assert!(err.to_string().contains("Missing $ inserted"));
    }

    #[test]
    fn test_spawn_failure() {
        let err = ProcessRunner
            .run(&instruction("quill-no-such-tool", &[]), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, CompileError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_captures_output_and_code() {
        let output = ProcessRunner
            .run(
                &instruction("sh", &["-c", "echo out; echo err >&2; exit 3"]),
                Duration::from_secs(10),
            )
            .unwrap();

        assert!(!output.success);
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_passes_environment() {
        let mut call = instruction("sh", &["-c", "printf %s \"$QUILL_TEST_VALUE\""]);
        call.env.push(("QUILL_TEST_VALUE".to_owned(), "42".to_owned()));

        let output = ProcessRunner.run(&call, Duration::from_secs(10)).unwrap();
        assert_eq!(output.stdout, "42");
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_child() {
        let err = ProcessRunner
            .run(&instruction("sleep", &["5"]), Duration::from_millis(100))
            .unwrap_err();
        assert!(matches!(err, CompileError::Timeout { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_does_not_wait_for_open_pipes() {
        let started = Instant::now();
        let err = ProcessRunner
            .run(
                &instruction("sh", &["-c", "sleep 5 & sleep 5; wait"]),
                Duration::from_millis(100),
            )
            .unwrap_err();

        assert!(matches!(err, CompileError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
