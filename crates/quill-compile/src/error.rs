//! Compilation errors.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Failure of one compilation.
///
/// Compile errors never abort a render: they become an error fragment for
/// the failing component while the rest of the document renders.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// The tool could not be started.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        /// Program name.
        command: String,
        /// Underlying error.
        source: io::Error,
    },
    /// The tool ran longer than allowed and was killed.
    #[error("`{command}` timed out after {}s", .timeout.as_secs())]
    Timeout {
        /// Program name.
        command: String,
        /// Configured limit.
        timeout: Duration,
    },
    /// The tool exited unsuccessfully.
    #[error("`{command}` failed ({}): {stderr}", .code.map_or_else(|| "killed".to_owned(), |c| format!("exit code {c}")))]
    Failed {
        /// Program name.
        command: String,
        /// Exit code, if the process exited normally.
        code: Option<i32>,
        /// Captured standard error (standard output when stderr is empty).
        stderr: String,
    },
    /// The tool succeeded but its output file is missing.
    #[error("expected output {} was not produced", .0.display())]
    MissingOutput(PathBuf),
    /// The artifact is not valid UTF-8 and cannot be inlined.
    #[error("artifact {0} is not valid UTF-8")]
    InvalidArtifact(String),
    /// I/O error around the tool invocation.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
