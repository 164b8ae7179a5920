//! Recoverable problems and where they are reported.
//!
//! Configuration mistakes, unterminated verbatim tags and failed compilations
//! never abort a render. They become [`Problem`] values handed to a
//! [`DiagnosticSink`] supplied when the pipeline is built.

use std::fmt;
use std::sync::{Mutex, PoisonError};

/// How serious a problem is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Processing continued with a sensible fallback.
    Warning,
    /// Something the user asked for was dropped.
    Error,
}

/// Which stage produced a problem.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProblemKind {
    /// Environment configuration.
    Config,
    /// Escaping (malformed verbatim tags).
    Escape,
    /// External compilation.
    Compile,
}

impl fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Config => "config",
            Self::Escape => "escape",
            Self::Compile => "compile",
        })
    }
}

/// A recoverable problem found while configuring or rendering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Problem {
    /// Severity.
    pub severity: Severity,
    /// Producing stage.
    pub kind: ProblemKind,
    /// Human-readable description.
    pub message: String,
    /// Property path or component id the problem is about.
    pub path: Option<String>,
}

impl Problem {
    /// Create an error-severity problem.
    #[must_use]
    pub fn error(kind: ProblemKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            message: message.into(),
            path: None,
        }
    }

    /// Create a warning-severity problem.
    #[must_use]
    pub fn warning(kind: ProblemKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            kind,
            message: message.into(),
            path: None,
        }
    }

    /// Attach a property path or component id.
    #[must_use]
    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{path}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Destination for recoverable problems.
pub trait DiagnosticSink: Send + Sync {
    /// Report one problem.
    fn report(&self, problem: Problem);
}

/// Forwards problems to `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, problem: Problem) {
        match problem.severity {
            Severity::Warning => tracing::warn!(kind = %problem.kind, "{problem}"),
            Severity::Error => tracing::error!(kind = %problem.kind, "{problem}"),
        }
    }
}

/// Keeps every problem in memory.
///
/// Used by `quill check` to print a report, and by tests.
#[derive(Debug, Default)]
pub struct CollectingSink {
    problems: Mutex<Vec<Problem>>,
}

impl CollectingSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the problems reported so far.
    #[must_use]
    pub fn problems(&self) -> Vec<Problem> {
        self.problems
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether any error-severity problem was reported.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.problems
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|p| p.severity == Severity::Error)
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&self, problem: Problem) {
        self.problems
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(problem);
    }
}
