//! Internal constants for external compilation.

/// Extension of stored artifacts.
pub const ARTIFACT_EXTENSION: &str = "svg";

/// Stem of every file inside a job's work directory.
pub const JOB_STEM: &str = "component";

/// Document class used when neither the environment nor the call site sets one.
pub const DEFAULT_DOCUMENT_CLASS: &str = "standalone";

/// Fingerprint characters used to name a job's work directory.
pub const WORK_DIR_PREFIX_LEN: usize = 16;
