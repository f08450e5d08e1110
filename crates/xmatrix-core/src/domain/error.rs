//! Error taxonomy for xmatrix.
//!
//! Configuration errors abort a run before any target starts. Infrastructure
//! errors are scoped to a single target and end up as a missing report in the
//! aggregate summary. Build and test failures are not errors at all: they are
//! recorded in `BuildResult` and `TestReport`.

use std::path::PathBuf;

use crate::domain::target::Stage;

/// Malformed or missing matrix configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read matrix config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse matrix config: {0}")]
    Parse(String),

    #[error("matrix declares no targets")]
    NoTargets,

    #[error("invalid target name {0:?}: use letters, digits, '.', '_' or '-'")]
    InvalidTargetName(String),

    #[error("duplicate target name: {0}")]
    DuplicateTarget(String),

    #[error("target {target} has an empty {stage} command")]
    EmptyCommand { target: String, stage: Stage },

    #[error("unknown target selected: {0}")]
    UnknownTarget(String),

    #[error("invalid cross target {0:?}: expected native, mips, cheri128 or cheri256")]
    InvalidCrossTarget(String),

    #[error("max_parallel must be at least 1")]
    InvalidParallelism,

    #[error("invalid {field} timeout for target {target}: must be greater than zero")]
    InvalidTimeout { target: String, field: Stage },
}

/// Failure of the machinery around a target, not of the code under test.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InfrastructureError {
    #[error("target {target}: failed to launch {stage} command: {message}")]
    Spawn {
        target: String,
        stage: Stage,
        message: String,
    },

    #[error("target {target}: {stage} timed out after {secs} seconds")]
    Timeout {
        target: String,
        stage: Stage,
        secs: u64,
    },

    #[error("target {target}: test harness produced no report at {path:?}")]
    ReportMissing { target: String, path: PathBuf },

    #[error("target {target}: unreadable report {path:?}: {message}")]
    ReportMalformed {
        target: String,
        path: PathBuf,
        message: String,
    },

    #[error("target {target}: io error: {message}")]
    Io { target: String, message: String },

    #[error("target {target}: worker task aborted: {message}")]
    TaskAborted { target: String, message: String },
}

impl InfrastructureError {
    /// Name of the target the error is scoped to.
    pub fn target(&self) -> &str {
        match self {
            InfrastructureError::Spawn { target, .. }
            | InfrastructureError::Timeout { target, .. }
            | InfrastructureError::ReportMissing { target, .. }
            | InfrastructureError::ReportMalformed { target, .. }
            | InfrastructureError::Io { target, .. }
            | InfrastructureError::TaskAborted { target, .. } => target,
        }
    }
}

/// Top-level xmatrix errors.
#[derive(Debug, thiserror::Error)]
pub enum MatrixError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("infrastructure error: {0}")]
    Infrastructure(#[from] InfrastructureError),

    #[error("notification error: {0}")]
    Notify(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for xmatrix operations.
pub type Result<T> = std::result::Result<T, MatrixError>;
