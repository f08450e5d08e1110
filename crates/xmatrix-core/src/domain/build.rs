//! Cross-build step results.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Terminal state of a build step that ran to completion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Succeeded,
    Failed,
}

/// Result of running the cross-build command for one target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildResult {
    /// Target name.
    pub target: String,

    /// Build outcome.
    pub status: BuildStatus,

    /// Exit code of the build command (-1 when terminated by a signal).
    pub exit_code: i32,

    /// Combined stdout/stderr log of the build.
    pub log_path: PathBuf,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl BuildResult {
    /// Build a result from the exit code of a finished build command.
    pub fn from_exit(target: impl Into<String>, exit_code: i32, log_path: PathBuf, duration_ms: u64) -> Self {
        let status = if exit_code == 0 {
            BuildStatus::Succeeded
        } else {
            BuildStatus::Failed
        };
        Self {
            target: target.into(),
            status,
            exit_code,
            log_path,
            duration_ms,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == BuildStatus::Succeeded
    }
}
