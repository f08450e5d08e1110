//! Per-target test reports and terminal outcomes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Counts collected from a JUnit-style report file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestReport {
    /// Target name.
    pub target: String,

    /// Total number of test cases.
    pub tests: u32,

    /// Test cases that failed an assertion.
    pub failed: u32,

    /// Test cases that errored.
    pub errors: u32,

    /// Test cases that were skipped.
    pub skipped: u32,

    /// Location of the report artifact.
    pub report_path: PathBuf,

    /// Whether the report was written by the driver instead of the test
    /// harness (e.g. because the build failed).
    pub synthesized: bool,
}

impl TestReport {
    /// Test cases that passed.
    pub fn passed(&self) -> u32 {
        self.tests
            .saturating_sub(self.failed)
            .saturating_sub(self.errors)
            .saturating_sub(self.skipped)
    }

    /// Failures plus errors; any non-zero value fails the aggregate.
    pub fn fail_count(&self) -> u32 {
        self.failed.saturating_add(self.errors)
    }

    pub fn is_clean(&self) -> bool {
        self.fail_count() == 0
    }
}

/// Terminal state of one target in a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TargetOutcome {
    /// A report exists, whether produced by the harness or synthesized.
    Reported { report: TestReport },

    /// The target ended without a report (infrastructure error).
    Missing { target: String, reason: String },
}

impl TargetOutcome {
    pub fn target(&self) -> &str {
        match self {
            TargetOutcome::Reported { report } => &report.target,
            TargetOutcome::Missing { target, .. } => target,
        }
    }

    pub fn report(&self) -> Option<&TestReport> {
        match self {
            TargetOutcome::Reported { report } => Some(report),
            TargetOutcome::Missing { .. } => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, TargetOutcome::Missing { .. })
    }

    /// A missing report counts as a failure.
    pub fn is_failure(&self) -> bool {
        match self {
            TargetOutcome::Reported { report } => !report.is_clean(),
            TargetOutcome::Missing { .. } => true,
        }
    }
}

impl From<TestReport> for TargetOutcome {
    fn from(report: TestReport) -> Self {
        TargetOutcome::Reported { report }
    }
}
