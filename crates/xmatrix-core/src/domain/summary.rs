//! Aggregate verdict over every target of a run.

use serde::{Deserialize, Serialize};

use crate::digest::summary_digest;
use crate::domain::report::TargetOutcome;

/// Overall status of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OverallStatus {
    Passed,
    Failed,
}

/// Combined pass/fail verdict across all targets.
///
/// Carries no timestamps or run ids: building a summary from the same
/// outcomes always yields an equal value, digest included.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AggregateSummary {
    /// Failed if any target failed a test or has no report.
    pub overall: OverallStatus,

    /// Per-target outcomes in matrix order.
    pub targets: Vec<TargetOutcome>,

    /// Total test cases across reported targets.
    pub total_tests: u32,

    /// Total failures plus errors across reported targets.
    pub total_failures: u32,

    /// Targets that ended without a report.
    pub missing: u32,

    /// SHA-256 over target names and report counts.
    pub digest: String,
}

impl AggregateSummary {
    /// Compute the summary from terminal target outcomes.
    pub fn from_outcomes(targets: Vec<TargetOutcome>) -> Self {
        let overall = if targets.iter().any(TargetOutcome::is_failure) {
            OverallStatus::Failed
        } else {
            OverallStatus::Passed
        };
        let total_tests = targets
            .iter()
            .filter_map(|t| t.report())
            .fold(0u32, |acc, r| acc.saturating_add(r.tests));
        let total_failures = targets
            .iter()
            .filter_map(|t| t.report())
            .fold(0u32, |acc, r| acc.saturating_add(r.fail_count()));
        let missing = targets.iter().filter(|t| t.is_missing()).count() as u32;
        let digest = summary_digest(&targets);

        Self {
            overall,
            targets,
            total_tests,
            total_failures,
            missing,
            digest,
        }
    }

    pub fn passed(&self) -> bool {
        self.overall == OverallStatus::Passed
    }

    /// Names of the targets that failed or are missing.
    pub fn failing_targets(&self) -> Vec<&str> {
        self.targets
            .iter()
            .filter(|t| t.is_failure())
            .map(|t| t.target())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::report::TestReport;
    use std::path::PathBuf;

    fn reported(name: &str, tests: u32, failed: u32) -> TargetOutcome {
        TargetOutcome::from(TestReport {
            target: name.to_string(),
            tests,
            failed,
            errors: 0,
            skipped: 0,
            report_path: PathBuf::from(format!("{name}-results.xml")),
            synthesized: false,
        })
    }

    #[test]
    fn test_all_clean_passes() {
        let summary = AggregateSummary::from_outcomes(vec![
            reported("a", 3, 0),
            reported("b", 4, 0),
        ]);
        assert!(summary.passed());
        assert_eq!(summary.total_tests, 7);
        assert_eq!(summary.total_failures, 0);
        assert!(summary.failing_targets().is_empty());
    }

    #[test]
    fn test_any_failure_fails() {
        let summary = AggregateSummary::from_outcomes(vec![
            reported("a", 3, 0),
            reported("b", 4, 2),
        ]);
        assert_eq!(summary.overall, OverallStatus::Failed);
        assert_eq!(summary.total_failures, 2);
        assert_eq!(summary.failing_targets(), vec!["b"]);
    }

    #[test]
    fn test_missing_fails() {
        let summary = AggregateSummary::from_outcomes(vec![
            reported("a", 3, 0),
            TargetOutcome::Missing {
                target: "b".to_string(),
                reason: "spawn failed".to_string(),
            },
        ]);
        assert_eq!(summary.overall, OverallStatus::Failed);
        assert_eq!(summary.missing, 1);
    }

    #[test]
    fn test_empty_outcomes_pass() {
        let summary = AggregateSummary::from_outcomes(Vec::new());
        assert!(summary.passed());
    }

    #[test]
    fn test_summary_is_idempotent() {
        let outcomes = vec![reported("a", 3, 0), reported("b", 4, 1)];
        let first = AggregateSummary::from_outcomes(outcomes.clone());
        let second = AggregateSummary::from_outcomes(outcomes);
        assert_eq!(first, second);
    }

    #[test]
    fn test_totals_saturate() {
        let summary = AggregateSummary::from_outcomes(vec![
            reported("a", u32::MAX, u32::MAX),
            reported("b", 1, 1),
        ]);
        assert_eq!(summary.total_tests, u32::MAX);
        assert_eq!(summary.total_failures, u32::MAX);
        assert_eq!(summary.overall, OverallStatus::Failed);
    }
}
