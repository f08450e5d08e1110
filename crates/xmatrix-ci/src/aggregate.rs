//! Aggregation of per-target reports into one verdict.

use std::path::Path;

use tracing::{debug, info};
use xmatrix_core::{AggregateSummary, TargetEnvironment, TargetOutcome, TestReport};

use crate::junit;

/// Merges per-target outcomes into an `AggregateSummary`.
pub struct ResultAggregator;

impl ResultAggregator {
    /// Summarize the outcomes of a run. Pure: equal inputs give equal output.
    pub fn aggregate(outcomes: Vec<TargetOutcome>) -> AggregateSummary {
        let summary = AggregateSummary::from_outcomes(outcomes);
        info!(
            overall = ?summary.overall,
            targets = summary.targets.len(),
            tests = summary.total_tests,
            failures = summary.total_failures,
            missing = summary.missing,
            "Aggregated results"
        );
        summary
    }

    /// Re-aggregate the reports of an existing output directory.
    ///
    /// Every target is looked up as `<dir>/<name>-results.xml`; a target
    /// without a readable report is counted as missing.
    pub fn aggregate_dir(dir: &Path, targets: &[TargetEnvironment]) -> AggregateSummary {
        let outcomes = targets
            .iter()
            .map(|target| Self::collect(dir, target))
            .collect();
        Self::aggregate(outcomes)
    }

    fn collect(dir: &Path, target: &TargetEnvironment) -> TargetOutcome {
        let report_path = dir.join(target.report_file_name());
        if !report_path.is_file() {
            return TargetOutcome::Missing {
                target: target.name.clone(),
                reason: format!("no report at {}", report_path.display()),
            };
        }

        match junit::parse_file(&report_path) {
            Ok(counts) => {
                debug!(target_name = %target.name, ?counts, "Collected report");
                TargetOutcome::from(TestReport {
                    target: target.name.clone(),
                    tests: counts.tests,
                    failed: counts.failures,
                    errors: counts.errors,
                    skipped: counts.skipped,
                    report_path,
                    synthesized: counts.synthesized,
                })
            }
            Err(message) => TargetOutcome::Missing {
                target: target.name.clone(),
                reason: format!("unreadable report {}: {}", report_path.display(), message),
            },
        }
    }
}
