//! Deterministic digests for matrix identity and summaries.

use sha2::{Digest, Sha256};

use crate::domain::{TargetEnvironment, TargetOutcome};

/// Digest of the ordered matrix: target names, images, cross targets and
/// commands. Two runs of the same matrix file share this digest.
pub fn matrix_digest(targets: &[TargetEnvironment]) -> String {
    let mut hasher = Sha256::new();
    for target in targets {
        hasher.update(target.name.as_bytes());
        hasher.update(b"\0");
        hasher.update(target.image.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"\0");
        hasher.update(target.cross_target.build_suffix().as_bytes());
        hasher.update(b"\0");
        for arg in target.build_command.iter().chain(&target.test_command) {
            hasher.update(arg.as_bytes());
            hasher.update(b"\x1f");
        }
        hasher.update(b"\x1e");
    }
    hex::encode(hasher.finalize())
}

/// Digest of a list of target outcomes.
///
/// Covers target names, report counts and the synthesized flag. Report
/// locations and missing reasons are left out so that a results directory
/// re-aggregated from another path, or after being moved, keeps its digest.
pub fn summary_digest(outcomes: &[TargetOutcome]) -> String {
    let mut hasher = Sha256::new();
    for outcome in outcomes {
        hasher.update(outcome.target().as_bytes());
        hasher.update(b"\0");
        match outcome.report() {
            Some(report) => {
                hasher.update(b"reported\0");
                for n in [report.tests, report.failed, report.errors, report.skipped] {
                    hasher.update(n.to_le_bytes());
                }
                hasher.update([u8::from(report.synthesized)]);
            }
            None => hasher.update(b"missing\0"),
        }
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TestReport;
    use std::path::PathBuf;

    fn reported(path: &str, failed: u32) -> TargetOutcome {
        TargetOutcome::from(TestReport {
            target: "py35".to_string(),
            tests: 4,
            failed,
            errors: 0,
            skipped: 0,
            report_path: PathBuf::from(path),
            synthesized: false,
        })
    }

    fn target(name: &str) -> TargetEnvironment {
        TargetEnvironment::new(name, vec!["make".into()], vec!["pytest".into()])
    }

    #[test]
    fn test_matrix_digest_deterministic() {
        let a = matrix_digest(&[target("py35"), target("py36")]);
        let b = matrix_digest(&[target("py35"), target("py36")]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_matrix_digest_order_sensitive() {
        let a = matrix_digest(&[target("py35"), target("py36")]);
        let b = matrix_digest(&[target("py36"), target("py35")]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_matrix_digest_covers_image() {
        let a = matrix_digest(&[target("py35")]);
        let b = matrix_digest(&[target("py35").with_image("python:3.5")]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_summary_digest_ignores_report_location() {
        let absolute = summary_digest(&[reported("/ci/work/results/py35-results.xml", 0)]);
        let relative = summary_digest(&[reported("results/py35-results.xml", 0)]);
        assert_eq!(absolute, relative);
    }

    #[test]
    fn test_summary_digest_covers_counts_and_missing() {
        let clean = summary_digest(&[reported("r.xml", 0)]);
        let failing = summary_digest(&[reported("r.xml", 1)]);
        let missing = summary_digest(&[TargetOutcome::Missing {
            target: "py35".to_string(),
            reason: "timed out".to_string(),
        }]);
        assert_ne!(clean, failing);
        assert_ne!(clean, missing);
    }
}
