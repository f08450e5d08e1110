//! Test suite execution and report collection.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use xmatrix_core::{BuildResult, InfrastructureError, Stage, TargetEnvironment, TestReport};

use crate::config::RunOptions;
use crate::junit;
use crate::launcher::Launcher;
use crate::runner::StageRunner;

/// Runs a target's test suite and turns its JUnit output into a `TestReport`.
pub struct TestRunnerAdapter;

impl TestRunnerAdapter {
    /// Run the tests for a built target.
    ///
    /// The test command's exit code is ignored: failing tests are read from
    /// the report. Only a harness crash (no readable report, spawn failure,
    /// timeout) is an error. When the build failed, tests are not run and a
    /// single-failure report is written in their place.
    ///
    /// On error, whatever the harness left at the report path is moved to
    /// `<name>-results.xml.partial`, so the directory never holds a report
    /// for a target recorded as missing.
    pub async fn run(
        launcher: &Launcher,
        opts: &RunOptions,
        target: &TargetEnvironment,
        build: &BuildResult,
    ) -> Result<TestReport, InfrastructureError> {
        let result = Self::collect(launcher, opts, target, build).await;
        if result.is_err() {
            discard_report(&opts.report_path(target)).await;
        }
        result
    }

    async fn collect(
        launcher: &Launcher,
        opts: &RunOptions,
        target: &TargetEnvironment,
        build: &BuildResult,
    ) -> Result<TestReport, InfrastructureError> {
        let report_path = opts.report_path(target);
        let io_err = |e: std::io::Error| InfrastructureError::Io {
            target: target.name.clone(),
            message: e.to_string(),
        };

        if !build.succeeded() {
            return Self::synthesize_build_failure(target, build, &report_path).await;
        }

        // a report left over from an earlier run must not be mistaken for this one
        match tokio::fs::remove_file(&report_path).await {
            Ok(()) => debug!(path = ?report_path, "Removed stale report"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(e)),
        }

        let output = StageRunner::execute(launcher, target, Stage::Test).await?;
        tokio::fs::write(opts.test_log_path(target), output.combined_log())
            .await
            .map_err(io_err)?;

        if !output.success() {
            info!(
                target_name = %target.name,
                exit_code = output.exit_code,
                "Test command exited non-zero, collecting report"
            );
        }

        let xml = match tokio::fs::read_to_string(&report_path).await {
            Ok(xml) => xml,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(InfrastructureError::ReportMissing {
                    target: target.name.clone(),
                    path: report_path,
                });
            }
            Err(e) => return Err(io_err(e)),
        };

        let counts = junit::parse_str(&xml).map_err(|message| InfrastructureError::ReportMalformed {
            target: target.name.clone(),
            path: report_path.clone(),
            message,
        })?;

        Ok(TestReport {
            target: target.name.clone(),
            tests: counts.tests,
            failed: counts.failures,
            errors: counts.errors,
            skipped: counts.skipped,
            report_path,
            synthesized: false,
        })
    }

    /// Write the report standing in for the tests of a target whose build failed.
    async fn synthesize_build_failure(
        target: &TargetEnvironment,
        build: &BuildResult,
        report_path: &Path,
    ) -> Result<TestReport, InfrastructureError> {
        let message = format!("build exited with code {}", build.exit_code);
        let details = format!("see build log {}", build.log_path.display());
        let xml = junit::render_failure(&target.name, "build", &message, &details);
        tokio::fs::write(report_path, xml)
            .await
            .map_err(|e| InfrastructureError::Io {
                target: target.name.clone(),
                message: e.to_string(),
            })?;

        Ok(TestReport {
            target: target.name.clone(),
            tests: 1,
            failed: 1,
            errors: 0,
            skipped: 0,
            report_path: report_path.to_path_buf(),
            synthesized: true,
        })
    }
}

/// Path a discarded report is moved to.
pub fn partial_report_path(report_path: &Path) -> PathBuf {
    let mut name = report_path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

/// Move a report that must not be counted out of the way.
pub async fn discard_report(report_path: &Path) {
    let partial = partial_report_path(report_path);
    match tokio::fs::rename(report_path, &partial).await {
        Ok(()) => warn!(path = ?partial, "Discarded report of a target without a result"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            warn!(path = ?report_path, error = %e, "Failed to discard report");
            if let Err(e) = tokio::fs::remove_file(report_path).await {
                warn!(path = ?report_path, error = %e, "Failed to remove report");
            }
        }
    }
}
