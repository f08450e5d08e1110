//! Matrix pipeline orchestration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};
use uuid::Uuid;
use xmatrix_core::{
    emit_build_finished, emit_notification_dispatched, emit_run_finished, emit_run_started,
    emit_target_missing, emit_tests_finished, matrix_digest, run_span, target_span,
    AggregateSummary, BuildResult, ConfigError, InfrastructureError, MatrixError, TargetEnvironment,
    TargetOutcome,
};

use crate::aggregate::ResultAggregator;
use crate::build::BuildInvoker;
use crate::config::{RunOptions, TestFailurePolicy};
use crate::launcher::Launcher;
use crate::notify::{NotificationMessage, Notifier};
use crate::test_adapter::{discard_report, TestRunnerAdapter};

/// Exit code for a completed run.
pub const EXIT_OK: i32 = 0;

/// Exit code for an aggregate failure under the gating policy.
pub const EXIT_TESTS_FAILED: i32 = 1;

/// Exit code for configuration or infrastructure failures.
pub const EXIT_INFRASTRUCTURE: i32 = 2;

/// Result of a complete matrix run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Unique id of this run.
    pub run_id: String,

    /// Build identifier from the run options.
    pub build_id: String,

    pub started_at: DateTime<Utc>,

    pub finished_at: DateTime<Utc>,

    /// Total duration in milliseconds.
    pub duration_ms: u64,

    /// Digest of the ordered matrix.
    pub matrix_digest: String,

    /// Build results of targets whose build ran to completion.
    pub builds: Vec<BuildResult>,

    /// Aggregate verdict.
    pub summary: AggregateSummary,

    /// Whether a failure notification was delivered.
    pub notified: bool,
}

impl PipelineResult {
    /// Number of targets with a clean report.
    pub fn passed_count(&self) -> usize {
        self.summary.targets.iter().filter(|t| !t.is_failure()).count()
    }

    /// Number of targets that failed or are missing.
    pub fn failed_count(&self) -> usize {
        self.summary.targets.iter().filter(|t| t.is_failure()).count()
    }

    /// Number of targets without a report.
    pub fn missing_count(&self) -> usize {
        self.summary.missing as usize
    }

    /// Process exit code under `policy`. See [`exit_code_for`].
    pub fn exit_code(&self, policy: TestFailurePolicy) -> i32 {
        exit_code_for(&self.summary, policy)
    }
}

/// Process exit code for a summary under `policy`.
///
/// Missing reports are infrastructure failures and always exit non-zero.
/// Failing tests only do so under the gating policy.
pub fn exit_code_for(summary: &AggregateSummary, policy: TestFailurePolicy) -> i32 {
    if summary.missing > 0 {
        EXIT_INFRASTRUCTURE
    } else if !summary.passed() && policy == TestFailurePolicy::Gating {
        EXIT_TESTS_FAILED
    } else {
        EXIT_OK
    }
}

/// Terminal state of one target task.
struct TargetRun {
    build: Option<BuildResult>,
    outcome: TargetOutcome,
}

impl TargetRun {
    fn missing(error: &InfrastructureError, build: Option<BuildResult>) -> Self {
        emit_target_missing(error.target(), error);
        Self {
            build,
            outcome: TargetOutcome::Missing {
                target: error.target().to_string(),
                reason: error.to_string(),
            },
        }
    }
}

/// Identity of a spawned target task, kept for when the task panics.
struct TargetSlot {
    name: String,
    report_path: PathBuf,
}

/// Matrix orchestrator.
pub struct MatrixPipeline;

impl MatrixPipeline {
    /// Run every target's build and test cycle, aggregate, and notify.
    ///
    /// Targets run concurrently, at most `max_parallel` at a time, and share
    /// no state. Aggregation waits for every target to reach a terminal
    /// state. A target that fails to build or test never stops the others.
    /// Only an unusable output directory aborts the run.
    pub async fn run(
        targets: Vec<TargetEnvironment>,
        opts: &RunOptions,
        notifier: Arc<dyn Notifier>,
    ) -> Result<PipelineResult, MatrixError> {
        if targets.is_empty() {
            return Err(ConfigError::NoTargets.into());
        }

        let run_id = Uuid::new_v4().to_string();
        let span = run_span(&run_id);
        Self::run_inner(run_id, targets, opts, notifier)
            .instrument(span)
            .await
    }

    async fn run_inner(
        run_id: String,
        targets: Vec<TargetEnvironment>,
        opts: &RunOptions,
        notifier: Arc<dyn Notifier>,
    ) -> Result<PipelineResult, MatrixError> {
        let start = Instant::now();
        let started_at = Utc::now();
        let digest = matrix_digest(&targets);

        tokio::fs::create_dir_all(&opts.output_dir).await?;
        emit_run_started(&run_id, &digest, targets.len());

        let launcher = Arc::new(Launcher::new(opts).with_run_id(&run_id));
        let shared_opts = Arc::new(opts.clone());
        let permits = Arc::new(Semaphore::new(opts.max_parallel));

        let mut slots = Vec::with_capacity(targets.len());
        for target in targets {
            let slot = TargetSlot {
                name: target.name.clone(),
                report_path: opts.report_path(&target),
            };
            let launcher = Arc::clone(&launcher);
            let opts = Arc::clone(&shared_opts);
            let permits = Arc::clone(&permits);
            let span = target_span(&slot.name);

            let handle = tokio::spawn(
                async move {
                    // the semaphore is never closed
                    let _permit = permits.acquire_owned().await.ok();
                    Self::run_target(&launcher, &opts, &target).await
                }
                .instrument(span),
            );
            slots.push((slot, handle));
        }

        let (builds, outcomes) = Self::join_targets(slots).await;
        let summary = ResultAggregator::aggregate(outcomes);
        let notified = if summary.passed() {
            false
        } else {
            Self::notify(notifier.as_ref(), &summary, opts).await
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let result = PipelineResult {
            run_id,
            build_id: opts.build_id.clone(),
            started_at,
            finished_at: Utc::now(),
            duration_ms,
            matrix_digest: digest,
            builds,
            summary,
            notified,
        };

        let json = serde_json::to_string_pretty(&result)?;
        tokio::fs::write(opts.summary_path(), json).await?;

        emit_run_finished(
            &result.run_id,
            duration_ms,
            result.summary.passed(),
            result.missing_count(),
        );
        Ok(result)
    }

    /// Join barrier: every target reaches a terminal state before
    /// aggregation. A task that panicked becomes a missing outcome, and any
    /// report it left behind is discarded.
    async fn join_targets(
        slots: Vec<(TargetSlot, JoinHandle<TargetRun>)>,
    ) -> (Vec<BuildResult>, Vec<TargetOutcome>) {
        let (slots, handles): (Vec<_>, Vec<_>) = slots.into_iter().unzip();
        let joined = join_all(handles).await;

        let mut builds = Vec::new();
        let mut outcomes = Vec::with_capacity(joined.len());
        for (slot, joined) in slots.into_iter().zip(joined) {
            let run = match joined {
                Ok(run) => run,
                Err(e) => {
                    discard_report(&slot.report_path).await;
                    TargetRun::missing(
                        &InfrastructureError::TaskAborted {
                            target: slot.name,
                            message: e.to_string(),
                        },
                        None,
                    )
                }
            };
            builds.extend(run.build);
            outcomes.push(run.outcome);
        }
        (builds, outcomes)
    }

    /// Build then test one target. Never fails: errors become a missing outcome.
    async fn run_target(
        launcher: &Launcher,
        opts: &RunOptions,
        target: &TargetEnvironment,
    ) -> TargetRun {
        let report_path = opts.report_path(target);
        if let Err(e) = tokio::fs::remove_file(&report_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                return TargetRun::missing(
                    &InfrastructureError::Io {
                        target: target.name.clone(),
                        message: e.to_string(),
                    },
                    None,
                );
            }
        }

        let build = match BuildInvoker::invoke(launcher, opts, target).await {
            Ok(build) => build,
            Err(e) => return TargetRun::missing(&e, None),
        };
        emit_build_finished(&target.name, build.exit_code, build.duration_ms, build.succeeded());

        match TestRunnerAdapter::run(launcher, opts, target, &build).await {
            Ok(report) => {
                emit_tests_finished(&target.name, report.tests, report.fail_count(), report.synthesized);
                TargetRun {
                    build: Some(build),
                    outcome: TargetOutcome::from(report),
                }
            }
            Err(e) => TargetRun::missing(&e, Some(build)),
        }
    }

    async fn notify(notifier: &dyn Notifier, summary: &AggregateSummary, opts: &RunOptions) -> bool {
        let message = NotificationMessage::for_failure(summary, opts);
        match notifier.notify(&message).await {
            Ok(()) => {
                emit_notification_dispatched(
                    notifier.channel(),
                    message.recipient.as_deref().unwrap_or("unset"),
                );
                true
            }
            Err(e) => {
                warn!(channel = notifier.channel(), error = %e, "Failed to deliver failure notification");
                false
            }
        }
    }
}

/// Log a one-line-per-target digest of a finished run.
pub fn log_summary(result: &PipelineResult) {
    for outcome in &result.summary.targets {
        match outcome {
            TargetOutcome::Reported { report } => info!(
                target_name = %report.target,
                tests = report.tests,
                passed = report.passed(),
                failed = report.failed,
                errors = report.errors,
                skipped = report.skipped,
                synthesized = report.synthesized,
                "Target report"
            ),
            TargetOutcome::Missing { target, reason } => {
                warn!(target_name = %target, %reason, "Target report missing")
            }
        }
    }
    info!(
        overall = ?result.summary.overall,
        passed = result.passed_count(),
        failed = result.failed_count(),
        missing = result.missing_count(),
        "Matrix finished"
    );
}
