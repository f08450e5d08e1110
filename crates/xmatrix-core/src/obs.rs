//! Structured observability hooks for matrix run lifecycle events.
//!
//! This module provides:
//! - Run- and target-scoped tracing spans for instrumenting async work
//! - Emission functions for the lifecycle events of a run and its targets
//!
//! Events are emitted at `info!` level, except for missing targets which are
//! reported at `warn!`. Filtering is controlled through `RUST_LOG`.

use tracing::{info, warn, Span};

/// Span tagged with the run_id, to be attached with `Instrument::instrument`.
///
/// # Example
///
/// ```ignore
/// run_matrix().instrument(run_span("3f1c...")).await;
/// // every event inside carries run_id = "3f1c..."
/// ```
pub fn run_span(run_id: &str) -> Span {
    tracing::info_span!("xmatrix.run", run_id = %run_id)
}

/// Span tagged with a target name.
pub fn target_span(target: &str) -> Span {
    tracing::info_span!("xmatrix.target", target_name = %target)
}

/// Emit event: run started over `target_count` targets.
pub fn emit_run_started(run_id: &str, matrix_digest: &str, target_count: usize) {
    info!(
        event = "run.started",
        run_id = %run_id,
        matrix_digest = %matrix_digest,
        targets = target_count,
    );
}

/// Emit event: build step of a target reached a terminal state.
pub fn emit_build_finished(target: &str, exit_code: i32, duration_ms: u64, success: bool) {
    info!(
        event = "target.build_finished",
        target_name = %target,
        exit_code = exit_code,
        duration_ms = duration_ms,
        success = success,
    );
}

/// Emit event: test report collected for a target.
pub fn emit_tests_finished(target: &str, tests: u32, failures: u32, synthesized: bool) {
    info!(
        event = "target.tests_finished",
        target_name = %target,
        tests = tests,
        failures = failures,
        synthesized = synthesized,
    );
}

/// Emit event: target ended without a report (infrastructure error).
pub fn emit_target_missing(target: &str, reason: &dyn std::fmt::Display) {
    warn!(event = "target.missing", target_name = %target, reason = %reason);
}

/// Emit event: run finished with its aggregate verdict.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, passed: bool, missing: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        passed = passed,
        missing = missing,
    );
}

/// Emit event: failure notification handed to a notifier.
pub fn emit_notification_dispatched(channel: &str, recipient: &str) {
    info!(event = "notify.dispatched", channel = %channel, recipient = %recipient);
}
