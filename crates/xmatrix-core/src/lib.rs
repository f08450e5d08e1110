//! xmatrix Core Library
//!
//! Domain model shared by the build driver and its CLI:
//! - Target environments and cross-compilation targets
//! - Build results, test reports and the aggregate summary
//! - Error taxonomy (configuration vs. infrastructure failures)
//! - Tracing setup and structured lifecycle events

pub mod digest;
pub mod domain;
pub mod obs;
pub mod telemetry;

pub use digest::{matrix_digest, summary_digest};

pub use domain::{
    AggregateSummary, BuildResult, BuildStatus, ConfigError, CrossTarget, InfrastructureError,
    MatrixError, OverallStatus, Result, Stage, TargetEnvironment, TargetOutcome, TestReport,
};

pub use obs::{
    emit_build_finished, emit_notification_dispatched, emit_run_finished, emit_run_started,
    emit_target_missing, emit_tests_finished, run_span, target_span,
};
pub use telemetry::init_tracing;

/// xmatrix version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
