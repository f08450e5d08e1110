//! Domain models for xmatrix.
//!
//! Canonical definitions for the core entities:
//! - `TargetEnvironment`: one declared cell of the build matrix
//! - `BuildResult`: outcome of the cross-build step
//! - `TestReport`: counts parsed from a JUnit-style report
//! - `AggregateSummary`: verdict across every target of a run

pub mod build;
pub mod error;
pub mod report;
pub mod summary;
pub mod target;

pub use build::{BuildResult, BuildStatus};
pub use error::{ConfigError, InfrastructureError, MatrixError, Result};
pub use report::{TargetOutcome, TestReport};
pub use summary::{AggregateSummary, OverallStatus};
pub use target::{CrossTarget, Stage, TargetEnvironment};
