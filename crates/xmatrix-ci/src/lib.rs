//! xmatrix CI - build matrix execution
//!
//! Provides a matrix orchestrator that:
//! - Selects target environments from a TOML matrix file
//! - Runs the cross-build and test commands per target, in parallel
//! - Collects JUnit reports and aggregates them into one verdict
//! - Notifies on aggregate failure

pub mod aggregate;
pub mod build;
pub mod config;
pub mod junit;
pub mod launcher;
pub mod notify;
pub mod pipeline;
pub mod runner;
pub mod selector;
pub mod test_adapter;

// Re-export key types
pub use aggregate::ResultAggregator;
pub use build::BuildInvoker;
pub use config::{MatrixConfig, RunOptions, TestFailurePolicy};
pub use junit::JunitCounts;
pub use launcher::Launcher;
pub use notify::{LogNotifier, MemoryNotifier, NotificationMessage, Notifier, WebhookNotifier};
pub use pipeline::{MatrixPipeline, PipelineResult};
pub use runner::{ProcessOutput, StageRunner};
pub use selector::EnvironmentSelector;
pub use test_adapter::TestRunnerAdapter;
