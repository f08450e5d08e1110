//! xmatrix - multi-target build-and-test driver
//!
//! ## Commands
//!
//! - `run`: build and test every selected target, aggregate, notify on failure
//! - `list`: print the resolved target matrix
//! - `validate`: check a matrix file and print its digest
//! - `aggregate`: re-aggregate the reports of an earlier run

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info, Level};

use xmatrix_ci::pipeline::{exit_code_for, log_summary, EXIT_INFRASTRUCTURE, EXIT_OK};
use xmatrix_ci::{
    EnvironmentSelector, LogNotifier, MatrixConfig, MatrixPipeline, Notifier, ResultAggregator,
    RunOptions, TestFailurePolicy, WebhookNotifier,
};
use xmatrix_core::{matrix_digest, MatrixError, TargetEnvironment};

#[derive(Parser)]
#[command(name = "xmatrix")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build and test a project across a matrix of target environments", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and test the matrix, then aggregate and notify on failure
    Run {
        /// Matrix file (TOML)
        #[arg(short, long, default_value = "xmatrix.toml")]
        config: PathBuf,

        /// Run only these targets (comma-separated)
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,

        /// Output directory for reports and logs (overrides the matrix file)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Maximum number of targets running at once
        #[arg(long)]
        max_parallel: Option<usize>,

        /// Exit non-zero when any target fails its tests
        #[arg(long)]
        gating: bool,

        /// Build identifier used in the failure notification
        #[arg(long, env = "XMATRIX_BUILD_ID")]
        build_id: Option<String>,

        /// Build URL used in the failure notification
        #[arg(long, env = "XMATRIX_BUILD_URL")]
        build_url: Option<String>,

        /// Source tree the commands run in (default: current directory)
        #[arg(long, default_value = ".")]
        workdir: PathBuf,
    },

    /// Print the resolved target matrix
    List {
        /// Matrix file (TOML)
        #[arg(short, long, default_value = "xmatrix.toml")]
        config: PathBuf,
    },

    /// Validate a matrix file and print its digest
    Validate {
        /// Matrix file (TOML)
        #[arg(short, long, default_value = "xmatrix.toml")]
        config: PathBuf,
    },

    /// Re-aggregate the reports of an earlier run
    Aggregate {
        /// Matrix file (TOML)
        #[arg(short, long, default_value = "xmatrix.toml")]
        config: PathBuf,

        /// Directory holding `<target>-results.xml` reports
        #[arg(short, long)]
        dir: PathBuf,

        /// Exit non-zero when any target fails its tests
        #[arg(long)]
        gating: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    xmatrix_core::init_tracing(cli.json, level);

    let outcome = match cli.command {
        Commands::Run {
            config,
            only,
            output_dir,
            max_parallel,
            gating,
            build_id,
            build_url,
            workdir,
        } => {
            let overrides = RunOverrides {
                only,
                output_dir,
                max_parallel,
                gating,
                build_id,
                build_url,
            };
            cmd_run(&config, &workdir, overrides).await
        }
        Commands::List { config } => cmd_list(&config),
        Commands::Validate { config } => cmd_validate(&config),
        Commands::Aggregate {
            config,
            dir,
            gating,
        } => cmd_aggregate(&config, &dir, gating),
    };

    match outcome {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_INFRASTRUCTURE as u8)
        }
    }
}

/// Command-line settings layered over the matrix file.
#[derive(Debug, Default)]
struct RunOverrides {
    only: Vec<String>,
    output_dir: Option<PathBuf>,
    max_parallel: Option<usize>,
    gating: bool,
    build_id: Option<String>,
    build_url: Option<String>,
}

impl RunOverrides {
    fn apply(self, mut opts: RunOptions) -> Result<RunOptions, MatrixError> {
        if let Some(dir) = &self.output_dir {
            opts = opts.with_output_dir(dir);
        }
        if let Some(n) = self.max_parallel {
            opts = opts.with_max_parallel(n)?;
        }
        if self.gating {
            opts = opts.with_policy(TestFailurePolicy::Gating);
        }
        if let Some(id) = self.build_id {
            opts = opts.with_build_id(id);
        }
        if let Some(url) = self.build_url {
            opts = opts.with_build_url(url);
        }
        Ok(opts)
    }
}

fn load_matrix(path: &Path, only: &[String]) -> Result<(MatrixConfig, Vec<TargetEnvironment>)> {
    let config = MatrixConfig::load(path)?;
    let targets = EnvironmentSelector::select(&config, only)
        .with_context(|| format!("Invalid target matrix in {}", path.display()))?;
    Ok((config, targets))
}

fn notifier_for(config: &MatrixConfig) -> Arc<dyn Notifier> {
    match &config.notify.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => Arc::new(LogNotifier),
    }
}

async fn cmd_run(config_path: &Path, workdir: &Path, overrides: RunOverrides) -> Result<i32> {
    let (config, targets) = load_matrix(config_path, &overrides.only)?;
    let workdir = std::fs::canonicalize(workdir)
        .with_context(|| format!("Workdir {} is not accessible", workdir.display()))?;

    let opts = overrides.apply(RunOptions::from_config(&config, &workdir)?)?;
    info!(
        build_id = %opts.build_id,
        targets = targets.len(),
        max_parallel = opts.max_parallel,
        output_dir = %opts.output_dir.display(),
        "Starting matrix run"
    );

    let result = MatrixPipeline::run(targets, &opts, notifier_for(&config))
        .await
        .context("Matrix run aborted")?;

    log_summary(&result);
    println!("Summary written to {}", opts.summary_path().display());
    Ok(result.exit_code(opts.test_failure_policy))
}

#[derive(Serialize)]
struct TargetLine<'a> {
    name: &'a str,
    image: Option<&'a str>,
    cross_target: String,
    triple: Option<&'static str>,
}

fn cmd_list(config_path: &Path) -> Result<i32> {
    let (_, targets) = load_matrix(config_path, &[])?;
    for target in &targets {
        let line = TargetLine {
            name: &target.name,
            image: target.image.as_deref(),
            cross_target: target.cross_target.to_string(),
            triple: target.cross_target.target_triple(),
        };
        println!("{}", serde_json::to_string(&line)?);
    }
    Ok(EXIT_OK)
}

fn cmd_validate(config_path: &Path) -> Result<i32> {
    let (_, targets) = load_matrix(config_path, &[])?;
    println!(
        "{} target(s), matrix digest {}",
        targets.len(),
        matrix_digest(&targets)
    );
    Ok(EXIT_OK)
}

fn cmd_aggregate(config_path: &Path, dir: &Path, gating: bool) -> Result<i32> {
    let (config, targets) = load_matrix(config_path, &[])?;
    let summary = ResultAggregator::aggregate_dir(dir, &targets);
    println!("{}", serde_json::to_string_pretty(&summary)?);

    let policy = if gating {
        TestFailurePolicy::Gating
    } else {
        config.run.test_failure_policy
    };
    Ok(exit_code_for(&summary, policy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use xmatrix_ci::pipeline::EXIT_TESTS_FAILED;

    const MATRIX: &str = r#"
[defaults]
build_command = ["true"]
test_command = ["true"]

[[target]]
name = "py35"

[[target]]
name = "cheri"
cross_target = "cheri128"
"#;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_with_only_list() {
        let cli = Cli::parse_from([
            "xmatrix", "run", "--config", "m.toml", "--only", "py35,cheri", "--gating",
        ]);
        match cli.command {
            Commands::Run {
                config, only, gating, ..
            } => {
                assert_eq!(config, PathBuf::from("m.toml"));
                assert_eq!(only, vec!["py35", "cheri"]);
                assert!(gating);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn overrides_apply_over_config() {
        let opts = RunOptions::local(Path::new("/work"), Path::new("results"));
        let overrides = RunOverrides {
            output_dir: Some(PathBuf::from("elsewhere")),
            max_parallel: Some(2),
            gating: true,
            build_id: Some("42".to_string()),
            ..Default::default()
        };
        let opts = overrides.apply(opts).expect("apply");
        assert_eq!(opts.output_dir, PathBuf::from("/work/elsewhere"));
        assert_eq!(opts.max_parallel, 2);
        assert_eq!(opts.test_failure_policy, TestFailurePolicy::Gating);
        assert_eq!(opts.build_id, "42");
    }

    #[test]
    fn zero_parallelism_is_rejected() {
        let opts = RunOptions::local(Path::new("/work"), Path::new("results"));
        let overrides = RunOverrides {
            max_parallel: Some(0),
            ..Default::default()
        };
        assert!(overrides.apply(opts).is_err());
    }

    #[test]
    fn aggregate_exit_codes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = dir.path().join("xmatrix.toml");
        std::fs::write(&config, MATRIX).expect("write config");

        // no reports yet
        assert_eq!(
            cmd_aggregate(&config, dir.path(), false).expect("aggregate"),
            EXIT_INFRASTRUCTURE
        );

        let clean = r#"<testsuite><testcase name="a"/></testsuite>"#;
        let failing = r#"<testsuite><testcase name="a"><failure/></testcase></testsuite>"#;
        std::fs::write(dir.path().join("py35-results.xml"), clean).expect("write");
        std::fs::write(dir.path().join("cheri-results.xml"), failing).expect("write");

        assert_eq!(cmd_aggregate(&config, dir.path(), false).expect("aggregate"), EXIT_OK);
        assert_eq!(
            cmd_aggregate(&config, dir.path(), true).expect("aggregate"),
            EXIT_TESTS_FAILED
        );
    }

    #[test]
    fn validate_rejects_unknown_cross_target() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = dir.path().join("xmatrix.toml");
        std::fs::write(&config, MATRIX.replace("cheri128", "sparc")).expect("write config");
        assert!(cmd_validate(&config).is_err());
    }
}
