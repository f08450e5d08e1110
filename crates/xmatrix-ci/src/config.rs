//! Matrix configuration file and resolved run options.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use xmatrix_core::{ConfigError, CrossTarget, TargetEnvironment};

/// Default build timeout in seconds.
pub const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 3600;

/// Default test timeout in seconds.
pub const DEFAULT_TEST_TIMEOUT_SECS: u64 = 1800;

/// What a failing test does to the process exit code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TestFailurePolicy {
    /// Test failures are reported but never change the exit code.
    #[default]
    Informational,

    /// An aggregate failure exits non-zero.
    Gating,
}

/// Top-level matrix file (`xmatrix.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MatrixConfig {
    #[serde(default)]
    pub run: RunSection,

    #[serde(default)]
    pub defaults: DefaultsSection,

    #[serde(default, rename = "target")]
    pub targets: Vec<TargetEntry>,

    #[serde(default)]
    pub notify: NotifySection,
}

/// `[run]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RunSection {
    /// Build identifier used in notifications.
    pub build_id: Option<String>,

    /// Link to the build, included in notification bodies.
    pub build_url: Option<String>,

    /// Where reports, logs and `summary.json` are written.
    pub output_dir: PathBuf,

    /// Maximum number of targets running at once.
    pub max_parallel: usize,

    /// Export `PYTHONDONTWRITEBYTECODE=1` to every command.
    pub disable_bytecode_cache: bool,

    pub test_failure_policy: TestFailurePolicy,

    pub build_timeout_secs: u64,

    pub test_timeout_secs: u64,

    /// Container runtime binary used for targets with an image.
    pub container_runtime: String,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            build_id: None,
            build_url: None,
            output_dir: PathBuf::from("results"),
            max_parallel: 4,
            disable_bytecode_cache: true,
            test_failure_policy: TestFailurePolicy::Informational,
            build_timeout_secs: DEFAULT_BUILD_TIMEOUT_SECS,
            test_timeout_secs: DEFAULT_TEST_TIMEOUT_SECS,
            container_runtime: "docker".to_string(),
        }
    }
}

/// `[defaults]` section, applied to targets that do not override a field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DefaultsSection {
    pub build_command: Vec<String>,
    pub test_command: Vec<String>,
    pub env: BTreeMap<String, String>,
}

/// One `[[target]]` entry as written in the file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TargetEntry {
    pub name: String,

    #[serde(default)]
    pub image: Option<String>,

    #[serde(default)]
    pub cross_target: CrossTarget,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub build_command: Option<Vec<String>>,

    #[serde(default)]
    pub test_command: Option<Vec<String>>,

    #[serde(default)]
    pub build_timeout_secs: Option<u64>,

    #[serde(default)]
    pub test_timeout_secs: Option<u64>,
}

impl TargetEntry {
    /// Apply run-level and `[defaults]` values.
    pub fn resolve(&self, run: &RunSection, defaults: &DefaultsSection) -> TargetEnvironment {
        let mut env = defaults.env.clone();
        env.extend(self.env.clone());

        TargetEnvironment {
            name: self.name.clone(),
            image: self.image.clone(),
            cross_target: self.cross_target,
            env,
            build_command: self
                .build_command
                .clone()
                .unwrap_or_else(|| defaults.build_command.clone()),
            test_command: self
                .test_command
                .clone()
                .unwrap_or_else(|| defaults.test_command.clone()),
            build_timeout_secs: self.build_timeout_secs.unwrap_or(run.build_timeout_secs),
            test_timeout_secs: self.test_timeout_secs.unwrap_or(run.test_timeout_secs),
        }
    }
}

/// `[notify]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct NotifySection {
    pub recipient: Option<String>,
    pub webhook_url: Option<String>,
}

impl MatrixConfig {
    /// Read and parse a matrix file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

/// Run-level options resolved from the config file and the command line.
///
/// Passed explicitly into every build and test invocation; nothing here is
/// read from process-global state.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Working directory for host commands, mounted into containers.
    pub workdir: PathBuf,

    /// Absolute output directory.
    pub output_dir: PathBuf,

    pub max_parallel: usize,

    pub disable_bytecode_cache: bool,

    pub test_failure_policy: TestFailurePolicy,

    pub build_id: String,

    pub build_url: Option<String>,

    pub container_runtime: String,

    /// Who receives failure notifications.
    pub recipient: Option<String>,
}

impl RunOptions {
    /// Resolve options from a parsed config, relative to `workdir`.
    pub fn from_config(config: &MatrixConfig, workdir: &Path) -> Result<Self, ConfigError> {
        let run = &config.run;
        if run.max_parallel == 0 {
            return Err(ConfigError::InvalidParallelism);
        }

        Ok(Self {
            workdir: workdir.to_path_buf(),
            output_dir: workdir.join(&run.output_dir),
            max_parallel: run.max_parallel,
            disable_bytecode_cache: run.disable_bytecode_cache,
            test_failure_policy: run.test_failure_policy,
            build_id: run.build_id.clone().unwrap_or_else(|| "local".to_string()),
            build_url: run.build_url.clone(),
            container_runtime: run.container_runtime.clone(),
            recipient: config.notify.recipient.clone(),
        })
    }

    /// Options for a host-only run writing into `output_dir`.
    pub fn local(workdir: &Path, output_dir: &Path) -> Self {
        Self {
            workdir: workdir.to_path_buf(),
            output_dir: workdir.join(output_dir),
            max_parallel: 4,
            disable_bytecode_cache: true,
            test_failure_policy: TestFailurePolicy::Informational,
            build_id: "local".to_string(),
            build_url: None,
            container_runtime: "docker".to_string(),
            recipient: None,
        }
    }

    pub fn with_output_dir(mut self, output_dir: &Path) -> Self {
        self.output_dir = self.workdir.join(output_dir);
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Result<Self, ConfigError> {
        if max_parallel == 0 {
            return Err(ConfigError::InvalidParallelism);
        }
        self.max_parallel = max_parallel;
        Ok(self)
    }

    pub fn with_policy(mut self, policy: TestFailurePolicy) -> Self {
        self.test_failure_policy = policy;
        self
    }

    pub fn with_build_id(mut self, build_id: impl Into<String>) -> Self {
        self.build_id = build_id.into();
        self
    }

    pub fn with_build_url(mut self, build_url: impl Into<String>) -> Self {
        self.build_url = Some(build_url.into());
        self
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    /// `<output_dir>/<name>-results.xml`
    pub fn report_path(&self, target: &TargetEnvironment) -> PathBuf {
        self.output_dir.join(target.report_file_name())
    }

    /// `<output_dir>/<name>-build.log`
    pub fn build_log_path(&self, target: &TargetEnvironment) -> PathBuf {
        self.output_dir.join(target.build_log_file_name())
    }

    /// `<output_dir>/<name>-test.log`
    pub fn test_log_path(&self, target: &TargetEnvironment) -> PathBuf {
        self.output_dir.join(format!("{}-test.log", target.name))
    }

    /// `<output_dir>/build/<name>-<suffix>-build`
    pub fn build_dir(&self, target: &TargetEnvironment) -> PathBuf {
        self.output_dir.join("build").join(target.build_dir_name())
    }

    /// `<output_dir>/summary.json`
    pub fn summary_path(&self) -> PathBuf {
        self.output_dir.join("summary.json")
    }
}
