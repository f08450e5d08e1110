//! Target environments and cross-compilation targets.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;

/// Step of a target's cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Build,
    Test,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Build => "build",
            Stage::Test => "test",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Architecture the build step compiles for.
///
/// `Native` builds for the host running the driver; `Mips` and `Cheri` are
/// cross targets with a FreeBSD userland triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CrossTarget {
    #[default]
    Native,
    Mips,
    Cheri {
        /// Capability width in bits (128 or 256).
        bits: u16,
    },
}

impl CrossTarget {
    /// Target triple handed to the compiler, `None` when building for the host.
    pub fn target_triple(&self) -> Option<&'static str> {
        match self {
            CrossTarget::Native => None,
            CrossTarget::Mips => Some("mips64-unknown-freebsd"),
            CrossTarget::Cheri { .. } => Some("cheri-unknown-freebsd"),
        }
    }

    /// Suffix appended to per-target build directories so that builds for
    /// different capability widths never share object files.
    pub fn build_suffix(&self) -> String {
        match self {
            CrossTarget::Native => "native".to_string(),
            CrossTarget::Mips => "mips".to_string(),
            CrossTarget::Cheri { bits } => format!("cheri{bits}"),
        }
    }

    /// Size of `void*` on the target, in bytes.
    pub fn pointer_size(&self) -> u8 {
        match self {
            CrossTarget::Native | CrossTarget::Mips => 8,
            CrossTarget::Cheri { bits: 128 } => 16,
            CrossTarget::Cheri { .. } => 32,
        }
    }

    pub fn is_cross(&self) -> bool {
        !matches!(self, CrossTarget::Native)
    }
}

impl fmt::Display for CrossTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.build_suffix())
    }
}

impl FromStr for CrossTarget {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" | "host" => Ok(CrossTarget::Native),
            "mips" | "mips64" => Ok(CrossTarget::Mips),
            "cheri128" => Ok(CrossTarget::Cheri { bits: 128 }),
            "cheri256" => Ok(CrossTarget::Cheri { bits: 256 }),
            _ => Err(ConfigError::InvalidCrossTarget(s.to_string())),
        }
    }
}

impl TryFrom<String> for CrossTarget {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CrossTarget> for String {
    fn from(value: CrossTarget) -> Self {
        value.build_suffix()
    }
}

/// One declared cell of the build matrix.
///
/// Fully resolved: defaults have been applied and timeouts are concrete.
/// Immutable once the selector has produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetEnvironment {
    /// Unique target name, also used as the stage/report file prefix.
    pub name: String,

    /// Container image to run in; `None` runs on the host.
    pub image: Option<String>,

    /// Architecture to cross-compile for.
    pub cross_target: CrossTarget,

    /// Extra environment variables for every command of this target.
    pub env: BTreeMap<String, String>,

    /// Cross-build command (first element is the executable).
    pub build_command: Vec<String>,

    /// Test command (first element is the executable).
    pub test_command: Vec<String>,

    /// Build timeout in seconds.
    pub build_timeout_secs: u64,

    /// Test timeout in seconds.
    pub test_timeout_secs: u64,
}

impl TargetEnvironment {
    /// Create a host target with the given commands and default timeouts.
    pub fn new(name: impl Into<String>, build_command: Vec<String>, test_command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            image: None,
            cross_target: CrossTarget::Native,
            env: BTreeMap::new(),
            build_command,
            test_command,
            build_timeout_secs: 3600,
            test_timeout_secs: 1800,
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_cross_target(mut self, cross_target: CrossTarget) -> Self {
        self.cross_target = cross_target;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_timeouts(mut self, build_secs: u64, test_secs: u64) -> Self {
        self.build_timeout_secs = build_secs;
        self.test_timeout_secs = test_secs;
        self
    }

    /// Command for the given stage.
    pub fn command(&self, stage: Stage) -> &[String] {
        match stage {
            Stage::Build => &self.build_command,
            Stage::Test => &self.test_command,
        }
    }

    /// Timeout for the given stage.
    pub fn timeout_secs(&self, stage: Stage) -> u64 {
        match stage {
            Stage::Build => self.build_timeout_secs,
            Stage::Test => self.test_timeout_secs,
        }
    }

    /// File name of the JUnit report for this target.
    pub fn report_file_name(&self) -> String {
        format!("{}-results.xml", self.name)
    }

    /// File name of the captured build log for this target.
    pub fn build_log_file_name(&self) -> String {
        format!("{}-build.log", self.name)
    }

    /// Directory name used for this target's build tree.
    pub fn build_dir_name(&self) -> String {
        format!("{}-{}-build", self.name, self.cross_target.build_suffix())
    }
}
