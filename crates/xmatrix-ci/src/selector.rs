//! Target environment selection.

use std::collections::HashSet;

use tracing::debug;
use xmatrix_core::{ConfigError, Stage, TargetEnvironment};

use crate::config::MatrixConfig;

/// Enumerates the target environments of a matrix.
pub struct EnvironmentSelector;

impl EnvironmentSelector {
    /// Resolve and validate every declared target, in declaration order.
    ///
    /// When `only` is non-empty the result is restricted to those names,
    /// still in declaration order. Any validation problem aborts the whole
    /// selection: no target runs on a malformed matrix.
    pub fn select(
        config: &MatrixConfig,
        only: &[String],
    ) -> Result<Vec<TargetEnvironment>, ConfigError> {
        if config.targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }

        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(config.targets.len());
        for entry in &config.targets {
            let target = entry.resolve(&config.run, &config.defaults);
            Self::validate(&target)?;
            if !seen.insert(target.name.clone()) {
                return Err(ConfigError::DuplicateTarget(target.name));
            }
            targets.push(target);
        }

        if only.is_empty() {
            return Ok(targets);
        }

        if let Some(unknown) = only.iter().find(|name| !seen.contains(name.as_str())) {
            return Err(ConfigError::UnknownTarget(unknown.clone()));
        }
        let wanted: HashSet<&str> = only.iter().map(String::as_str).collect();

        let selected: Vec<_> = targets
            .into_iter()
            .filter(|t| wanted.contains(t.name.as_str()))
            .collect();
        debug!(selected = selected.len(), "Filtered matrix targets");
        Ok(selected)
    }

    /// Check a single resolved target.
    pub fn validate(target: &TargetEnvironment) -> Result<(), ConfigError> {
        if !is_valid_name(&target.name) {
            return Err(ConfigError::InvalidTargetName(target.name.clone()));
        }
        for stage in [Stage::Build, Stage::Test] {
            if target.command(stage).first().map_or(true, |exe| exe.trim().is_empty()) {
                return Err(ConfigError::EmptyCommand {
                    target: target.name.clone(),
                    stage,
                });
            }
            if target.timeout_secs(stage) == 0 {
                return Err(ConfigError::InvalidTimeout {
                    target: target.name.clone(),
                    field: stage,
                });
            }
        }
        Ok(())
    }
}

/// Target names become file names, so keep them to a portable alphabet.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(body: &str) -> MatrixConfig {
        let defaults = "[defaults]\nbuild_command = [\"make\"]\ntest_command = [\"pytest\"]\n";
        MatrixConfig::from_toml_str(&format!("{defaults}{body}")).expect("parse")
    }

    #[test]
    fn test_select_preserves_order() {
        let config = config(
            "[[target]]\nname = \"py36\"\n[[target]]\nname = \"py35\"\n[[target]]\nname = \"ubuntu16.04\"\n",
        );
        let targets = EnvironmentSelector::select(&config, &[]).expect("select");
        let names: Vec<_> = targets.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["py36", "py35", "ubuntu16.04"]);
    }

    #[test]
    fn test_select_only_filters_in_matrix_order() {
        let config = config("[[target]]\nname = \"a\"\n[[target]]\nname = \"b\"\n[[target]]\nname = \"c\"\n");
        let targets =
            EnvironmentSelector::select(&config, &["c".to_string(), "a".to_string()]).expect("select");
        let names: Vec<_> = targets.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn test_select_unknown_target() {
        let config = config("[[target]]\nname = \"a\"\n");
        let err = EnvironmentSelector::select(&config, &["zzz".to_string()]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTarget(name) if name == "zzz"));
    }

    #[test]
    fn test_no_targets() {
        let config = config("");
        assert!(matches!(
            EnvironmentSelector::select(&config, &[]),
            Err(ConfigError::NoTargets)
        ));
    }

    #[test]
    fn test_duplicate_target() {
        let config = config("[[target]]\nname = \"a\"\n[[target]]\nname = \"a\"\n");
        assert!(matches!(
            EnvironmentSelector::select(&config, &[]),
            Err(ConfigError::DuplicateTarget(_))
        ));
    }

    #[test]
    fn test_invalid_name() {
        let config = config("[[target]]\nname = \"../escape\"\n");
        assert!(matches!(
            EnvironmentSelector::select(&config, &[]),
            Err(ConfigError::InvalidTargetName(_))
        ));
    }

    #[test]
    fn test_missing_command() {
        let config = MatrixConfig::from_toml_str(
            "[[target]]\nname = \"a\"\nbuild_command = [\"make\"]\n",
        )
        .expect("parse");
        let err = EnvironmentSelector::select(&config, &[]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::EmptyCommand { stage: Stage::Test, .. }
        ));
    }

    #[test]
    fn test_zero_timeout() {
        let config = config("[[target]]\nname = \"a\"\nbuild_timeout_secs = 0\n");
        assert!(matches!(
            EnvironmentSelector::select(&config, &[]),
            Err(ConfigError::InvalidTimeout { field: Stage::Build, .. })
        ));
    }
}
