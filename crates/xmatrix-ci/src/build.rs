//! Cross-build step invocation.

use tracing::{info, warn};
use xmatrix_core::{BuildResult, InfrastructureError, Stage, TargetEnvironment};

use crate::config::RunOptions;
use crate::launcher::Launcher;
use crate::runner::StageRunner;

/// Runs the cross-build command of a target.
pub struct BuildInvoker;

impl BuildInvoker {
    /// Build `target`, writing the combined log to `<name>-build.log`.
    ///
    /// A non-zero exit produces a failed `BuildResult`; it is not an error.
    /// The per-target build directory is created before the command starts.
    pub async fn invoke(
        launcher: &Launcher,
        opts: &RunOptions,
        target: &TargetEnvironment,
    ) -> Result<BuildResult, InfrastructureError> {
        let io_err = |e: std::io::Error| InfrastructureError::Io {
            target: target.name.clone(),
            message: e.to_string(),
        };

        tokio::fs::create_dir_all(opts.build_dir(target))
            .await
            .map_err(io_err)?;

        info!(
            target_name = %target.name,
            cross_target = %target.cross_target,
            image = target.image.as_deref().unwrap_or("host"),
            "Building target"
        );

        let output = StageRunner::execute(launcher, target, Stage::Build).await?;
        let log_path = opts.build_log_path(target);
        tokio::fs::write(&log_path, output.combined_log())
            .await
            .map_err(io_err)?;

        let result = BuildResult::from_exit(&target.name, output.exit_code, log_path, output.duration_ms);
        if !result.succeeded() {
            warn!(
                target_name = %target.name,
                exit_code = result.exit_code,
                log = ?result.log_path,
                "Build failed"
            );
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use xmatrix_core::{BuildStatus, CrossTarget};

    fn setup() -> (tempfile::TempDir, RunOptions) {
        let dir = tempfile::tempdir().expect("tempdir");
        let opts = RunOptions::local(dir.path(), Path::new("out"));
        std::fs::create_dir_all(&opts.output_dir).expect("mkdir");
        (dir, opts)
    }

    fn target(build_script: &str) -> TargetEnvironment {
        TargetEnvironment::new(
            "mips-target",
            vec!["sh".into(), "-c".into(), build_script.into()],
            vec!["true".into()],
        )
        .with_cross_target(CrossTarget::Mips)
    }

    #[tokio::test]
    async fn test_successful_build_writes_log() {
        let (_dir, opts) = setup();
        let target = target("echo building for $XMATRIX_TARGET_TRIPLE; echo warn >&2");
        let result = BuildInvoker::invoke(&Launcher::new(&opts), &opts, &target)
            .await
            .expect("build");
        assert_eq!(result.status, BuildStatus::Succeeded);

        let log = std::fs::read_to_string(&result.log_path).expect("log");
        assert!(log.contains("building for mips64-unknown-freebsd"));
        assert!(log.contains("warn"));
        assert!(opts.build_dir(&target).is_dir());
    }

    #[tokio::test]
    async fn test_failed_build_is_not_an_error() {
        let (_dir, opts) = setup();
        let target = target("echo compile error >&2; exit 2");
        let result = BuildInvoker::invoke(&Launcher::new(&opts), &opts, &target)
            .await
            .expect("build");
        assert!(!result.succeeded());
        assert_eq!(result.exit_code, 2);
    }

    #[tokio::test]
    async fn test_build_uses_build_dir_placeholder() {
        let (_dir, opts) = setup();
        let target = target("touch {build_dir}/artifact.o");
        let result = BuildInvoker::invoke(&Launcher::new(&opts), &opts, &target)
            .await
            .expect("build");
        assert!(result.succeeded());
        assert!(opts.build_dir(&target).join("artifact.o").exists());
    }
}
