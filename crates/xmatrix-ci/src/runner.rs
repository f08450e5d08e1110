//! Stage process execution with timeouts.

use std::time::{Duration, Instant};

use tracing::{debug, warn};
use xmatrix_core::{InfrastructureError, Stage, TargetEnvironment};

use crate::launcher::Launcher;

/// Upper bound on the `<runtime> kill` issued after a stage timeout.
const KILL_TIMEOUT_SECS: u64 = 30;

/// Captured output of a finished stage process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Exit code (-1 when terminated by a signal).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr, as written to log files.
    pub fn combined_log(&self) -> String {
        let mut log = String::with_capacity(self.stdout.len() + self.stderr.len() + 16);
        log.push_str(&self.stdout);
        if !self.stderr.is_empty() {
            if !log.is_empty() && !log.ends_with('\n') {
                log.push('\n');
            }
            log.push_str(&self.stderr);
        }
        log
    }
}

/// Executes one stage of a target.
pub struct StageRunner;

impl StageRunner {
    /// Run the stage command to completion.
    ///
    /// A non-zero exit is a normal result. Spawn failures and timeouts are
    /// infrastructure errors. On timeout the child is killed, and the
    /// container of an image target is stopped through `<runtime> kill`.
    pub async fn execute(
        launcher: &Launcher,
        target: &TargetEnvironment,
        stage: Stage,
    ) -> Result<ProcessOutput, InfrastructureError> {
        let start = Instant::now();
        let timeout_secs = target.timeout_secs(stage);

        debug!(target_name = %target.name, %stage, argv = ?launcher.argv(target, stage), "Spawning stage");

        let child = launcher
            .command(target, stage)?
            .spawn()
            .map_err(|e| InfrastructureError::Spawn {
                target: target.name.clone(),
                stage,
                message: e.to_string(),
            })?;

        // dropping the future drops the child, and kill_on_drop reaps it
        let waited =
            tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await;
        let Ok(output) = waited else {
            Self::kill_container(launcher, target, stage).await;
            return Err(InfrastructureError::Timeout {
                target: target.name.clone(),
                stage,
                secs: timeout_secs,
            });
        };
        let output = output.map_err(|e| InfrastructureError::Io {
            target: target.name.clone(),
            message: e.to_string(),
        })?;

        Ok(ProcessOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Stop the container of a timed-out stage, if the target has one.
    async fn kill_container(launcher: &Launcher, target: &TargetEnvironment, stage: Stage) {
        let Some(mut kill) = launcher.kill_command(target, stage) else {
            return;
        };
        let killed = tokio::time::timeout(Duration::from_secs(KILL_TIMEOUT_SECS), kill.output()).await;
        match killed {
            Ok(Ok(out)) if out.status.success() => {
                debug!(target_name = %target.name, %stage, "Killed timed-out container");
            }
            Ok(Ok(out)) => warn!(
                target_name = %target.name,
                %stage,
                stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                "Container kill failed"
            ),
            Ok(Err(e)) => warn!(target_name = %target.name, %stage, error = %e, "Container kill failed"),
            Err(_) => warn!(target_name = %target.name, %stage, "Container kill timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunOptions;

    fn sh(name: &str, script: &str) -> TargetEnvironment {
        TargetEnvironment::new(
            name,
            vec!["sh".into(), "-c".into(), script.into()],
            vec!["true".into()],
        )
    }

    fn launcher() -> Launcher {
        Launcher::new(&RunOptions::local(&std::env::temp_dir(), std::path::Path::new("xmatrix-runner")))
    }

    #[test]
    fn test_combined_log() {
        let output = ProcessOutput {
            exit_code: 0,
            stdout: "out".to_string(),
            stderr: "err\n".to_string(),
            duration_ms: 1,
        };
        assert_eq!(output.combined_log(), "out\nerr\n");
        assert!(output.success());
    }

    #[tokio::test]
    async fn test_execute_simple_command() {
        let target = sh("echo_test", "echo hello");
        let result = StageRunner::execute(&launcher(), &target, Stage::Build)
            .await
            .expect("execute failed");
        assert!(result.success());
        assert!(result.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_execute_failing_command() {
        let target = sh("false_test", "exit 3");
        let result = StageRunner::execute(&launcher(), &target, Stage::Build)
            .await
            .expect("execute failed");
        assert_eq!(result.exit_code, 3);
    }

    #[tokio::test]
    async fn test_execute_sees_target_env() {
        let target = sh("env_test", "echo $XMATRIX_TARGET $PYTHONDONTWRITEBYTECODE");
        let result = StageRunner::execute(&launcher(), &target, Stage::Build)
            .await
            .expect("execute failed");
        assert_eq!(result.stdout.trim(), "env_test 1");
    }

    #[tokio::test]
    async fn test_execute_spawn_failure() {
        let target = TargetEnvironment::new(
            "missing",
            vec!["/nonexistent-binary-that-does-not-exist".into()],
            vec!["true".into()],
        );
        let err = StageRunner::execute(&launcher(), &target, Stage::Build)
            .await
            .unwrap_err();
        assert!(matches!(err, InfrastructureError::Spawn { stage: Stage::Build, .. }));
    }

    #[tokio::test]
    async fn test_execute_timeout() {
        let target = sh("slow", "sleep 5").with_timeouts(1, 1);
        let err = StageRunner::execute(&launcher(), &target, Stage::Build)
            .await
            .unwrap_err();
        assert!(matches!(err, InfrastructureError::Timeout { secs: 1, .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_container() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let calls = dir.path().join("calls.log");
        let runtime = dir.path().join("fake-runtime");
        std::fs::write(
            &runtime,
            format!(
                "#!/bin/sh\necho \"$@\" >> {}\n[ \"$1\" = run ] && sleep 30\nexit 0\n",
                calls.display()
            ),
        )
        .expect("write runtime");
        std::fs::set_permissions(&runtime, std::fs::Permissions::from_mode(0o755)).expect("chmod");

        let mut opts = RunOptions::local(dir.path(), std::path::Path::new("out"));
        opts.container_runtime = runtime.to_string_lossy().into_owned();
        let launcher = Launcher::new(&opts).with_run_id("run42");
        let target = sh("slow", "true").with_image("python:3.6").with_timeouts(1, 1);

        let err = StageRunner::execute(&launcher, &target, Stage::Build)
            .await
            .unwrap_err();
        assert!(matches!(err, InfrastructureError::Timeout { .. }));

        let log = std::fs::read_to_string(&calls).expect("calls");
        assert!(log.lines().any(|l| l == "kill xmatrix-run42-slow-build"));
    }
}
