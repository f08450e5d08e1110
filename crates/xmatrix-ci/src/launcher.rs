//! Turns a target's declared command into a concrete process.
//!
//! Host targets run the command directly in the working directory. Targets
//! with an image run it through `<runtime> run --rm`, with the working and
//! output directories bind-mounted at the same paths so that report paths are
//! valid on both sides.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use uuid::Uuid;
use xmatrix_core::{InfrastructureError, Stage, TargetEnvironment};

use crate::config::RunOptions;

/// Environment variable carrying the report path to the test harness.
pub const REPORT_PATH_VAR: &str = "XMATRIX_REPORT_PATH";

/// Builds processes for target commands.
#[derive(Debug, Clone)]
pub struct Launcher {
    opts: RunOptions,
    run_id: String,
}

impl Launcher {
    pub fn new(opts: &RunOptions) -> Self {
        Self {
            opts: opts.clone(),
            run_id: Uuid::new_v4().simple().to_string(),
        }
    }

    /// Tag container names with the id of the run that owns them.
    pub fn with_run_id(mut self, run_id: &str) -> Self {
        self.run_id = run_id.to_string();
        self
    }

    /// Name given to the container of a stage; `None` for host targets.
    pub fn container_name(&self, target: &TargetEnvironment, stage: Stage) -> Option<String> {
        target
            .image
            .as_ref()
            .map(|_| format!("xmatrix-{}-{}-{}", self.run_id, target.name, stage))
    }

    /// Command stopping the container of a stage. Killing the local
    /// `<runtime> run` client leaves the container itself running.
    pub fn kill_command(&self, target: &TargetEnvironment, stage: Stage) -> Option<Command> {
        let name = self.container_name(target, stage)?;
        let mut command = Command::new(&self.opts.container_runtime);
        command
            .arg("kill")
            .arg(name)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        Some(command)
    }

    /// Substitute `{target}`, `{report}`, `{build_dir}`, `{output_dir}` and
    /// `{triple}` in one argument.
    pub fn expand(&self, target: &TargetEnvironment, arg: &str) -> String {
        if !arg.contains('{') {
            return arg.to_string();
        }
        arg.replace("{target}", &target.name)
            .replace("{report}", &path_str(self.opts.report_path(target)))
            .replace("{build_dir}", &path_str(self.opts.build_dir(target)))
            .replace("{output_dir}", &path_str(self.opts.output_dir.clone()))
            .replace("{triple}", target.cross_target.target_triple().unwrap_or(""))
    }

    /// Variables exported to every command of `target`.
    pub fn environment(&self, target: &TargetEnvironment) -> BTreeMap<String, String> {
        let mut env = target.env.clone();
        env.insert("XMATRIX_TARGET".to_string(), target.name.clone());
        env.insert(
            "XMATRIX_CROSS_TARGET".to_string(),
            target.cross_target.build_suffix(),
        );
        if let Some(triple) = target.cross_target.target_triple() {
            env.insert("XMATRIX_TARGET_TRIPLE".to_string(), triple.to_string());
        }
        env.insert(
            REPORT_PATH_VAR.to_string(),
            path_str(self.opts.report_path(target)),
        );
        if self.opts.disable_bytecode_cache {
            env.insert("PYTHONDONTWRITEBYTECODE".to_string(), "1".to_string());
        }
        env
    }

    /// Full argument vector for a stage, including the container prefix.
    pub fn argv(&self, target: &TargetEnvironment, stage: Stage) -> Vec<String> {
        let command: Vec<String> = target
            .command(stage)
            .iter()
            .map(|arg| self.expand(target, arg))
            .collect();

        let (Some(image), Some(name)) = (&target.image, self.container_name(target, stage)) else {
            return command;
        };

        let workdir = path_str(self.opts.workdir.clone());
        let mut argv = vec![
            self.opts.container_runtime.clone(),
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            name,
            "-v".to_string(),
            format!("{workdir}:{workdir}"),
        ];
        if !self.opts.output_dir.starts_with(&self.opts.workdir) {
            let output = path_str(self.opts.output_dir.clone());
            argv.push("-v".to_string());
            argv.push(format!("{output}:{output}"));
        }
        argv.push("-w".to_string());
        argv.push(workdir);
        for (key, value) in self.environment(target) {
            argv.push("-e".to_string());
            argv.push(format!("{key}={value}"));
        }
        argv.push(image.clone());
        argv.extend(command);
        argv
    }

    /// Process ready to spawn, with piped output. The child is killed if the
    /// handle is dropped, which is how per-target timeouts cancel it.
    pub fn command(
        &self,
        target: &TargetEnvironment,
        stage: Stage,
    ) -> Result<Command, InfrastructureError> {
        let argv = self.argv(target, stage);
        let Some((exe, args)) = argv.split_first() else {
            return Err(InfrastructureError::Spawn {
                target: target.name.clone(),
                stage,
                message: "empty command".to_string(),
            });
        };
        let mut command = Command::new(exe);
        command
            .args(args)
            .current_dir(&self.opts.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if target.image.is_none() {
            command.envs(self.environment(target));
        }
        Ok(command)
    }
}

fn path_str(path: PathBuf) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use xmatrix_core::CrossTarget;

    fn opts() -> RunOptions {
        RunOptions::local(Path::new("/work"), Path::new("results"))
    }

    fn target() -> TargetEnvironment {
        TargetEnvironment::new(
            "py36",
            vec!["./cheribuild.py".into(), "--build-root".into(), "{build_dir}".into()],
            vec!["pytest".into(), "--junitxml".into(), "{report}".into()],
        )
        .with_env("LC_ALL", "C.UTF-8")
    }

    #[test]
    fn test_expand_placeholders() {
        let launcher = Launcher::new(&opts());
        let target = target().with_cross_target(CrossTarget::Mips);
        assert_eq!(
            launcher.expand(&target, "{report}"),
            "/work/results/py36-results.xml"
        );
        assert_eq!(
            launcher.expand(&target, "--target={triple}"),
            "--target=mips64-unknown-freebsd"
        );
        assert_eq!(
            launcher.expand(&target, "{build_dir}"),
            "/work/results/build/py36-mips-build"
        );
        assert_eq!(launcher.expand(&target, "plain"), "plain");
    }

    #[test]
    fn test_host_argv() {
        let launcher = Launcher::new(&opts());
        let argv = launcher.argv(&target(), Stage::Test);
        assert_eq!(
            argv,
            vec!["pytest", "--junitxml", "/work/results/py36-results.xml"]
        );
    }

    #[test]
    fn test_environment() {
        let launcher = Launcher::new(&opts());
        let env = launcher.environment(&target().with_cross_target(CrossTarget::Cheri { bits: 128 }));
        assert_eq!(env["XMATRIX_TARGET"], "py36");
        assert_eq!(env["XMATRIX_CROSS_TARGET"], "cheri128");
        assert_eq!(env["XMATRIX_TARGET_TRIPLE"], "cheri-unknown-freebsd");
        assert_eq!(env["PYTHONDONTWRITEBYTECODE"], "1");
        assert_eq!(env["LC_ALL"], "C.UTF-8");
        assert_eq!(env[REPORT_PATH_VAR], "/work/results/py36-results.xml");
    }

    #[test]
    fn test_bytecode_cache_flag_is_explicit() {
        let mut options = opts();
        options.disable_bytecode_cache = false;
        let env = Launcher::new(&options).environment(&target());
        assert!(!env.contains_key("PYTHONDONTWRITEBYTECODE"));
        assert!(!env.contains_key("XMATRIX_TARGET_TRIPLE"));
    }

    #[test]
    fn test_container_argv() {
        let launcher = Launcher::new(&opts());
        let argv = launcher.argv(&target().with_image("python:3.6"), Stage::Build);
        assert_eq!(&argv[..3], ["docker", "run", "--rm"]);
        assert_eq!(&argv[5..7], ["-v", "/work:/work"]);
        assert!(argv.contains(&"-w".to_string()));
        assert!(argv.contains(&"PYTHONDONTWRITEBYTECODE=1".to_string()));
        let image_pos = argv.iter().position(|a| a == "python:3.6").expect("image");
        assert_eq!(argv[image_pos + 1], "./cheribuild.py");
        assert_eq!(argv.last().map(String::as_str), Some("/work/results/build/py36-native-build"));
    }

    #[test]
    fn test_container_mounts_external_output_dir() {
        let options = RunOptions::local(Path::new("/work"), Path::new("/tmp/out"));
        let argv = Launcher::new(&options).argv(&target().with_image("ubuntu:16.04"), Stage::Test);
        assert!(argv.contains(&"/tmp/out:/tmp/out".to_string()));
    }

    #[test]
    fn test_container_is_named_after_run_target_and_stage() {
        let launcher = Launcher::new(&opts()).with_run_id("run42");
        let target = target().with_image("python:3.6");
        let argv = launcher.argv(&target, Stage::Test);
        assert_eq!(&argv[3..5], ["--name", "xmatrix-run42-py36-test"]);
        assert_eq!(launcher.container_name(&self::target(), Stage::Test), None);
    }

    #[test]
    fn test_kill_command_targets_the_container() {
        let launcher = Launcher::new(&opts()).with_run_id("run42");
        let kill = launcher
            .kill_command(&target().with_image("python:3.6"), Stage::Build)
            .expect("container target");
        let std = kill.as_std();
        assert_eq!(std.get_program(), "docker");
        let args: Vec<_> = std.get_args().collect();
        assert_eq!(args, ["kill", "xmatrix-run42-py36-build"]);
        assert!(launcher.kill_command(&target(), Stage::Build).is_none());
    }
}
