//! # Test command execution.
//!
//! [`Executor`] runs the test command for one task inside one cluster
//! namespace. [`CommandExecutor`] is the process-backed adapter:
//!
//! ```text
//! go test -failfast -v [-count=N] [-run=T] [-json] ./<task id>
//!   cwd  = base dir
//!   env  = TEST_DOCKER_PREFIX=<prefix>
//!   stdout ──8 KiB chunks──► Telemetry::write (console + failure catcher)
//! ```
//!
//! In dry-run mode nothing is spawned; the executor sleeps one second instead.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::info;

use crate::cluster::PREFIX_ENV;
use crate::error::ExecError;
use crate::tasks::Task;
use crate::telemetry::Telemetry;

const CHUNK: usize = 8 * 1024;

/// Pause standing in for a test run when nothing is executed.
pub const DRY_RUN_PAUSE: Duration = Duration::from_secs(1);

/// Runs the tests of one task.
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    /// Runs `task` against the cluster namespace `prefix`, streaming output into `telemetry`.
    async fn run(&self, task: &Task, prefix: &str, telemetry: &Telemetry) -> Result<(), ExecError>;
}

/// Spawns the test command as a child process.
#[derive(Clone, Debug)]
pub struct CommandExecutor {
    base: PathBuf,
    program: Vec<String>,
    count: Option<u32>,
    run_filter: Option<String>,
    json: bool,
    dry: bool,
}

impl CommandExecutor {
    /// `go test -failfast -v` in `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            program: ["go", "test", "-failfast", "-v"].map(String::from).to_vec(),
            count: None,
            run_filter: None,
            json: false,
            dry: false,
        }
    }

    /// Replaces the command prefix the flags and package are appended to.
    pub fn with_program(mut self, program: Vec<String>) -> Self {
        self.program = program;
        self
    }

    /// `-count=N`; zero means no override.
    pub fn with_count(mut self, count: Option<u32>) -> Self {
        self.count = count.filter(|n| *n > 0);
        self
    }

    pub fn with_run_filter(mut self, test: Option<String>) -> Self {
        self.run_filter = test.filter(|t| !t.is_empty());
        self
    }

    /// Machine-readable output for CI.
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub fn with_dry_run(mut self, dry: bool) -> Self {
        self.dry = dry;
        self
    }

    /// Full argument vector for `task`.
    pub fn args_for(&self, task: &Task) -> Vec<String> {
        let mut args = self.program.clone();
        if let Some(n) = self.count {
            args.push(format!("-count={n}"));
        }
        if let Some(t) = &self.run_filter {
            args.push(format!("-run={t}"));
        }
        if self.json {
            args.push("-json".into());
        }
        args.push(package_path(&task.id));
        args
    }
}

fn package_path(id: &str) -> String {
    if id == "." { ".".into() } else { format!("./{id}") }
}

#[async_trait]
impl Executor for CommandExecutor {
    async fn run(&self, task: &Task, prefix: &str, telemetry: &Telemetry) -> Result<(), ExecError> {
        let args = self.args_for(task);
        info!(target: "testvisor.exec", command = %args.join(" "), prefix, "Running: {} with {prefix}", args.join(" "));

        if self.dry {
            tokio::time::sleep(DRY_RUN_PAUSE).await;
            return Ok(());
        }

        let (program, rest) = args.split_first().ok_or_else(|| ExecError::Spawn {
            program: String::new(),
            error: "empty command".into(),
        })?;

        let mut child = Command::new(program)
            .args(rest)
            .current_dir(&self.base)
            .env(PREFIX_ENV, prefix)
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecError::Spawn {
                program: program.clone(),
                error: e.to_string(),
            })?;

        if let Some(mut stdout) = child.stdout.take() {
            let mut buf = vec![0u8; CHUNK];
            loop {
                let n = stdout.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                telemetry.write(&buf[..n])?;
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(ExecError::Failed {
                task: task.id.clone(),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

/// Runs the build step (`make install` by default) in `base`.
pub async fn build(base: &Path, command: &[String]) -> Result<(), ExecError> {
    let (program, rest) = command.split_first().ok_or_else(|| ExecError::Spawn {
        program: String::new(),
        error: "empty build command".into(),
    })?;
    info!(target: "testvisor.exec", command = %command.join(" "), "building");

    let status = Command::new(program)
        .args(rest)
        .current_dir(base)
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|e| ExecError::Spawn {
            program: program.clone(),
            error: e.to_string(),
        })?;

    if !status.success() {
        return Err(ExecError::Build {
            command: command.to_vec(),
            status: status.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskKind;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into(), "sh".into()]
    }

    #[test]
    fn test_args_follow_options() {
        let task = Task::new("systest/acl", TaskKind::Common);
        let exec = CommandExecutor::new("..")
            .with_count(Some(2))
            .with_run_filter(Some("TestLogin".into()))
            .with_json(true);
        assert_eq!(
            exec.args_for(&task),
            vec!["go", "test", "-failfast", "-v", "-count=2", "-run=TestLogin", "-json", "./systest/acl"]
        );

        let plain = CommandExecutor::new("..").with_count(Some(0)).with_run_filter(Some(String::new()));
        assert_eq!(
            plain.args_for(&Task::new(".", TaskKind::Common)),
            vec!["go", "test", "-failfast", "-v", "."]
        );
    }

    #[tokio::test]
    async fn test_output_is_streamed_into_telemetry() {
        let dir = tempfile::tempdir().unwrap();
        let exec = CommandExecutor::new(dir.path())
            .with_program(sh(
                "test \"$TEST_DOCKER_PREFIX\" = test-001-1 && test \"$1\" = ./query || exit 1; echo '--- FAIL: TestX'",
            ));
        let telemetry = Telemetry::with_console(Box::new(std::io::sink()));

        exec.run(&Task::new("query", TaskKind::Common), "test-001-1", &telemetry)
            .await
            .unwrap();
        let caught = String::from_utf8(telemetry.caught()).unwrap();
        assert_eq!(caught, "--- FAIL: TestX\n");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let exec = CommandExecutor::new(dir.path()).with_program(sh("exit 3"));
        let telemetry = Telemetry::with_console(Box::new(std::io::sink()));

        let err = exec
            .run(&Task::new("query", TaskKind::Common), "p", &telemetry)
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "exec_failed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dry_run_spawns_nothing() {
        let exec = CommandExecutor::new("/nonexistent")
            .with_program(vec!["definitely-not-a-binary".into()])
            .with_dry_run(true);
        let telemetry = Telemetry::with_console(Box::new(std::io::sink()));

        let started = tokio::time::Instant::now();
        exec.run(&Task::new("query", TaskKind::Common), "p", &telemetry)
            .await
            .unwrap();
        assert_eq!(started.elapsed(), DRY_RUN_PAUSE);
    }

    #[tokio::test]
    async fn test_build_reports_status() {
        let dir = tempfile::tempdir().unwrap();
        build(dir.path(), &sh("true")).await.unwrap();
        let err = build(dir.path(), &sh("exit 2")).await.unwrap_err();
        assert_eq!(err.as_label(), "exec_build");
    }
}
