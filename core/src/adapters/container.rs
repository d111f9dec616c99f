//! Container backend: probes and execs through the docker/podman CLI.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{BackendKind, BackendProbe, CommandSpec};
use crate::error::{Error, Result};
use crate::ports::{Backend, CommandRunner};

/// Timeout for `ps`-style queries.
const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Environment tag carried by every process a dispatched command spawns.
pub const EXEC_ID_ENV: &str = "RUNBRIDGE_EXEC_ID";

/// Upper bound on the in-container cleanup after a timeout or cancel.
const KILL_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs commands inside a named, already-running container.
pub struct ContainerBackend {
    cli_path: Option<PathBuf>,
    container_name: String,
    runner: Arc<dyn CommandRunner>,
}

impl ContainerBackend {
    pub fn new(
        cli_path: Option<PathBuf>,
        container_name: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            cli_path,
            container_name: container_name.into(),
            runner,
        }
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    fn cli(&self) -> Result<&PathBuf> {
        self.cli_path
            .as_ref()
            .ok_or_else(|| Error::spawn_failure("docker", "container CLI not found"))
    }

    /// `docker ps` filtered to running containers with exactly this name.
    pub fn ps_command(&self) -> Result<CommandSpec> {
        Ok(CommandSpec::new(self.cli()?).args([
            "ps".to_string(),
            "--filter".to_string(),
            format!("name=^/?{}$", self.container_name),
            "--filter".to_string(),
            "status=running".to_string(),
            "--format".to_string(),
            "{{.Names}}".to_string(),
        ]))
    }

    /// `docker exec -e RUNBRIDGE_EXEC_ID=<id> <name> sh -c <command>`.
    pub fn exec_command(&self, command: &str, exec_id: &str) -> Result<CommandSpec> {
        Ok(CommandSpec::new(self.cli()?).args([
            "exec".to_string(),
            "-e".to_string(),
            format!("{}={}", EXEC_ID_ENV, exec_id),
            self.container_name.clone(),
            "sh".to_string(),
            "-c".to_string(),
            command.to_string(),
        ]))
    }

    /// Kills every process in the container tagged with `exec_id`: SIGTERM,
    /// one second of grace, then SIGKILL.
    ///
    /// Killing the local CLI client does not stop the exec'd process, so
    /// this runs inside the container and matches on `/proc/<pid>/environ`.
    pub fn kill_command(&self, exec_id: &str) -> Result<CommandSpec> {
        let script = format!(
            "for sig in TERM KILL; do \
               for p in /proc/[0-9]*; do \
                 grep -qs '{env}={id}' \"$p/environ\" && kill -$sig \"${{p#/proc/}}\" 2>/dev/null; \
               done; \
               [ $sig = TERM ] && sleep 1; \
             done; true",
            env = EXEC_ID_ENV,
            id = exec_id,
        );
        Ok(CommandSpec::new(self.cli()?).args([
            "exec".to_string(),
            self.container_name.clone(),
            "sh".to_string(),
            "-c".to_string(),
            script,
        ]))
    }

    /// Reaps a timed-out or cancelled command in the background.
    fn kill_in_background(&self, exec_id: String) {
        let spec = match self.kill_command(&exec_id) {
            Ok(spec) => spec,
            Err(e) => {
                debug!(error = %e, "cannot clean up container command");
                return;
            }
        };
        let runner = self.runner.clone();
        let container = self.container_name.clone();
        tokio::spawn(async move {
            match runner.run(&spec, KILL_TIMEOUT, &CancellationToken::new()).await {
                Ok(output) if output.success() => {
                    debug!(%container, exec_id = %exec_id, "container command terminated")
                }
                Ok(output) => warn!(
                    %container,
                    exec_id = %exec_id,
                    stderr = %output.stderr.trim(),
                    "failed to terminate container command"
                ),
                Err(e) => warn!(%container, error = %e, "failed to terminate container command"),
            }
        });
    }
}

/// Whether `docker ps --format {{.Names}}` output lists `name`.
pub fn is_listed(ps_output: &str, name: &str) -> bool {
    ps_output
        .lines()
        .map(|line| line.trim().trim_start_matches('/'))
        .any(|listed| listed == name)
}

#[async_trait]
impl Backend for ContainerBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Container
    }

    fn endpoint(&self) -> String {
        format!("container:{}", self.container_name)
    }

    async fn probe(&self) -> BackendProbe {
        let spec = match self.ps_command() {
            Ok(spec) => spec,
            Err(e) => return BackendProbe::unusable(e.to_string()),
        };

        match self
            .runner
            .run(&spec, QUERY_TIMEOUT, &CancellationToken::new())
            .await
        {
            Ok(output) if output.success() && is_listed(&output.stdout, &self.container_name) => {
                BackendProbe::usable(format!("container {} running", self.container_name))
            }
            Ok(output) if output.success() => {
                BackendProbe::unusable(format!("container {} not running", self.container_name))
            }
            Ok(output) => {
                debug!(stderr = %output.stderr.trim(), "container ps failed");
                BackendProbe::unusable(format!(
                    "container CLI failed: {}",
                    first_line(&output.stderr)
                ))
            }
            Err(e) => BackendProbe::unusable(e.to_string()),
        }
    }

    async fn execute(
        &self,
        command: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let exec_id = Uuid::new_v4().to_string();
        let spec = self.exec_command(command, &exec_id)?;
        let output = match self.runner.run(&spec, timeout, cancel).await {
            Ok(output) => output,
            Err(Error::Cancelled) => {
                self.kill_in_background(exec_id);
                return Err(Error::Cancelled);
            }
            Err(e) => return Err(e),
        };

        if output.timed_out {
            self.kill_in_background(exec_id);
            warn!(
                container = %self.container_name,
                timeout_secs = timeout.as_secs(),
                "container command timed out; returning partial output"
            );
            return Ok(output.annotated());
        }

        match output.exit_code {
            Some(0) => Ok(output.combined()),
            code => Err(Error::RemoteCommand {
                message: match code {
                    Some(code) => format!("command exited with status {}", code),
                    None => "command terminated by signal".to_string(),
                },
                output: Some(output.combined()),
            }),
        }
    }
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or("").trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProcessOutput;
    use parking_lot::Mutex;

    /// Scripted runner that records every spec it is asked to run.
    struct ScriptedRunner {
        output: ProcessOutput,
        cancel_first: bool,
        calls: Mutex<Vec<CommandSpec>>,
    }

    impl ScriptedRunner {
        fn new(output: ProcessOutput) -> Arc<Self> {
            Arc::new(Self {
                output,
                cancel_first: false,
                calls: Mutex::new(Vec::new()),
            })
        }

        /// Reports the first run as cancelled, succeeds afterwards.
        fn cancelling() -> Arc<Self> {
            Arc::new(Self {
                output: exited(0, ""),
                cancel_first: true,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(
            &self,
            spec: &CommandSpec,
            _timeout: Duration,
            _cancel: &CancellationToken,
        ) -> Result<ProcessOutput> {
            let first = {
                let mut calls = self.calls.lock();
                calls.push(spec.clone());
                calls.len() == 1
            };
            if self.cancel_first && first {
                return Err(Error::Cancelled);
            }
            Ok(self.output.clone())
        }
    }

    fn exited(code: i32, stdout: &str) -> ProcessOutput {
        ProcessOutput {
            exit_code: Some(code),
            stdout: stdout.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_is_listed_matches_exact_names() {
        assert!(is_listed("devstack-runtime\n", "devstack-runtime"));
        assert!(is_listed("/devstack-runtime\nother\n", "devstack-runtime"));
        assert!(!is_listed("devstack-runtime-old\n", "devstack-runtime"));
        assert!(!is_listed("", "devstack-runtime"));
    }

    #[test]
    fn test_exec_command_argv() {
        let runner = ScriptedRunner::new(exited(0, ""));
        let backend = ContainerBackend::new(Some("/usr/bin/docker".into()), "rt", runner);
        let spec = backend.exec_command("echo hi && ls", "abc").unwrap();
        assert_eq!(
            spec.args,
            vec!["exec", "-e", "RUNBRIDGE_EXEC_ID=abc", "rt", "sh", "-c", "echo hi && ls"]
        );
    }

    #[test]
    fn test_kill_command_targets_tagged_processes() {
        let runner = ScriptedRunner::new(exited(0, ""));
        let backend = ContainerBackend::new(Some("/usr/bin/docker".into()), "rt", runner);
        let spec = backend.kill_command("abc").unwrap();

        assert_eq!(&spec.args[..4], &["exec", "rt", "sh", "-c"]);
        let script = &spec.args[4];
        assert!(script.contains("RUNBRIDGE_EXEC_ID=abc"));
        assert!(script.contains("/environ"));
        assert!(script.contains("kill -$sig"));
    }

    /// Waits for the background cleanup to reach the runner.
    async fn wait_for_calls(runner: &ScriptedRunner, count: usize) {
        for _ in 0..50 {
            if runner.calls.lock().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_probe_running_container() {
        let runner = ScriptedRunner::new(exited(0, "rt\n"));
        let backend = ContainerBackend::new(Some("/usr/bin/docker".into()), "rt", runner.clone());

        let probe = backend.probe().await;
        assert!(probe.usable);
        assert_eq!(runner.calls.lock()[0].args[0], "ps");
    }

    #[tokio::test]
    async fn test_probe_without_cli_spawns_nothing() {
        let runner = ScriptedRunner::new(exited(0, "rt\n"));
        let backend = ContainerBackend::new(None, "rt", runner.clone());

        assert!(!backend.probe().await.usable);
        assert!(runner.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_execute_nonzero_exit_is_remote_error() {
        let runner = ScriptedRunner::new(exited(2, "oops"));
        let backend = ContainerBackend::new(Some("/usr/bin/docker".into()), "rt", runner);

        let err = backend
            .execute("false", Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RemoteCommand { .. }));
        assert!(!err.is_transport());
        assert_eq!(err.partial_output(), Some("oops"));
    }

    #[tokio::test]
    async fn test_execute_timeout_returns_annotated_output() {
        let runner = ScriptedRunner::new(ProcessOutput {
            stdout: "half done\n".into(),
            timed_out: true,
            elapsed: Duration::from_secs(90),
            ..Default::default()
        });
        let backend = ContainerBackend::new(Some("/usr/bin/docker".into()), "rt", runner.clone());

        let output = backend
            .execute("long", Duration::from_secs(90), &CancellationToken::new())
            .await
            .unwrap();
        assert!(output.starts_with("half done"));
        assert!(output.contains(crate::domain::TIMEOUT_MARKER));

        wait_for_calls(&runner, 2).await;
        let calls = runner.calls.lock();
        assert_eq!(calls.len(), 2);
        let tag = calls[0].args[2].clone();
        assert!(calls[1].args[4].contains(&tag), "cleanup must target the same exec");
    }

    #[tokio::test]
    async fn test_execute_cancel_kills_container_command() {
        let runner = ScriptedRunner::cancelling();
        let backend = ContainerBackend::new(Some("/usr/bin/docker".into()), "rt", runner.clone());

        let err = backend
            .execute("sleep 600", Duration::from_secs(90), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));

        wait_for_calls(&runner, 2).await;
        let calls = runner.calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].args[1], "rt");
        assert!(calls[1].args[4].contains(&calls[0].args[2]));
    }

    #[tokio::test]
    async fn test_execute_success_needs_no_cleanup() {
        let runner = ScriptedRunner::new(exited(0, "ok\n"));
        let backend = ContainerBackend::new(Some("/usr/bin/docker".into()), "rt", runner.clone());

        let output = backend
            .execute("echo ok", Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(output, "ok\n");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runner.calls.lock().len(), 1);
    }
}
