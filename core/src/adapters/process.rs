//! Process runner built on `tokio::process`.
//!
//! One live OS process per call, no pooling. Streams are collected
//! incrementally so a timeout can still return what was printed so far.

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::{CommandSpec, ProcessOutput};
use crate::error::{Error, Result};
use crate::ports::CommandRunner;

/// Grace period between SIGTERM and SIGKILL.
pub const KILL_GRACE_PERIOD: Duration = Duration::from_millis(300);

/// How long to wait for stream readers after the process exited.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How long to wait for stream readers after the process was killed.
const READER_ABORT_TIMEOUT: Duration = Duration::from_millis(200);

/// Upper bound on captured bytes per stream.
const MAX_CAPTURE_BYTES: usize = 4 * 1024 * 1024;

type Capture = Arc<Mutex<Vec<u8>>>;

enum Outcome {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Runs external CLI tools (kubectl, docker) to completion.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let started = Instant::now();
        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::spawn_failure(spec.program_name(), e))?;

        debug!(command = %spec.display(), pid = ?child.id(), "process started");

        let stdout: Capture = Arc::default();
        let stderr: Capture = Arc::default();
        let readers = [
            spawn_collector(child.stdout.take(), stdout.clone()),
            spawn_collector(child.stderr.take(), stderr.clone()),
        ];

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Outcome::Cancelled,
            status = child.wait() => Outcome::Exited(status),
            _ = tokio::time::sleep(timeout) => Outcome::TimedOut,
        };

        match outcome {
            Outcome::Exited(status) => {
                let status = status?;
                drain(readers, READER_DRAIN_TIMEOUT).await;
                Ok(ProcessOutput {
                    exit_code: status.code(),
                    stdout: take_string(&stdout),
                    stderr: take_string(&stderr),
                    timed_out: false,
                    elapsed: started.elapsed(),
                })
            }
            Outcome::TimedOut => {
                warn!(command = %spec.program_name(), timeout_secs = timeout.as_secs(), "process timed out; terminating");
                terminate_in_background(child);
                drain(readers, READER_ABORT_TIMEOUT).await;
                Ok(ProcessOutput {
                    exit_code: None,
                    stdout: take_string(&stdout),
                    stderr: take_string(&stderr),
                    timed_out: true,
                    elapsed: started.elapsed(),
                })
            }
            Outcome::Cancelled => {
                debug!(command = %spec.program_name(), "process cancelled; terminating");
                terminate_in_background(child);
                Err(Error::Cancelled)
            }
        }
    }
}

/// Sends SIGTERM, waits [`KILL_GRACE_PERIOD`], then SIGKILLs and reaps.
pub async fn terminate_gracefully(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
                && tokio::time::timeout(KILL_GRACE_PERIOD, child.wait())
                    .await
                    .is_ok()
            {
                return;
            }
        }
    }

    let _ = child.kill().await; // kill() also waits, so no zombie is left
}

/// Terminates `child` without making the caller wait for teardown.
fn terminate_in_background(mut child: Child) {
    tokio::spawn(async move {
        terminate_gracefully(&mut child).await;
    });
}

fn spawn_collector<R>(pipe: Option<R>, capture: Capture) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut pipe) = pipe else {
            return;
        };
        let mut buf = [0u8; 8192];
        loop {
            match pipe.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let mut captured = capture.lock();
                    let room = MAX_CAPTURE_BYTES.saturating_sub(captured.len());
                    captured.extend_from_slice(&buf[..n.min(room)]);
                }
            }
        }
    })
}

async fn drain(readers: [JoinHandle<()>; 2], limit: Duration) {
    for reader in readers {
        let _ = tokio::time::timeout(limit, reader).await;
    }
}

fn take_string(capture: &Capture) -> String {
    String::from_utf8_lossy(&std::mem::take(&mut *capture.lock())).into_owned()
}
