//! Port-forward supervisor.
//!
//! Owns one long-lived forwarding process per service. Process exits arrive
//! over a channel and only flip the handle to `Dead`; restarting is left to
//! the periodic sweep.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tokio::sync::{mpsc, oneshot, Mutex as ServiceLock};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapters::process::{terminate_gracefully, KILL_GRACE_PERIOD};
use crate::adapters::HealthProber;
use crate::config::ServiceTarget;
use crate::domain::{ForwardSnapshot, ForwardStart, ForwardState};
use crate::error::{Error, Result};
use crate::kubernetes::port_forward::{detect_port_conflict, is_error_line};
use crate::ports::ForwardLauncher;

/// How long a fresh forward gets to start answering on its local port.
pub const PORT_FORWARD_STABILIZATION: Duration = Duration::from_secs(2);

/// Polling step while waiting for a forward to answer.
const STABILIZATION_POLL: Duration = Duration::from_millis(100);

/// Upper bound on waiting for a watcher task after asking it to stop.
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(3);

/// Sent by a watcher task when its process is gone.
#[derive(Debug)]
struct ForwardExit {
    service: String,
    id: Uuid,
    code: Option<i32>,
}

struct ForwardHandle {
    id: Uuid,
    local_port: u16,
    pid: Option<u32>,
    state: ForwardState,
    restarts: u32,
    started_at: DateTime<Utc>,
    kill_tx: Option<oneshot::Sender<()>>,
    watcher: JoinHandle<()>,
}

impl ForwardHandle {
    fn snapshot(&self, service: &str) -> ForwardSnapshot {
        ForwardSnapshot {
            id: self.id,
            service: service.to_string(),
            local_port: self.local_port,
            pid: self.pid,
            state: self.state,
            restarts: self.restarts,
            started_at: self.started_at,
        }
    }
}

/// Supervises forwarding processes for the cluster backend.
pub struct PortForwardSupervisor {
    launcher: Arc<dyn ForwardLauncher>,
    prober: HealthProber,
    stabilization: Duration,
    handles: Mutex<HashMap<String, ForwardHandle>>,
    /// Serializes start/restart/stop per service so one service never gets two processes.
    service_locks: Mutex<HashMap<String, Arc<ServiceLock<()>>>>,
    exits_tx: mpsc::UnboundedSender<ForwardExit>,
    exits_rx: Mutex<mpsc::UnboundedReceiver<ForwardExit>>,
}

impl PortForwardSupervisor {
    pub fn new(launcher: Arc<dyn ForwardLauncher>, prober: HealthProber) -> Self {
        let (exits_tx, exits_rx) = mpsc::unbounded_channel();
        Self {
            launcher,
            prober,
            stabilization: PORT_FORWARD_STABILIZATION,
            handles: Mutex::new(HashMap::new()),
            service_locks: Mutex::new(HashMap::new()),
            exits_tx,
            exits_rx: Mutex::new(exits_rx),
        }
    }

    /// Overrides how long `start_forward` waits for the port to answer.
    pub fn with_stabilization(mut self, stabilization: Duration) -> Self {
        self.stabilization = stabilization;
        self
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts a forward for `target`, replacing any existing handle for it.
    ///
    /// Returns [`ForwardStart::Skipped`] without spawning when the local port
    /// already answers.
    pub async fn start_forward(&self, target: &ServiceTarget) -> Result<ForwardStart> {
        let lock = self.service_lock(&target.name);
        let _serial = lock.lock().await;
        self.start_locked(target).await
    }

    /// Body of `start_forward`; the caller holds the service lock.
    async fn start_locked(&self, target: &ServiceTarget) -> Result<ForwardStart> {
        let previous = self.handles.lock().remove(&target.name);
        let restarts = match previous {
            Some(handle) => {
                let restarts = handle.restarts + 1;
                teardown(handle).await;
                restarts
            }
            None => 0,
        };

        if self.prober.port_open(target.local_port).await {
            info!(
                service = %target.name,
                port = target.local_port,
                "local port already answering; not starting a forward"
            );
            return Ok(ForwardStart::Skipped {
                port: target.local_port,
            });
        }

        let spec = self.launcher.command(target)?;
        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::spawn_failure(spec.program_name(), e))?;

        let id = Uuid::new_v4();
        let pid = child.id();
        if let Some(stderr) = child.stderr.take() {
            monitor_stderr(target.name.clone(), stderr);
        }

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let exits_tx = self.exits_tx.clone();
        let service = target.name.clone();
        let watcher = tokio::spawn(async move {
            let code = tokio::select! {
                status = child.wait() => status.ok().and_then(|s| s.code()),
                _ = kill_rx => {
                    terminate_gracefully(&mut child).await;
                    None
                }
            };
            let _ = exits_tx.send(ForwardExit { service, id, code });
        });

        info!(service = %target.name, port = target.local_port, ?pid, restarts, "forward started");
        let displaced = self.handles.lock().insert(
            target.name.clone(),
            ForwardHandle {
                id,
                local_port: target.local_port,
                pid,
                state: ForwardState::Starting,
                restarts,
                started_at: Utc::now(),
                kill_tx: Some(kill_tx),
                watcher,
            },
        );
        if let Some(handle) = displaced {
            warn!(service = %target.name, "replacing a forward that appeared concurrently");
            teardown(handle).await;
        }

        if self.wait_until_listening(&target.name, id, target.local_port).await {
            self.set_state(&target.name, id, ForwardState::Running);
        } else {
            debug!(service = %target.name, "forward not answering yet");
        }

        Ok(ForwardStart::Started { id, pid })
    }

    /// Stops the forward for `service`. Returns false if there was none.
    pub async fn stop_forward(&self, service: &str) -> bool {
        let lock = self.service_lock(service);
        let _serial = lock.lock().await;
        let removed = self.handles.lock().remove(service);
        let Some(handle) = removed else {
            return false;
        };
        info!(service, "stopping forward");
        teardown(handle).await;
        true
    }

    /// Stops every tracked forward; returns how many handles were removed.
    pub async fn stop_all(&self) -> usize {
        let handles: Vec<_> = self.handles.lock().drain().collect();
        let count = handles.len();

        let mut teardowns = JoinSet::new();
        for (_, handle) in handles {
            teardowns.spawn(teardown(handle));
        }
        while teardowns.join_next().await.is_some() {}

        if count > 0 {
            info!(count, "all forwards stopped");
        }
        count
    }

    // =========================================================================
    // Sweep Support
    // =========================================================================

    /// Starts forwards for targets without a live handle.
    ///
    /// Failures are logged; a missing forward is remediated by later sweeps.
    pub async fn ensure_started(&self, targets: &[ServiceTarget]) -> usize {
        self.reconcile();
        let mut started = 0;
        for target in targets {
            let lock = self.service_lock(&target.name);
            let _serial = lock.lock().await;
            self.reconcile();
            let live = matches!(
                self.state_of(&target.name),
                Some(ForwardState::Starting | ForwardState::Running)
            );
            if live {
                continue;
            }
            match self.start_locked(target).await {
                Ok(ForwardStart::Started { .. }) => started += 1,
                Ok(ForwardStart::Skipped { .. }) => {}
                Err(e) => warn!(service = %target.name, error = %e, "failed to start forward"),
            }
        }
        started
    }

    /// Restarts `Dead` forwards whose local port is free.
    ///
    /// Returns the names of the services that got a new process.
    pub async fn restart_dead(&self, targets: &[ServiceTarget]) -> Vec<String> {
        self.reconcile();
        let mut restarted = Vec::new();

        for target in targets {
            let lock = self.service_lock(&target.name);
            let _serial = lock.lock().await;
            self.reconcile();
            if self.state_of(&target.name) != Some(ForwardState::Dead) {
                continue;
            }
            if self.prober.port_open(target.local_port).await {
                debug!(
                    service = %target.name,
                    port = target.local_port,
                    "port in use by another process; leaving forward dead"
                );
                continue;
            }
            match self.start_locked(target).await {
                Ok(ForwardStart::Started { .. }) => restarted.push(target.name.clone()),
                Ok(ForwardStart::Skipped { .. }) => {}
                Err(e) => warn!(service = %target.name, error = %e, "failed to restart forward"),
            }
        }

        restarted
    }

    /// Applies pending exit notifications to the handle table.
    pub fn reconcile(&self) {
        let mut exits = self.exits_rx.lock();
        let mut handles = self.handles.lock();

        while let Ok(exit) = exits.try_recv() {
            match handles.get_mut(&exit.service) {
                // Exits from torn-down predecessors are stale.
                Some(handle) if handle.id == exit.id && handle.state != ForwardState::Dead => {
                    warn!(service = %exit.service, code = ?exit.code, "forward exited");
                    handle.state = ForwardState::Dead;
                    handle.pid = None;
                }
                _ => debug!(service = %exit.service, "ignoring exit of replaced forward"),
            }
        }
    }

    /// Read-only view of every handle, sorted by service name.
    pub fn snapshot(&self) -> Vec<ForwardSnapshot> {
        self.reconcile();
        let mut snapshots: Vec<_> = self
            .handles
            .lock()
            .iter()
            .map(|(service, handle)| handle.snapshot(service))
            .collect();
        snapshots.sort_by(|a, b| a.service.cmp(&b.service));
        snapshots
    }

    pub fn state_of(&self, service: &str) -> Option<ForwardState> {
        self.handles.lock().get(service).map(|h| h.state)
    }

    // =========================================================================
    // Internal Helpers
    // =========================================================================

    fn service_lock(&self, service: &str) -> Arc<ServiceLock<()>> {
        self.service_locks
            .lock()
            .entry(service.to_string())
            .or_default()
            .clone()
    }

    async fn wait_until_listening(&self, service: &str, id: Uuid, port: u16) -> bool {
        let deadline = Instant::now() + self.stabilization;
        loop {
            if self.prober.port_open(port).await {
                return true;
            }
            self.reconcile();
            let alive = self
                .handles
                .lock()
                .get(service)
                .map(|h| h.id == id && h.state != ForwardState::Dead)
                .unwrap_or(false);
            if !alive || Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(STABILIZATION_POLL).await;
        }
    }

    fn set_state(&self, service: &str, id: Uuid, state: ForwardState) {
        if let Some(handle) = self.handles.lock().get_mut(service) {
            if handle.id == id && handle.state != ForwardState::Dead {
                handle.state = state;
            }
        }
    }
}

impl Drop for PortForwardSupervisor {
    fn drop(&mut self) {
        // Aborting a watcher drops its child, and kill_on_drop reaps it.
        for (_, handle) in self.handles.get_mut().drain() {
            handle.watcher.abort();
        }
    }
}

/// Signals the watcher to terminate its process and waits for it, bounded.
async fn teardown(mut handle: ForwardHandle) {
    if let Some(kill_tx) = handle.kill_tx.take() {
        let _ = kill_tx.send(());
    }
    if tokio::time::timeout(TEARDOWN_TIMEOUT + KILL_GRACE_PERIOD, &mut handle.watcher)
        .await
        .is_err()
    {
        handle.watcher.abort();
    }
}

fn monitor_stderr(service: String, stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(port) = detect_port_conflict(&line) {
                warn!(service = %service, port, "forward port already in use");
            } else if is_error_line(&line) {
                warn!(service = %service, line = %line.trim(), "forward error");
            } else {
                debug!(service = %service, line = %line.trim(), "forward output");
            }
        }
    });
}
