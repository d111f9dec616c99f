//! Runbridge engine - Central state management and the detection/sweep loop.
//!
//! The [`Orchestrator`] owns the authoritative [`RuntimeState`], runs backend
//! detection and the health sweep on timers, dispatches commands, and
//! publishes snapshots and change events to subscribers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters::executable::{locate, CONTAINER_CLI_PATHS, KUBECTL_PATHS};
use crate::adapters::{ContainerBackend, HealthProber, ProcessRunner};
use crate::application::{BackendDetector, CommandDispatcher, PortForwardSupervisor};
use crate::config::{ServiceTarget, Settings};
use crate::domain::{
    BackendKind, FailoverRecord, ForwardSnapshot, HealthPhase, RuntimeState, ServiceStatus,
};
use crate::error::{Error, Result};
use crate::kubernetes::{BridgeClient, ClusterBackend, KubectlForwardLauncher, KubernetesDiscovery};
use crate::ports::{Backend, CommandRunner, ForwardLauncher};

/// Buffered events per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 64;

/// One way out of the "no backend" state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOption {
    pub backend: BackendKind,
    pub label: String,
    pub hint: String,
}

/// Actionable prompt raised when detection finds nothing usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployPrompt {
    pub message: String,
    pub options: Vec<DeployOption>,
}

impl DeployPrompt {
    pub fn new(settings: &Settings, detail: &str) -> Self {
        Self {
            message: format!("No runtime backend is available ({})", detail),
            options: vec![
                DeployOption {
                    backend: BackendKind::Cluster,
                    label: "Deploy to cluster".to_string(),
                    hint: format!(
                        "deploy the stack to namespace '{}' (needs {} ready pods)",
                        settings.namespace, settings.min_running_pods
                    ),
                },
                DeployOption {
                    backend: BackendKind::Container,
                    label: "Start container".to_string(),
                    hint: format!("docker start {}", settings.container_name),
                },
            ],
        }
    }
}

/// Notifications delivered to subscribers.
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    /// Published after every sweep and detection, changed or not.
    Snapshot(Arc<RuntimeState>),
    /// The selected backend changed.
    BackendChanged {
        from: BackendKind,
        to: BackendKind,
        reason: String,
    },
    /// The settled health phase or the healthy flag changed.
    HealthChanged {
        backend: BackendKind,
        from: HealthPhase,
        to: HealthPhase,
        healthy: bool,
    },
    /// Detection found no backend; the operator has to act.
    ActionRequired(DeployPrompt),
}

/// The main runbridge engine.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct Orchestrator {
    settings: Settings,
    detector: BackendDetector,
    dispatcher: CommandDispatcher,
    supervisor: PortForwardSupervisor,
    prober: HealthProber,

    // State: replaced whole, never mutated in place
    state: RwLock<Arc<RuntimeState>>,
    pinned: RwLock<Option<BackendKind>>,
    last_health: Mutex<(HealthPhase, bool)>,

    sweeping: AtomicBool,
    events: broadcast::Sender<OrchestratorEvent>,
    shutdown: CancellationToken,
}

impl Orchestrator {
    /// Create an orchestrator wired to kubectl, the container CLI and the bridge API.
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;

        let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner::new());
        let kubectl = locate(settings.kubectl_path.as_deref(), KUBECTL_PATHS, &["kubectl"]);
        let container_cli = locate(
            settings.container_cli_path.as_deref(),
            CONTAINER_CLI_PATHS,
            &["docker", "podman"],
        );
        debug!(?kubectl, ?container_cli, "resolved CLI tools");

        let cluster = Arc::new(ClusterBackend::new(
            KubernetesDiscovery::with_path(kubectl.clone(), runner.clone()),
            BridgeClient::new(settings.bridge_url()?, settings.probe_timeout())?,
            settings.namespace.clone(),
            settings.min_running_pods,
        ));
        let container = Arc::new(ContainerBackend::new(
            container_cli,
            settings.container_name.clone(),
            runner,
        ));
        let launcher = Arc::new(KubectlForwardLauncher::new(kubectl, settings.namespace.clone()));

        Self::with_components(settings, cluster, container, launcher)
    }

    /// Create an orchestrator from explicit strategies (used by tests and embedders).
    pub fn with_components(
        settings: Settings,
        cluster: Arc<dyn Backend>,
        container: Arc<dyn Backend>,
        launcher: Arc<dyn ForwardLauncher>,
    ) -> Result<Self> {
        let prober = HealthProber::new(settings.probe_timeout())?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let pinned = settings.pinned_backend.filter(BackendKind::is_available);

        Ok(Self {
            detector: BackendDetector::new(cluster.clone(), container.clone()),
            dispatcher: CommandDispatcher::new(cluster, container),
            supervisor: PortForwardSupervisor::new(launcher, prober.clone()),
            prober,
            state: RwLock::new(Arc::new(RuntimeState::initial())),
            pinned: RwLock::new(pinned),
            last_health: Mutex::new((HealthPhase::Offline, false)),
            sweeping: AtomicBool::new(false),
            events,
            shutdown: CancellationToken::new(),
            settings,
        })
    }

    /// Overrides how long new forwards get to start answering.
    pub fn with_forward_stabilization(self, stabilization: Duration) -> Self {
        Self {
            supervisor: self.supervisor.with_stabilization(stabilization),
            ..self
        }
    }

    // MARK: - State Access

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Latest snapshot. Cheap: clones an `Arc`.
    pub fn state(&self) -> Arc<RuntimeState> {
        self.state.read().clone()
    }

    /// Subscribe to snapshots and change events; drop the receiver to unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.events.subscribe()
    }

    pub fn pinned_backend(&self) -> Option<BackendKind> {
        *self.pinned.read()
    }

    pub fn forwards(&self) -> Vec<ForwardSnapshot> {
        self.supervisor.snapshot()
    }

    // MARK: - Operator Controls

    /// Prefer `kind` in future detections and re-detect now.
    pub async fn pin_backend(&self, kind: BackendKind) -> Result<Arc<RuntimeState>> {
        if !kind.is_available() {
            return Err(Error::Config(format!("cannot pin backend '{}'", kind)));
        }
        *self.pinned.write() = Some(kind);
        info!(backend = %kind, "backend pinned");
        Ok(self.detect_now().await)
    }

    /// Drop the pin and re-detect now.
    pub async fn unpin_backend(&self) -> Arc<RuntimeState> {
        *self.pinned.write() = None;
        info!("backend unpinned");
        self.detect_now().await
    }

    /// Stop every port-forward; returns how many were running.
    pub async fn stop_all_forwards(&self) -> usize {
        self.supervisor.stop_all().await
    }

    // MARK: - Detection

    /// Run detection, swap in the result, then sweep.
    pub async fn detect_now(&self) -> Arc<RuntimeState> {
        let previous = self.state();
        let after_failover =
            previous.failover.is_some() && previous.backend == BackendKind::Container;

        if after_failover {
            // Re-confirming the cluster needs a path to its bridge.
            if let Ok(bridge) = self.settings.bridge_target() {
                self.supervisor
                    .ensure_started(std::slice::from_ref(bridge))
                    .await;
            }
        }

        let pinned = self.pinned_backend();
        let detection = self.detector.detect(pinned, after_failover).await;
        let kind = detection.kind;

        match kind {
            BackendKind::Cluster => {
                self.supervisor.ensure_started(&self.settings.services).await;
            }
            _ if previous.backend == BackendKind::Cluster => {
                self.supervisor.stop_all().await;
            }
            _ => {}
        }

        let endpoint = self
            .detector
            .backend(kind)
            .map(|backend| backend.endpoint())
            .unwrap_or_default();
        let mut next = RuntimeState::detected(kind, endpoint, Some(detection.detail.clone()));
        if kind == previous.backend && kind.is_available() {
            next.healthy = previous.healthy;
            next.services = previous.services.clone();
        }
        if kind == BackendKind::Container {
            next.failover = previous.failover.clone();
        } else if previous.failover.is_some() {
            info!(backend = %kind, "failover cleared");
        }

        let (prev, next) = self.replace_state(next);
        self.publish(&prev, &next, &detection.detail);

        if kind == BackendKind::None {
            warn!(detail = %detection.detail, "no backend available");
            let _ = self.events.send(OrchestratorEvent::ActionRequired(DeployPrompt::new(
                &self.settings,
                &detection.detail,
            )));
        }

        self.sweep().await.unwrap_or_else(|| self.state())
    }

    // MARK: - Health Sweep

    /// One health-check tick. Returns `None` if a sweep is already running.
    pub async fn sweep(&self) -> Option<Arc<RuntimeState>> {
        if self
            .sweeping
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("sweep already in flight; skipping tick");
            return None;
        }
        let _guard = SweepGuard(&self.sweeping);

        let current = self.state();
        let statuses = self.probe_services(current.backend).await;
        let phase = crate::domain::aggregate(&statuses);

        if current.backend == BackendKind::Cluster && phase != HealthPhase::Healthy {
            let restarted = self.supervisor.restart_dead(&self.settings.services).await;
            if !restarted.is_empty() {
                info!(?restarted, "restarted dead forwards");
            }
        }

        let swapped = {
            let mut state = self.state.write();
            if state.backend == current.backend && state.detected_at == current.detected_at {
                let next = Arc::new(state.with_health(statuses));
                let prev = std::mem::replace(&mut *state, next.clone());
                Some((prev, next))
            } else {
                None
            }
        };

        match swapped {
            Some((prev, next)) => {
                self.publish(&prev, &next, "health sweep");
                Some(next)
            }
            None => {
                debug!("backend changed during sweep; result discarded");
                let latest = self.state();
                let _ = self.events.send(OrchestratorEvent::Snapshot(latest.clone()));
                Some(latest)
            }
        }
    }

    /// Probes every service under `backend`'s addressing scheme, in table order.
    async fn probe_services(&self, backend: BackendKind) -> Vec<ServiceStatus> {
        if !backend.is_available() {
            return Vec::new();
        }

        let mut probes = JoinSet::new();
        for (index, target) in self.settings.services.iter().cloned().enumerate() {
            let prober = self.prober.clone();
            probes.spawn(async move { (index, probe_service(&prober, &target, backend).await) });
        }

        let mut statuses = Vec::with_capacity(self.settings.services.len());
        while let Some(joined) = probes.join_next().await {
            if let Ok(status) = joined {
                statuses.push(status);
            }
        }
        statuses.sort_by_key(|(index, _)| *index);
        statuses.into_iter().map(|(_, status)| status).collect()
    }

    // MARK: - Dispatch

    /// Run `command` on the current backend.
    ///
    /// Re-detects first when the snapshot is stale. Cancellation wins over
    /// every other outcome and resolves promptly.
    pub async fn exec(
        &self,
        command: &str,
        cancel: &CancellationToken,
        long_running: bool,
    ) -> Result<String> {
        let mut state = self.state();
        if state.is_stale(self.settings.staleness()) {
            debug!("runtime state stale; re-detecting before dispatch");
            state = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                state = self.detect_now() => state,
            };
        }

        debug!(backend = %state.backend, long_running, "dispatching command");
        let outcome = self
            .dispatcher
            .dispatch(state.backend, command, cancel, long_running)
            .await?;

        if let Some(record) = outcome.failover {
            self.apply_failover(record).await;
        }
        Ok(outcome.output)
    }

    /// Switches to the container after a successful fallback dispatch.
    async fn apply_failover(&self, record: FailoverRecord) {
        warn!(reason = %record.reason, "switched to container backend after cluster failure");

        let endpoint = self
            .detector
            .backend(BackendKind::Container)
            .map(|backend| backend.endpoint())
            .unwrap_or_default();
        let reason = format!("failover: {}", record.reason);
        let mut next = RuntimeState::detected(BackendKind::Container, endpoint, Some(reason.clone()));
        next.failover = Some(record);

        let (prev, next) = self.replace_state(next);
        self.publish(&prev, &next, &reason);

        self.supervisor.stop_all().await;
        self.sweep().await;
    }

    // MARK: - Background Loop

    /// Start the detection and sweep timers. Detection runs immediately.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut detect = tokio::time::interval(self.settings.detect_interval());
            let mut sweep = tokio::time::interval(self.settings.sweep_interval());
            detect.set_missed_tick_behavior(MissedTickBehavior::Skip);
            sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // detect_now already sweeps; skip the immediate sweep tick
            sweep.tick().await;

            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = detect.tick() => {
                        tokio::select! {
                            _ = self.shutdown.cancelled() => break,
                            _ = self.detect_now() => {}
                        }
                    }
                    _ = sweep.tick() => {
                        tokio::select! {
                            _ = self.shutdown.cancelled() => break,
                            _ = self.sweep() => {}
                        }
                    }
                }
            }

            self.supervisor.stop_all().await;
            debug!("orchestrator loop stopped");
        })
    }

    /// Stop the background loop and tear down every forward.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.supervisor.stop_all().await;
    }

    // MARK: - Internal Helpers

    fn replace_state(&self, next: RuntimeState) -> (Arc<RuntimeState>, Arc<RuntimeState>) {
        let next = Arc::new(next);
        let prev = std::mem::replace(&mut *self.state.write(), next.clone());
        (prev, next)
    }

    fn publish(&self, prev: &RuntimeState, next: &Arc<RuntimeState>, reason: &str) {
        let _ = self.events.send(OrchestratorEvent::Snapshot(next.clone()));

        if prev.backend != next.backend {
            info!(from = %prev.backend, to = %next.backend, reason, "backend changed");
            let _ = self.events.send(OrchestratorEvent::BackendChanged {
                from: prev.backend,
                to: next.backend,
                reason: reason.to_string(),
            });
        }

        let settled = next.phase != HealthPhase::Detecting;
        let mut last = self.last_health.lock();
        let (last_phase, last_healthy) = *last;
        if (settled && last_phase != next.phase) || last_healthy != next.healthy {
            let to = if settled { next.phase } else { last_phase };
            info!(backend = %next.backend, from = %last_phase, to = %to, healthy = next.healthy, "health changed");
            *last = (to, next.healthy);
            let _ = self.events.send(OrchestratorEvent::HealthChanged {
                backend: next.backend,
                from: last_phase,
                to,
                healthy: next.healthy,
            });
        }
    }
}

/// Clears the sweeping flag even if the sweep future is dropped.
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Cluster services answer on the forwarded local port; the container may
/// publish on the local port or the alternate one.
async fn probe_service(
    prober: &HealthProber,
    target: &ServiceTarget,
    backend: BackendKind,
) -> ServiceStatus {
    let ports = match backend {
        BackendKind::Container => target.container_ports(),
        _ => vec![target.local_port],
    };

    for port in &ports {
        let url = target.health_url(*port);
        if prober.probe(&url).await {
            return ServiceStatus {
                name: target.name.clone(),
                url,
                healthy: true,
            };
        }
    }

    ServiceStatus {
        name: target.name.clone(),
        url: target.health_url(target.local_port),
        healthy: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BackendProbe, CommandSpec};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct FakeBackend {
        kind: BackendKind,
        usable: bool,
        executions: AtomicUsize,
    }

    impl FakeBackend {
        fn new(kind: BackendKind, usable: bool) -> Arc<Self> {
            Arc::new(Self {
                kind,
                usable,
                executions: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Backend for FakeBackend {
        fn kind(&self) -> BackendKind {
            self.kind
        }

        fn endpoint(&self) -> String {
            format!("fake:{}", self.kind)
        }

        async fn probe(&self) -> BackendProbe {
            if self.usable {
                BackendProbe::usable("up")
            } else {
                BackendProbe::unusable("down")
            }
        }

        async fn execute(&self, command: &str, _: Duration, _: &CancellationToken) -> Result<String> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{} ran {}", self.kind, command))
        }
    }

    /// Cluster whose pods look fine but whose bridge refuses commands.
    struct FlakyCluster {
        confirmed: AtomicBool,
    }

    #[async_trait]
    impl Backend for FlakyCluster {
        fn kind(&self) -> BackendKind {
            BackendKind::Cluster
        }

        fn endpoint(&self) -> String {
            "fake:cluster".to_string()
        }

        async fn probe(&self) -> BackendProbe {
            BackendProbe::usable("pods ready")
        }

        async fn confirm(&self) -> bool {
            self.confirmed.load(Ordering::SeqCst)
        }

        async fn execute(&self, _: &str, _: Duration, _: &CancellationToken) -> Result<String> {
            Err(Error::TransportFailure("connection refused".to_string()))
        }
    }

    struct NoLauncher;

    impl ForwardLauncher for NoLauncher {
        fn command(&self, _target: &ServiceTarget) -> Result<CommandSpec> {
            Err(Error::spawn_failure("kubectl", "not available in tests"))
        }
    }

    async fn free_port() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    async fn settings_with(services: Vec<ServiceTarget>) -> Settings {
        let mut settings = Settings::default();
        settings.bridge_service = services[0].name.clone();
        settings.services = services;
        settings.probe_timeout_ms = 300;
        settings
    }

    async fn orchestrator(cluster: bool, container: bool) -> Orchestrator {
        let port = free_port().await;
        let settings =
            settings_with(vec![ServiceTarget::new("bridge", port, port, port, "svc/bridge", "/")])
                .await;
        Orchestrator::with_components(
            settings,
            FakeBackend::new(BackendKind::Cluster, cluster),
            FakeBackend::new(BackendKind::Container, container),
            Arc::new(NoLauncher),
        )
        .unwrap()
    }

    fn drain(events: &mut broadcast::Receiver<OrchestratorEvent>) -> Vec<OrchestratorEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    fn snapshots(events: &[OrchestratorEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, OrchestratorEvent::Snapshot(_)))
            .count()
    }

    fn health_changes(events: &[OrchestratorEvent]) -> Vec<(HealthPhase, HealthPhase, bool)> {
        events
            .iter()
            .filter_map(|e| match e {
                OrchestratorEvent::HealthChanged {
                    from, to, healthy, ..
                } => Some((*from, *to, *healthy)),
                _ => None,
            })
            .collect()
    }

    /// Two services answering `/api` and `/web` on the same mock server.
    async fn two_services(server: &mockito::ServerGuard) -> Settings {
        let port = server.socket_address().port();
        settings_with(vec![
            ServiceTarget::new("api", port, port, 8080, "svc/api", "/api"),
            ServiceTarget::new("web", port, port, 8081, "svc/web", "/web"),
        ])
        .await
    }

    #[tokio::test]
    async fn test_initial_state_is_offline() {
        let orchestrator = orchestrator(true, true).await;
        let state = orchestrator.state();
        assert_eq!(state.backend, BackendKind::None);
        assert!(!state.healthy);
        assert_eq!(state.phase, HealthPhase::Offline);
    }

    #[tokio::test]
    async fn test_no_backend_raises_prompt() {
        let orchestrator = orchestrator(false, false).await;
        let mut events = orchestrator.subscribe();

        let state = orchestrator.detect_now().await;
        assert_eq!(state.backend, BackendKind::None);
        assert_eq!(state.phase, HealthPhase::Offline);

        let mut prompted = false;
        while let Ok(event) = events.try_recv() {
            if let OrchestratorEvent::ActionRequired(prompt) = event {
                assert_eq!(prompt.options.len(), 2);
                prompted = true;
            }
        }
        assert!(prompted);

        let err = orchestrator
            .exec("echo hi", &CancellationToken::new(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoBackendAvailable));
    }

    #[tokio::test]
    async fn test_pin_rejects_none_and_prefers_pinned() {
        let orchestrator = orchestrator(true, true).await;
        assert!(orchestrator.pin_backend(BackendKind::None).await.is_err());

        let state = orchestrator.pin_backend(BackendKind::Container).await.unwrap();
        assert_eq!(state.backend, BackendKind::Container);
        assert_eq!(state.endpoint, "fake:container");

        let state = orchestrator.unpin_backend().await;
        assert_eq!(state.backend, BackendKind::Cluster);
    }

    #[tokio::test]
    async fn test_sweep_is_not_reentrant() {
        let orchestrator = orchestrator(false, true).await;
        orchestrator.sweeping.store(true, Ordering::SeqCst);
        assert!(orchestrator.sweep().await.is_none());

        orchestrator.sweeping.store(false, Ordering::SeqCst);
        assert!(orchestrator.sweep().await.is_some());
        assert!(!orchestrator.sweeping.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_container_uses_alternate_port() {
        let mut server = mockito::Server::new_async().await;
        let _health = server
            .mock("GET", "/health")
            .with_status(200)
            .create_async()
            .await;
        let alternate = server.socket_address().port();
        let local = free_port().await;

        let settings = settings_with(vec![ServiceTarget::new(
            "dashboard",
            local,
            alternate,
            8080,
            "svc/dashboard",
            "/health",
        )])
        .await;
        let orchestrator = Orchestrator::with_components(
            settings,
            FakeBackend::new(BackendKind::Cluster, false),
            FakeBackend::new(BackendKind::Container, true),
            Arc::new(NoLauncher),
        )
        .unwrap();

        let state = orchestrator.detect_now().await;
        assert_eq!(state.backend, BackendKind::Container);
        assert_eq!(state.phase, HealthPhase::Healthy);
        assert!(state.healthy);
        assert!(state.services[0].url.ends_with(&format!(":{}/health", alternate)));
    }

    #[tokio::test]
    async fn test_fresh_state_skips_redetection() {
        let cluster = FakeBackend::new(BackendKind::Cluster, true);
        let container = FakeBackend::new(BackendKind::Container, false);
        let port = free_port().await;
        let settings =
            settings_with(vec![ServiceTarget::new("bridge", port, port, port, "svc/bridge", "/")])
                .await;
        let orchestrator = Orchestrator::with_components(
            settings,
            cluster.clone(),
            container,
            Arc::new(NoLauncher),
        )
        .unwrap();

        orchestrator.detect_now().await;
        let detected_at = orchestrator.state().detected_at;

        let output = orchestrator
            .exec("ls", &CancellationToken::new(), false)
            .await
            .unwrap();
        assert_eq!(output, "cluster ran ls");
        assert_eq!(orchestrator.state().detected_at, detected_at);
        assert_eq!(cluster.executions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_every_sweep_publishes_and_health_transitions_are_reported() {
        let mut server = mockito::Server::new_async().await;
        let api = server.mock("GET", "/api").with_status(200).create_async().await;
        let web = server.mock("GET", "/web").with_status(200).create_async().await;

        let orchestrator = Orchestrator::with_components(
            two_services(&server).await,
            FakeBackend::new(BackendKind::Cluster, false),
            FakeBackend::new(BackendKind::Container, true),
            Arc::new(NoLauncher),
        )
        .unwrap();
        let mut events = orchestrator.subscribe();

        let state = orchestrator.detect_now().await;
        assert_eq!(state.phase, HealthPhase::Healthy);
        let seen = drain(&mut events);
        assert_eq!(snapshots(&seen), 2);
        assert_eq!(
            health_changes(&seen),
            vec![(HealthPhase::Offline, HealthPhase::Healthy, true)]
        );

        // Nothing changed: still one snapshot, no health event.
        orchestrator.sweep().await.unwrap();
        let seen = drain(&mut events);
        assert_eq!(snapshots(&seen), 1);
        assert!(health_changes(&seen).is_empty());

        web.remove_async().await;
        let state = orchestrator.sweep().await.unwrap();
        assert_eq!(state.phase, HealthPhase::Degraded);
        assert!(!state.healthy);
        let seen = drain(&mut events);
        assert_eq!(snapshots(&seen), 1);
        assert_eq!(
            health_changes(&seen),
            vec![(HealthPhase::Healthy, HealthPhase::Degraded, false)]
        );

        api.remove_async().await;
        let state = orchestrator.sweep().await.unwrap();
        assert_eq!(state.phase, HealthPhase::Offline);
        let seen = drain(&mut events);
        assert_eq!(snapshots(&seen), 1);
        assert_eq!(
            health_changes(&seen),
            vec![(HealthPhase::Degraded, HealthPhase::Offline, false)]
        );

        let _api = server.mock("GET", "/api").with_status(200).create_async().await;
        let _web = server.mock("GET", "/web").with_status(200).create_async().await;
        let state = orchestrator.sweep().await.unwrap();
        assert!(state.healthy);
        let seen = drain(&mut events);
        assert_eq!(snapshots(&seen), 1);
        assert_eq!(
            health_changes(&seen),
            vec![(HealthPhase::Offline, HealthPhase::Healthy, true)]
        );
    }

    #[tokio::test]
    async fn test_same_backend_redetect_is_quiet() {
        let mut server = mockito::Server::new_async().await;
        let _api = server.mock("GET", "/api").with_status(200).create_async().await;
        let _web = server.mock("GET", "/web").with_status(200).create_async().await;

        let orchestrator = Orchestrator::with_components(
            two_services(&server).await,
            FakeBackend::new(BackendKind::Cluster, false),
            FakeBackend::new(BackendKind::Container, true),
            Arc::new(NoLauncher),
        )
        .unwrap();
        assert!(orchestrator.detect_now().await.healthy);
        let mut events = orchestrator.subscribe();

        let state = orchestrator.detect_now().await;
        assert_eq!(state.backend, BackendKind::Container);
        assert!(state.healthy);

        let seen = drain(&mut events);
        assert_eq!(snapshots(&seen), 2);
        assert!(health_changes(&seen).is_empty());
        assert!(!seen
            .iter()
            .any(|e| matches!(e, OrchestratorEvent::BackendChanged { .. })));
    }

    #[tokio::test]
    async fn test_backend_switch_flips_healthy_flag() {
        let mut server = mockito::Server::new_async().await;
        let _api = server.mock("GET", "/api").with_status(200).create_async().await;
        let _web = server.mock("GET", "/web").with_status(200).create_async().await;

        let orchestrator = Orchestrator::with_components(
            two_services(&server).await,
            FakeBackend::new(BackendKind::Cluster, true),
            FakeBackend::new(BackendKind::Container, true),
            Arc::new(NoLauncher),
        )
        .unwrap();
        let state = orchestrator.pin_backend(BackendKind::Container).await.unwrap();
        assert!(state.healthy);
        let mut events = orchestrator.subscribe();

        // The mock server already holds the local ports, so no forward is needed.
        let state = orchestrator.unpin_backend().await;
        assert_eq!(state.backend, BackendKind::Cluster);
        assert!(state.healthy);

        let seen = drain(&mut events);
        assert_eq!(snapshots(&seen), 2);
        assert_eq!(
            health_changes(&seen),
            vec![
                (HealthPhase::Healthy, HealthPhase::Healthy, false),
                (HealthPhase::Healthy, HealthPhase::Healthy, true),
            ]
        );
    }

    #[tokio::test]
    async fn test_reconfirmed_cluster_clears_failover() {
        let cluster = Arc::new(FlakyCluster {
            confirmed: AtomicBool::new(false),
        });
        let container = FakeBackend::new(BackendKind::Container, true);
        let port = free_port().await;
        let settings =
            settings_with(vec![ServiceTarget::new("bridge", port, port, port, "svc/bridge", "/")])
                .await;
        let orchestrator = Orchestrator::with_components(
            settings,
            cluster.clone(),
            container.clone(),
            Arc::new(NoLauncher),
        )
        .unwrap();

        assert_eq!(orchestrator.detect_now().await.backend, BackendKind::Cluster);
        let output = orchestrator
            .exec("ls", &CancellationToken::new(), false)
            .await
            .unwrap();
        assert_eq!(output, "container ran ls");
        assert_eq!(container.executions.load(Ordering::SeqCst), 1);
        assert!(orchestrator.state().failover.is_some());

        // Not confirmed yet: the failover sticks.
        let state = orchestrator.detect_now().await;
        assert_eq!(state.backend, BackendKind::Container);
        assert!(state.failover.is_some());

        cluster.confirmed.store(true, Ordering::SeqCst);
        let mut events = orchestrator.subscribe();
        let state = orchestrator.detect_now().await;
        assert_eq!(state.backend, BackendKind::Cluster);
        assert!(state.failover.is_none());
        assert_eq!(state.details.as_deref(), Some("cluster re-confirmed"));

        let switched = drain(&mut events).into_iter().any(|e| {
            matches!(
                e,
                OrchestratorEvent::BackendChanged {
                    from: BackendKind::Container,
                    to: BackendKind::Cluster,
                    ..
                }
            )
        });
        assert!(switched);
    }

    #[test]
    fn test_deploy_prompt_mentions_targets() {
        let settings = Settings::default();
        let prompt = DeployPrompt::new(&settings, "cluster: down; container: down");
        assert!(prompt.message.contains("cluster: down"));
        assert!(prompt.options[1].hint.contains(&settings.container_name));
    }
}
