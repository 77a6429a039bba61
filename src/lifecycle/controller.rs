//! Service controller: the single owner of the monitoring lifecycle.
//!
//! Every lifecycle entry point (`start`, `stop`, `toggle`, `restart`,
//! `ensure_running`, wake callbacks, config reloads) serializes through one
//! async mutex around the runtime record, which is what keeps the number of
//! poll loops at one no matter how many triggers race.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use arc_swap::ArcSwap;
use futures_util::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::alert::{
    AlertDriver, AlertMode, AudioOutput, CommandAudio, DriverSettings, LogVibrator, Vibrator,
};
use crate::config::{MonitorConfig, Region};
use crate::lifecycle::guard::{backend_for, LivenessGuard, WakeLockBackend};
use crate::net::{ClientError, EndpointProbe, EndpointSet, FailoverClient, StatusSource};
use crate::poller::{DeviceIdentity, PollLoop, ServiceState, StatusBoard};
use crate::watchdog::{WakeCallback, WakeError, WakeKind, WakeSignal, WakeSourceRegistration, Watchdog};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed to build status client: {0}")]
    Client(#[from] ClientError),
}

/// What `ensure_running` had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnsureOutcome {
    /// Was idle; monitoring started.
    Started,
    /// Poll loop was dead and has been restarted.
    Restarted,
    /// Everything already running.
    Healthy,
}

/// Point-in-time view for displays and the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state: ServiceState,
    pub status_line: String,
    pub region: Region,
    pub device_id: DeviceIdentity,
    pub session_id: Option<Uuid>,
    pub last_success_age_secs: Option<f64>,
    pub current_endpoint: Option<String>,
    pub guard_held: bool,
    pub alert_mode: AlertMode,
    pub poll_loop_starts: u64,
    pub wake_sources: Vec<WakeSourceRegistration>,
}

/// Collaborators injected into the controller.
pub struct ControllerParts {
    pub source: Arc<dyn StatusSource>,
    /// Endpoint set to probe and report. `None` skips the liveness probe.
    pub endpoints: Option<Arc<EndpointSet>>,
    /// Woken by the client when an endpoint is exhausted.
    pub probe_hint: Option<Arc<Notify>>,
    pub audio: Arc<dyn AudioOutput>,
    pub vibrator: Arc<dyn Vibrator>,
    pub wake_lock: Arc<dyn WakeLockBackend>,
    /// Wake sources; built from the config when `None`.
    pub watchdog: Option<Watchdog>,
}

struct PollTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Session {
    id: Uuid,
    cancel: CancellationToken,
    aux: Vec<JoinHandle<()>>,
}

struct Runtime {
    watchdog: Watchdog,
    poll: Option<PollTask>,
    session: Option<Session>,
}

impl Runtime {
    fn poll_alive(&self) -> bool {
        self.poll
            .as_ref()
            .is_some_and(|poll| !poll.handle.is_finished())
    }
}

struct Inner {
    settings: ArcSwap<MonitorConfig>,
    device: DeviceIdentity,
    source: Arc<dyn StatusSource>,
    endpoints: Option<Arc<EndpointSet>>,
    probe_hint: Option<Arc<Notify>>,
    alert: Arc<AlertDriver>,
    guard: LivenessGuard,
    status: Arc<StatusBoard>,
    epoch: AtomicU64,
    runtime: Mutex<Runtime>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let runtime = self.runtime.get_mut();
        if let Some(session) = runtime.session.take() {
            session.cancel.cancel();
            for task in session.aux {
                task.abort();
            }
        }
        if let Some(poll) = runtime.poll.take() {
            poll.cancel.cancel();
            poll.handle.abort();
        }
    }
}

/// Cheap handle; clones share one controller.
#[derive(Clone)]
pub struct ServiceController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ServiceController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceController")
            .field("device", &self.inner.device)
            .field("state", &self.inner.status.state())
            .finish()
    }
}

impl ServiceController {
    /// Build the production controller: failover HTTP client, command
    /// audio, log vibrator and the configured wake lock backend.
    pub fn new(config: MonitorConfig, device: DeviceIdentity) -> Result<Self, ServiceError> {
        let endpoints = Arc::new(EndpointSet::new(config.endpoints.urls.iter())?);
        let client = FailoverClient::new(
            &config.client,
            endpoints.clone(),
            &config.endpoints.status_path,
        )?;
        let parts = ControllerParts {
            probe_hint: Some(client.probe_hint()),
            source: Arc::new(client),
            endpoints: Some(endpoints),
            audio: Arc::new(CommandAudio::from_config(&config.alert)),
            vibrator: Arc::new(LogVibrator::default()),
            wake_lock: backend_for(config.guard.backend),
            watchdog: None,
        };
        Ok(Self::with_parts(config, device, parts))
    }

    pub fn with_parts(config: MonitorConfig, device: DeviceIdentity, parts: ControllerParts) -> Self {
        let alert = Arc::new(AlertDriver::new(
            parts.audio,
            parts.vibrator,
            DriverSettings::from(&config.alert),
        ));
        let guard = LivenessGuard::new(
            parts.wake_lock,
            Duration::from_secs(config.guard.validity_secs),
        );
        let watchdog = parts
            .watchdog
            .unwrap_or_else(|| Watchdog::from_config(&config.watchdog));

        tracing::info!(device = %device, region = ?config.device.region, "Service controller created");
        Self {
            inner: Arc::new(Inner {
                settings: ArcSwap::from_pointee(config),
                device,
                source: parts.source,
                endpoints: parts.endpoints,
                probe_hint: parts.probe_hint,
                alert,
                guard,
                status: Arc::new(StatusBoard::new()),
                epoch: AtomicU64::new(0),
                runtime: Mutex::new(Runtime {
                    watchdog,
                    poll: None,
                    session: None,
                }),
            }),
        }
    }

    pub fn state(&self) -> ServiceState {
        self.inner.status.state()
    }

    pub fn status(&self) -> &Arc<StatusBoard> {
        &self.inner.status
    }

    pub fn device(&self) -> &DeviceIdentity {
        &self.inner.device
    }

    pub fn settings(&self) -> Arc<MonitorConfig> {
        self.inner.settings.load_full()
    }

    /// Start monitoring. Returns `false` if it was already running.
    pub async fn start(&self) -> bool {
        let mut runtime = self.inner.runtime.lock().await;
        if runtime.session.is_some() {
            return false;
        }
        self.start_locked(&mut runtime);
        true
    }

    /// Stop monitoring. Returns `false` if it was already idle.
    pub async fn stop(&self) -> bool {
        let mut runtime = self.inner.runtime.lock().await;
        self.stop_locked(&mut runtime).await
    }

    /// Start when idle, stop otherwise. Returns the resulting state.
    pub async fn toggle(&self) -> ServiceState {
        let mut runtime = self.inner.runtime.lock().await;
        if runtime.session.is_some() {
            self.stop_locked(&mut runtime).await;
        } else {
            self.start_locked(&mut runtime);
        }
        self.inner.status.state()
    }

    /// Stop (if running) and start again with a fresh session.
    pub async fn restart(&self) {
        let mut runtime = self.inner.runtime.lock().await;
        self.stop_locked(&mut runtime).await;
        self.start_locked(&mut runtime);
    }

    /// Make sure monitoring is running and healthy. Safe to call from any
    /// trigger, any number of times.
    pub async fn ensure_running(&self) -> EnsureOutcome {
        let mut runtime = self.inner.runtime.lock().await;
        self.ensure_locked(&mut runtime, false).await
    }

    /// Swap in a reloaded configuration. Identical configurations are
    /// ignored. A change to the poll, alert, watchdog or device sections
    /// restarts monitoring if it was running; anything else is swapped in
    /// place.
    pub async fn apply_config(&self, config: MonitorConfig) {
        let mut runtime = self.inner.runtime.lock().await;
        let previous = self.inner.settings.load_full();
        if *previous == config {
            tracing::debug!("Configuration unchanged");
            return;
        }
        if previous.endpoints != config.endpoints
            || previous.client != config.client
            || previous.guard != config.guard
        {
            tracing::warn!(
                "Endpoint, client or guard settings changed; they take effect after a process restart"
            );
        }

        self.inner.alert.update_settings(DriverSettings::from(&config.alert));
        let reschedule = previous.poll != config.poll
            || previous.alert != config.alert
            || previous.watchdog != config.watchdog
            || previous.device != config.device;
        if !reschedule {
            self.inner.settings.store(Arc::new(config));
            tracing::info!(restarting = false, "Configuration applied");
            return;
        }

        let was_running = self.stop_locked(&mut runtime).await;
        if previous.watchdog != config.watchdog {
            runtime.watchdog = Watchdog::from_config(&config.watchdog);
        }
        self.inner.settings.store(Arc::new(config));
        tracing::info!(restarting = was_running, "Configuration applied");
        if was_running {
            self.start_locked(&mut runtime);
        }
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        let runtime = self.inner.runtime.lock().await;
        let settings = self.inner.settings.load();
        let state = self.inner.status.state();
        StatusSnapshot {
            state,
            status_line: state.status_line(settings.device.region).to_string(),
            region: settings.device.region,
            device_id: self.inner.device.clone(),
            session_id: runtime.session.as_ref().map(|s| s.id),
            last_success_age_secs: self.inner.status.last_success_age().map(|age| age.as_secs_f64()),
            current_endpoint: self.inner.endpoints.as_ref().map(|e| e.current().to_string()),
            guard_held: self.inner.guard.is_held(),
            alert_mode: self.inner.alert.mode(),
            poll_loop_starts: self.inner.status.loop_starts(),
            wake_sources: runtime.watchdog.registrations(),
        }
    }

    async fn handle_wake(&self, epoch: u64, signal: WakeSignal) -> Result<(), WakeError> {
        let mut runtime = self.inner.runtime.lock().await;
        let current = self.inner.epoch.load(Ordering::Acquire);
        if epoch != current {
            tracing::debug!(source = signal.source, fired = epoch, current, "Ignoring stale wake");
            return Err(WakeError::Stale {
                fired: epoch,
                current,
            });
        }

        let outcome = self
            .ensure_locked(&mut runtime, signal.kind == WakeKind::Heartbeat)
            .await;
        if outcome != EnsureOutcome::Healthy {
            tracing::info!(source = signal.source, outcome = ?outcome, "Wake source repaired monitoring");
        }

        // Deferred work retries these with backoff.
        if !self.inner.guard.is_held() {
            return Err(WakeError::Failed("liveness guard not held".to_string()));
        }
        if !runtime.poll_alive() {
            return Err(WakeError::Failed("poll loop not running".to_string()));
        }
        Ok(())
    }

    fn wake_callback(&self, epoch: u64) -> WakeCallback {
        let inner = Arc::downgrade(&self.inner);
        Arc::new(move |signal: WakeSignal| -> BoxFuture<'static, Result<(), WakeError>> {
            let inner = inner.clone();
            Box::pin(async move {
                let inner = inner.upgrade().ok_or(WakeError::ControllerGone)?;
                let controller = ServiceController { inner };
                controller.handle_wake(epoch, signal).await
            })
        })
    }

    async fn ensure_locked(&self, runtime: &mut Runtime, renew_guard: bool) -> EnsureOutcome {
        if runtime.session.is_none() {
            self.start_locked(runtime);
            return EnsureOutcome::Started;
        }

        let guard = if renew_guard {
            self.inner.guard.renew()
        } else {
            self.inner.guard.acquire()
        };
        if let Err(e) = guard {
            tracing::warn!(error = %e, "Liveness guard renewal failed");
        }

        let outcome = if runtime.poll_alive() {
            EnsureOutcome::Healthy
        } else {
            tracing::warn!("Poll loop is not running, restarting");
            self.restart_poll_locked(runtime).await;
            EnsureOutcome::Restarted
        };

        self.inner.alert.ensure_silent();
        outcome
    }

    fn start_locked(&self, runtime: &mut Runtime) {
        let settings = self.inner.settings.load_full();
        let session = Session {
            id: Uuid::new_v4(),
            cancel: CancellationToken::new(),
            aux: Vec::new(),
        };
        let session_id = session.id;

        self.inner.status.set_state(ServiceState::Monitoring);
        if let Err(e) = self.inner.guard.acquire() {
            tracing::warn!(error = %e, "Failed to acquire liveness guard");
        }
        self.inner.alert.enter_silent();

        let epoch = self.inner.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        runtime.watchdog.arm(self.wake_callback(epoch));
        runtime.session = Some(session);
        self.spawn_poll_locked(runtime, &settings);
        self.spawn_aux_locked(runtime, &settings);

        tracing::info!(session = %session_id, device = %self.inner.device, "Monitoring started");
    }

    async fn stop_locked(&self, runtime: &mut Runtime) -> bool {
        let Some(session) = runtime.session.take() else {
            return false;
        };

        session.cancel.cancel();
        if let Some(poll) = runtime.poll.take() {
            poll.cancel.cancel();
            if let Err(e) = poll.handle.await {
                if e.is_panic() {
                    tracing::error!(error = %e, "Poll loop panicked");
                }
            }
        }
        for task in session.aux {
            task.abort();
            let _ = task.await;
        }

        self.inner.alert.shutdown();
        runtime.watchdog.disarm();
        self.inner.epoch.fetch_add(1, Ordering::AcqRel);
        self.inner.guard.release();
        self.inner.status.set_state(ServiceState::Idle);

        tracing::info!(session = %session.id, "Monitoring stopped");
        true
    }

    fn spawn_poll_locked(&self, runtime: &mut Runtime, settings: &MonitorConfig) {
        let Some(session) = runtime.session.as_ref() else {
            return;
        };
        let cancel = session.cancel.child_token();
        let handle = PollLoop::new(
            self.inner.source.clone(),
            self.inner.alert.clone(),
            self.inner.status.clone(),
            self.inner.device.clone(),
            settings.poll.clone(),
        )
        .within_session(session.cancel.clone())
        .spawn(cancel.clone());
        runtime.poll = Some(PollTask { cancel, handle });
    }

    async fn stop_poll_locked(&self, runtime: &mut Runtime) {
        if let Some(poll) = runtime.poll.take() {
            poll.cancel.cancel();
            if let Err(e) = poll.handle.await {
                if e.is_panic() {
                    tracing::error!(error = %e, "Poll loop panicked");
                }
            }
        }
    }

    async fn restart_poll_locked(&self, runtime: &mut Runtime) {
        self.stop_poll_locked(runtime).await;
        let settings = self.inner.settings.load_full();
        self.spawn_poll_locked(runtime, &settings);
    }

    fn spawn_aux_locked(&self, runtime: &mut Runtime, settings: &MonitorConfig) {
        let Some(session) = runtime.session.as_mut() else {
            return;
        };

        if let Some(endpoints) = &self.inner.endpoints {
            let probe = EndpointProbe::new(
                endpoints.clone(),
                Duration::from_millis(settings.endpoints.probe_timeout_ms),
            );
            let hint = self.inner.probe_hint.clone().unwrap_or_default();
            let interval = (settings.endpoints.probe_interval_secs > 0)
                .then(|| Duration::from_secs(settings.endpoints.probe_interval_secs));
            session
                .aux
                .push(tokio::spawn(probe.run(hint, interval, session.cancel.child_token())));
        }

        if settings.poll.recycle_interval_secs > 0 {
            let every = Duration::from_secs(settings.poll.recycle_interval_secs);
            session.aux.push(tokio::spawn(recycle_loop(
                Arc::downgrade(&self.inner),
                every,
                session.cancel.child_token(),
            )));
        }
    }

    /// Restart the poll loop unless an alert is in progress. The hold keeps
    /// the old loop from starting an alert while it is being cancelled; the
    /// new loop picks the signal up on its first poll.
    async fn recycle(&self) {
        let mut runtime = self.inner.runtime.lock().await;
        if runtime.session.is_none() {
            return;
        }
        let Some(hold) = self.inner.status.hold_for_recycle() else {
            return;
        };
        tracing::debug!("Recycling poll loop");
        self.stop_poll_locked(&mut runtime).await;
        drop(hold);
        let settings = self.inner.settings.load_full();
        self.spawn_poll_locked(&mut runtime, &settings);
    }
}

async fn recycle_loop(inner: Weak<Inner>, every: Duration, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(every) => {}
        }
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let controller = ServiceController { inner };
        controller.recycle().await;
    }
}
