//! Timer-backed wake sources.
//!
//! Every source runs as one tokio task holding the callback; unregistering
//! aborts the task, which also drops any pending re-arm or backoff sleep.

use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::WatchdogConfig;
use crate::resilience::backoff::{calculate_backoff, jittered_window};
use crate::watchdog::source::{
    FireLog, RegistrationError, TriggerSource, WakeCallback, WakeKind,
};

/// Task slot shared by all timer sources.
#[derive(Debug, Default)]
struct Slot {
    task: Option<JoinHandle<()>>,
    fires: FireLog,
}

impl Slot {
    fn spawn<F>(
        &mut self,
        name: &'static str,
        interval: Duration,
        task: F,
    ) -> Result<(), RegistrationError>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        if interval.is_zero() {
            return Err(RegistrationError::ZeroInterval { source_name: name });
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| RegistrationError::NoRuntime { source_name: name })?;
        self.cancel();
        self.task = Some(runtime.spawn(task));
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn is_armed(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Precise one-shot deadline, re-armed after every firing.
#[derive(Debug)]
pub struct SelfTimer {
    delay: Duration,
    slot: Slot,
}

impl SelfTimer {
    pub const NAME: &'static str = "self-timer";

    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            slot: Slot::default(),
        }
    }
}

impl TriggerSource for SelfTimer {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn kind(&self) -> WakeKind {
        WakeKind::SelfTimer
    }

    fn interval(&self) -> Duration {
        self.delay
    }

    fn register(&mut self, callback: WakeCallback) -> Result<(), RegistrationError> {
        let delay = self.delay;
        let fires = self.slot.fires.clone();
        self.slot.spawn(Self::NAME, delay, async move {
            let mut deadline = Instant::now() + delay;
            loop {
                time::sleep_until(deadline).await;
                if let Err(e) = fires.fire(Self::NAME, WakeKind::SelfTimer, &callback).await {
                    if e.is_terminal() {
                        break;
                    }
                    tracing::warn!(source = Self::NAME, error = %e, "Wake callback failed");
                }
                deadline = Instant::now() + delay;
            }
        })
    }

    fn unregister(&mut self) {
        self.slot.cancel();
    }

    fn is_registered(&self) -> bool {
        self.slot.is_armed()
    }

    fn last_fired_at(&self) -> Option<SystemTime> {
        self.slot.fires.get()
    }
}

/// Fires at a random point of a `[min_latency, deadline]` window, the way a
/// host job scheduler batches deferrable work.
#[derive(Debug)]
pub struct PeriodicJob {
    min_latency: Duration,
    deadline: Duration,
    slot: Slot,
}

impl PeriodicJob {
    pub const NAME: &'static str = "periodic-job";

    pub fn new(min_latency: Duration, deadline: Duration) -> Self {
        Self {
            min_latency,
            deadline,
            slot: Slot::default(),
        }
    }
}

impl TriggerSource for PeriodicJob {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn kind(&self) -> WakeKind {
        WakeKind::PeriodicJob
    }

    fn interval(&self) -> Duration {
        self.deadline
    }

    fn register(&mut self, callback: WakeCallback) -> Result<(), RegistrationError> {
        let (min, max) = (self.min_latency, self.deadline);
        let fires = self.slot.fires.clone();
        self.slot.spawn(Self::NAME, max, async move {
            loop {
                time::sleep(jittered_window(min, max)).await;
                if let Err(e) = fires.fire(Self::NAME, WakeKind::PeriodicJob, &callback).await {
                    if e.is_terminal() {
                        break;
                    }
                    tracing::warn!(source = Self::NAME, error = %e, "Wake callback failed");
                }
            }
        })
    }

    fn unregister(&mut self) {
        self.slot.cancel();
    }

    fn is_registered(&self) -> bool {
        self.slot.is_armed()
    }

    fn last_fired_at(&self) -> Option<SystemTime> {
        self.slot.fires.get()
    }
}

/// Initial delay, then periodic. A failed callback is retried with
/// exponential backoff until it succeeds.
#[derive(Debug)]
pub struct DeferredWork {
    initial_delay: Duration,
    period: Duration,
    backoff_base_ms: u64,
    backoff_max_ms: u64,
    slot: Slot,
}

impl DeferredWork {
    pub const NAME: &'static str = "deferred-work";

    pub fn new(initial_delay: Duration, period: Duration) -> Self {
        Self {
            initial_delay,
            period,
            backoff_base_ms: 10_000,
            backoff_max_ms: 300_000,
            slot: Slot::default(),
        }
    }

    pub fn with_backoff(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.backoff_base_ms = base_ms;
        self.backoff_max_ms = max_ms;
        self
    }
}

impl TriggerSource for DeferredWork {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn kind(&self) -> WakeKind {
        WakeKind::DeferredWork
    }

    fn interval(&self) -> Duration {
        self.period
    }

    fn register(&mut self, callback: WakeCallback) -> Result<(), RegistrationError> {
        let (initial, period) = (self.initial_delay, self.period);
        let (base_ms, max_ms) = (self.backoff_base_ms, self.backoff_max_ms);
        let fires = self.slot.fires.clone();
        self.slot.spawn(Self::NAME, period, async move {
            time::sleep(initial).await;
            loop {
                let mut attempt = 0;
                loop {
                    match fires.fire(Self::NAME, WakeKind::DeferredWork, &callback).await {
                        Ok(()) => break,
                        Err(e) if e.is_terminal() => return,
                        Err(e) => {
                            attempt += 1;
                            let backoff = calculate_backoff(attempt, base_ms, max_ms);
                            tracing::warn!(
                                source = Self::NAME,
                                attempt,
                                backoff_ms = backoff.as_millis() as u64,
                                error = %e,
                                "Deferred work failed, retrying"
                            );
                            time::sleep(backoff).await;
                        }
                    }
                }
                time::sleep(period).await;
            }
        })
    }

    fn unregister(&mut self) {
        self.slot.cancel();
    }

    fn is_registered(&self) -> bool {
        self.slot.is_armed()
    }

    fn last_fired_at(&self) -> Option<SystemTime> {
        self.slot.fires.get()
    }
}

/// Fixed-period source; used for the heartbeat and keep-alive pair.
#[derive(Debug)]
pub struct Periodic {
    name: &'static str,
    kind: WakeKind,
    every: Duration,
    slot: Slot,
}

impl Periodic {
    pub fn heartbeat(every: Duration) -> Self {
        Self::new("heartbeat", WakeKind::Heartbeat, every)
    }

    pub fn keep_alive(every: Duration) -> Self {
        Self::new("keep-alive", WakeKind::KeepAlive, every)
    }

    pub fn new(name: &'static str, kind: WakeKind, every: Duration) -> Self {
        Self {
            name,
            kind,
            every,
            slot: Slot::default(),
        }
    }
}

impl TriggerSource for Periodic {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> WakeKind {
        self.kind
    }

    fn interval(&self) -> Duration {
        self.every
    }

    fn register(&mut self, callback: WakeCallback) -> Result<(), RegistrationError> {
        let (name, kind, every) = (self.name, self.kind, self.every);
        let fires = self.slot.fires.clone();
        self.slot.spawn(name, every, async move {
            let mut ticker = time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = fires.fire(name, kind, &callback).await {
                    if e.is_terminal() {
                        break;
                    }
                    tracing::warn!(source = name, error = %e, "Wake callback failed");
                }
            }
        })
    }

    fn unregister(&mut self) {
        self.slot.cancel();
    }

    fn is_registered(&self) -> bool {
        self.slot.is_armed()
    }

    fn last_fired_at(&self) -> Option<SystemTime> {
        self.slot.fires.get()
    }
}

/// The standard set of five sources.
pub fn default_sources(config: &WatchdogConfig) -> Vec<Box<dyn TriggerSource>> {
    vec![
        Box::new(SelfTimer::new(Duration::from_secs(config.self_timer_secs))),
        Box::new(PeriodicJob::new(
            Duration::from_secs(config.job_min_latency_secs),
            Duration::from_secs(config.job_deadline_secs),
        )),
        Box::new(
            DeferredWork::new(
                Duration::from_secs(config.deferred_initial_delay_secs),
                Duration::from_secs(config.deferred_period_secs),
            )
            .with_backoff(config.deferred_backoff_base_ms, config.deferred_backoff_max_ms),
        ),
        Box::new(Periodic::heartbeat(Duration::from_secs(config.heartbeat_secs))),
        Box::new(Periodic::keep_alive(Duration::from_secs(config.keep_alive_secs))),
    ]
}
