//! The poll loop task.
//!
//! One iteration: poll, apply the result to the alert state, sleep. A failed
//! cycle adds the failure back-off before the normal interval. The loop only
//! ends through its cancellation token (or an abort), and a drop guard
//! silences the alert on every exit path. When the whole session is being
//! stopped the guard shuts the alert driver down instead of resuming the
//! silent loop.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::alert::AlertDriver;
use crate::config::PollConfig;
use crate::net::client::StatusSource;
use crate::net::types::PollResult;
use crate::poller::state::{DeviceIdentity, ServiceState, StatusBoard};

pub struct PollLoop {
    source: Arc<dyn StatusSource>,
    alert: Arc<AlertDriver>,
    status: Arc<StatusBoard>,
    device: DeviceIdentity,
    settings: PollConfig,
    session: Option<CancellationToken>,
}

/// Stops ringing and vibration when the loop task ends, however it ends.
struct CleanupGuard {
    alert: Arc<AlertDriver>,
    status: Arc<StatusBoard>,
    session: Option<CancellationToken>,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if self.session.as_ref().is_some_and(CancellationToken::is_cancelled) {
            self.alert.shutdown();
        } else {
            self.alert.leave_loud();
        }
        self.status
            .transition(ServiceState::Alerting, ServiceState::Monitoring);
    }
}

impl PollLoop {
    pub fn new(
        source: Arc<dyn StatusSource>,
        alert: Arc<AlertDriver>,
        status: Arc<StatusBoard>,
        device: DeviceIdentity,
        settings: PollConfig,
    ) -> Self {
        Self {
            source,
            alert,
            status,
            device,
            settings,
            session: None,
        }
    }

    /// Tie the loop to a monitoring session. Once `session` is cancelled the
    /// loop exits fully silent.
    pub fn within_session(mut self, session: CancellationToken) -> Self {
        self.session = Some(session);
        self
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    pub async fn run(self, cancel: CancellationToken) {
        let generation = self.status.record_loop_start();
        let _cleanup = CleanupGuard {
            alert: self.alert.clone(),
            status: self.status.clone(),
            session: self.session.clone(),
        };
        tracing::info!(generation, device = %self.device, "Poll loop started");

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.source.poll(&self.device) => result,
            };

            let pause = if result.succeeded {
                self.apply(&result);
                self.settings.interval()
            } else {
                tracing::warn!(
                    http_status = ?result.http_status,
                    backoff_ms = self.settings.failure_backoff_ms,
                    "Poll failed"
                );
                self.settings.failure_backoff() + self.settings.interval()
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        tracing::info!(generation, "Poll loop stopped");
    }

    fn apply(&self, result: &PollResult) {
        self.status.record_success();
        match result.should_alert {
            Some(true) => {
                if self
                    .status
                    .transition(ServiceState::Monitoring, ServiceState::Alerting)
                {
                    self.alert.enter_loud();
                }
            }
            Some(false) => {
                if self
                    .status
                    .transition(ServiceState::Alerting, ServiceState::Monitoring)
                {
                    self.alert.leave_loud();
                }
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::alert::{AlertMode, DriverSettings};
    use crate::alert::output::{AudioOutput, VibrationPattern};
    use crate::testing::{AudioEvent, FakeAudio, FakeVibrator, ScriptedSource};

    struct Harness {
        source: Arc<ScriptedSource>,
        audio: Arc<FakeAudio>,
        vibrator: Arc<FakeVibrator>,
        alert: Arc<AlertDriver>,
        status: Arc<StatusBoard>,
    }

    fn harness() -> Harness {
        let audio = Arc::new(FakeAudio::default());
        let vibrator = Arc::new(FakeVibrator::default());
        let alert = Arc::new(AlertDriver::new(
            audio.clone(),
            vibrator.clone(),
            DriverSettings {
                pattern: VibrationPattern::repeating(&[0, 1000, 1000]),
                replay_check: Duration::from_millis(500),
                play_error_delay: Duration::from_secs(1),
                silent_retry_delay: Duration::from_secs(5),
            },
        ));
        let status = Arc::new(StatusBoard::new());
        status.set_state(ServiceState::Monitoring);
        alert.enter_silent();
        Harness {
            source: Arc::new(ScriptedSource::new(PollResult::success(None, Some(200)))),
            audio,
            vibrator,
            alert,
            status,
        }
    }

    impl Harness {
        fn spawn(&self, cancel: CancellationToken) -> JoinHandle<()> {
            PollLoop::new(
                self.source.clone(),
                self.alert.clone(),
                self.status.clone(),
                DeviceIdentity::new("dev"),
                PollConfig::default(),
            )
            .spawn(cancel)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_alert_follows_signal_sequence() {
        let h = harness();
        for flag in [false, true, true, false] {
            h.source.push(PollResult::success(Some(flag), Some(200)));
        }
        let cancel = CancellationToken::new();
        let task = h.spawn(cancel.clone());

        // Polls land at 0s, 7s, 14s and 21s; sample one second after each.
        let expected = [false, true, true, false];
        tokio::time::sleep(Duration::from_secs(1)).await;
        for (i, loud) in expected.iter().enumerate() {
            let state = if *loud { ServiceState::Alerting } else { ServiceState::Monitoring };
            assert_eq!(h.status.state(), state, "cycle {i}");
            assert_eq!(h.audio.is_alert_playing(), *loud, "cycle {i}");
            assert_eq!(h.audio.is_silent_playing(), !*loud, "cycle {i}");
            assert_eq!(h.vibrator.is_vibrating(), *loud, "cycle {i}");
            tokio::time::sleep(Duration::from_secs(7)).await;
        }

        assert!(!h.audio.overlapped());
        cancel.cancel();
        task.await.unwrap();
        assert_eq!(h.source.calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_alerting_silences_before_exit() {
        let h = harness();
        h.source.set_fallback(PollResult::success(Some(true), Some(200)));
        let cancel = CancellationToken::new();
        let task = h.spawn(cancel.clone());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.alert.mode(), AlertMode::Loud);

        cancel.cancel();
        task.await.unwrap();
        assert!(!h.audio.is_alert_playing());
        assert!(!h.vibrator.is_vibrating());
        assert_eq!(h.alert.mode(), AlertMode::Silent);
        assert_eq!(h.status.state(), ServiceState::Monitoring);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_stop_while_alerting_leaves_audio_off() {
        let h = harness();
        h.source.set_fallback(PollResult::success(Some(true), Some(200)));
        let session = CancellationToken::new();
        let task = PollLoop::new(
            h.source.clone(),
            h.alert.clone(),
            h.status.clone(),
            DeviceIdentity::new("dev"),
            PollConfig::default(),
        )
        .within_session(session.clone())
        .spawn(session.child_token());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.alert.mode(), AlertMode::Loud);
        let silent_starts = h.audio.count(AudioEvent::SilentStart);

        session.cancel();
        task.await.unwrap();
        assert_eq!(h.audio.count(AudioEvent::SilentStart), silent_starts);
        assert_eq!(h.alert.mode(), AlertMode::Off);
        assert!(!h.audio.is_alert_playing());
        assert!(!h.audio.is_silent_playing());
        assert!(!h.vibrator.is_vibrating());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_while_alerting_silences() {
        let h = harness();
        h.source.set_fallback(PollResult::success(Some(true), Some(200)));
        let task = h.spawn(CancellationToken::new());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(h.vibrator.is_vibrating());

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(!h.vibrator.is_vibrating());
        assert!(!h.audio.is_alert_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_adds_backoff() {
        let h = harness();
        h.source.set_fallback(PollResult::failure(Some(503)));
        let cancel = CancellationToken::new();
        let task = h.spawn(cancel.clone());

        // Failed cycles repeat every 5s + 7s.
        tokio::time::sleep(Duration::from_secs(13)).await;
        assert_eq!(h.source.calls(), 2);
        assert_eq!(h.status.last_success_age(), None);
        assert_eq!(h.status.state(), ServiceState::Monitoring);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_signal_keeps_state() {
        let h = harness();
        let cancel = CancellationToken::new();
        let task = h.spawn(cancel.clone());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.status.state(), ServiceState::Monitoring);
        assert!(h.status.last_success_age().is_some());
        assert_eq!(h.status.loop_starts(), 1);

        cancel.cancel();
        task.await.unwrap();
    }
}
