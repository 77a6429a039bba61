//! Alert driver: silent keep-alive loop versus loud alert loop.
//!
//! Both loops share one audio output and are never active at the same time.
//! Every mode change happens under the driver lock, and the loud loop
//! re-checks the mode under that lock before each playback, so a playback
//! can never start after the driver has left `Loud`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::alert::output::{AudioOutput, VibrationPattern, Vibrator};
use crate::config::AlertConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertMode {
    Off,
    Silent,
    Loud,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverSettings {
    pub pattern: VibrationPattern,
    pub replay_check: Duration,
    pub play_error_delay: Duration,
    pub silent_retry_delay: Duration,
}

impl From<&AlertConfig> for DriverSettings {
    fn from(config: &AlertConfig) -> Self {
        Self {
            pattern: VibrationPattern::repeating(&config.vibration_pattern_ms),
            replay_check: Duration::from_millis(config.replay_check_ms),
            play_error_delay: Duration::from_millis(config.play_error_delay_ms),
            silent_retry_delay: Duration::from_millis(config.silent_retry_delay_ms),
        }
    }
}

struct DriverState {
    mode: AlertMode,
    settings: DriverSettings,
    loud_task: Option<JoinHandle<()>>,
    silent_retry: Option<JoinHandle<()>>,
}

struct Shared {
    audio: Arc<dyn AudioOutput>,
    vibrator: Arc<dyn Vibrator>,
    state: Mutex<DriverState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, DriverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns the audio and vibration outputs for the lifetime of the service.
pub struct AlertDriver {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for AlertDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertDriver").field("mode", &self.mode()).finish()
    }
}

impl AlertDriver {
    pub fn new(
        audio: Arc<dyn AudioOutput>,
        vibrator: Arc<dyn Vibrator>,
        settings: DriverSettings,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                audio,
                vibrator,
                state: Mutex::new(DriverState {
                    mode: AlertMode::Off,
                    settings,
                    loud_task: None,
                    silent_retry: None,
                }),
            }),
        }
    }

    pub fn mode(&self) -> AlertMode {
        self.shared.lock().mode
    }

    /// Replace timings and pattern. Takes effect on the next mode change.
    pub fn update_settings(&self, settings: DriverSettings) {
        self.shared.lock().settings = settings;
    }

    /// Start the silent keep-alive loop, stopping the loud loop first.
    pub fn enter_silent(&self) {
        let mut state = self.shared.lock();
        if state.mode == AlertMode::Silent {
            return;
        }
        if state.mode == AlertMode::Loud {
            stop_loud(&self.shared, &mut state);
        }
        state.mode = AlertMode::Silent;
        start_silent(&self.shared, &mut state);
    }

    /// Stop the silent loop, start vibrating and looping the alert sound.
    pub fn enter_loud(&self) {
        let mut state = self.shared.lock();
        if state.mode == AlertMode::Loud {
            return;
        }
        stop_silent(&self.shared, &mut state);
        state.mode = AlertMode::Loud;

        if let Err(e) = self.shared.vibrator.vibrate(&state.settings.pattern) {
            tracing::warn!(error = %e, "Failed to start vibration");
        }

        let shared = self.shared.clone();
        let replay_check = state.settings.replay_check;
        let error_delay = state.settings.play_error_delay;
        state.loud_task = Some(tokio::spawn(loud_loop(shared, replay_check, error_delay)));
        tracing::info!("Alert started");
    }

    /// Stop the alert and go back to the silent loop. No-op unless loud.
    pub fn leave_loud(&self) {
        let mut state = self.shared.lock();
        if state.mode != AlertMode::Loud {
            return;
        }
        stop_loud(&self.shared, &mut state);
        state.mode = AlertMode::Silent;
        start_silent(&self.shared, &mut state);
        tracing::info!("Alert stopped");
    }

    /// Restart the silent loop if it should be playing but is not.
    pub fn ensure_silent(&self) {
        let mut state = self.shared.lock();
        if state.mode == AlertMode::Silent && !self.shared.audio.is_silent_playing() {
            tracing::debug!("Silent loop not playing, restarting");
            start_silent(&self.shared, &mut state);
        }
    }

    /// Stop everything. Vibration is cancelled even when not loud.
    pub fn shutdown(&self) {
        let mut state = self.shared.lock();
        stop_loud(&self.shared, &mut state);
        stop_silent(&self.shared, &mut state);
        state.mode = AlertMode::Off;
    }
}

impl Drop for AlertDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn stop_loud(shared: &Shared, state: &mut DriverState) {
    if let Some(task) = state.loud_task.take() {
        task.abort();
    }
    shared.audio.stop_alert();
    shared.vibrator.cancel();
}

fn stop_silent(shared: &Shared, state: &mut DriverState) {
    if let Some(task) = state.silent_retry.take() {
        task.abort();
    }
    shared.audio.stop_silent();
}

fn start_silent(shared: &Arc<Shared>, state: &mut DriverState) {
    if let Some(task) = state.silent_retry.take() {
        task.abort();
    }
    let Err(e) = shared.audio.start_silent() else {
        return;
    };

    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::warn!(error = %e, "Silent loop failed to start");
        return;
    };
    tracing::warn!(error = %e, "Silent loop failed to start, retrying once");
    let retry_shared = shared.clone();
    let delay = state.settings.silent_retry_delay;
    state.silent_retry = Some(runtime.spawn(async move {
        tokio::time::sleep(delay).await;
        let state = retry_shared.lock();
        if state.mode != AlertMode::Silent {
            return;
        }
        match retry_shared.audio.start_silent() {
            Ok(()) => tracing::info!("Silent loop recovered"),
            Err(e) => tracing::warn!(error = %e, "Silent loop retry failed"),
        }
    }));
}

async fn loud_loop(shared: Arc<Shared>, replay_check: Duration, error_delay: Duration) {
    loop {
        let pause = {
            let state = shared.lock();
            if state.mode != AlertMode::Loud {
                break;
            }
            if shared.audio.is_alert_playing() {
                replay_check
            } else {
                match shared.audio.play_alert() {
                    Ok(()) => replay_check,
                    Err(e) => {
                        tracing::warn!(error = %e, "Alert playback failed");
                        error_delay
                    }
                }
            }
        };
        tokio::time::sleep(pause).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{AudioEvent, FakeAudio, FakeVibrator};

    fn settings() -> DriverSettings {
        DriverSettings {
            pattern: VibrationPattern::repeating(&[0, 1000, 1000]),
            replay_check: Duration::from_millis(500),
            play_error_delay: Duration::from_millis(1000),
            silent_retry_delay: Duration::from_millis(5000),
        }
    }

    fn driver() -> (AlertDriver, Arc<FakeAudio>, Arc<FakeVibrator>) {
        let audio = Arc::new(FakeAudio::default());
        let vibrator = Arc::new(FakeVibrator::default());
        let driver = AlertDriver::new(audio.clone(), vibrator.clone(), settings());
        (driver, audio, vibrator)
    }

    #[tokio::test(start_paused = true)]
    async fn test_loud_replaces_silent_without_overlap() {
        let (driver, audio, vibrator) = driver();
        driver.enter_silent();
        assert!(audio.is_silent_playing());

        driver.enter_loud();
        tokio::task::yield_now().await;
        assert_eq!(driver.mode(), AlertMode::Loud);
        assert!(audio.is_alert_playing());
        assert!(!audio.is_silent_playing());
        assert!(vibrator.is_vibrating());

        driver.leave_loud();
        assert_eq!(driver.mode(), AlertMode::Silent);
        assert!(!audio.is_alert_playing());
        assert!(!vibrator.is_vibrating());
        assert!(audio.is_silent_playing());
        assert!(!audio.overlapped());
    }

    #[tokio::test(start_paused = true)]
    async fn test_alert_replays_when_playback_ends() {
        let (driver, audio, _) = driver();
        driver.enter_loud();
        tokio::task::yield_now().await;
        assert_eq!(audio.count(AudioEvent::AlertPlay), 1);

        audio.finish_alert();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(audio.count(AudioEvent::AlertPlay), 2);

        driver.leave_loud();
        audio.finish_alert();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(audio.count(AudioEvent::AlertPlay), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_start_retries_once() {
        let (driver, audio, _) = driver();
        audio.fail_silent_starts(1);
        driver.enter_silent();
        assert!(!audio.is_silent_playing());

        tokio::time::sleep(Duration::from_millis(5100)).await;
        assert!(audio.is_silent_playing());
        assert_eq!(audio.count(AudioEvent::SilentStart), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_retry_skipped_after_going_loud() {
        let (driver, audio, _) = driver();
        audio.fail_silent_starts(1);
        driver.enter_silent();
        driver.enter_loud();

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!audio.is_silent_playing());
        assert_eq!(audio.count(AudioEvent::SilentStart), 1);
        assert!(!audio.overlapped());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_vibration_unconditionally() {
        let (driver, audio, vibrator) = driver();
        driver.enter_silent();
        driver.shutdown();
        assert_eq!(driver.mode(), AlertMode::Off);
        assert!(!audio.is_silent_playing());
        assert_eq!(vibrator.cancels(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_silent_restarts_stopped_loop() {
        let (driver, audio, _) = driver();
        driver.enter_silent();
        audio.stop_silent();
        driver.ensure_silent();
        assert!(audio.is_silent_playing());
        assert_eq!(audio.count(AudioEvent::SilentStart), 2);
    }
}
