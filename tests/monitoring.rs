mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{start_programmable_backend, wait_for, RecordingAudio, RecordingVibrator};
use ring_monitor::config::MonitorConfig;
use ring_monitor::lifecycle::{ControllerParts, EnsureOutcome, NoopWakeLock, ServiceController};
use ring_monitor::net::{EndpointSet, FailoverClient};
use ring_monitor::poller::{DeviceIdentity, ServiceState};

struct Setup {
    controller: ServiceController,
    ringing: Arc<AtomicBool>,
    audio: Arc<RecordingAudio>,
    vibrator: Arc<RecordingVibrator>,
}

async fn setup() -> Setup {
    setup_with(true).await
}

/// `success` is what the backend reports in every body.
async fn setup_with(success: bool) -> Setup {
    let ringing = Arc::new(AtomicBool::new(false));
    let flag = ringing.clone();
    let backend = start_programmable_backend(move || {
        let ring = flag.load(Ordering::SeqCst);
        let body = if success {
            format!(r#"{{"success":true,"shouldAlert":{}}}"#, ring)
        } else {
            format!(r#"{{"success":false,"shouldAlert":{},"error":"device not registered"}}"#, ring)
        };
        async move { (200, body) }
    })
    .await;

    let mut config = MonitorConfig::default();
    config.endpoints.urls = vec!["http://127.0.0.1:9/".to_string(), backend.url()];
    config.endpoints.probe_timeout_ms = 200;
    config.client.tries = 1;
    config.client.retry_delay_ms = 10;
    config.client.connect_timeout_secs = 1;
    config.poll.interval_ms = 50;
    config.poll.failure_backoff_ms = 50;
    config.alert.replay_check_ms = 20;

    let endpoints = Arc::new(EndpointSet::new(config.endpoints.urls.iter()).unwrap());
    let client = FailoverClient::new(&config.client, endpoints.clone(), &config.endpoints.status_path)
        .unwrap();
    let audio = Arc::new(RecordingAudio::default());
    let vibrator = Arc::new(RecordingVibrator::default());

    let controller = ServiceController::with_parts(
        config,
        DeviceIdentity::new("handset-e2e"),
        ControllerParts {
            probe_hint: Some(client.probe_hint()),
            source: Arc::new(client),
            endpoints: Some(endpoints),
            audio: audio.clone(),
            vibrator: vibrator.clone(),
            wake_lock: Arc::new(NoopWakeLock),
            watchdog: None,
        },
    );

    Setup {
        controller,
        ringing,
        audio,
        vibrator,
    }
}

#[tokio::test]
async fn test_rings_while_signal_is_set() {
    let s = setup().await;
    assert_eq!(s.controller.ensure_running().await, EnsureOutcome::Started);

    let status = s.controller.status().clone();
    assert!(wait_for(|| status.last_success_age().is_some(), Duration::from_secs(5)).await);
    assert_eq!(s.controller.state(), ServiceState::Monitoring);
    assert!(s.audio.silent.load(Ordering::SeqCst));

    s.ringing.store(true, Ordering::SeqCst);
    assert!(wait_for(|| status.state() == ServiceState::Alerting, Duration::from_secs(5)).await);
    assert!(wait_for(|| s.audio.alert.load(Ordering::SeqCst), Duration::from_secs(1)).await);
    assert!(s.vibrator.active.load(Ordering::SeqCst));
    assert!(!s.audio.silent.load(Ordering::SeqCst));

    s.ringing.store(false, Ordering::SeqCst);
    assert!(wait_for(|| status.state() == ServiceState::Monitoring, Duration::from_secs(5)).await);
    assert!(!s.audio.alert.load(Ordering::SeqCst));
    assert!(!s.vibrator.active.load(Ordering::SeqCst));
    assert!(s.audio.silent.load(Ordering::SeqCst));
    assert!(!s.audio.overlap.load(Ordering::SeqCst));

    let snapshot = s.controller.snapshot().await;
    assert_eq!(snapshot.current_endpoint.as_deref().map(|u| u.contains(":9/")), Some(false));

    s.controller.stop().await;
    assert_eq!(s.controller.state(), ServiceState::Idle);
}

#[tokio::test]
async fn test_rings_even_when_server_reports_error() {
    let s = setup_with(false).await;
    s.ringing.store(true, Ordering::SeqCst);
    s.controller.start().await;

    let status = s.controller.status().clone();
    assert!(wait_for(|| status.state() == ServiceState::Alerting, Duration::from_secs(5)).await);
    assert!(wait_for(|| s.audio.alert.load(Ordering::SeqCst), Duration::from_secs(1)).await);
    assert!(s.vibrator.active.load(Ordering::SeqCst));
    assert!(status.last_success_age().is_some());

    s.controller.stop().await;
    assert!(!s.audio.alert.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_stop_during_alert_goes_quiet() {
    let s = setup().await;
    s.ringing.store(true, Ordering::SeqCst);
    s.controller.start().await;

    let status = s.controller.status().clone();
    assert!(wait_for(|| status.state() == ServiceState::Alerting, Duration::from_secs(5)).await);

    assert!(s.controller.stop().await);
    assert!(!s.controller.stop().await);
    assert_eq!(s.controller.state(), ServiceState::Idle);
    assert!(!s.audio.alert.load(Ordering::SeqCst));
    assert!(!s.audio.silent.load(Ordering::SeqCst));
    assert!(!s.vibrator.active.load(Ordering::SeqCst));

    let snapshot = s.controller.snapshot().await;
    assert!(snapshot.wake_sources.is_empty());
    assert!(!snapshot.guard_held);
}

#[tokio::test]
async fn test_restart_keeps_endpoint_affinity() {
    let s = setup().await;
    s.controller.start().await;
    let status = s.controller.status().clone();
    assert!(wait_for(|| status.last_success_age().is_some(), Duration::from_secs(5)).await);
    let before = s.controller.snapshot().await;

    s.controller.restart().await;
    let after = s.controller.snapshot().await;
    assert_eq!(before.current_endpoint, after.current_endpoint);
    assert_ne!(before.session_id, after.session_id);
    assert_eq!(after.state, ServiceState::Monitoring);

    s.controller.stop().await;
}
