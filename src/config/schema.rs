//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the monitor.
//! All types derive Serde traits for deserialization from config files, and
//! every section falls back to its `Default` so a minimal file only needs the
//! values it wants to change.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the ring monitor.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Device identity and display region.
    pub device: DeviceConfig,

    /// Candidate status endpoints and probe settings.
    pub endpoints: EndpointsConfig,

    /// Per-request client behaviour (tries, timeouts, TLS).
    pub client: ClientConfig,

    /// Poll loop cadence.
    pub poll: PollConfig,

    /// Alert driver (sound and vibration).
    pub alert: AlertConfig,

    /// Wake source intervals.
    pub watchdog: WatchdogConfig,

    /// Liveness guard backend.
    pub guard: GuardConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin control surface.
    pub admin: AdminConfig,
}

/// Display region. Only affects status text.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    #[default]
    Default,
    Jp,
}

/// Device configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct DeviceConfig {
    /// Explicit device identity. Resolved from the host when absent.
    pub id: Option<String>,

    /// Region flag for status text.
    pub region: Region,
}

/// Endpoint registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EndpointsConfig {
    /// Ordered base URLs (primary first).
    pub urls: Vec<String>,

    /// Path appended to each base URL for the status request.
    pub status_path: String,

    /// Interval of the background reachability probe in seconds (0 disables).
    pub probe_interval_secs: u64,

    /// Connect timeout for a single probe in milliseconds.
    pub probe_timeout_ms: u64,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            urls: vec![
                "https://192.168.254.163/".to_string(),
                "https://126.209.7.246/".to_string(),
            ],
            status_path: "status".to_string(),
            probe_interval_secs: 60,
            probe_timeout_ms: 1000,
        }
    }
}

/// Failover client configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Attempts per endpoint before failing over.
    pub tries: u32,

    /// Fixed delay between attempts in milliseconds.
    pub retry_delay_ms: u64,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Total request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Accept self-issued or otherwise invalid TLS certificates.
    ///
    /// INSECURE. Only for deployments whose endpoints use self-signed
    /// certificates. Disables certificate and hostname verification.
    pub accept_invalid_certs: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tries: 3,
            retry_delay_ms: 500,
            connect_timeout_secs: 2,
            request_timeout_secs: 10,
            accept_invalid_certs: false,
        }
    }
}

impl ClientConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Poll loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PollConfig {
    /// Delay between poll cycles in milliseconds.
    pub interval_ms: u64,

    /// Extra back-off after a failed cycle in milliseconds.
    pub failure_backoff_ms: u64,

    /// Restart the poll loop this often while not alerting (0 disables).
    pub recycle_interval_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 7_000,
            failure_backoff_ms: 5_000,
            recycle_interval_secs: 180,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn failure_backoff(&self) -> Duration {
        Duration::from_millis(self.failure_backoff_ms)
    }
}

/// Alert driver configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AlertConfig {
    /// Vibration waveform: leading delay, then alternating on/off durations (ms).
    pub vibration_pattern_ms: Vec<u64>,

    /// How often the loud loop checks that the alert sound is still playing (ms).
    pub replay_check_ms: u64,

    /// Pause after a failed alert playback before trying again (ms).
    pub play_error_delay_ms: u64,

    /// Delay before the single retry of a failed silent loop start (ms).
    pub silent_retry_delay_ms: u64,

    /// Command that plays the alert sound once. Terminal bell when empty.
    pub alert_command: Vec<String>,

    /// Command that plays the silent clip. `{clip}` is replaced by the clip path.
    pub silent_command: Vec<String>,

    /// Where the generated silent clip is written.
    pub silent_clip_path: String,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            vibration_pattern_ms: vec![0, 1000, 1000],
            replay_check_ms: 500,
            play_error_delay_ms: 1000,
            silent_retry_delay_ms: 5000,
            alert_command: Vec::new(),
            silent_command: Vec::new(),
            silent_clip_path: std::env::temp_dir()
                .join("ring-monitor-silent.wav")
                .to_string_lossy()
                .into_owned(),
        }
    }
}

/// Wake source intervals.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct WatchdogConfig {
    /// One-shot self timer, re-armed after each firing (seconds).
    pub self_timer_secs: u64,

    /// Earliest point of the periodic job window (seconds).
    pub job_min_latency_secs: u64,

    /// Latest point of the periodic job window (seconds).
    pub job_deadline_secs: u64,

    /// Initial delay of the deferred work request (seconds).
    pub deferred_initial_delay_secs: u64,

    /// Period of the deferred work request (seconds).
    pub deferred_period_secs: u64,

    /// Base of the deferred work retry backoff (ms).
    pub deferred_backoff_base_ms: u64,

    /// Cap of the deferred work retry backoff (ms).
    pub deferred_backoff_max_ms: u64,

    /// Heartbeat period; renews the liveness guard (seconds).
    pub heartbeat_secs: u64,

    /// Keep-alive period; re-checks poll task and silent audio (seconds).
    pub keep_alive_secs: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            self_timer_secs: 60,
            job_min_latency_secs: 15,
            job_deadline_secs: 45,
            deferred_initial_delay_secs: 30,
            deferred_period_secs: 900,
            deferred_backoff_base_ms: 10_000,
            deferred_backoff_max_ms: 300_000,
            heartbeat_secs: 60,
            keep_alive_secs: 30,
        }
    }
}

/// Wake lock backend selection.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum GuardBackend {
    /// In-process token only.
    #[default]
    None,
    /// Hold a `systemd-inhibit` child for the validity window.
    SystemdInhibit,
}

/// Liveness guard configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct GuardConfig {
    pub backend: GuardBackend,

    /// Validity window of one acquisition (seconds).
    pub validity_secs: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            backend: GuardBackend::None,
            validity_secs: 3600,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Serve the admin surface.
    pub enabled: bool,

    /// Bearer key. Empty disables authentication (loopback use only).
    pub api_key: String,

    /// Admin surface bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: String::new(),
            bind_address: "127.0.0.1:8087".to_string(),
        }
    }
}
