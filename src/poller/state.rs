//! Service state, device identity and the shared status board.
//!
//! # States
//! ```text
//! Idle ──start──▶ Monitoring ──shouldAlert=true──▶ Alerting
//!  ▲                  │  ▲                           │
//!  │                  │  └──────shouldAlert=false────┘
//!  └──────stop────────┴──────────────stop────────────┘
//! ```
//!
//! `Alerting` is only entered from `Monitoring`; only an explicit stop
//! returns to `Idle`.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::Region;
use crate::observability::metrics;

/// Sentinel used when no identity can be resolved.
pub const UNKNOWN_DEVICE: &str = "unknown-device";

/// Opaque polling key, resolved once per process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Resolve the identity: explicit value, then `RING_DEVICE_ID`, then
    /// `/etc/machine-id`, then the sentinel.
    pub fn resolve(explicit: Option<&str>) -> Self {
        Self::resolve_from(explicit, std::env::var("RING_DEVICE_ID").ok(), || {
            std::fs::read_to_string(Path::new("/etc/machine-id"))
                .map_err(|e| tracing::debug!(error = %e, "No machine id available"))
                .ok()
        })
    }

    /// Blank candidates fall through to the next one.
    fn resolve_from(
        explicit: Option<&str>,
        from_env: Option<String>,
        from_host: impl FnOnce() -> Option<String>,
    ) -> Self {
        fn usable(id: &str) -> Option<String> {
            let id = id.trim();
            (!id.is_empty()).then(|| id.to_string())
        }

        let resolved = explicit
            .and_then(usable)
            .or_else(|| from_env.as_deref().and_then(usable))
            .or_else(|| from_host().as_deref().and_then(usable));

        match resolved {
            Some(id) => Self(id),
            None => {
                tracing::warn!("Device identity unavailable, using sentinel");
                Self(UNKNOWN_DEVICE.to_string())
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_sentinel(&self) -> bool {
        self.0 == UNKNOWN_DEVICE
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Idle,
    Monitoring,
    Alerting,
}

impl ServiceState {
    pub fn is_active(self) -> bool {
        self != ServiceState::Idle
    }

    /// Human-readable status line in the requested region.
    pub fn status_line(self, region: Region) -> &'static str {
        match (region, self) {
            (Region::Default, ServiceState::Alerting) => "RINGING - alert active",
            (Region::Default, ServiceState::Monitoring) => "Active - monitoring",
            (Region::Default, ServiceState::Idle) => "Inactive - start to monitor",
            (Region::Jp, ServiceState::Alerting) => "鳴っています - アラート中",
            (Region::Jp, ServiceState::Monitoring) => "アクティブ - 監視中",
            (Region::Jp, ServiceState::Idle) => "非アクティブ - 開始してください",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceState::Idle => "idle",
            ServiceState::Monitoring => "monitoring",
            ServiceState::Alerting => "alerting",
        };
        f.write_str(name)
    }
}

/// Shared, observable state written by the controller and the poll loop.
#[derive(Debug)]
pub struct StatusBoard {
    state: watch::Sender<ServiceState>,
    last_success: Mutex<Option<Instant>>,
    loop_starts: AtomicU64,
    recycling: AtomicBool,
}

/// Keeps the board out of `Alerting` while the poll loop is replaced.
#[derive(Debug)]
pub(crate) struct RecycleHold<'a> {
    board: &'a StatusBoard,
}

impl Drop for RecycleHold<'_> {
    fn drop(&mut self) {
        self.board.recycling.store(false, Ordering::Release);
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ServiceState::Idle);
        Self {
            state,
            last_success: Mutex::new(None),
            loop_starts: AtomicU64::new(0),
            recycling: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ServiceState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ServiceState> {
        self.state.subscribe()
    }

    pub(crate) fn set_state(&self, next: ServiceState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::info!(from = %previous, to = %next, "Service state changed");
            metrics::record_state(next);
        }
    }

    /// Flip `Monitoring → Alerting` or back. Refuses to leave or enter `Idle`,
    /// and refuses to enter `Alerting` while a recycle hold is out.
    pub(crate) fn transition(&self, from: ServiceState, to: ServiceState) -> bool {
        let mut changed = false;
        self.state.send_if_modified(|current| {
            let held = to == ServiceState::Alerting && self.recycling.load(Ordering::Acquire);
            if *current == from && from.is_active() && to.is_active() && !held {
                *current = to;
                changed = true;
            }
            changed
        });
        if changed {
            tracing::info!(from = %from, to = %to, "Service state changed");
            metrics::record_state(to);
        }
        changed
    }

    /// Pin the board in `Monitoring` until the hold is dropped. `None` unless
    /// the state is `Monitoring` right now. Checked and taken under the same
    /// lock as `transition`.
    pub(crate) fn hold_for_recycle(&self) -> Option<RecycleHold<'_>> {
        let mut held = false;
        self.state.send_if_modified(|current| {
            if *current == ServiceState::Monitoring {
                self.recycling.store(true, Ordering::Release);
                held = true;
            }
            false
        });
        held.then_some(RecycleHold { board: self })
    }

    pub(crate) fn record_success(&self) {
        *self.last_success.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    /// Time since the last successful poll, if any.
    pub fn last_success_age(&self) -> Option<Duration> {
        self.last_success
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|at| at.elapsed())
    }

    pub(crate) fn record_loop_start(&self) -> u64 {
        metrics::record_loop_start();
        self.loop_starts.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Number of poll loops ever started.
    pub fn loop_starts(&self) -> u64 {
        self.loop_starts.load(Ordering::Acquire)
    }
}
