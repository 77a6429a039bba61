//! The wake source seam.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use futures_util::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;

use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WakeKind {
    SelfTimer,
    PeriodicJob,
    DeferredWork,
    Heartbeat,
    KeepAlive,
}

impl fmt::Display for WakeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WakeKind::SelfTimer => "self-timer",
            WakeKind::PeriodicJob => "periodic-job",
            WakeKind::DeferredWork => "deferred-work",
            WakeKind::Heartbeat => "heartbeat",
            WakeKind::KeepAlive => "keep-alive",
        };
        f.write_str(name)
    }
}

/// What a source hands to the callback when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeSignal {
    pub source: &'static str,
    pub kind: WakeKind,
    pub fired_at: SystemTime,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WakeError {
    /// The controller behind the callback has been dropped.
    #[error("controller is gone")]
    ControllerGone,

    /// The callback belongs to a registration that has been replaced.
    #[error("stale registration (epoch {fired}, current {current})")]
    Stale { fired: u64, current: u64 },

    #[error("wake handling failed: {0}")]
    Failed(String),
}

impl WakeError {
    /// Terminal errors end the source's task instead of being retried.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WakeError::ControllerGone | WakeError::Stale { .. })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("{source_name}: interval must be greater than zero")]
    ZeroInterval { source_name: &'static str },

    #[error("{source_name}: no async runtime to schedule on")]
    NoRuntime { source_name: &'static str },

    #[error("{source_name}: {reason}")]
    Rejected {
        source_name: &'static str,
        reason: String,
    },
}

pub type WakeCallback =
    Arc<dyn Fn(WakeSignal) -> BoxFuture<'static, Result<(), WakeError>> + Send + Sync>;

/// Snapshot of one registered source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WakeSourceRegistration {
    pub name: &'static str,
    pub kind: WakeKind,
    pub interval: Duration,
    pub last_fired_at: Option<SystemTime>,
}

/// One independent way of getting the service woken up.
pub trait TriggerSource: Send + Sync {
    fn name(&self) -> &'static str;
    fn kind(&self) -> WakeKind;

    /// Nominal interval between firings (upper bound for windowed sources).
    fn interval(&self) -> Duration;

    /// Start firing `callback`. Registering again replaces the previous
    /// registration.
    fn register(&mut self, callback: WakeCallback) -> Result<(), RegistrationError>;

    /// Stop firing and cancel any pending re-arm. Idempotent.
    fn unregister(&mut self);

    fn is_registered(&self) -> bool;
    fn last_fired_at(&self) -> Option<SystemTime>;

    fn registration(&self) -> WakeSourceRegistration {
        WakeSourceRegistration {
            name: self.name(),
            kind: self.kind(),
            interval: self.interval(),
            last_fired_at: self.last_fired_at(),
        }
    }
}

/// Last firing time shared between a source and its task.
#[derive(Debug, Clone, Default)]
pub(crate) struct FireLog(Arc<Mutex<Option<SystemTime>>>);

impl FireLog {
    pub(crate) fn get(&self) -> Option<SystemTime> {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the firing and run the callback.
    pub(crate) async fn fire(
        &self,
        source: &'static str,
        kind: WakeKind,
        callback: &WakeCallback,
    ) -> Result<(), WakeError> {
        let fired_at = SystemTime::now();
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(fired_at);
        metrics::record_wake(source);
        tracing::debug!(source, kind = %kind, "Wake source fired");
        callback(WakeSignal {
            source,
            kind,
            fired_at,
        })
        .await
    }
}
