//! Liveness guard: a "do not suspend" token with a bounded validity window.
//!
//! The guard is held while monitoring and renewed by the heartbeat wake
//! source. If nobody renews it, it lapses on its own.

use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use crate::config::GuardBackend;

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("wake lock backend failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("wake lock refused: {0}")]
    Refused(String),
}

/// Host mechanism that keeps the machine from suspending.
pub trait WakeLockBackend: Send + Sync {
    fn name(&self) -> &'static str;
    fn acquire(&self, validity: Duration) -> Result<(), GuardError>;
    fn release(&self);
}

/// In-process token only.
#[derive(Debug, Default)]
pub struct NoopWakeLock;

impl WakeLockBackend for NoopWakeLock {
    fn name(&self) -> &'static str {
        "none"
    }

    fn acquire(&self, _validity: Duration) -> Result<(), GuardError> {
        Ok(())
    }

    fn release(&self) {}
}

/// Holds a `systemd-inhibit` child for the validity window.
#[derive(Debug, Default)]
pub struct SystemdInhibitLock {
    child: Mutex<Option<Child>>,
}

impl WakeLockBackend for SystemdInhibitLock {
    fn name(&self) -> &'static str {
        "systemd-inhibit"
    }

    fn acquire(&self, validity: Duration) -> Result<(), GuardError> {
        self.release();
        let child = Command::new("systemd-inhibit")
            .args([
                "--what=sleep:idle",
                "--who=ring-monitor",
                "--why=Polling for alerts",
                "--mode=block",
                "sleep",
            ])
            .arg(validity.as_secs().max(1).to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        *self.child.lock().unwrap_or_else(PoisonError::into_inner) = Some(child);
        Ok(())
    }

    fn release(&self) {
        if let Some(mut child) = self.child.lock().unwrap_or_else(PoisonError::into_inner).take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for SystemdInhibitLock {
    fn drop(&mut self) {
        self.release();
    }
}

pub fn backend_for(kind: GuardBackend) -> Arc<dyn WakeLockBackend> {
    match kind {
        GuardBackend::None => Arc::new(NoopWakeLock),
        GuardBackend::SystemdInhibit => Arc::new(SystemdInhibitLock::default()),
    }
}

pub struct LivenessGuard {
    backend: Arc<dyn WakeLockBackend>,
    validity: Duration,
    expires_at: Mutex<Option<Instant>>,
}

impl std::fmt::Debug for LivenessGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivenessGuard")
            .field("backend", &self.backend.name())
            .field("validity", &self.validity)
            .field("held", &self.is_held())
            .finish()
    }
}

impl LivenessGuard {
    pub fn new(backend: Arc<dyn WakeLockBackend>, validity: Duration) -> Self {
        Self {
            backend,
            validity,
            expires_at: Mutex::new(None),
        }
    }

    /// Acquire for one validity window. No-op while a window is still open.
    pub fn acquire(&self) -> Result<(), GuardError> {
        let mut expires_at = self.expires_at.lock().unwrap_or_else(PoisonError::into_inner);
        if expires_at.is_some_and(|at| Instant::now() < at) {
            return Ok(());
        }
        self.backend.acquire(self.validity)?;
        *expires_at = Some(Instant::now() + self.validity);
        tracing::debug!(backend = self.backend.name(), validity_secs = self.validity.as_secs(), "Liveness guard acquired");
        Ok(())
    }

    /// Release, then acquire a fresh window.
    pub fn renew(&self) -> Result<(), GuardError> {
        self.release();
        self.acquire()
    }

    /// Idempotent.
    pub fn release(&self) {
        let previous = self.expires_at.lock().unwrap_or_else(PoisonError::into_inner).take();
        if previous.is_some() {
            self.backend.release();
            tracing::debug!(backend = self.backend.name(), "Liveness guard released");
        }
    }

    /// Held and not yet lapsed.
    pub fn is_held(&self) -> bool {
        self.expires_in().is_some()
    }

    pub fn expires_in(&self) -> Option<Duration> {
        self.expires_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .and_then(|at| at.checked_duration_since(Instant::now()))
            .filter(|left| !left.is_zero())
    }
}

impl Drop for LivenessGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeWakeLock;

    fn guard(validity: Duration) -> (LivenessGuard, Arc<FakeWakeLock>) {
        let lock = Arc::new(FakeWakeLock::default());
        (LivenessGuard::new(lock.clone(), validity), lock)
    }

    #[tokio::test(start_paused = true)]
    async fn test_lapses_without_renewal() {
        let (guard, lock) = guard(Duration::from_secs(60));
        guard.acquire().unwrap();
        guard.acquire().unwrap();
        assert_eq!(lock.acquires(), 1);
        assert!(guard.is_held());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!guard.is_held());
    }

    #[tokio::test(start_paused = true)]
    async fn test_renew_opens_a_new_window() {
        let (guard, lock) = guard(Duration::from_secs(60));
        guard.acquire().unwrap();
        tokio::time::advance(Duration::from_secs(50)).await;
        guard.renew().unwrap();
        tokio::time::advance(Duration::from_secs(50)).await;

        assert!(guard.is_held());
        assert_eq!(lock.acquires(), 2);
        assert_eq!(lock.releases(), 1);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let (guard, lock) = guard(Duration::from_secs(60));
        guard.acquire().unwrap();
        guard.release();
        guard.release();
        assert!(!guard.is_held());
        assert_eq!(lock.releases(), 1);
    }

    #[tokio::test]
    async fn test_failed_renewal_leaves_guard_released() {
        let (guard, lock) = guard(Duration::from_secs(60));
        guard.acquire().unwrap();
        lock.set_failing(true);
        assert!(matches!(guard.renew(), Err(GuardError::Refused(_))));
        assert!(!guard.is_held());
    }
}
