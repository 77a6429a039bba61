//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Triggers (controller.rs):
//!     admin / CLI / wake sources / SIGHUP
//!         → ServiceController (one async mutex around the runtime record)
//!         → start | stop | toggle | restart | ensure_running
//!
//! Start:
//!     Monitoring → guard.acquire → silent audio → arm watchdog
//!         → spawn poll loop, probe, recycle
//!
//! Stop:
//!     cancel poll loop + aux (await cleanup) → alert shutdown
//!         → disarm watchdog → guard.release → Idle
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → shutdown.rs broadcast → daemon stops and exits
//!     SIGHUP → restart monitoring
//! ```
//!
//! # Design Decisions
//! - Every entry point is idempotent; duplicate triggers are expected
//! - Wake callbacks hold a weak handle and a registration epoch, so a fire
//!   racing a stop cannot restart the service

pub mod controller;
pub mod guard;
pub mod shutdown;
pub mod signals;

pub use controller::{ControllerParts, EnsureOutcome, ServiceController, ServiceError, StatusSnapshot};
pub use guard::{GuardError, LivenessGuard, NoopWakeLock, SystemdInhibitLock, WakeLockBackend};
pub use shutdown::{Shutdown, ShutdownReason};
pub use signals::{spawn_signal_handler, SignalEvent, Signals};
