//! Watchdog: redundant wake sources funnelling into one callback.
//!
//! # Data Flow
//! ```text
//! self-timer    (one-shot, re-armed) ─┐
//! periodic-job  (random in window)   ─┤
//! deferred-work (backoff on failure) ─┼──▶ WakeCallback ──▶ controller.ensure_running
//! heartbeat     (periodic)           ─┤                     (+ guard renew)
//! keep-alive    (periodic)           ─┘                     (+ silent audio nudge)
//! ```
//!
//! # Design Decisions
//! - Sources share nothing but the callback; any one of them is enough to
//!   bring polling back
//! - Duplicate wakes are expected and absorbed by the idempotent callee
//! - A callback returning a terminal `WakeError` ends that source's task

pub mod scheduler;
pub mod source;
pub mod timers;

pub use scheduler::Watchdog;
pub use source::{
    RegistrationError, TriggerSource, WakeCallback, WakeError, WakeKind, WakeSignal,
    WakeSourceRegistration,
};
pub use timers::{default_sources, DeferredWork, Periodic, PeriodicJob, SelfTimer};
