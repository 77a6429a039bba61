//! Poll loop and service state.
//!
//! # Data Flow
//! ```text
//! controller ──spawn(cancel)──▶ poll_loop.rs
//!                                 │ every poll.interval_ms
//!                                 ▼
//!                          StatusSource::poll ──▶ PollResult
//!                                 │
//!            shouldAlert=true  ───┼──▶ state.rs Monitoring → Alerting, alert.enter_loud
//!            shouldAlert=false ───┼──▶ state.rs Alerting → Monitoring, alert.leave_loud
//!            failed            ───┘   wait failure back-off, then interval
//! ```
//!
//! # Design Decisions
//! - The loop owns no state beyond its token; the `StatusBoard` is shared
//!   with the controller
//! - Cleanup runs from a drop guard so abort and panic paths silence too

pub mod poll_loop;
pub mod state;

pub use poll_loop::PollLoop;
pub use state::{DeviceIdentity, ServiceState, StatusBoard, UNKNOWN_DEVICE};
