//! Network subsystem.
//!
//! # Data Flow
//! ```text
//! Poll cycle:
//!     → client.rs (current endpoint first, N tries, fixed delay)
//!     → on exhaustion: endpoints.rs advances current, probe.rs is woken
//!     → on success: endpoints.rs promotes the winner (sticky)
//!     → types.rs folds the outcome into a PollResult
//!
//! Background:
//!     probe.rs races connect-only checks and promotes the first answer
//! ```

pub mod client;
pub mod endpoints;
pub mod probe;
pub mod types;

pub use client::{FailoverClient, StatusSource};
pub use endpoints::EndpointSet;
pub use probe::EndpointProbe;
pub use types::{ClientError, PollResult, StatusReply, StatusResponse};
