//! Resilience helpers.
//!
//! # Data Flow
//! ```text
//! Status request:
//!     → retries.rs (fixed-delay tries per endpoint, then fail over)
//!
//! Deferred work wake source:
//!     → backoff.rs (exponential backoff + jitter after a failed wake)
//!
//! Periodic job wake source:
//!     → backoff.rs (random point inside the scheduling window)
//! ```

pub mod backoff;
pub mod retries;
