//! Resilient poll-and-alert engine.
//!
//! Polls a status endpoint for a device's alert flag, rings until the flag
//! clears, and keeps itself alive through several redundant wake sources.

pub mod admin;
pub mod alert;
pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod poller;
pub mod resilience;
pub mod watchdog;

#[cfg(test)]
pub(crate) mod testing;

pub use config::MonitorConfig;
pub use lifecycle::{ServiceController, Shutdown};
pub use poller::{DeviceIdentity, ServiceState};
