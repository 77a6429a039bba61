//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → MonitorConfig (validated)
//!     → ServiceController (ArcSwap, read on every monitoring start)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → dropped if equal to the last config sent
//!     → ServiceController::apply_config swaps settings, restarting
//!       monitoring only for poll/alert/watchdog/device changes
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Endpoint list and client settings are process-lifetime; reload only
//!   affects the poll, alert, watchdog and display settings

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, AlertConfig, ClientConfig, DeviceConfig, EndpointsConfig, GuardBackend,
    GuardConfig, MonitorConfig, ObservabilityConfig, PollConfig, Region, WatchdogConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::ConfigWatcher;
