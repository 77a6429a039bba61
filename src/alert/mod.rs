//! Alert subsystem.
//!
//! # Data Flow
//! ```text
//! poller (shouldAlert=true)  → driver.enter_loud  → stop silent, vibrate, loop alert sound
//! poller (shouldAlert=false) → driver.leave_loud  → stop alert, cancel vibration, loop silence
//! keep-alive wake            → driver.ensure_silent
//! service stop               → driver.shutdown
//! ```
//!
//! # Design Decisions
//! - Devices sit behind `AudioOutput` / `Vibrator` so hosts can plug in
//!   their own backends
//! - The silent loop keeps the audio path warm; a failed start is retried
//!   once, after that the keep-alive wake takes over

pub mod driver;
pub mod output;

pub use driver::{AlertDriver, AlertMode, DriverSettings};
pub use output::{
    write_silent_clip, AudioOutput, CommandAudio, LogVibrator, OutputError, VibrationPattern,
    Vibrator,
};
