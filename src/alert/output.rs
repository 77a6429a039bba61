//! Audio and vibration devices.
//!
//! The driver talks to hardware only through [`AudioOutput`] and
//! [`Vibrator`]. The default implementations run configured player commands
//! and log vibration patterns, which is what a headless host can offer.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::AlertConfig;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("audio device unavailable: {0}")]
    Unavailable(String),

    #[error("device I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One audio output shared by the silent keep-alive loop and the alert loop.
pub trait AudioOutput: Send + Sync {
    /// Start looping the inaudible keep-alive clip.
    fn start_silent(&self) -> Result<(), OutputError>;
    fn is_silent_playing(&self) -> bool;
    fn stop_silent(&self);

    /// Start one playback of the alert sound.
    fn play_alert(&self) -> Result<(), OutputError>;
    fn is_alert_playing(&self) -> bool;
    fn stop_alert(&self);
}

/// Repeating vibration waveform: leading delay, then on/off pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VibrationPattern {
    pub timings: Vec<Duration>,
    pub repeat: bool,
}

impl VibrationPattern {
    pub fn repeating(timings_ms: &[u64]) -> Self {
        Self {
            timings: timings_ms.iter().map(|ms| Duration::from_millis(*ms)).collect(),
            repeat: true,
        }
    }
}

pub trait Vibrator: Send + Sync {
    fn vibrate(&self, pattern: &VibrationPattern) -> Result<(), OutputError>;
    fn cancel(&self);
}

/// Minimal PCM WAV: mono, 4410 Hz, 8-bit, no samples.
const SILENT_WAV: [u8; 44] = [
    0x52, 0x49, 0x46, 0x46, 0x24, 0x00, 0x00, 0x00, 0x57, 0x41, 0x56, 0x45, 0x66, 0x6D, 0x74, 0x20,
    0x10, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x44, 0x11, 0x00, 0x00, 0x44, 0x11, 0x00, 0x00,
    0x01, 0x00, 0x08, 0x00, 0x64, 0x61, 0x74, 0x61, 0x00, 0x00, 0x00, 0x00,
];

/// Write the silent keep-alive clip unless it already exists.
pub fn write_silent_clip(path: &Path) -> Result<(), OutputError> {
    if path.exists() {
        return Ok(());
    }
    std::fs::write(path, SILENT_WAV)?;
    Ok(())
}

fn spawn_player(command: &[String], clip: &Path) -> Result<Child, OutputError> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| OutputError::Unavailable("empty command".to_string()))?;
    let clip = clip.to_string_lossy();
    let child = Command::new(program)
        .args(args.iter().map(|arg| arg.replace("{clip}", &clip)))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    Ok(child)
}

fn is_running(slot: &Mutex<Option<Child>>) -> bool {
    let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
    match guard.as_mut().map(Child::try_wait) {
        Some(Ok(None)) => true,
        Some(_) => {
            *guard = None;
            false
        }
        None => false,
    }
}

fn kill(slot: &Mutex<Option<Child>>) {
    if let Some(mut child) = slot.lock().unwrap_or_else(PoisonError::into_inner).take() {
        if let Err(e) = child.kill() {
            tracing::debug!(error = %e, "Player already exited");
        }
        let _ = child.wait();
    }
}

/// Audio through external player commands, with a terminal-bell fallback
/// for the alert when no command is configured.
#[derive(Debug)]
pub struct CommandAudio {
    alert_command: Vec<String>,
    silent_command: Vec<String>,
    clip: PathBuf,
    alert_child: Mutex<Option<Child>>,
    silent_child: Mutex<Option<Child>>,
    bell_until: Mutex<Option<Instant>>,
    silent_flag: AtomicBool,
}

impl CommandAudio {
    pub fn from_config(config: &AlertConfig) -> Self {
        Self {
            alert_command: config.alert_command.clone(),
            silent_command: config.silent_command.clone(),
            clip: PathBuf::from(&config.silent_clip_path),
            alert_child: Mutex::new(None),
            silent_child: Mutex::new(None),
            bell_until: Mutex::new(None),
            silent_flag: AtomicBool::new(false),
        }
    }
}

impl AudioOutput for CommandAudio {
    fn start_silent(&self) -> Result<(), OutputError> {
        self.stop_silent();
        if self.silent_command.is_empty() {
            self.silent_flag.store(true, Ordering::Release);
            return Ok(());
        }
        write_silent_clip(&self.clip)?;
        let child = spawn_player(&self.silent_command, &self.clip)?;
        *self.silent_child.lock().unwrap_or_else(PoisonError::into_inner) = Some(child);
        Ok(())
    }

    fn is_silent_playing(&self) -> bool {
        if self.silent_command.is_empty() {
            self.silent_flag.load(Ordering::Acquire)
        } else {
            is_running(&self.silent_child)
        }
    }

    fn stop_silent(&self) {
        self.silent_flag.store(false, Ordering::Release);
        kill(&self.silent_child);
    }

    fn play_alert(&self) -> Result<(), OutputError> {
        if self.alert_command.is_empty() {
            let mut stderr = std::io::stderr();
            stderr.write_all(b"\x07")?;
            stderr.flush()?;
            *self.bell_until.lock().unwrap_or_else(PoisonError::into_inner) =
                Some(Instant::now() + Duration::from_secs(1));
            return Ok(());
        }
        let child = spawn_player(&self.alert_command, &self.clip)?;
        *self.alert_child.lock().unwrap_or_else(PoisonError::into_inner) = Some(child);
        Ok(())
    }

    fn is_alert_playing(&self) -> bool {
        if self.alert_command.is_empty() {
            return self
                .bell_until
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some_and(|until| Instant::now() < until);
        }
        is_running(&self.alert_child)
    }

    fn stop_alert(&self) {
        *self.bell_until.lock().unwrap_or_else(PoisonError::into_inner) = None;
        kill(&self.alert_child);
    }
}

impl Drop for CommandAudio {
    fn drop(&mut self) {
        kill(&self.alert_child);
        kill(&self.silent_child);
    }
}

/// Vibrator for hosts without haptics: records the request in the log.
#[derive(Debug, Default)]
pub struct LogVibrator {
    active: AtomicBool,
}

impl LogVibrator {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Vibrator for LogVibrator {
    fn vibrate(&self, pattern: &VibrationPattern) -> Result<(), OutputError> {
        self.active.store(true, Ordering::Release);
        tracing::info!(timings = ?pattern.timings, repeat = pattern.repeat, "Vibration started");
        Ok(())
    }

    fn cancel(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            tracing::info!("Vibration cancelled");
        }
    }
}
