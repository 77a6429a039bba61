//! In-process fakes shared by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::alert::output::{AudioOutput, OutputError, VibrationPattern, Vibrator};
use crate::lifecycle::guard::{GuardError, WakeLockBackend};
use crate::net::client::StatusSource;
use crate::net::types::PollResult;
use crate::poller::state::DeviceIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEvent {
    SilentStart,
    SilentStop,
    AlertPlay,
    AlertStop,
}

/// Audio output that records calls. An alert "plays" until stopped or
/// `finish_alert` is called.
#[derive(Debug, Default)]
pub struct FakeAudio {
    events: Mutex<Vec<AudioEvent>>,
    silent: AtomicBool,
    alert: AtomicBool,
    silent_failures: AtomicU32,
    overlap: AtomicBool,
}

impl FakeAudio {
    fn push(&self, event: AudioEvent) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event);
    }

    pub fn count(&self, event: AudioEvent) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| **e == event)
            .count()
    }

    pub fn fail_silent_starts(&self, n: u32) {
        self.silent_failures.store(n, Ordering::SeqCst);
    }

    pub fn finish_alert(&self) {
        self.alert.store(false, Ordering::SeqCst);
    }

    /// True if silent and alert audio were ever active together.
    pub fn overlapped(&self) -> bool {
        self.overlap.load(Ordering::SeqCst)
    }
}

impl AudioOutput for FakeAudio {
    fn start_silent(&self) -> Result<(), OutputError> {
        self.push(AudioEvent::SilentStart);
        let remaining = self.silent_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.silent_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(OutputError::Unavailable("scripted failure".into()));
        }
        if self.alert.load(Ordering::SeqCst) {
            self.overlap.store(true, Ordering::SeqCst);
        }
        self.silent.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_silent_playing(&self) -> bool {
        self.silent.load(Ordering::SeqCst)
    }

    fn stop_silent(&self) {
        self.push(AudioEvent::SilentStop);
        self.silent.store(false, Ordering::SeqCst);
    }

    fn play_alert(&self) -> Result<(), OutputError> {
        self.push(AudioEvent::AlertPlay);
        if self.silent.load(Ordering::SeqCst) {
            self.overlap.store(true, Ordering::SeqCst);
        }
        self.alert.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_alert_playing(&self) -> bool {
        self.alert.load(Ordering::SeqCst)
    }

    fn stop_alert(&self) {
        self.push(AudioEvent::AlertStop);
        self.alert.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
pub struct FakeVibrator {
    vibrating: AtomicBool,
    cancels: AtomicUsize,
}

impl FakeVibrator {
    pub fn is_vibrating(&self) -> bool {
        self.vibrating.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

impl Vibrator for FakeVibrator {
    fn vibrate(&self, _pattern: &VibrationPattern) -> Result<(), OutputError> {
        self.vibrating.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.vibrating.store(false, Ordering::SeqCst);
    }
}

/// Status source that replays queued results, then repeats a fallback.
#[derive(Debug)]
pub struct ScriptedSource {
    queue: Mutex<VecDeque<PollResult>>,
    fallback: Mutex<PollResult>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(fallback: PollResult) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(fallback),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, result: PollResult) {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).push_back(result);
    }

    pub fn set_fallback(&self, result: PollResult) {
        *self.fallback.lock().unwrap_or_else(PoisonError::into_inner) = result;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl StatusSource for ScriptedSource {
    fn poll<'a>(&'a self, _device: &'a DeviceIdentity) -> BoxFuture<'a, PollResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.fallback.lock().unwrap_or_else(PoisonError::into_inner).clone());
        Box::pin(async move { next })
    }
}

/// Wake lock backend that counts calls and can be told to refuse.
#[derive(Debug, Default)]
pub struct FakeWakeLock {
    attempts: AtomicUsize,
    acquires: AtomicUsize,
    releases: AtomicUsize,
    failing: AtomicBool,
}

impl FakeWakeLock {
    /// Acquire calls, refused ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn acquires(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl WakeLockBackend for FakeWakeLock {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn acquire(&self, _validity: Duration) -> Result<(), GuardError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(GuardError::Refused("scripted failure".into()));
        }
        self.acquires.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}
