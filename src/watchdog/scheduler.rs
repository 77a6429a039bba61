//! Arms and disarms the whole set of wake sources as one unit.

use crate::config::WatchdogConfig;
use crate::watchdog::source::{TriggerSource, WakeCallback, WakeSourceRegistration};
use crate::watchdog::timers::default_sources;

pub struct Watchdog {
    sources: Vec<Box<dyn TriggerSource>>,
}

impl std::fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchdog")
            .field("sources", &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl Watchdog {
    pub fn from_config(config: &WatchdogConfig) -> Self {
        Self::with_sources(default_sources(config))
    }

    pub fn with_sources(sources: Vec<Box<dyn TriggerSource>>) -> Self {
        Self { sources }
    }

    /// Register every source with `callback`. A source that fails to
    /// register is logged and skipped. Returns how many are armed.
    pub fn arm(&mut self, callback: WakeCallback) -> usize {
        let mut armed = 0;
        for source in &mut self.sources {
            match source.register(callback.clone()) {
                Ok(()) => {
                    armed += 1;
                    tracing::debug!(
                        source = source.name(),
                        interval_secs = source.interval().as_secs(),
                        "Wake source registered"
                    );
                }
                Err(e) => {
                    tracing::warn!(source = source.name(), error = %e, "Wake source registration failed");
                }
            }
        }
        tracing::info!(armed, total = self.sources.len(), "Watchdog armed");
        armed
    }

    pub fn disarm(&mut self) {
        let mut disarmed = 0;
        for source in &mut self.sources {
            if source.is_registered() {
                disarmed += 1;
            }
            source.unregister();
        }
        if disarmed > 0 {
            tracing::info!(disarmed, "Watchdog disarmed");
        }
    }

    /// Currently registered sources.
    pub fn registrations(&self) -> Vec<WakeSourceRegistration> {
        self.sources
            .iter()
            .filter(|s| s.is_registered())
            .map(|s| s.registration())
            .collect()
    }

    pub fn is_armed(&self) -> bool {
        self.sources.iter().any(|s| s.is_registered())
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        for source in &mut self.sources {
            source.unregister();
        }
    }
}
