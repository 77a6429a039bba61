//! Configuration file watcher for hot reload.
//!
//! Editors tend to produce several modify events for one save, and a bare
//! `touch` produces one with no content change. Only a file whose parsed,
//! validated content differs from the last one sent goes out.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::MonitorConfig;

/// Watches one configuration file and forwards changed configurations.
pub struct ConfigWatcher {
    path: PathBuf,
    current: MonitorConfig,
    update_tx: mpsc::UnboundedSender<MonitorConfig>,
}

impl ConfigWatcher {
    /// `current` is the configuration as last read from `path`; reloads that
    /// produce the same value are dropped.
    pub fn new(path: &Path, current: MonitorConfig) -> (Self, mpsc::UnboundedReceiver<MonitorConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                current,
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self {
            path,
            mut current,
            update_tx,
        } = self;
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    if let Some(next) = reload(&path, &mut current) {
                        let _ = update_tx.send(next);
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&watched, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?watched, "Config watcher started");
        Ok(watcher)
    }
}

/// Re-read `path`. Returns the new configuration only when it loads and
/// differs from `current`, which is then updated.
fn reload(path: &Path, current: &mut MonitorConfig) -> Option<MonitorConfig> {
    match load_config(path) {
        Ok(next) if next == *current => {
            tracing::debug!(path = ?path, "Config file event without content change");
            None
        }
        Ok(next) => {
            tracing::info!(path = ?path, "Config file changed, reloading");
            *current = next.clone();
            Some(next)
        }
        Err(e) => {
            tracing::error!(
                error = %e,
                "Failed to reload config, keeping current configuration"
            );
            None
        }
    }
}
