//! Ring monitor daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   wake sources ──┐                         ┌──────────────┐
//!   admin / CLI  ──┼──▶ ServiceController ──▶│  poll loop   │──▶ failover client ──▶ endpoints
//!   SIGHUP       ──┘        │                └──────┬───────┘
//!                           │                       ▼
//!                           ├──▶ liveness guard   alert driver (silent ⇄ loud)
//!                           └──▶ status board ──▶ snapshot (admin /status)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use ring_monitor::config::{load_config, ConfigWatcher, MonitorConfig, Region};
use ring_monitor::lifecycle::{spawn_signal_handler, ServiceController, Shutdown};
use ring_monitor::observability::{logging, metrics};
use ring_monitor::poller::DeviceIdentity;

#[derive(Parser, Debug, Clone)]
#[command(name = "ring-monitor", version)]
#[command(about = "Polls for the device alert signal and rings until it clears", long_about = None)]
struct Args {
    /// Configuration file (TOML). Built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device identity; overrides the config file.
    #[arg(long)]
    device_id: Option<String>,

    /// Status text region: default or jp.
    #[arg(long, value_parser = parse_region)]
    region: Option<Region>,
}

fn parse_region(raw: &str) -> Result<Region, String> {
    match raw {
        "default" => Ok(Region::Default),
        "jp" => Ok(Region::Jp),
        other => Err(format!("unknown region '{}' (expected default or jp)", other)),
    }
}

impl Args {
    fn apply_overrides(&self, config: &mut MonitorConfig) {
        if let Some(id) = &self.device_id {
            config.device.id = Some(id.clone());
        }
        if let Some(region) = self.region {
            config.device.region = region;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let file_config = match &args.config {
        Some(path) => load_config(path)?,
        None => MonitorConfig::default(),
    };
    let mut config = file_config.clone();
    args.apply_overrides(&mut config);

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ring-monitor starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let device = DeviceIdentity::resolve(config.device.id.as_deref());
    tracing::info!(
        device = %device,
        endpoints = config.endpoints.urls.len(),
        poll_interval_ms = config.poll.interval_ms,
        "Configuration loaded"
    );

    let controller = ServiceController::new(config.clone(), device)?;
    controller.start().await;

    let shutdown = Shutdown::new();
    let mut shutdown_rx = shutdown.subscribe();

    let admin = if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        Some(tokio::spawn(ring_monitor::admin::serve(
            listener,
            controller.clone(),
            shutdown.wait(),
        )))
    } else {
        None
    };

    // Kept alive for the lifetime of the process.
    let _watcher = match &args.config {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path, file_config);
            match watcher.run() {
                Ok(watcher) => {
                    let controller = controller.clone();
                    let args = args.clone();
                    tokio::spawn(async move {
                        while let Some(mut update) = updates.recv().await {
                            args.apply_overrides(&mut update);
                            controller.apply_config(update).await;
                        }
                    });
                    Some(watcher)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Config watcher unavailable, reload disabled");
                    None
                }
            }
        }
        None => None,
    };

    let signals = spawn_signal_handler(controller.clone(), shutdown.clone());

    let reason = shutdown_rx.recv().await;
    tracing::info!(reason = ?reason.ok(), "Shutting down");

    controller.stop().await;
    if let Some(admin) = admin {
        match admin.await {
            Ok(Err(e)) => tracing::error!(error = %e, "Admin surface failed"),
            Err(e) => tracing::error!(error = %e, "Admin task failed"),
            Ok(Ok(())) => {}
        }
    }
    signals.abort();

    tracing::info!("Shutdown complete");
    Ok(())
}
