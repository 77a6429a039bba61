//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//! - Trigger appropriate actions (shutdown, restart)
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP restarts monitoring, not the process

use tokio::task::JoinHandle;

use crate::lifecycle::controller::ServiceController;
use crate::lifecycle::shutdown::{Shutdown, ShutdownReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    Shutdown(ShutdownReason),
    Restart,
}

#[cfg(unix)]
type Stream = tokio::signal::unix::Signal;

/// Installed signal streams. A stream that fails to install is logged and
/// left out.
#[derive(Debug)]
pub struct Signals {
    #[cfg(unix)]
    terminate: Option<Stream>,
    #[cfg(unix)]
    hangup: Option<Stream>,
}

impl Signals {
    pub fn install() -> Self {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let install = |kind: SignalKind, name: &'static str| match signal(kind) {
                Ok(stream) => Some(stream),
                Err(e) => {
                    tracing::error!(signal = name, error = %e, "Failed to install signal handler");
                    None
                }
            };
            Self {
                terminate: install(SignalKind::terminate(), "SIGTERM"),
                hangup: install(SignalKind::hangup(), "SIGHUP"),
            }
        }
        #[cfg(not(unix))]
        {
            Self {}
        }
    }

    pub async fn recv(&mut self) -> SignalEvent {
        #[cfg(unix)]
        {
            tokio::select! {
                Ok(()) = tokio::signal::ctrl_c() => SignalEvent::Shutdown(ShutdownReason::Interrupt),
                Some(()) = next(&mut self.terminate) => SignalEvent::Shutdown(ShutdownReason::Terminate),
                Some(()) = next(&mut self.hangup) => SignalEvent::Restart,
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            SignalEvent::Shutdown(ShutdownReason::Interrupt)
        }
    }
}

#[cfg(unix)]
async fn next(stream: &mut Option<Stream>) -> Option<()> {
    match stream {
        Some(stream) => stream.recv().await,
        None => std::future::pending().await,
    }
}

/// Restart monitoring on SIGHUP; trigger `shutdown` on SIGINT/SIGTERM.
pub fn spawn_signal_handler(controller: ServiceController, shutdown: Shutdown) -> JoinHandle<()> {
    let mut signals = Signals::install();
    tokio::spawn(async move {
        loop {
            match signals.recv().await {
                SignalEvent::Restart => {
                    tracing::info!("SIGHUP received, restarting monitoring");
                    controller.restart().await;
                }
                SignalEvent::Shutdown(reason) => {
                    tracing::info!(reason = %reason, "Shutdown signal received");
                    shutdown.trigger(reason);
                    break;
                }
            }
        }
    })
}
