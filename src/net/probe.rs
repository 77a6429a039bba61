//! Endpoint liveness probe.
//!
//! Races a connect-only check against every candidate endpoint and makes the
//! first one that answers current, so normal traffic starts from a reachable
//! endpoint even before the next real request.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::time;
use tokio_util::sync::CancellationToken;
use url::{Host, Url};

use crate::net::endpoints::EndpointSet;

pub struct EndpointProbe {
    endpoints: Arc<EndpointSet>,
    connect_timeout: Duration,
}

fn target(url: &Url) -> Option<(String, u16)> {
    let host = match url.host()? {
        Host::Domain(domain) => domain.to_string(),
        Host::Ipv4(addr) => addr.to_string(),
        Host::Ipv6(addr) => addr.to_string(),
    };
    Some((host, url.port_or_known_default()?))
}

impl EndpointProbe {
    pub fn new(endpoints: Arc<EndpointSet>, connect_timeout: Duration) -> Self {
        Self {
            endpoints,
            connect_timeout,
        }
    }

    /// Probe all endpoints concurrently. Returns the index that answered
    /// first, after promoting it.
    pub async fn probe_once(&self) -> Option<usize> {
        let connect_timeout = self.connect_timeout;
        let mut checks: FuturesUnordered<_> = self
            .endpoints
            .urls()
            .iter()
            .enumerate()
            .filter_map(|(index, url)| {
                let (host, port) = target(url)?;
                Some(async move {
                    let reachable = matches!(
                        time::timeout(connect_timeout, TcpStream::connect((host.as_str(), port))).await,
                        Ok(Ok(_))
                    );
                    (index, reachable)
                })
            })
            .collect();

        while let Some((index, reachable)) = checks.next().await {
            if reachable {
                self.endpoints.promote(index);
                return Some(index);
            }
        }
        None
    }

    /// Probe every `interval` (if any) and whenever `hint` is notified.
    pub async fn run(self, hint: Arc<Notify>, interval: Option<Duration>, cancel: CancellationToken) {
        tracing::debug!(interval = ?interval, "Endpoint probe starting");
        loop {
            let tick = async {
                match interval {
                    Some(period) => time::sleep(period).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick => {}
                _ = hint.notified() => {}
            }

            match self.probe_once().await {
                Some(index) => tracing::debug!(endpoint = %self.endpoints.urls()[index], "Probe found reachable endpoint"),
                None => tracing::warn!("Probe found no reachable endpoint"),
            }
        }
        tracing::debug!("Endpoint probe stopped");
    }
}
