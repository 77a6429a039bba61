//! Failover status client.
//!
//! # Responsibilities
//! - Issue the status request against the current endpoint
//! - Retry each endpoint a fixed number of times with a fixed delay
//! - Fail over through the endpoint list and keep the winner sticky
//! - Fold every outcome into a typed result, never a panic
//!
//! # Design Decisions
//! - Per-try connect/request timeouts bound the worst case of one poll
//! - Exhausting an endpoint advances the shared pointer and wakes the probe
//! - Certificate validation can only be disabled through an explicit flag

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use tokio::sync::Notify;
use url::Url;

use crate::config::ClientConfig;
use crate::net::endpoints::EndpointSet;
use crate::net::types::{ClientError, PollResult, StatusReply, StatusResponse};
use crate::observability::metrics;
use crate::poller::state::DeviceIdentity;
use crate::resilience::retries::RetryPolicy;

/// Anything that can answer one poll cycle.
///
/// The poll loop only depends on this seam, so it can be driven by scripted
/// results in tests.
pub trait StatusSource: Send + Sync {
    fn poll<'a>(&'a self, device: &'a DeviceIdentity) -> BoxFuture<'a, PollResult>;
}

/// HTTP client with per-endpoint retries and sticky failover.
#[derive(Debug, Clone)]
pub struct FailoverClient {
    http: reqwest::Client,
    endpoints: Arc<EndpointSet>,
    policy: RetryPolicy,
    status_path: String,
    probe_hint: Arc<Notify>,
}

impl FailoverClient {
    /// Build the client. Logs a warning when certificate validation is off.
    pub fn new(
        config: &ClientConfig,
        endpoints: Arc<EndpointSet>,
        status_path: &str,
    ) -> Result<Self, ClientError> {
        if config.accept_invalid_certs {
            tracing::warn!(
                endpoints = endpoints.len(),
                "TLS certificate and hostname verification DISABLED for status endpoints \
                 (client.accept_invalid_certs = true)"
            );
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .user_agent(concat!("ring-monitor/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self {
            http,
            endpoints,
            policy: RetryPolicy::from(config),
            status_path: status_path.trim_start_matches('/').to_string(),
            probe_hint: Arc::new(Notify::new()),
        })
    }

    pub fn endpoints(&self) -> &Arc<EndpointSet> {
        &self.endpoints
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Notified whenever an endpoint is exhausted.
    pub fn probe_hint(&self) -> Arc<Notify> {
        self.probe_hint.clone()
    }

    /// Full status URL for one endpoint.
    pub fn status_url(&self, base: &Url, device: &DeviceIdentity) -> Result<Url, ClientError> {
        let mut url = base
            .join(&self.status_path)
            .map_err(|e| ClientError::InvalidEndpoint {
                url: base.to_string(),
                reason: e.to_string(),
            })?;
        url.query_pairs_mut().append_pair("deviceId", device.as_str());
        Ok(url)
    }

    async fn try_once(&self, base: &Url, device: &DeviceIdentity) -> Result<StatusReply, ClientError> {
        let url = self.status_url(base, device)?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                endpoint: base.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::HttpStatus {
                endpoint: base.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .json::<StatusResponse>()
            .await
            .map_err(|source| ClientError::Decode {
                endpoint: base.to_string(),
                source,
            })?;

        Ok(StatusReply {
            endpoint: base.clone(),
            http_status: status.as_u16(),
            body,
        })
    }

    /// Fetch the alert status, walking the endpoints in failover order.
    pub async fn fetch_status(&self, device: &DeviceIdentity) -> Result<StatusReply, ClientError> {
        let mut attempts = 0;
        let mut last_error = None;

        for index in self.endpoints.failover_order() {
            let Some(base) = self.endpoints.get(index) else {
                continue;
            };

            for attempt in 1..=self.policy.tries {
                attempts += 1;
                match self.try_once(base, device).await {
                    Ok(reply) => {
                        self.endpoints.promote(index);
                        tracing::debug!(
                            endpoint = %base,
                            attempt,
                            should_alert = ?reply.body.should_alert,
                            "Status request succeeded"
                        );
                        return Ok(reply);
                    }
                    Err(e) => {
                        tracing::warn!(endpoint = %base, attempt, error = %e, "Status request failed");
                        last_error = Some(e);
                        if let Some(pause) = self.policy.pause_after(attempt) {
                            tokio::time::sleep(pause).await;
                        }
                    }
                }
            }

            let next = self.endpoints.advance_from(index);
            metrics::record_failover(base.as_str());
            tracing::warn!(
                endpoint = %base,
                tries = self.policy.tries,
                next = %self.endpoints.urls()[next],
                "Endpoint exhausted, failing over"
            );
            self.probe_hint.notify_one();
        }

        Err(ClientError::Exhausted {
            attempts,
            last: Box::new(last_error.unwrap_or(ClientError::NoEndpoints)),
        })
    }
}

impl StatusSource for FailoverClient {
    fn poll<'a>(&'a self, device: &'a DeviceIdentity) -> BoxFuture<'a, PollResult> {
        Box::pin(async move {
            let start = Instant::now();
            let outcome = self.fetch_status(device).await;
            let result = PollResult::from_outcome(&outcome);
            match &outcome {
                Ok(reply) if !reply.body.success => {
                    tracing::warn!(
                        endpoint = %reply.endpoint,
                        error = reply.body.error.as_deref().unwrap_or("unspecified"),
                        "Status endpoint reported failure"
                    );
                    metrics::record_poll("rejected", start);
                }
                Ok(_) => metrics::record_poll("success", start),
                Err(_) => metrics::record_poll("failure", start),
            }
            result
        })
    }
}
