//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate endpoint URLs
//! - Validate value ranges (intervals > 0, windows ordered)
//! - Keep the heartbeat inside the liveness guard validity window
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: MonitorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::MonitorConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("endpoints.urls must not be empty")]
    NoEndpoints,

    #[error("endpoint '{url}' is not a valid http(s) URL: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("watchdog.job_min_latency_secs ({min}) exceeds watchdog.job_deadline_secs ({max})")]
    InvertedJobWindow { min: u64, max: u64 },

    #[error("watchdog.deferred_backoff_base_ms ({base}) exceeds watchdog.deferred_backoff_max_ms ({max})")]
    InvertedBackoff { base: u64, max: u64 },

    #[error("watchdog.heartbeat_secs ({heartbeat}) must be shorter than guard.validity_secs ({validity})")]
    HeartbeatTooSlow { heartbeat: u64, validity: u64 },

    #[error("{field} '{value}' is not a socket address")]
    InvalidAddress { field: &'static str, value: String },
}

/// Validate a parsed configuration.
pub fn validate_config(config: &MonitorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.endpoints.urls.is_empty() {
        errors.push(ValidationError::NoEndpoints);
    }
    for raw in &config.endpoints.urls {
        if let Err(reason) = check_endpoint(raw) {
            errors.push(ValidationError::InvalidEndpoint {
                url: raw.clone(),
                reason,
            });
        }
    }

    let positive: [(&'static str, u64); 12] = [
        ("client.tries", u64::from(config.client.tries)),
        ("client.connect_timeout_secs", config.client.connect_timeout_secs),
        ("client.request_timeout_secs", config.client.request_timeout_secs),
        ("endpoints.probe_timeout_ms", config.endpoints.probe_timeout_ms),
        ("poll.interval_ms", config.poll.interval_ms),
        ("alert.replay_check_ms", config.alert.replay_check_ms),
        ("watchdog.self_timer_secs", config.watchdog.self_timer_secs),
        ("watchdog.job_deadline_secs", config.watchdog.job_deadline_secs),
        ("watchdog.deferred_period_secs", config.watchdog.deferred_period_secs),
        ("watchdog.heartbeat_secs", config.watchdog.heartbeat_secs),
        ("watchdog.keep_alive_secs", config.watchdog.keep_alive_secs),
        ("guard.validity_secs", config.guard.validity_secs),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    let wd = &config.watchdog;
    if wd.job_min_latency_secs > wd.job_deadline_secs {
        errors.push(ValidationError::InvertedJobWindow {
            min: wd.job_min_latency_secs,
            max: wd.job_deadline_secs,
        });
    }
    if wd.deferred_backoff_base_ms > wd.deferred_backoff_max_ms {
        errors.push(ValidationError::InvertedBackoff {
            base: wd.deferred_backoff_base_ms,
            max: wd.deferred_backoff_max_ms,
        });
    }
    if wd.heartbeat_secs >= config.guard.validity_secs {
        errors.push(ValidationError::HeartbeatTooSlow {
            heartbeat: wd.heartbeat_secs,
            validity: config.guard.validity_secs,
        });
    }

    if config.admin.enabled && config.admin.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "admin.bind_address",
            value: config.admin.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_endpoint(raw: &str) -> Result<(), String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(format!("unsupported scheme '{}'", other)),
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    Ok(())
}
