//! Wire types, poll results and client errors.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

fn default_success() -> bool {
    true
}

/// Body of `GET <endpoint>/status?deviceId=<id>`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(default = "default_success")]
    pub success: bool,

    /// `None` means "no change". Older servers call this field `shouldRing`.
    #[serde(default, alias = "shouldRing")]
    pub should_alert: Option<bool>,

    #[serde(default)]
    pub error: Option<String>,
}

/// A status response together with where it came from.
#[derive(Debug, Clone)]
pub struct StatusReply {
    pub endpoint: Url,
    pub http_status: u16,
    pub body: StatusResponse,
}

/// Outcome of one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollResult {
    pub timestamp: SystemTime,
    pub succeeded: bool,
    pub should_alert: Option<bool>,
    pub http_status: Option<u16>,
}

impl PollResult {
    pub fn success(should_alert: Option<bool>, http_status: Option<u16>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            succeeded: true,
            should_alert,
            http_status,
        }
    }

    pub fn failure(http_status: Option<u16>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            succeeded: false,
            should_alert: None,
            http_status,
        }
    }

    /// Fold a client outcome into a poll result. Any 2xx reply is a
    /// successful cycle and its `shouldAlert` applies, even when the body
    /// carries `success: false`; the caller logs the server's error.
    pub fn from_outcome(outcome: &Result<StatusReply, ClientError>) -> Self {
        match outcome {
            Ok(reply) => Self::success(reply.body.should_alert, Some(reply.http_status)),
            Err(e) => Self::failure(e.http_status()),
        }
    }
}

/// Errors produced by the failover client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no endpoints configured")]
    NoEndpoints,

    #[error("invalid endpoint '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} answered with HTTP {status}")]
    HttpStatus { endpoint: String, status: u16 },

    #[error("could not decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("all endpoints failed after {attempts} attempts; last error: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<ClientError>,
    },
}

impl ClientError {
    /// HTTP status of the (last) failed response, if there was one.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ClientError::HttpStatus { status, .. } => Some(*status),
            ClientError::Exhausted { last, .. } => last.http_status(),
            _ => None,
        }
    }
}
