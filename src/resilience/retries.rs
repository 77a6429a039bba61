//! Fixed-delay retry policy used per endpoint by the failover client.

use std::time::Duration;

use crate::config::ClientConfig;

/// How many attempts an endpoint gets and how long to pause between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub tries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(tries: u32, delay: Duration) -> Self {
        Self {
            tries: tries.max(1),
            delay,
        }
    }

    /// Delay to wait after a failed `attempt` (1-based), or `None` when the
    /// endpoint is exhausted.
    pub fn pause_after(&self, attempt: u32) -> Option<Duration> {
        (attempt < self.tries).then_some(self.delay)
    }
}

impl From<&ClientConfig> for RetryPolicy {
    fn from(config: &ClientConfig) -> Self {
        Self::new(config.tries, config.retry_delay())
    }
}
