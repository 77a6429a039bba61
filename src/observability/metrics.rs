//! Metrics collection and exposition.
//!
//! # Metrics
//! - `ring_polls_total` (counter): poll cycles by outcome
//! - `ring_poll_duration_seconds` (histogram): latency of a full poll cycle
//! - `ring_failovers_total` (counter): endpoint exhaustions
//! - `ring_wake_fires_total` (counter): wake source firings by source
//! - `ring_poll_loop_starts_total` (counter): poll loop (re)starts
//! - `ring_service_state` (gauge): 0=idle, 1=monitoring, 2=alerting
//!
//! Without an installed recorder every call is a no-op, so library users and
//! tests pay nothing.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::poller::state::ServiceState;

/// Install the Prometheus recorder and its HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_poll(outcome: &'static str, start: Instant) {
    counter!("ring_polls_total", "outcome" => outcome).increment(1);
    histogram!("ring_poll_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_failover(from: &str) {
    counter!("ring_failovers_total", "from" => from.to_string()).increment(1);
}

pub fn record_wake(source: &str) {
    counter!("ring_wake_fires_total", "source" => source.to_string()).increment(1);
}

pub fn record_loop_start() {
    counter!("ring_poll_loop_starts_total").increment(1);
}

pub fn record_state(state: ServiceState) {
    let value = match state {
        ServiceState::Idle => 0.0,
        ServiceState::Monitoring => 1.0,
        ServiceState::Alerting => 2.0,
    };
    gauge!("ring_service_state").set(value);
}
