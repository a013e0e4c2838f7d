//! Metrics collection and exposition.
//!
//! # Metrics
//! - `faultline_sessions_total` (counter): sessions opened, by behavior
//! - `faultline_validation_failures_total` (counter): check routes answered 400, by behavior
//! - `faultline_bytes_streamed_total` (counter): body bytes handed to connections, by behavior
//! - `faultline_timers_canceled_total` (counter): timers torn down by session close
//! - `faultline_active_connections` (gauge): current connection count
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and costs nothing until a
//!   recorder is installed
//! - The Prometheus exporter is opt-in through configuration

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::behavior::Behavior;

pub const SESSIONS_TOTAL: &str = "faultline_sessions_total";
pub const VALIDATION_FAILURES_TOTAL: &str = "faultline_validation_failures_total";
pub const BYTES_STREAMED_TOTAL: &str = "faultline_bytes_streamed_total";
pub const TIMERS_CANCELED_TOTAL: &str = "faultline_timers_canceled_total";
pub const ACTIVE_CONNECTIONS: &str = "faultline_active_connections";

/// Install the Prometheus recorder and serve it on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe();
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

fn describe() {
    describe_counter!(SESSIONS_TOTAL, "Sessions opened, by behavior");
    describe_counter!(VALIDATION_FAILURES_TOTAL, "Check requests refused, by behavior");
    describe_counter!(BYTES_STREAMED_TOTAL, "Body bytes streamed, by behavior");
    describe_counter!(TIMERS_CANCELED_TOTAL, "Session timers canceled on close");
    describe_gauge!(ACTIVE_CONNECTIONS, "Open client connections");
}

pub fn record_session(behavior: Behavior) {
    counter!(SESSIONS_TOTAL, "behavior" => behavior.name()).increment(1);
}

pub fn record_validation_failure(behavior: Behavior) {
    counter!(VALIDATION_FAILURES_TOTAL, "behavior" => behavior.name()).increment(1);
}

pub fn record_bytes_streamed(behavior: Behavior, bytes: u64) {
    counter!(BYTES_STREAMED_TOTAL, "behavior" => behavior.name()).increment(bytes);
}

pub fn record_timers_canceled(count: usize) {
    counter!(TIMERS_CANCELED_TOTAL).increment(count as u64);
}

pub fn set_active_connections(count: usize) {
    gauge!(ACTIVE_CONNECTIONS).set(count as f64);
}
