//! Metrics collection and export for Parley.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use parley_core::FanoutReport;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const SESSIONS_TOTAL: &str = "parley_sessions_total";
    pub const SESSIONS_ACTIVE: &str = "parley_sessions_active";
    pub const USERS_ONLINE: &str = "parley_users_online";
    pub const MESSAGES_TOTAL: &str = "parley_messages_total";
    pub const PUSHES_TOTAL: &str = "parley_pushes_total";
    pub const FANOUT_SECONDS: &str = "parley_fanout_seconds";
    pub const ERRORS_TOTAL: &str = "parley_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::SESSIONS_TOTAL,
        "Total number of sessions since server start"
    );
    metrics::describe_gauge!(names::SESSIONS_ACTIVE, "Current number of open sessions");
    metrics::describe_gauge!(names::USERS_ONLINE, "Users currently reachable for push");
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Messages persisted, by kind");
    metrics::describe_counter!(names::PUSHES_TOTAL, "Push attempts, by outcome");
    metrics::describe_histogram!(
        names::FANOUT_SECONDS,
        "Time from send request to last push, in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a completed send. `kind` is `direct` or `channel`.
pub fn record_fanout(kind: &'static str, report: &FanoutReport, seconds: f64) {
    counter!(names::MESSAGES_TOTAL, "kind" => kind).increment(1);
    counter!(names::PUSHES_TOTAL, "outcome" => "delivered").increment(report.delivered.len() as u64);
    counter!(names::PUSHES_TOTAL, "outcome" => "failed").increment(report.failed.len() as u64);
    counter!(names::PUSHES_TOTAL, "outcome" => "unreachable")
        .increment(report.unreachable.len() as u64);
    histogram!(names::FANOUT_SECONDS, "kind" => kind).record(seconds);
}

/// Update the number of reachable users.
pub fn set_users_online(count: usize) {
    gauge!(names::USERS_ONLINE).set(count as f64);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Metrics guard that records session close on drop.
pub struct SessionMetricsGuard;

impl SessionMetricsGuard {
    /// Create a new metrics guard, recording a session open.
    #[must_use]
    pub fn new() -> Self {
        counter!(names::SESSIONS_TOTAL).increment(1);
        gauge!(names::SESSIONS_ACTIVE).increment(1.0);
        Self
    }
}

impl Default for SessionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SessionMetricsGuard {
    fn drop(&mut self) {
        gauge!(names::SESSIONS_ACTIVE).decrement(1.0);
    }
}
