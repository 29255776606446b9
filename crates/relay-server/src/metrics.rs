//! Metrics collection and export for the relay.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use chanrelay_core::{Router, RouterStats};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Metric names.
pub mod names {
    pub const MESSAGES_RECEIVED: &str = "chanrelay_messages_received_total";
    pub const MESSAGES_DROPPED: &str = "chanrelay_messages_dropped_total";
    pub const MESSAGES_FORWARDED: &str = "chanrelay_messages_forwarded_total";
    pub const PATTERN_ERRORS: &str = "chanrelay_pattern_errors_total";
    pub const REGISTRATIONS_TOTAL: &str = "chanrelay_registrations_total";
    pub const STORE_CONNECTIONS: &str = "chanrelay_store_connections";
    pub const ERRORS_TOTAL: &str = "chanrelay_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::MESSAGES_RECEIVED,
        "Total number of events read from the realtime connection"
    );
    metrics::describe_counter!(
        names::MESSAGES_DROPPED,
        "Events that produced no relayed message, by reason"
    );
    metrics::describe_counter!(names::MESSAGES_FORWARDED, "Total number of relayed copies");
    metrics::describe_counter!(
        names::PATTERN_ERRORS,
        "Rules skipped because their pattern failed to compile"
    );
    metrics::describe_counter!(
        names::REGISTRATIONS_TOTAL,
        "Total number of rules registered"
    );
    metrics::describe_gauge!(
        names::STORE_CONNECTIONS,
        "Rule store pool connections, by state"
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

/// Mirror router counters into the recorder.
pub fn report_router_stats(stats: &RouterStats) {
    counter!(names::MESSAGES_RECEIVED).absolute(stats.received);
    counter!(names::MESSAGES_FORWARDED).absolute(stats.forwarded);
    counter!(names::PATTERN_ERRORS).absolute(stats.pattern_errors);

    for (reason, value) in [
        ("ignored", stats.ignored),
        ("unroutable", stats.unroutable),
        ("store_error", stats.store_errors),
        ("unmatched", stats.unmatched),
    ] {
        counter!(names::MESSAGES_DROPPED, "reason" => reason).absolute(value);
    }
}

/// Update rule store pool gauges.
pub fn set_store_connections(total: u32, idle: u32) {
    gauge!(names::STORE_CONNECTIONS, "state" => "total").set(f64::from(total));
    gauge!(names::STORE_CONNECTIONS, "state" => "idle").set(f64::from(idle));
}

/// Record a registered rule.
pub fn record_registration() {
    counter!(names::REGISTRATIONS_TOTAL).increment(1);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
}

/// Periodically mirror router counters until aborted.
pub fn spawn_stats_reporter(router: Arc<Router>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            report_router_stats(&router.stats());
        }
    })
}
