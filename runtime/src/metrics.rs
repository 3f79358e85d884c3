//! Prometheus metrics for the stats pipeline.
//!
//! Each process installs one recorder with [`install_recorder`] and serves
//! [`PrometheusHandle::render`] at `GET /metrics`. Recording goes through the
//! `metrics` facade, so the `record_*` helpers are no-ops until a recorder is
//! installed (as in unit tests).

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

/// Events handed to the bus.
pub const EVENTS_PUBLISHED: &str = "todo_events_published_total";
/// Events lost before reaching the bus.
pub const PUBLISH_FAILURES: &str = "todo_events_publish_failures_total";
/// Events that incremented a counter.
pub const EVENTS_AGGREGATED: &str = "todo_events_aggregated_total";
/// Events with an unknown type.
pub const EVENTS_IGNORED: &str = "todo_events_ignored_total";
/// Deliveries handed back to the bus.
pub const EVENTS_REDELIVERED: &str = "todo_events_redelivered_total";

/// Why a publish failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishFailure {
    /// The publisher queue was full or closed.
    Enqueue,
    /// The bus connection became unusable.
    Transport,
    /// The bus refused this one event.
    Rejected,
}

impl PublishFailure {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Enqueue => "enqueue",
            Self::Transport => "transport",
            Self::Rejected => "rejected",
        }
    }
}

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Install the Prometheus recorder and describe every metric.
///
/// # Errors
///
/// Returns [`MetricsError::Install`] if a recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, MetricsError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| MetricsError::Install(e.to_string()))?;
    describe_metrics();
    Ok(handle)
}

fn describe_metrics() {
    describe_counter!(EVENTS_PUBLISHED, "Events accepted by the event bus");
    describe_counter!(PUBLISH_FAILURES, "Events that never reached the event bus");
    describe_counter!(EVENTS_AGGREGATED, "Events that incremented a stats counter");
    describe_counter!(EVENTS_IGNORED, "Events with an unrecognised type");
    describe_counter!(EVENTS_REDELIVERED, "Deliveries handed back for redelivery");
}

/// Record an event accepted by the bus.
pub fn record_published(event_type: &str) {
    counter!(EVENTS_PUBLISHED, "event_type" => event_type.to_string()).increment(1);
}

/// Record an event that never reached the bus.
pub fn record_publish_failure(event_type: &str, reason: PublishFailure) {
    counter!(
        PUBLISH_FAILURES,
        "event_type" => event_type.to_string(),
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record an event that incremented a counter.
pub fn record_aggregated(event_type: &str) {
    counter!(EVENTS_AGGREGATED, "event_type" => event_type.to_string()).increment(1);
}

/// Record an event that was acknowledged without effect.
pub fn record_ignored() {
    counter!(EVENTS_IGNORED).increment(1);
}

/// Record a delivery handed back to the bus.
pub fn record_redelivered() {
    counter!(EVENTS_REDELIVERED).increment(1);
}
