//! Prometheus scrape endpoint.

use axum::extract::State;
use metrics_exporter_prometheus::PrometheusHandle;

/// Render every recorded metric in the Prometheus text format.
///
/// # Endpoint
///
/// ```text
/// GET /metrics
/// ```
#[allow(clippy::unused_async)]
pub async fn render(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}
