//! Shared state of the two HTTP services.

use crate::client::StatsClient;
use metrics_exporter_prometheus::PrometheusHandle;
use todo_stats_runtime::{StatsService, TodoService};

/// State of the Todo API.
#[derive(Clone)]
pub struct TodoApiState {
    /// Write path over the item store.
    pub todos: TodoService,
    /// Client for the Stats API behind `/api/stats`.
    pub stats_client: StatsClient,
    /// Prometheus render handle for `/metrics`, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl TodoApiState {
    /// Create the state without a metrics endpoint.
    #[must_use]
    pub const fn new(todos: TodoService, stats_client: StatsClient) -> Self {
        Self {
            todos,
            stats_client,
            metrics: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// State of the Stats API.
#[derive(Clone)]
pub struct StatsApiState {
    /// Counter reads.
    pub stats: StatsService,
    /// Prometheus render handle for `/metrics`, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl StatsApiState {
    /// Create the state without a metrics endpoint.
    #[must_use]
    pub const fn new(stats: StatsService) -> Self {
        Self {
            stats,
            metrics: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
