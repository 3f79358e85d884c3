//! Routers of the two HTTP services.

use crate::handlers::{health, metrics, stats, todos};
use crate::state::{StatsApiState, TodoApiState};
use axum::Router;
use axum::routing::{get, put};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Routes of the Todo API, `/health`, and `/metrics` when a recorder is set.
pub fn todo_api_router(state: TodoApiState) -> Router {
    let handle = state.metrics.clone();

    let router = Router::new()
        .route("/api/todos", get(todos::list_todos).post(todos::create_todo))
        .route(
            "/api/todos/:id",
            put(todos::update_todo).delete(todos::delete_todo),
        )
        .route("/api/stats", get(todos::proxy_stats))
        .route("/health", get(health::health_check))
        .with_state(state);

    with_observability(router, handle)
}

/// Routes of the Stats API, `/health`, and `/metrics` when a recorder is set.
pub fn stats_api_router(state: StatsApiState) -> Router {
    let handle = state.metrics.clone();

    let router = Router::new()
        .route("/stats", get(stats::get_stats))
        .route("/health", get(health::health_check))
        .with_state(state);

    with_observability(router, handle)
}

fn with_observability(router: Router, handle: Option<PrometheusHandle>) -> Router {
    let router = match handle {
        Some(handle) => router.merge(
            Router::new()
                .route("/metrics", get(metrics::render))
                .with_state(handle),
        ),
        None => router,
    };

    router.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}
