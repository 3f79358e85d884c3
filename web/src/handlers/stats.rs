//! Stats API handler.

use crate::WebResult;
use crate::state::StatsApiState;
use axum::Json;
use axum::extract::State;
use todo_stats_core::counter::Stats;

/// Current values of the three counters; `0` for counters never incremented.
///
/// # Endpoint
///
/// ```text
/// GET /stats
/// ```
///
/// # Response
///
/// ```json
/// { "todosCreated": 3, "todosCompleted": 1, "todosDeleted": 0 }
/// ```
///
/// # Errors
///
/// 500 if the counter cache is unreachable.
pub async fn get_stats(State(state): State<StatsApiState>) -> WebResult<Json<Stats>> {
    Ok(Json(state.stats.get_stats().await?))
}
