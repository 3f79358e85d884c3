//! Todo API handlers.
//!
//! | Method | Path | Success |
//! |---|---|---|
//! | GET | `/api/todos` | 200, array of items |
//! | POST | `/api/todos` | 201, stored item |
//! | PUT | `/api/todos/:id` | 204 |
//! | DELETE | `/api/todos/:id` | 204 |
//! | GET | `/api/stats` | Stats API response, verbatim |

use crate::WebResult;
use crate::state::TodoApiState;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use todo_stats_core::todo::Todo;

/// List every item.
///
/// # Errors
///
/// 500 if the store fails.
pub async fn list_todos(State(state): State<TodoApiState>) -> WebResult<Json<Vec<Todo>>> {
    Ok(Json(state.todos.list().await?))
}

/// Create an item from the request body.
///
/// # Errors
///
/// 400 for a missing, malformed, or empty body; 500 if the store fails.
pub async fn create_todo(
    State(state): State<TodoApiState>,
    body: Result<Json<Value>, JsonRejection>,
) -> WebResult<(StatusCode, Json<Todo>)> {
    let Json(body) = body?;
    let todo = state.todos.create(body).await?;
    Ok((StatusCode::CREATED, Json(todo)))
}

/// Merge the request body into an item.
///
/// # Errors
///
/// 400 for an invalid id or a body containing `_id`; 404 if no item has
/// the id; 500 if the store fails.
pub async fn update_todo(
    State(state): State<TodoApiState>,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> WebResult<StatusCode> {
    let Json(body) = body?;
    state.todos.update(&id, body).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delete an item.
///
/// # Errors
///
/// 400 for an invalid id; 404 if no item has the id; 500 if the store fails.
pub async fn delete_todo(
    State(state): State<TodoApiState>,
    Path(id): Path<String>,
) -> WebResult<StatusCode> {
    state.todos.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Proxy `GET /stats` of the Stats API, passing its status and body through.
///
/// # Errors
///
/// 500 if the Stats API cannot be reached.
pub async fn proxy_stats(State(state): State<TodoApiState>) -> WebResult<Response> {
    let (status, body) = state.stats_client.fetch().await?;
    Ok((status, [(header::CONTENT_TYPE, "application/json")], body).into_response())
}
