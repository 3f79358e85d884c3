//! HTTP surfaces of the todo stats system.
//!
//! Two axum routers share this crate:
//!
//! - [`todo_api_router`]: CRUD over the item store plus the `/api/stats`
//!   proxy to the Stats API
//! - [`stats_api_router`]: read-only counters at `/stats`
//!
//! Handlers are thin: they extract the request, call the service from
//! `todo-stats-runtime`, and map its result to a response. Errors go through
//! [`AppError`], which fixes the status code per error kind.
//!
//! # Example
//!
//! ```ignore
//! use todo_stats_web::{TodoApiState, StatsClient, todo_api_router};
//!
//! let state = TodoApiState::new(todos, StatsClient::new("localhost:3001", timeout)?);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, todo_api_router(state)).await?;
//! ```

pub mod client;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use client::StatsClient;
pub use error::AppError;
pub use router::{stats_api_router, todo_api_router};
pub use state::{StatsApiState, TodoApiState};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
