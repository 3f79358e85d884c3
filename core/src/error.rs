//! Error taxonomy of the Todo and Stats APIs.

use crate::counter::CacheError;
use crate::store::StoreError;
use crate::todo::{InvalidTodoId, TodoId};
use thiserror::Error;

/// Errors returned by the to-do and stats services.
///
/// - [`Validation`](Self::Validation): the request is malformed (HTTP 400)
/// - [`NotFound`](Self::NotFound): no item has that identifier (HTTP 404)
/// - [`Dependency`](Self::Dependency): the store or cache failed (HTTP 500)
#[derive(Error, Debug)]
pub enum TodoError {
    /// The request is malformed.
    #[error("{0}")]
    Validation(String),

    /// No item has the identifier.
    #[error("Todo not found: {0}")]
    NotFound(TodoId),

    /// A backing service failed.
    #[error("Dependency failure: {0}")]
    Dependency(String),
}

impl From<StoreError> for TodoError {
    fn from(error: StoreError) -> Self {
        Self::Dependency(error.to_string())
    }
}

impl From<CacheError> for TodoError {
    fn from(error: CacheError) -> Self {
        Self::Dependency(error.to_string())
    }
}

impl From<InvalidTodoId> for TodoError {
    fn from(error: InvalidTodoId) -> Self {
        Self::Validation(error.to_string())
    }
}

/// Result alias for service operations.
pub type Result<T> = std::result::Result<T, TodoError>;
