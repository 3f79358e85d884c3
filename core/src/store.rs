//! Item store abstraction.
//!
//! The item store owns the to-do collection. It assigns identifiers on insert,
//! and its update and delete operations report whether a matching item existed
//! so the write path can tell a committed mutation from a no-op.
//!
//! # Implementations
//!
//! - `PostgresTodoStore` (in `todo-stats-postgres`): JSONB documents in `PostgreSQL`
//! - `InMemoryTodoStore` (in `todo-stats-testing`): fast, deterministic tests

use crate::todo::{Document, Todo, TodoId};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during item store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database connection or query error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A stored document could not be read back.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Persistent collection of to-do items keyed by [`TodoId`].
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// to enable trait object usage (`Arc<dyn TodoStore>`).
pub trait TodoStore: Send + Sync {
    /// Store a new item and return it with its assigned identifier.
    ///
    /// `fields` must not contain `_id`; the store assigns it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if the write fails.
    fn insert(
        &self,
        fields: Document,
    ) -> Pin<Box<dyn Future<Output = Result<Todo, StoreError>> + Send + '_>>;

    /// All items, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if the read fails.
    fn find_all(&self) -> Pin<Box<dyn Future<Output = Result<Vec<Todo>, StoreError>> + Send + '_>>;

    /// Shallow-merge `patch` into the item with identifier `id`.
    ///
    /// Returns the item as it was **before** the merge, or `None` if no item
    /// matched. Read and write happen atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if the write fails.
    fn update<'a>(
        &'a self,
        id: &'a TodoId,
        patch: Document,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Todo>, StoreError>> + Send + 'a>>;

    /// Remove the item with identifier `id`. Returns whether one was removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if the write fails.
    fn delete<'a>(
        &'a self,
        id: &'a TodoId,
    ) -> Pin<Box<dyn Future<Output = Result<bool, StoreError>> + Send + 'a>>;

    /// Release the store's connections.
    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async {})
    }
}
