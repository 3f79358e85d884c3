//! In-memory item store.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on lock poisoning

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use todo_stats_core::store::{StoreError, TodoStore};
use todo_stats_core::todo::{Document, Todo, TodoId};

/// `Vec`-backed [`TodoStore`] preserving insertion order.
///
/// # Example
///
/// ```
/// use todo_stats_core::store::TodoStore;
/// use todo_stats_testing::{InMemoryTodoStore, document};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let store = InMemoryTodoStore::new();
/// let todo = store.insert(document(json!({"title": "x"}))).await.unwrap();
///
/// assert_eq!(store.find_all().await.unwrap(), vec![todo]);
/// # });
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryTodoStore {
    items: Arc<RwLock<Vec<Todo>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryTodoStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with a database error (or stop).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of stored items
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.read().unwrap().len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.read().unwrap().is_empty()
    }

    /// The stored item with identifier `id`
    #[must_use]
    pub fn get(&self, id: &TodoId) -> Option<Todo> {
        self.items
            .read()
            .unwrap()
            .iter()
            .find(|todo| &todo.id == id)
            .cloned()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::DatabaseError("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

impl TodoStore for InMemoryTodoStore {
    fn insert(
        &self,
        fields: Document,
    ) -> Pin<Box<dyn Future<Output = Result<Todo, StoreError>> + Send + '_>> {
        Box::pin(async move {
            self.check()?;
            let todo = Todo::new(TodoId::generate(), fields);
            self.items.write().unwrap().push(todo.clone());
            Ok(todo)
        })
    }

    fn find_all(&self) -> Pin<Box<dyn Future<Output = Result<Vec<Todo>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            self.check()?;
            Ok(self.items.read().unwrap().clone())
        })
    }

    fn update<'a>(
        &'a self,
        id: &'a TodoId,
        patch: Document,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Todo>, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            self.check()?;
            let mut items = self.items.write().unwrap();
            Ok(items.iter_mut().find(|todo| &todo.id == id).map(|todo| {
                let previous = todo.clone();
                todo.merge(patch);
                previous
            }))
        })
    }

    fn delete<'a>(
        &'a self,
        id: &'a TodoId,
    ) -> Pin<Box<dyn Future<Output = Result<bool, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            self.check()?;
            let mut items = self.items.write().unwrap();
            let before = items.len();
            items.retain(|todo| &todo.id != id);
            Ok(items.len() < before)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document;
    use serde_json::json;

    #[tokio::test]
    async fn update_returns_previous_and_merges() {
        let store = InMemoryTodoStore::new();
        let todo = store
            .insert(document(json!({"title": "a", "completed": false})))
            .await
            .unwrap();

        let previous = store
            .update(&todo.id, document(json!({"completed": true})))
            .await
            .unwrap();

        assert_eq!(previous, Some(todo.clone()));
        let current = store.get(&todo.id).unwrap();
        assert!(current.is_completed());
        assert_eq!(current.fields.get("title"), Some(&json!("a")));
    }

    #[tokio::test]
    async fn update_and_delete_of_missing_item_are_no_ops() {
        let store = InMemoryTodoStore::new();
        let id = TodoId::generate();

        assert_eq!(store.update(&id, Document::new()).await.unwrap(), None);
        assert!(!store.delete(&id).await.unwrap());
    }

    #[tokio::test]
    async fn failing_store_reports_database_errors() {
        let store = InMemoryTodoStore::new();
        store.set_failing(true);

        assert!(matches!(
            store.find_all().await,
            Err(StoreError::DatabaseError(_))
        ));
    }
}
