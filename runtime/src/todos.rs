//! Write path: item CRUD plus event emission.
//!
//! Every operation validates its input, performs the store mutation, and only
//! after the store confirms the mutation hands an event to the
//! [`EventPublisher`]. Failed and no-op mutations emit nothing.
//!
//! | Operation | Emits |
//! |---|---|
//! | [`create`](TodoService::create) | `todo.created` |
//! | [`update`](TodoService::update) | `todo.completed`, when the patch flips `completed` to `true` |
//! | [`delete`](TodoService::delete) | `todo.deleted` |

use crate::publisher::EventPublisher;
use serde_json::Value;
use std::sync::Arc;
use todo_stats_core::error::{Result, TodoError};
use todo_stats_core::event::TodoEvent;
use todo_stats_core::store::TodoStore;
use todo_stats_core::todo::{Document, ID_FIELD, Todo, TodoId, marks_completed};
use tracing::{debug, info};

/// Item CRUD composed with event publishing.
#[derive(Clone)]
pub struct TodoService {
    store: Arc<dyn TodoStore>,
    publisher: Arc<EventPublisher>,
}

impl TodoService {
    /// Create a service over `store` that announces mutations via `publisher`.
    #[must_use]
    pub fn new(store: Arc<dyn TodoStore>, publisher: Arc<EventPublisher>) -> Self {
        Self { store, publisher }
    }

    /// All items.
    ///
    /// # Errors
    ///
    /// Returns [`TodoError::Dependency`] if the store fails.
    pub async fn list(&self) -> Result<Vec<Todo>> {
        Ok(self.store.find_all().await?)
    }

    /// Store a new item and emit `todo.created`.
    ///
    /// # Errors
    ///
    /// - [`TodoError::Validation`] if `body` is not a non-empty object or
    ///   carries `_id`
    /// - [`TodoError::Dependency`] if the store fails
    pub async fn create(&self, body: Value) -> Result<Todo> {
        let fields = into_fields(body)?;
        if fields.is_empty() {
            return Err(TodoError::Validation("Request body must not be empty".to_string()));
        }
        reject_id_field(&fields)?;

        let todo = self.store.insert(fields).await?;
        info!(todo_id = %todo.id, "Todo created");

        self.publisher.publish(TodoEvent::Created(todo.clone()));
        Ok(todo)
    }

    /// Shallow-merge `body` into the item `id`.
    ///
    /// Emits `todo.completed` only when `body` sets `completed` to exactly
    /// `true` and the stored item was not already completed.
    ///
    /// # Errors
    ///
    /// - [`TodoError::Validation`] if `id` is malformed, or `body` is not a
    ///   non-empty object, or `body` carries `_id`
    /// - [`TodoError::NotFound`] if no item has that identifier
    /// - [`TodoError::Dependency`] if the store fails
    pub async fn update(&self, id: &str, body: Value) -> Result<()> {
        let id = TodoId::parse(id)?;
        let patch = into_fields(body)?;
        reject_id_field(&patch)?;
        if patch.is_empty() {
            return Err(TodoError::Validation("Request body must not be empty".to_string()));
        }

        let completing = marks_completed(&patch);
        let previous = self
            .store
            .update(&id, patch)
            .await?
            .ok_or_else(|| TodoError::NotFound(id.clone()))?;
        info!(todo_id = %id, "Todo updated");

        if completing && !previous.is_completed() {
            self.publisher.publish(TodoEvent::Completed(id));
        } else if completing {
            debug!(todo_id = %id, "Todo already completed, not emitting");
        }
        Ok(())
    }

    /// Remove the item `id` and emit `todo.deleted`.
    ///
    /// # Errors
    ///
    /// - [`TodoError::Validation`] if `id` is malformed
    /// - [`TodoError::NotFound`] if no item has that identifier
    /// - [`TodoError::Dependency`] if the store fails
    pub async fn delete(&self, id: &str) -> Result<()> {
        let id = TodoId::parse(id)?;
        if !self.store.delete(&id).await? {
            return Err(TodoError::NotFound(id));
        }
        info!(todo_id = %id, "Todo deleted");

        self.publisher.publish(TodoEvent::Deleted(id));
        Ok(())
    }
}

fn into_fields(body: Value) -> Result<Document> {
    match body {
        Value::Object(fields) => Ok(fields),
        _ => Err(TodoError::Validation(
            "Request body must be a JSON object".to_string(),
        )),
    }
}

fn reject_id_field(fields: &Document) -> Result<()> {
    if fields.contains_key(ID_FIELD) {
        Err(TodoError::Validation(format!(
            "Request body must not contain '{ID_FIELD}'"
        )))
    } else {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use todo_stats_core::event::TodoEventKind;
    use todo_stats_testing::{InMemoryEventBus, InMemoryTodoStore};

    struct Harness {
        service: TodoService,
        store: InMemoryTodoStore,
        bus: InMemoryEventBus,
        publisher: Arc<EventPublisher>,
    }

    impl Harness {
        fn new() -> Self {
            let store = InMemoryTodoStore::new();
            let bus = InMemoryEventBus::new();
            let publisher = Arc::new(EventPublisher::new(Arc::new(bus.clone()), "todo-events", 64));
            let service = TodoService::new(Arc::new(store.clone()), Arc::clone(&publisher));
            Self {
                service,
                store,
                bus,
                publisher,
            }
        }

        /// Flush the publisher and return the kinds of every event emitted.
        async fn emitted(self) -> Vec<TodoEventKind> {
            self.publisher.close().await.unwrap();
            self.bus
                .published()
                .iter()
                .filter_map(todo_stats_core::event::SerializedEvent::kind)
                .collect()
        }
    }

    #[tokio::test]
    async fn create_then_list_includes_item_with_stable_id() {
        let harness = Harness::new();

        let created = harness
            .service
            .create(json!({"title": "buy milk", "completed": false}))
            .await
            .unwrap();
        let listed = harness.service.list().await.unwrap();

        assert_eq!(listed, vec![created.clone()]);
        assert!(TodoId::is_valid(created.id.as_str()));
        assert_eq!(harness.emitted().await, vec![TodoEventKind::Created]);
    }

    #[tokio::test]
    async fn create_rejects_empty_non_object_and_id_bodies() {
        let harness = Harness::new();

        for body in [json!({}), json!([1, 2]), json!("x"), json!(null), json!({"_id": "a"})] {
            let result = harness.service.create(body).await;
            assert!(matches!(result, Err(TodoError::Validation(_))));
        }
        assert!(harness.store.is_empty());
        assert!(harness.emitted().await.is_empty());
    }

    #[tokio::test]
    async fn update_with_id_field_is_always_a_validation_error() {
        let harness = Harness::new();
        let todo = harness.service.create(json!({"title": "a"})).await.unwrap();

        let result = harness
            .service
            .update(todo.id.as_str(), json!({"_id": todo.id.as_str(), "completed": true}))
            .await;

        assert!(matches!(result, Err(TodoError::Validation(_))));
        assert!(!harness.store.get(&todo.id).unwrap().is_completed());
    }

    #[tokio::test]
    async fn update_with_malformed_id_is_a_validation_error() {
        let harness = Harness::new();
        let result = harness.service.update("not-an-id", json!({"completed": true})).await;
        assert!(matches!(result, Err(TodoError::Validation(_))));
    }

    #[tokio::test]
    async fn update_of_missing_item_is_not_found() {
        let harness = Harness::new();
        let result = harness
            .service
            .update(TodoId::generate().as_str(), json!({"completed": true}))
            .await;

        assert!(matches!(result, Err(TodoError::NotFound(_))));
        assert!(harness.emitted().await.is_empty());
    }

    #[tokio::test]
    async fn completing_emits_exactly_one_completed_event() {
        let harness = Harness::new();
        let todo = harness
            .service
            .create(json!({"title": "a", "completed": false}))
            .await
            .unwrap();

        harness
            .service
            .update(todo.id.as_str(), json!({"completed": true}))
            .await
            .unwrap();

        assert_eq!(
            harness.emitted().await,
            vec![TodoEventKind::Created, TodoEventKind::Completed]
        );
    }

    #[tokio::test]
    async fn non_boolean_or_absent_completed_emits_nothing() {
        let harness = Harness::new();
        let todo = harness.service.create(json!({"title": "a"})).await.unwrap();
        let id = todo.id.as_str();

        for body in [
            json!({"completed": "true"}),
            json!({"completed": 1}),
            json!({"completed": false}),
            json!({"title": "b"}),
        ] {
            harness.service.update(id, body).await.unwrap();
        }

        assert_eq!(harness.emitted().await, vec![TodoEventKind::Created]);
    }

    #[tokio::test]
    async fn completing_an_already_completed_item_emits_nothing() {
        let harness = Harness::new();
        let todo = harness
            .service
            .create(json!({"title": "a", "completed": true}))
            .await
            .unwrap();

        harness
            .service
            .update(todo.id.as_str(), json!({"completed": true}))
            .await
            .unwrap();

        assert_eq!(harness.emitted().await, vec![TodoEventKind::Created]);
    }

    #[tokio::test]
    async fn update_merges_fields() {
        let harness = Harness::new();
        let todo = harness
            .service
            .create(json!({"title": "a", "priority": 1}))
            .await
            .unwrap();

        harness
            .service
            .update(todo.id.as_str(), json!({"priority": 2}))
            .await
            .unwrap();

        let stored = harness.store.get(&todo.id).unwrap();
        assert_eq!(stored.fields.get("title"), Some(&json!("a")));
        assert_eq!(stored.fields.get("priority"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn delete_of_missing_item_is_not_found_and_emits_nothing() {
        let harness = Harness::new();
        let result = harness.service.delete(TodoId::generate().as_str()).await;

        assert!(matches!(result, Err(TodoError::NotFound(_))));
        assert!(harness.emitted().await.is_empty());
    }

    #[tokio::test]
    async fn delete_removes_and_emits() {
        let harness = Harness::new();
        let todo = harness.service.create(json!({"title": "a"})).await.unwrap();

        harness.service.delete(todo.id.as_str()).await.unwrap();

        assert!(harness.store.is_empty());
        assert_eq!(
            harness.emitted().await,
            vec![TodoEventKind::Created, TodoEventKind::Deleted]
        );
    }

    #[tokio::test]
    async fn delete_accepts_uppercase_ids() {
        let harness = Harness::new();
        let todo = harness.service.create(json!({"title": "a"})).await.unwrap();

        harness
            .service
            .delete(&todo.id.as_str().to_ascii_uppercase())
            .await
            .unwrap();

        assert!(harness.store.is_empty());
    }

    #[tokio::test]
    async fn store_failures_are_dependency_errors() {
        let harness = Harness::new();
        harness.store.set_failing(true);

        assert!(matches!(harness.service.list().await, Err(TodoError::Dependency(_))));
        assert!(matches!(
            harness.service.create(json!({"title": "a"})).await,
            Err(TodoError::Dependency(_))
        ));
        assert!(harness.emitted().await.is_empty());
    }
}
