//! `PostgreSQL` item store for the to-do service.
//!
//! Items are stored as JSONB documents next to their identifier:
//!
//! ```text
//! todos
//! ┌──────────────────────────┬──────────────────────────────┬────────────┐
//! │ id (TEXT, PK)            │ doc (JSONB)                  │ created_at │
//! ├──────────────────────────┼──────────────────────────────┼────────────┤
//! │ 65a1f0c2e4b0a1b2c3d4e5f6 │ {"title": "x", "completed":  │ …          │
//! │                          │  false}                      │            │
//! └──────────────────────────┴──────────────────────────────┴────────────┘
//! ```
//!
//! The identifier never appears inside `doc`. Partial updates use JSONB
//! concatenation (`doc || patch`), which replaces top-level keys only.
//!
//! # Example
//!
//! ```ignore
//! use todo_stats_postgres::PostgresTodoStore;
//!
//! let store = PostgresTodoStore::connect("postgres://localhost/todos", 10).await?;
//! store.migrate().await?;
//! ```

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::future::Future;
use std::pin::Pin;
use todo_stats_core::store::{StoreError, TodoStore};
use todo_stats_core::todo::{Document, Todo, TodoId};

/// [`TodoStore`] backed by a `PostgreSQL` connection pool.
#[derive(Clone, Debug)]
pub struct PostgresTodoStore {
    pool: PgPool,
}

impl PostgresTodoStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` with at most `max_connections` connections.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if the database is unreachable.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Failed to connect: {e}")))?;

        Ok(Self::from_pool(pool))
    }

    /// Create the `todos` table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn to_todo(id: String, doc: Json<Document>) -> Result<Todo, StoreError> {
    let id = TodoId::parse(&id).map_err(|e| StoreError::SerializationError(e.to_string()))?;
    Ok(Todo::new(id, doc.0))
}

fn database_error(e: sqlx::Error) -> StoreError {
    StoreError::DatabaseError(e.to_string())
}

impl TodoStore for PostgresTodoStore {
    fn insert(
        &self,
        fields: Document,
    ) -> Pin<Box<dyn Future<Output = Result<Todo, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let todo = Todo::new(TodoId::generate(), fields);

            sqlx::query("INSERT INTO todos (id, doc) VALUES ($1, $2)")
                .bind(todo.id.as_str())
                .bind(Json(&todo.fields))
                .execute(&self.pool)
                .await
                .map_err(database_error)?;

            tracing::debug!(todo_id = %todo.id, "Inserted todo");
            Ok(todo)
        })
    }

    fn find_all(&self) -> Pin<Box<dyn Future<Output = Result<Vec<Todo>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let rows: Vec<(String, Json<Document>)> =
                sqlx::query_as("SELECT id, doc FROM todos ORDER BY created_at, id")
                    .fetch_all(&self.pool)
                    .await
                    .map_err(database_error)?;

            rows.into_iter().map(|(id, doc)| to_todo(id, doc)).collect()
        })
    }

    fn update<'a>(
        &'a self,
        id: &'a TodoId,
        patch: Document,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Todo>, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            // The CTE locks the row and yields the document as it was before
            // the merge, in the same statement as the write.
            let previous: Option<(Json<Document>,)> = sqlx::query_as(
                r"
                WITH previous AS (
                    SELECT id, doc FROM todos WHERE id = $1 FOR UPDATE
                )
                UPDATE todos
                SET doc = todos.doc || $2
                FROM previous
                WHERE todos.id = previous.id
                RETURNING previous.doc
                ",
            )
            .bind(id.as_str())
            .bind(Json(&patch))
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;

            Ok(previous.map(|(doc,)| Todo::new(id.clone(), doc.0)))
        })
    }

    fn delete<'a>(
        &'a self,
        id: &'a TodoId,
    ) -> Pin<Box<dyn Future<Output = Result<bool, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM todos WHERE id = $1")
                .bind(id.as_str())
                .execute(&self.pool)
                .await
                .map_err(database_error)?;

            Ok(result.rows_affected() > 0)
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.pool.close().await;
            tracing::info!("Postgres pool closed");
        })
    }
}
