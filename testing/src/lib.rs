//! # Todo Stats Testing
//!
//! In-memory implementations of the infrastructure traits, so the write path,
//! the aggregator, and the HTTP surfaces can be tested without Postgres,
//! Kafka, or Redis.
//!
//! - [`InMemoryTodoStore`]: ordered `Vec`-backed item store
//! - [`InMemoryEventBus`]: at-least-once bus with consumer groups and redelivery
//! - [`InMemoryCounterCache`]: counter map with failure injection
//!
//! All three are cheap to clone; clones share state, so a test can keep a
//! handle for assertions while the code under test owns another.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use todo_stats_core::counter::{CounterCache, CounterKey};
//! use todo_stats_testing::InMemoryCounterCache;
//!
//! # tokio_test::block_on(async {
//! let cache = InMemoryCounterCache::new();
//! let shared: Arc<dyn CounterCache> = Arc::new(cache.clone());
//!
//! shared.increment(CounterKey::Created).await.unwrap();
//! assert_eq!(cache.value(CounterKey::Created), Some(1));
//! # });
//! ```

#![allow(clippy::unwrap_used)] // Test doubles unwrap lock guards; poisoning means a test already panicked

pub mod counter_cache;
pub mod event_bus;
pub mod store;

pub use counter_cache::InMemoryCounterCache;
pub use event_bus::InMemoryEventBus;
pub use store::InMemoryTodoStore;

/// JSON object literal as a [`Document`](todo_stats_core::todo::Document).
///
/// Non-object values yield an empty document.
#[must_use]
pub fn document(value: serde_json::Value) -> todo_stats_core::todo::Document {
    match value {
        serde_json::Value::Object(map) => map,
        _ => todo_stats_core::todo::Document::new(),
    }
}
