//! Stats aggregator: maps each event to one counter increment.
//!
//! | Event type | Counter |
//! |---|---|
//! | `todo.created` | `todosCreated` |
//! | `todo.completed` | `todosCompleted` |
//! | `todo.deleted` | `todosDeleted` |
//!
//! Any other event type is ignored. The aggregator holds no state of its own;
//! any number of instances can share one cache because the cache increments
//! atomically.

use crate::consumer::{EventHandler, HandlerError};
use crate::metrics;
use async_trait::async_trait;
use std::sync::Arc;
use todo_stats_core::counter::{CacheError, CounterCache, CounterKey};
use todo_stats_core::event::SerializedEvent;
use tracing::{debug, info};

/// What applying one event did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    /// The counter was incremented to `value`.
    Counted {
        /// Incremented counter
        key: CounterKey,
        /// Value after the increment
        value: u64,
    },
    /// The event type is not counted.
    Ignored,
}

/// Increments the counter matching each event's type.
#[derive(Clone)]
pub struct StatsAggregator {
    cache: Arc<dyn CounterCache>,
}

impl StatsAggregator {
    /// Create an aggregator writing to `cache`.
    #[must_use]
    pub fn new(cache: Arc<dyn CounterCache>) -> Self {
        Self { cache }
    }

    /// Apply one event: exactly one increment for a counted type, nothing
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the increment fails; the event must then be
    /// delivered again.
    pub async fn apply(&self, event: &SerializedEvent) -> Result<Applied, CacheError> {
        let Some(kind) = event.kind() else {
            debug!(event_type = %event.event_type, "Ignoring unknown event type");
            metrics::record_ignored();
            return Ok(Applied::Ignored);
        };

        let key = kind.counter_key();
        let value = self.cache.increment(key).await?;
        info!(event_type = %kind, counter = %key, value, "Counter incremented");
        metrics::record_aggregated(kind.event_type());
        Ok(Applied::Counted { key, value })
    }
}

#[async_trait]
impl EventHandler for StatsAggregator {
    async fn handle(&self, event: &SerializedEvent) -> Result<(), HandlerError> {
        self.apply(event).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use todo_stats_testing::InMemoryCounterCache;

    fn event(event_type: &str) -> SerializedEvent {
        SerializedEvent::new(event_type.to_string(), json!({"_id": "x"}), None)
    }

    #[tokio::test]
    async fn each_kind_increments_its_counter_once() {
        let cache = InMemoryCounterCache::new();
        let aggregator = StatsAggregator::new(Arc::new(cache.clone()));

        aggregator.apply(&event("todo.created")).await.unwrap();
        aggregator.apply(&event("todo.created")).await.unwrap();
        aggregator.apply(&event("todo.completed")).await.unwrap();
        let applied = aggregator.apply(&event("todo.deleted")).await.unwrap();

        assert_eq!(cache.value(CounterKey::Created), Some(2));
        assert_eq!(cache.value(CounterKey::Completed), Some(1));
        assert_eq!(cache.value(CounterKey::Deleted), Some(1));
        assert_eq!(
            applied,
            Applied::Counted {
                key: CounterKey::Deleted,
                value: 1
            }
        );
    }

    #[tokio::test]
    async fn unknown_events_are_ignored() {
        let cache = InMemoryCounterCache::new();
        let aggregator = StatsAggregator::new(Arc::new(cache.clone()));

        let applied = aggregator.apply(&event("todo.renamed")).await.unwrap();

        assert_eq!(applied, Applied::Ignored);
        assert_eq!(cache.increments(), 0);
    }

    #[tokio::test]
    async fn cache_failures_propagate() {
        let cache = InMemoryCounterCache::new();
        cache.set_unavailable(true);
        let aggregator = StatsAggregator::new(Arc::new(cache));

        assert!(aggregator.handle(&event("todo.created")).await.is_err());
    }
}
