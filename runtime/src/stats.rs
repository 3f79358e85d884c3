//! Read path: the three counters as a [`Stats`] snapshot.

use std::sync::Arc;
use todo_stats_core::counter::{CounterCache, CounterKey, Stats};
use todo_stats_core::error::Result;

/// Reads the counter projection.
#[derive(Clone)]
pub struct StatsService {
    cache: Arc<dyn CounterCache>,
}

impl StatsService {
    /// Create a service reading from `cache`.
    #[must_use]
    pub fn new(cache: Arc<dyn CounterCache>) -> Self {
        Self { cache }
    }

    /// All three counters in one multi-key read; absent keys read as `0`.
    ///
    /// # Errors
    ///
    /// Returns [`TodoError::Dependency`](todo_stats_core::error::TodoError::Dependency)
    /// if the cache is unreachable.
    pub async fn get_stats(&self) -> Result<Stats> {
        let values = self.cache.get_many(&CounterKey::ALL).await?;
        Ok(Stats::from_values(CounterKey::ALL.into_iter().zip(values)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use todo_stats_core::error::TodoError;
    use todo_stats_testing::InMemoryCounterCache;

    #[tokio::test]
    async fn fresh_cache_reads_all_zero() {
        let service = StatsService::new(Arc::new(InMemoryCounterCache::new()));
        assert_eq!(service.get_stats().await.unwrap(), Stats::default());
    }

    #[tokio::test]
    async fn reports_each_counter() {
        let cache = InMemoryCounterCache::new();
        cache.set(CounterKey::Created, 5);
        cache.set(CounterKey::Completed, 2);
        let service = StatsService::new(Arc::new(cache));

        assert_eq!(
            service.get_stats().await.unwrap(),
            Stats {
                todos_created: 5,
                todos_completed: 2,
                todos_deleted: 0,
            }
        );
    }

    #[tokio::test]
    async fn unreachable_cache_is_a_dependency_error() {
        let cache = InMemoryCounterCache::new();
        cache.set_unavailable(true);
        let service = StatsService::new(Arc::new(cache));

        assert!(matches!(
            service.get_stats().await,
            Err(TodoError::Dependency(_))
        ));
    }
}
