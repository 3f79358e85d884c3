//! In-memory counter cache.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on lock poisoning

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use todo_stats_core::counter::{CacheError, CounterCache, CounterKey};

#[derive(Debug, Default)]
struct CacheState {
    values: HashMap<CounterKey, u64>,
    unavailable: bool,
    failing_increments: usize,
    increments: usize,
}

/// [`CounterCache`] over a mutex-guarded map.
///
/// Every increment happens under one lock, so concurrent callers never lose
/// a count.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCounterCache {
    state: Arc<Mutex<CacheState>>,
}

impl InMemoryCounterCache {
    /// Create a new empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of `key`, `None` if it was never written
    #[must_use]
    pub fn value(&self, key: CounterKey) -> Option<u64> {
        self.state.lock().unwrap().values.get(&key).copied()
    }

    /// Seed `key` with `value`
    pub fn set(&self, key: CounterKey, value: u64) {
        self.state.lock().unwrap().values.insert(key, value);
    }

    /// Make every operation fail as if the cache were unreachable (or stop).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    /// Make the next `count` increments fail.
    pub fn fail_next_increments(&self, count: usize) {
        self.state.lock().unwrap().failing_increments = count;
    }

    /// Number of increment calls that succeeded
    #[must_use]
    pub fn increments(&self) -> usize {
        self.state.lock().unwrap().increments
    }
}

impl CounterCache for InMemoryCounterCache {
    fn increment(
        &self,
        key: CounterKey,
    ) -> Pin<Box<dyn Future<Output = Result<u64, CacheError>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if state.unavailable {
                return Err(CacheError::Unavailable("connection refused".to_string()));
            }
            if state.failing_increments > 0 {
                state.failing_increments -= 1;
                return Err(CacheError::Command("injected failure".to_string()));
            }
            state.increments += 1;
            let value = state.values.entry(key).or_insert(0);
            *value += 1;
            Ok(*value)
        })
    }

    fn get_many<'a>(
        &'a self,
        keys: &'a [CounterKey],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Option<u64>>, CacheError>> + Send + 'a>> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            if state.unavailable {
                return Err(CacheError::Unavailable("connection refused".to_string()));
            }
            Ok(keys.iter().map(|key| state.values.get(key).copied()).collect())
        })
    }
}
