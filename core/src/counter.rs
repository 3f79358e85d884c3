//! Counter keys, the stats read model, and the counter cache abstraction.
//!
//! Three counters live in the cache under fixed keys. They only ever go up:
//! the aggregator increments them atomically and nothing decrements them.
//! A key that was never incremented reads as `0`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// One of the three stats counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CounterKey {
    /// Items created.
    Created,
    /// Items completed.
    Completed,
    /// Items deleted.
    Deleted,
}

impl CounterKey {
    /// All counters, in response order.
    pub const ALL: [Self; 3] = [Self::Created, Self::Completed, Self::Deleted];

    /// Cache key of this counter.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "todosCreated",
            Self::Completed => "todosCompleted",
            Self::Deleted => "todosDeleted",
        }
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the three counters, as served by the Stats API.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Value of `todosCreated`.
    pub todos_created: u64,
    /// Value of `todosCompleted`.
    pub todos_completed: u64,
    /// Value of `todosDeleted`.
    pub todos_deleted: u64,
}

impl Stats {
    /// Build a snapshot from per-key values; absent keys count as `0`.
    #[must_use]
    pub fn from_values(values: impl IntoIterator<Item = (CounterKey, Option<u64>)>) -> Self {
        let mut stats = Self::default();
        for (key, value) in values {
            let value = value.unwrap_or(0);
            match key {
                CounterKey::Created => stats.todos_created = value,
                CounterKey::Completed => stats.todos_completed = value,
                CounterKey::Deleted => stats.todos_deleted = value,
            }
        }
        stats
    }
}

/// Errors that can occur during counter cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The cache could not be reached.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    /// The cache rejected a command.
    #[error("Cache command failed: {0}")]
    Command(String),

    /// A stored value is not an integer.
    #[error("Invalid counter value for '{key}': {value}")]
    InvalidValue {
        /// Counter key
        key: String,
        /// Raw stored value
        value: String,
    },
}

/// Key-value cache holding the counters.
///
/// Increments must be atomic at the cache (never read-modify-write) so any
/// number of aggregators can run concurrently without losing counts.
///
/// # Implementations
///
/// - `RedisCounterCache` (in `todo-stats-redis`): `INCR` / `MGET`
/// - `InMemoryCounterCache` (in `todo-stats-testing`): atomics
pub trait CounterCache: Send + Sync {
    /// Atomically add one to `key` and return the new value.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the cache is unreachable or rejects the command.
    fn increment(
        &self,
        key: CounterKey,
    ) -> Pin<Box<dyn Future<Output = Result<u64, CacheError>> + Send + '_>>;

    /// Read several counters in one round trip, `None` for absent keys.
    ///
    /// The result has one entry per requested key, in request order.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the cache is unreachable or a value is not
    /// an integer.
    fn get_many<'a>(
        &'a self,
        keys: &'a [CounterKey],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Option<u64>>, CacheError>> + Send + 'a>>;
}
