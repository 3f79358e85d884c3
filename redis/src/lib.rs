//! Redis counter cache for the todo stats pipeline.
//!
//! Each counter is a plain Redis string key holding an integer:
//!
//! - **Increment**: `INCR todosCreated` (atomic on the server, creates the key at 0)
//! - **Read**: `MGET todosCreated todosCompleted todosDeleted` (one round trip)
//!
//! Connections go through a [`ConnectionManager`], which reconnects after a
//! dropped connection and is cheap to clone per command.
//!
//! # Example
//!
//! ```no_run
//! use todo_stats_redis::{RedisConfig, RedisCounterCache};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RedisConfig::new("localhost", 6379);
//! let cache = RedisCounterCache::connect(&config).await?;
//! # Ok(())
//! # }
//! ```

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use todo_stats_core::counter::{CacheError, CounterCache, CounterKey};

/// Where to find the Redis server and how to authenticate.
#[derive(Clone, PartialEq, Eq)]
pub struct RedisConfig {
    /// Server host name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Password for `AUTH`, if the server requires one.
    pub password: Option<String>,
    /// Connect over TLS (`rediss://`).
    pub tls: bool,
}

impl RedisConfig {
    /// Plain-text connection without a password.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            password: None,
            tls: false,
        }
    }

    /// Set the password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Enable or disable TLS.
    #[must_use]
    pub const fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Connection URL: `redis[s]://[:password@]host:port`.
    ///
    /// The password is percent-encoded.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.tls { "rediss" } else { "redis" };
        match self.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => format!(
                "{scheme}://:{}@{}:{}",
                urlencoding::encode(password),
                self.host,
                self.port
            ),
            None => format!("{scheme}://{}:{}", self.host, self.port),
        }
    }
}

impl fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("tls", &self.tls)
            .finish()
    }
}

/// [`CounterCache`] backed by Redis.
#[derive(Clone)]
pub struct RedisCounterCache {
    conn_manager: ConnectionManager,
}

impl RedisCounterCache {
    /// Connect to the server described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] if the URL is invalid or the
    /// server cannot be reached.
    pub async fn connect(config: &RedisConfig) -> Result<Self, CacheError> {
        let client = Client::open(config.url())
            .map_err(|e| CacheError::Unavailable(format!("Failed to create Redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            CacheError::Unavailable(format!("Failed to create Redis connection manager: {e}"))
        })?;

        tracing::info!(host = %config.host, port = config.port, tls = config.tls, "Connected to Redis");
        Ok(Self { conn_manager })
    }
}

fn cache_error(e: &RedisError) -> CacheError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
        CacheError::Unavailable(e.to_string())
    } else {
        CacheError::Command(e.to_string())
    }
}

fn parse_counter(key: CounterKey, raw: Option<String>) -> Result<Option<u64>, CacheError> {
    raw.map(|value| {
        value.parse::<u64>().map_err(|_| CacheError::InvalidValue {
            key: key.to_string(),
            value,
        })
    })
    .transpose()
}

impl CounterCache for RedisCounterCache {
    fn increment(
        &self,
        key: CounterKey,
    ) -> Pin<Box<dyn Future<Output = Result<u64, CacheError>> + Send + '_>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let value: u64 = conn.incr(key.as_str(), 1_u64).await.map_err(|e| {
                tracing::warn!(counter = %key, error = %e, "INCR failed");
                cache_error(&e)
            })?;

            tracing::trace!(counter = %key, value, "Counter incremented");
            Ok(value)
        })
    }

    fn get_many<'a>(
        &'a self,
        keys: &'a [CounterKey],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Option<u64>>, CacheError>> + Send + 'a>> {
        Box::pin(async move {
            if keys.is_empty() {
                return Ok(Vec::new());
            }

            let mut conn = self.conn_manager.clone();
            let names: Vec<&str> = keys.iter().copied().map(CounterKey::as_str).collect();

            // MGET always answers with one entry per key, even for a single key.
            let raw: Vec<Option<String>> = redis::cmd("MGET")
                .arg(&names)
                .query_async(&mut conn)
                .await
                .map_err(|e| cache_error(&e))?;

            keys.iter()
                .copied()
                .zip(raw)
                .map(|(key, value)| parse_counter(key, value))
                .collect()
        })
    }
}
