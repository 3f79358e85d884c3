//! Connecting to every dependency before a process starts serving.
//!
//! Each process connects to what it needs, in this order:
//!
//! | Process | Store | Bus | Cache |
//! |---|---|---|---|
//! | todo-api | yes (and migrates) | producer (reachability checked) | |
//! | stats-api | | | yes |
//! | stats-aggregator | | consumer group (reachability checked) | yes |
//!
//! Any failure here is fatal: the binary logs it and exits with code 1.

use crate::config::{BusConfig, DatabaseConfig, ServerConfig};
use std::io;
use std::time::Duration;
use thiserror::Error;
use todo_stats_core::counter::CacheError;
use todo_stats_core::event_bus::EventBusError;
use todo_stats_core::store::StoreError;
use todo_stats_postgres::PostgresTodoStore;
use todo_stats_redis::{RedisConfig, RedisCounterCache};
use todo_stats_redpanda::RedpandaEventBus;
use todo_stats_runtime::metrics::MetricsError;
use todo_stats_web::StatsClient;
use tokio::net::TcpListener;
use tracing::info;

/// Timeout of `/api/stats` proxy requests.
pub const STATS_PROXY_TIMEOUT: Duration = Duration::from_secs(5);

/// Startup failures.
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// The item store could not be reached or migrated.
    #[error("Item store: {0}")]
    Store(#[from] StoreError),

    /// The event bus client could not be created, or no broker answered.
    #[error("Event bus: {0}")]
    Bus(#[from] EventBusError),

    /// The counter cache could not be reached.
    #[error("Counter cache: {0}")]
    Cache(#[from] CacheError),

    /// The metrics recorder could not be installed.
    #[error("Metrics: {0}")]
    Metrics(#[from] MetricsError),

    /// The HTTP listener could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Requested address
        addr: String,
        /// Underlying error
        source: io::Error,
    },

    /// The Stats API client could not be built.
    #[error("HTTP client: {0}")]
    HttpClient(String),
}

/// Connect to `PostgreSQL` and apply migrations.
///
/// # Errors
///
/// Returns [`BootstrapError::Store`] if the database is unreachable or a
/// migration fails.
pub async fn connect_store(config: &DatabaseConfig) -> Result<PostgresTodoStore, BootstrapError> {
    info!("Connecting to item store...");
    let store = PostgresTodoStore::connect(&config.url, config.max_connections).await?;
    store.migrate().await?;
    info!("Item store connected and migrated");
    Ok(store)
}

/// Create the event bus client, with the aggregator consumer group, and
/// check that a broker answers for the topic.
///
/// # Errors
///
/// Returns [`BootstrapError::Bus`] if the client cannot be created or no
/// broker is reachable.
pub async fn connect_bus(config: &BusConfig) -> Result<RedpandaEventBus, BootstrapError> {
    info!("Connecting to event bus...");
    let bus = RedpandaEventBus::builder()
        .brokers(&config.brokers)
        .consumer_group(&config.consumer_group)
        .build()?;
    bus.check_connection(&config.topic).await?;
    info!(brokers = %bus.brokers(), topic = %config.topic, "Event bus ready");
    Ok(bus)
}

/// Connect to Redis.
///
/// # Errors
///
/// Returns [`BootstrapError::Cache`] if Redis is unreachable.
pub async fn connect_cache(config: &RedisConfig) -> Result<RedisCounterCache, BootstrapError> {
    info!("Connecting to counter cache...");
    Ok(RedisCounterCache::connect(config).await?)
}

/// Build the client of the `/api/stats` proxy.
///
/// # Errors
///
/// Returns [`BootstrapError::HttpClient`] if the TLS backend cannot be
/// initialised.
pub fn stats_client(stats_api_host: &str) -> Result<StatsClient, BootstrapError> {
    StatsClient::new(stats_api_host, STATS_PROXY_TIMEOUT)
        .map_err(|e| BootstrapError::HttpClient(e.to_string()))
}

/// Bind the HTTP listener.
///
/// # Errors
///
/// Returns [`BootstrapError::Bind`] if the address is unavailable.
pub async fn bind(config: &ServerConfig) -> Result<TcpListener, BootstrapError> {
    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| BootstrapError::Bind { addr: addr.clone(), source })?;
    info!(addr = %addr, "Listening");
    Ok(listener)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn stats_client_targets_the_stats_endpoint() {
        let client = stats_client("stats:3001").unwrap();
        assert_eq!(client.url(), "http://stats:3001/stats");
    }

    #[tokio::test]
    async fn unreachable_bus_fails_startup() {
        let config = BusConfig {
            brokers: "127.0.0.1:1".to_string(),
            topic: "todo-events".to_string(),
            consumer_group: "todo-stats-aggregator".to_string(),
        };

        let result = connect_bus(&config).await;

        assert!(matches!(result, Err(BootstrapError::Bus(EventBusError::ConnectionFailed(_)))));
    }

    #[tokio::test]
    async fn taken_port_fails_startup() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: taken.local_addr().unwrap().port(),
        };

        let result = bind(&config).await;

        assert!(matches!(result, Err(BootstrapError::Bind { .. })));
    }
}
