//! Stats aggregator.
//!
//! Consumes to-do events and increments one counter per event. Any number of
//! instances may run; they share the configured consumer group.
//!
//! ```bash
//! STATS_QUEUE_URI=localhost:9092 REDIS_HOST=localhost cargo run --bin stats-aggregator
//! ```

use std::process::ExitCode;
use std::sync::Arc;
use todo_stats_app::config::AggregatorConfig;
use todo_stats_app::{bootstrap, lifecycle, telemetry};
use todo_stats_core::event_bus::EventBus;
use todo_stats_runtime::{EventConsumer, StatsAggregator};
use tokio::sync::broadcast;

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    match run(AggregatorConfig::from_env()).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = ?e, "stats-aggregator failed");
            ExitCode::FAILURE
        },
    }
}

async fn run(config: AggregatorConfig) -> anyhow::Result<ExitCode> {
    tracing::info!(
        topic = %config.bus.topic,
        consumer_group = %config.bus.consumer_group,
        "Starting stats-aggregator"
    );

    let cache = Arc::new(bootstrap::connect_cache(&config.redis).await?);
    let bus = Arc::new(bootstrap::connect_bus(&config.bus).await?);
    let (shutdown, _) = broadcast::channel(1);

    let consumer = EventConsumer::new(
        "stats-aggregator",
        vec![config.bus.topic.clone()],
        Arc::clone(&bus) as Arc<dyn EventBus>,
        Arc::new(StatsAggregator::new(cache)),
        shutdown.subscribe(),
    )
    .spawn();

    let stop = lifecycle::wait_for_stop(std::future::pending()).await?;

    if stop.is_graceful() {
        // The consumer finishes the in-flight event before it stops.
        let _ = shutdown.send(());
        if tokio::time::timeout(config.shutdown_timeout, consumer).await.is_err() {
            tracing::warn!("Consumer did not stop in time");
        }
        if let Err(e) = bus.close().await {
            tracing::warn!(error = %e, "Event bus did not close cleanly");
        }
    }

    tracing::info!(stop = ?stop, "stats-aggregator stopped");
    Ok(stop.exit_code())
}
