//! Todo API server.
//!
//! ```bash
//! DATABASE_URL=postgres://... STATS_QUEUE_URI=localhost:9092 cargo run --bin todo-api
//! ```

use std::process::ExitCode;
use std::sync::Arc;
use todo_stats_app::config::TODO_API_PORT;
use todo_stats_app::{Config, bootstrap, lifecycle, telemetry};
use todo_stats_core::store::TodoStore;
use todo_stats_runtime::{EventPublisher, TodoService, metrics};
use todo_stats_web::{TodoApiState, todo_api_router};

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    match run(Config::from_env(TODO_API_PORT)).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = ?e, "todo-api failed");
            ExitCode::FAILURE
        },
    }
}

async fn run(config: Config) -> anyhow::Result<ExitCode> {
    tracing::info!(port = config.server.port, topic = %config.bus.topic, "Starting todo-api");

    let metrics = metrics::install_recorder()?;
    let store = Arc::new(bootstrap::connect_store(&config.database).await?);
    let bus = Arc::new(bootstrap::connect_bus(&config.bus).await?);
    let stats_client = bootstrap::stats_client(&config.stats_api_host)?;
    let listener = bootstrap::bind(&config.server).await?;

    let publisher = Arc::new(EventPublisher::new(
        bus,
        config.bus.topic.clone(),
        config.publish_buffer,
    ));
    let todos = TodoService::new(Arc::clone(&store) as Arc<dyn TodoStore>, Arc::clone(&publisher));
    let router = todo_api_router(TodoApiState::new(todos, stats_client).with_metrics(metrics));

    let stop = lifecycle::serve_until(
        listener,
        router,
        lifecycle::wait_for_stop(publisher.fatal_error()),
        config.shutdown_timeout,
    )
    .await?;

    if stop.is_graceful() {
        if let Err(e) = publisher.close().await {
            tracing::warn!(error = %e, "Event publisher did not close cleanly");
        }
        store.close().await;
    }

    tracing::info!(stop = ?stop, "todo-api stopped");
    Ok(stop.exit_code())
}
