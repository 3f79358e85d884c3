//! Stats API server.
//!
//! ```bash
//! REDIS_HOST=localhost cargo run --bin stats-api
//! ```

use std::process::ExitCode;
use std::sync::Arc;
use todo_stats_app::config::STATS_API_PORT;
use todo_stats_app::{Config, bootstrap, lifecycle, telemetry};
use todo_stats_runtime::{StatsService, metrics};
use todo_stats_web::{StatsApiState, stats_api_router};

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    match run(Config::from_env(STATS_API_PORT)).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = ?e, "stats-api failed");
            ExitCode::FAILURE
        },
    }
}

async fn run(config: Config) -> anyhow::Result<ExitCode> {
    tracing::info!(port = config.server.port, redis = ?config.redis, "Starting stats-api");

    let metrics = metrics::install_recorder()?;
    let cache = Arc::new(bootstrap::connect_cache(&config.redis).await?);
    let listener = bootstrap::bind(&config.server).await?;

    let router = stats_api_router(StatsApiState::new(StatsService::new(cache)).with_metrics(metrics));

    let stop = lifecycle::serve_until(
        listener,
        router,
        lifecycle::wait_for_stop(std::future::pending()),
        config.shutdown_timeout,
    )
    .await?;

    tracing::info!(stop = ?stop, "stats-api stopped");
    Ok(stop.exit_code())
}
