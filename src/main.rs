/*
 * Swapline - trade planning service
 * Main entry point for the application
 */

use anyhow::Context;
use std::sync::Arc;
use swapline::{api, config::Config, metrics::Metrics, service::TradeService};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()
        .map_err(|e| {
            eprintln!("Failed to load configuration: {e}");
            e
        })
        .context("loading configuration")?;

    init_tracing(&config.server.log_level);
    info!("Starting swapline trade planning service");

    let metrics = Arc::new(Metrics::new().context("registering metrics")?);
    let service = TradeService::new(&config, metrics)
        .await
        .map_err(|e| {
            error!("Failed to initialize trade service: {e}");
            e
        })
        .context("initializing trade service")?;

    info!("Starting API server on {}:{}", config.server.host, config.server.port);

    let rocket = api::create_rocket(api::ApiState {
        config,
        service: Arc::new(service),
    });
    rocket
        .launch()
        .await
        .map_err(|e| anyhow::anyhow!("running API server: {e}"))?;

    Ok(())
}

fn init_tracing(log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("swapline={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
