//! Ratekeeper daemon
//!
//! Keeps a local rate store fresh: warms the cache, then runs the periodic
//! staleness check until interrupted.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ratekeeper_sync::{SyncConfig, SyncOrchestrator, UnknownConnectivity};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SyncConfig::from_env();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting ratekeeperd");

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    info!(
        database_url = %config.store.database_url,
        base = %config.base_currency,
        targets = config.target_currencies.len(),
        check_interval_secs = config.check_interval.as_secs(),
        "Configuration loaded"
    );

    let orchestrator = Arc::new(
        SyncOrchestrator::bootstrap(config, Arc::new(UnknownConnectivity)).await?,
    );

    orchestrator.start();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    orchestrator.stop().await;
    orchestrator.cache().dispose();
    orchestrator.store().close().await;

    let metrics = serde_json::to_string(&orchestrator.metrics())?;
    info!(%metrics, "ratekeeperd shutdown complete");
    Ok(())
}
