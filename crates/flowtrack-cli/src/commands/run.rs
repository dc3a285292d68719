//! Run the Flowtrack runtime

use anyhow::{Context, Result};
use flowtrack_runtime::{Runtime, source};

use super::load_config;

/// Run the Flowtrack runtime
pub async fn run(config_path: &str) -> Result<()> {
    tracing::info!("Loading configuration from {}", config_path);

    let config = load_config(config_path)?;

    tracing::info!("Deployment: {}", config.settings.name);

    let source = source::from_settings(&config.settings)
        .await
        .context("Failed to create status source")?;
    let runtime = Runtime::new(config, source);

    let flows = runtime.start().await.context("Runtime error")?;
    if flows == 0 {
        tracing::warn!("No flows registered; nothing to refresh");
    }

    tracing::info!("Runtime running (press Ctrl+C to stop)");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to install Ctrl+C handler")?;
    tracing::info!("Received shutdown signal");

    runtime.shutdown().await.context("Shutdown error")?;

    tracing::info!("Flowtrack stopped");
    Ok(())
}
