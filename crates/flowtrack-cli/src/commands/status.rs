//! One-shot status fetch

use anyhow::{Context, Result};
use flowtrack_runtime::source;

use super::{load_config, load_monitor, not_found};
use crate::render;

/// Fetch a flow's status once from the configured source and print it
pub async fn run(config_path: &str, name: &str, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let monitor = load_monitor(&config)?;
    let snapshot = monitor.snapshot(name).ok_or_else(|| not_found(name))?;

    let source = source::from_settings(&config.settings)
        .await
        .context("Failed to create status source")?;
    tracing::debug!("Fetching status of '{}' from {}", name, source.name());

    let event = source
        .fetch(&snapshot)
        .await
        .with_context(|| format!("Failed to fetch status of '{}'", name))?;
    monitor.apply(&event)?;

    let view = monitor.project(name).ok_or_else(|| not_found(name))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print!("{}", render::tree(name, &view));
    }
    Ok(())
}
