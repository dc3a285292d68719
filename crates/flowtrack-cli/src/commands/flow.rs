//! Flow management commands

use anyhow::{Context, Result};
use flowtrack_core::config::FlowConfig;

use super::{load_config, load_monitor, not_found};
use crate::render;

/// List all flows
pub async fn list(config_path: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let monitor = load_monitor(&config)?;

    let flows = monitor.list_flows();
    if flows.is_empty() {
        println!("No flows registered in {}", config.config_dir().display());
        return Ok(());
    }
    print!("{}", render::flow_table(&flows));
    Ok(())
}

/// Show flow details
pub async fn show(config_path: &str, name: &str, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let monitor = load_monitor(&config)?;

    let view = monitor.project(name).ok_or_else(|| not_found(name))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&view.graph)?);
    } else {
        print!("{}", render::tree(name, &view));
    }
    Ok(())
}

/// Register a flow from a payload file
pub async fn register(config_path: &str, file: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let flow = FlowConfig::load(file).context("Failed to load flow payload")?;

    let graph = flow.build_graph();
    if graph.is_empty() {
        tracing::warn!("Flow '{}' declares no stages", flow.flow_name);
    }

    let store = config.config_store();
    let path = store.save(&flow).context("Failed to save flow configuration")?;

    tracing::info!("✓ Registered flow '{}' at {}", flow.flow_name, path.display());
    Ok(())
}

/// Remove a registered flow
pub async fn remove(config_path: &str, name: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let store = config.config_store();

    if !store.delete(name).context("Failed to remove flow configuration")? {
        return Err(not_found(name));
    }

    tracing::info!("✓ Removed flow '{}'", name);
    Ok(())
}
