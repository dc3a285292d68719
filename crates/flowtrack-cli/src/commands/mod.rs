//! CLI command implementations

pub mod flow;
pub mod init;
pub mod run;
pub mod status;
pub mod validate;
pub mod watch;

use anyhow::{Context, Result};
use flowtrack_core::Config;
use flowtrack_runtime::Monitor;

/// Settings from `path`, or defaults when the file does not exist
pub(crate) fn load_config(path: &str) -> Result<Config> {
    Config::load_or_default(path).with_context(|| format!("Failed to load settings from {}", path))
}

/// Monitor with every stored flow registered
pub(crate) fn load_monitor(config: &Config) -> Result<Monitor> {
    let store = config.config_store();
    let flows = store
        .load_all()
        .with_context(|| format!("Failed to read flow configs from {}", store.dir().display()))?;

    let monitor = Monitor::new();
    for flow in &flows {
        monitor.register(flow);
    }
    tracing::debug!(flows = flows.len(), "loaded flows");
    Ok(monitor)
}

/// Error for a flow name with no stored configuration
pub(crate) fn not_found(name: &str) -> anyhow::Error {
    flowtrack_core::Error::FlowNotFound {
        name: name.to_string(),
    }
    .into()
}
