//! Status runtime

use flowtrack_core::Config;
use flowtrack_core::status::{Status, StatusEvent, StatusMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::{FeedError, Result};
use crate::feed::{StatusListener, Subscriptions};
use crate::registry::Monitor;
use crate::source::StatusSource;

/// Logs every update at debug level and failures at warn level
#[derive(Debug, Default)]
pub struct LogListener;

impl StatusListener for LogListener {
    fn on_status(&self, event: &StatusEvent, status: &StatusMap) {
        let running = status.values().filter(|r| r.status == Status::Running).count();
        let failed = status.values().filter(|r| r.status == Status::Failed).count();
        tracing::debug!(
            flow = %event.flow_name,
            changed = event.stages.len(),
            running,
            failed,
            "status refreshed"
        );
    }

    fn on_error(&self, error: &FeedError) {
        tracing::warn!(error = %error, "status refresh failed");
    }
}

/// Loads flow configurations and keeps their status fresh
pub struct Runtime {
    config: Config,
    monitor: Arc<Monitor>,
    source: Arc<dyn StatusSource>,
    subscriptions: Mutex<Subscriptions>,
}

impl Runtime {
    /// Create a new runtime with the given configuration and status source
    pub fn new(config: Config, source: Arc<dyn StatusSource>) -> Self {
        let monitor = Arc::new(Monitor::new());
        let subscriptions = Subscriptions::new(Arc::clone(&monitor), Arc::clone(&source));
        Self {
            config,
            monitor,
            source,
            subscriptions: Mutex::new(subscriptions),
        }
    }

    /// Query interface over the registered flows
    pub fn monitor(&self) -> Arc<Monitor> {
        Arc::clone(&self.monitor)
    }

    /// Load every stored flow and start one status updater per flow.
    ///
    /// Returns the number of flows started.
    pub async fn start(&self) -> Result<usize> {
        tracing::info!(name = %self.config.settings.name, source = self.source.name(), "Starting Flowtrack runtime");

        let store = self.config.config_store();
        let configs = store.load_all()?;
        let default_interval = self.config.settings.default_refresh_interval;

        let mut subscriptions = self.subscriptions.lock().await;
        for flow in &configs {
            self.monitor.register(flow);
            let interval = self
                .source
                .poll_interval()
                .unwrap_or_else(|| Duration::from_secs(flow.refresh_secs(default_interval).max(1)));
            subscriptions
                .subscribe(&flow.flow_name, interval, Arc::new(LogListener))
                .await;
        }

        tracing::info!(flows = configs.len(), dir = %store.dir().display(), "Runtime started successfully");
        Ok(configs.len())
    }

    /// Stop every status updater
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down Flowtrack runtime");
        self.subscriptions.lock().await.unsubscribe_all().await;
        tracing::info!("Runtime shutdown complete");
        Ok(())
    }

    /// Flows with a running status updater
    pub async fn active_flows(&self) -> Vec<String> {
        self.subscriptions.lock().await.flows()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockStatusSource;
    use flowtrack_core::config::{ConfigStore, FlowConfig};

    fn write_flow(store: &ConfigStore, name: &str, definition: &str) {
        let payload = serde_json::json!({"flowName": name, "flowDefinition": definition});
        let flow = FlowConfig::from_slice(&serde_json::to_vec(&payload).unwrap()).unwrap();
        store.save(&flow).unwrap();
    }

    fn deployment() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("flowtrack.yaml"), "name: test\n").unwrap();
        let config = Config::load(dir.path()).unwrap();
        (dir, config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_registers_and_subscribes() {
        let (_dir, config) = deployment();
        let store = config.config_store();
        write_flow(&store, "DERIV", "Sub-stages\nAWS\nCalc { A->B }\n");
        write_flow(&store, "SECURITIES", "Sub-stages\nOn-PREM\nRecon { C }\n");

        let runtime = Runtime::new(
            config,
            Arc::new(MockStatusSource::new().with_interval(Duration::from_secs(5))),
        );
        assert_eq!(runtime.start().await.unwrap(), 2);
        assert_eq!(runtime.active_flows().await, vec!["DERIV", "SECURITIES"]);

        tokio::time::sleep(Duration::from_millis(10)).await;
        let monitor = runtime.monitor();
        assert_eq!(monitor.list_flows().len(), 2);
        assert_eq!(monitor.get_status("DERIV").unwrap()["A"].status, Status::Running);

        runtime.shutdown().await.unwrap();
        assert!(runtime.active_flows().await.is_empty());
    }

    #[tokio::test]
    async fn test_start_with_no_configs() {
        let (_dir, config) = deployment();
        let runtime = Runtime::new(config, Arc::new(MockStatusSource::new()));
        assert_eq!(runtime.start().await.unwrap(), 0);
        runtime.shutdown().await.unwrap();
    }
}
