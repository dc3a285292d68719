//! Follow a flow's status

use anyhow::{Context, Result};
use flowtrack_runtime::feed::{self, FeedUpdate};
use flowtrack_runtime::{Subscriptions, source};
use std::sync::Arc;
use std::time::Duration;

use super::{load_config, load_monitor, not_found};
use crate::render;

/// Subscribe to a flow and print every update until `ticks` updates or Ctrl+C
pub async fn run(config_path: &str, name: &str, ticks: Option<usize>) -> Result<()> {
    let config = load_config(config_path)?;
    let monitor = Arc::new(load_monitor(&config)?);
    let snapshot = monitor.snapshot(name).ok_or_else(|| not_found(name))?;

    let source = source::from_settings(&config.settings)
        .await
        .context("Failed to create status source")?;
    let interval = source.poll_interval().unwrap_or_else(|| {
        let secs = snapshot
            .refresh_interval
            .unwrap_or(config.settings.default_refresh_interval);
        Duration::from_secs(secs.max(1))
    });

    let mut subscriptions = Subscriptions::new(Arc::clone(&monitor), source);
    let (listener, mut updates) = feed::channel();
    subscriptions
        .subscribe(name, interval, Arc::new(listener))
        .await;

    tracing::info!("Watching '{}' every {:?} (press Ctrl+C to stop)", name, interval);

    let mut seen = 0;
    loop {
        tokio::select! {
            update = updates.recv() => {
                match update {
                    Some(FeedUpdate::Status { .. }) => {
                        if let Some(view) = monitor.project(name) {
                            print!("{}", render::tree(name, &view));
                            println!();
                        }
                    }
                    Some(FeedUpdate::Error(message)) => {
                        tracing::warn!("Status update failed: {}", message);
                    }
                    None => break,
                }
                seen += 1;
                if ticks.is_some_and(|limit| seen >= limit) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received shutdown signal");
                break;
            }
        }
    }

    subscriptions.unsubscribe_all().await;
    Ok(())
}
