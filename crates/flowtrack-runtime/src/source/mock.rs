//! Simulated status progression

use async_trait::async_trait;
use chrono::Utc;
use flowtrack_core::status::{Status, StatusEvent, StatusPatch};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

use super::StatusSource;
use crate::error::FeedError;
use crate::registry::FlowSnapshot;

#[derive(Debug, Default)]
struct Progress {
    version: u64,
    completed: usize,
    running: bool,
}

/// Walks each flow's sub-stages in declaration order.
///
/// Every fetch completes the running sub-stage and starts the next one, so
/// a flow with `n` distinct sub-stage names finishes after `n + 1` fetches.
/// Re-registering a flow restarts its progression.
#[derive(Debug, Default)]
pub struct MockStatusSource {
    interval: Option<Duration>,
    progress: Mutex<HashMap<String, Progress>>,
}

impl MockStatusSource {
    /// Source following each flow's own refresh interval
    pub fn new() -> Self {
        Self::default()
    }

    /// Poll every `interval` regardless of the flows' refresh intervals
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }
}

#[async_trait]
impl StatusSource for MockStatusSource {
    fn name(&self) -> &str {
        "mock"
    }

    fn poll_interval(&self) -> Option<Duration> {
        self.interval
    }

    async fn fetch(&self, flow: &FlowSnapshot) -> Result<StatusEvent, FeedError> {
        let mut names: Vec<&str> = Vec::new();
        for sub_stage in flow.graph.sub_stages() {
            if !names.contains(&sub_stage.name.as_str()) {
                names.push(&sub_stage.name);
            }
        }

        let now = Utc::now();
        let mut event = StatusEvent::new(&flow.name);
        event.timestamp = now;

        let mut progress = self.progress.lock();
        let entry = progress.entry(flow.name.clone()).or_default();
        if entry.version != flow.version {
            *entry = Progress {
                version: flow.version,
                ..Progress::default()
            };
        }

        if entry.running {
            if let Some(name) = names.get(entry.completed) {
                event = event.with_stage(*name, StatusPatch::status(Status::Completed).ended_at(now));
            }
            entry.completed += 1;
            entry.running = false;
        }

        if let Some(name) = names.get(entry.completed) {
            let start = StatusPatch {
                end_time: Some(None),
                ..StatusPatch::status(Status::Running).started_at(now)
            };
            event = event.with_stage(*name, start);
            entry.running = true;
        }

        Ok(event)
    }
}
