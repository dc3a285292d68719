//! Status subscriptions
//!
//! [`subscribe`] polls a [`StatusSource`] for one flow on an interval,
//! merges each event into the [`Monitor`] and hands it to a
//! [`StatusListener`]. Failures go to the listener's error callback and
//! polling continues.
//!
//! Teardown is explicit: [`SubscriptionHandle::unsubscribe`] stops the task
//! and waits for it, so no callback fires once it returns.

use flowtrack_core::status::{StatusEvent, StatusMap};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::error::FeedError;
use crate::registry::Monitor;
use crate::source::StatusSource;

/// Receives subscription callbacks
pub trait StatusListener: Send + Sync + 'static {
    /// An event was merged; `status` is the flow's map afterwards
    fn on_status(&self, event: &StatusEvent, status: &StatusMap);

    /// The source failed for this tick
    fn on_error(&self, error: &FeedError);
}

/// Message forwarded by a [`ChannelListener`]
#[derive(Debug, Clone)]
pub enum FeedUpdate {
    /// Merged event with the resulting map
    Status {
        /// Event as produced by the source
        event: StatusEvent,
        /// Flow status after the merge
        status: StatusMap,
    },
    /// Error text
    Error(String),
}

/// Listener forwarding callbacks into a channel
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<FeedUpdate>,
}

/// Listener plus the receiving end of its channel
pub fn channel() -> (ChannelListener, mpsc::UnboundedReceiver<FeedUpdate>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelListener { tx }, rx)
}

impl StatusListener for ChannelListener {
    fn on_status(&self, event: &StatusEvent, status: &StatusMap) {
        let _ = self.tx.send(FeedUpdate::Status {
            event: event.clone(),
            status: status.clone(),
        });
    }

    fn on_error(&self, error: &FeedError) {
        let _ = self.tx.send(FeedUpdate::Error(error.to_string()));
    }
}

/// Teardown handle of one subscription
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: Uuid,
    flow_name: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    /// Subscription id
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Subscribed flow
    pub fn flow_name(&self) -> &str {
        &self.flow_name
    }

    /// Whether the polling task has stopped
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|task| task.is_finished())
    }

    /// Stop polling and wait for the task to exit
    pub async fn unsubscribe(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::error!(flow = %self.flow_name, id = %self.id, "status subscription panicked");
                }
            }
        }
        tracing::info!(flow = %self.flow_name, id = %self.id, "unsubscribed");
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Poll `source` for `flow_name` every `interval`, starting immediately
pub fn subscribe(
    monitor: Arc<Monitor>,
    source: Arc<dyn StatusSource>,
    flow_name: &str,
    interval: Duration,
    listener: Arc<dyn StatusListener>,
) -> SubscriptionHandle {
    let id = Uuid::new_v4();
    let flow = flow_name.to_string();
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

    tracing::info!(flow = %flow, %id, source = source.name(), ?interval, "subscribed");

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => break,
                _ = ticker.tick() => {}
            }

            let Some(snapshot) = monitor.snapshot(&flow) else {
                listener.on_error(&FeedError::FlowNotRegistered { name: flow.clone() });
                continue;
            };

            let fetched = tokio::select! {
                biased;
                _ = &mut shutdown_rx => break,
                fetched = source.fetch(&snapshot) => fetched,
            };

            match fetched.and_then(|event| monitor.apply(&event).map(|status| (event, status))) {
                Ok((event, status)) => {
                    tracing::debug!(flow = %flow, stages = event.stages.len(), "status update");
                    listener.on_status(&event, &status);
                }
                Err(e) => {
                    tracing::warn!(flow = %flow, error = %e, "status fetch failed");
                    listener.on_error(&e);
                }
            }
        }
    });

    SubscriptionHandle {
        id,
        flow_name: flow_name.to_string(),
        shutdown: Some(shutdown_tx),
        task: Some(task),
    }
}

/// One consumer's subscriptions, at most one per flow
pub struct Subscriptions {
    monitor: Arc<Monitor>,
    source: Arc<dyn StatusSource>,
    handles: HashMap<String, SubscriptionHandle>,
}

impl Subscriptions {
    /// Subscriptions against `monitor`, polling `source`
    pub fn new(monitor: Arc<Monitor>, source: Arc<dyn StatusSource>) -> Self {
        Self {
            monitor,
            source,
            handles: HashMap::new(),
        }
    }

    /// Subscribe to a flow, tearing down any earlier subscription to it
    pub async fn subscribe(
        &mut self,
        flow_name: &str,
        interval: Duration,
        listener: Arc<dyn StatusListener>,
    ) -> Uuid {
        if let Some(previous) = self.handles.remove(flow_name) {
            previous.unsubscribe().await;
        }
        let handle = subscribe(
            Arc::clone(&self.monitor),
            Arc::clone(&self.source),
            flow_name,
            interval,
            listener,
        );
        let id = handle.id();
        self.handles.insert(flow_name.to_string(), handle);
        id
    }

    /// Tear down the subscription to a flow; false if there was none
    pub async fn unsubscribe(&mut self, flow_name: &str) -> bool {
        match self.handles.remove(flow_name) {
            Some(handle) => {
                handle.unsubscribe().await;
                true
            }
            None => false,
        }
    }

    /// Tear down every subscription
    pub async fn unsubscribe_all(&mut self) {
        let handles = self.handles.drain().map(|(_, handle)| handle.unsubscribe());
        futures::future::join_all(handles).await;
    }

    /// Whether a flow has a live subscription
    pub fn contains(&self, flow_name: &str) -> bool {
        self.handles.contains_key(flow_name)
    }

    /// Subscribed flow names, sorted
    pub fn flows(&self) -> Vec<String> {
        let mut flows: Vec<String> = self.handles.keys().cloned().collect();
        flows.sort();
        flows
    }

    /// Number of live subscriptions
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// True when nothing is subscribed
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
