//! Flow registry and status board
//!
//! Registered flows are immutable [`FlowSnapshot`]s behind an `Arc`.
//! Re-registering a flow builds the new snapshot first and then swaps the
//! pointer under a short write lock, so readers see either the old graph or
//! the new one, never a mix. Status maps are swapped the same way.

use chrono::{DateTime, Utc};
use flowtrack_core::config::FlowConfig;
use flowtrack_core::graph::FlowGraph;
use flowtrack_core::ir::ParsedFlowSpec;
use flowtrack_core::mapping::MappingTable;
use flowtrack_core::projector::{self, AnnotatedFlowGraph};
use flowtrack_core::status::{StatusEvent, StatusMap};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::FeedError;

/// One registered version of a flow
#[derive(Debug, Clone)]
pub struct FlowSnapshot {
    /// Flow name
    pub name: String,
    /// Registry-wide increasing version
    pub version: u64,
    /// Content hash of the definition
    pub fingerprint: String,
    /// Parsed definition
    pub spec: ParsedFlowSpec,
    /// Built graph with execution targets
    pub graph: FlowGraph,
    /// Mapping tables
    pub mappings: MappingTable,
    /// Refresh interval from the payload, if it set one
    pub refresh_interval: Option<u64>,
    /// When this version was registered
    pub registered_at: DateTime<Utc>,
}

impl FlowSnapshot {
    fn build(config: &FlowConfig, version: u64) -> Self {
        let spec = config.spec();
        let mappings = config.mappings();
        let graph = flowtrack_core::GraphBuilder::new()
            .with_mappings(&mappings)
            .build(&spec);

        Self {
            name: config.flow_name.clone(),
            version,
            fingerprint: spec.content_hash(),
            spec,
            graph,
            mappings,
            refresh_interval: config.refresh_interval,
            registered_at: Utc::now(),
        }
    }

    /// Listing entry for this snapshot
    pub fn summary(&self) -> FlowSummary {
        let counts = self.graph.summary();
        FlowSummary {
            name: self.name.clone(),
            stage_count: counts.stage_count,
            category_count: counts.category_count,
            node_count: counts.node_count,
            edge_count: counts.edge_count,
            version: self.version,
        }
    }
}

/// Listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSummary {
    /// Flow name
    pub name: String,
    /// Stage nodes
    pub stage_count: usize,
    /// Category nodes
    pub category_count: usize,
    /// Category plus stage nodes
    pub node_count: usize,
    /// Execution-order edges
    pub edge_count: usize,
    /// Snapshot version
    pub version: u64,
}

/// Registered flows keyed by name
#[derive(Debug, Default)]
pub struct FlowRegistry {
    flows: RwLock<BTreeMap<String, Arc<FlowSnapshot>>>,
    next_version: AtomicU64,
}

impl FlowRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and publish a snapshot, replacing any previous version
    pub fn register(&self, config: &FlowConfig) -> Arc<FlowSnapshot> {
        let version = self.next_version.fetch_add(1, Ordering::Relaxed) + 1;
        let snapshot = Arc::new(FlowSnapshot::build(config, version));

        let previous = self
            .flows
            .write()
            .insert(snapshot.name.clone(), Arc::clone(&snapshot));

        match previous {
            Some(old) if old.fingerprint == snapshot.fingerprint => {
                tracing::debug!(flow = %snapshot.name, version, "re-registered unchanged flow");
            }
            Some(old) => {
                tracing::info!(flow = %snapshot.name, from = old.version, to = version, "replaced flow graph");
            }
            None => {
                tracing::info!(flow = %snapshot.name, version, "registered flow");
            }
        }
        snapshot
    }

    /// Remove a flow; false if it was not registered
    pub fn remove(&self, name: &str) -> bool {
        self.flows.write().remove(name).is_some()
    }

    /// Current snapshot of a flow
    pub fn get(&self, name: &str) -> Option<Arc<FlowSnapshot>> {
        self.flows.read().get(name).cloned()
    }

    /// Whether a flow is registered
    pub fn contains(&self, name: &str) -> bool {
        self.flows.read().contains_key(name)
    }

    /// Registered flows, sorted by name
    pub fn list(&self) -> Vec<FlowSummary> {
        self.flows.read().values().map(|s| s.summary()).collect()
    }

    /// Number of registered flows
    pub fn len(&self) -> usize {
        self.flows.read().len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.flows.read().is_empty()
    }
}

/// Latest status map per flow
#[derive(Debug, Default)]
pub struct StatusBoard {
    maps: RwLock<HashMap<String, Arc<StatusMap>>>,
}

impl StatusBoard {
    /// Create an empty board
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed pending records for every declared sub-stage of `snapshot`.
    ///
    /// Records already on the board are kept, including those for names the
    /// new graph no longer declares.
    pub fn initialize(&self, snapshot: &FlowSnapshot) -> Arc<StatusMap> {
        let mut maps = self.maps.write();
        let mut seeded = maps
            .get(&snapshot.name)
            .map(|current| (**current).clone())
            .unwrap_or_default();
        for sub_stage in snapshot.graph.sub_stages() {
            seeded.entry(sub_stage.name.clone()).or_default();
        }
        let seeded = Arc::new(seeded);
        maps.insert(snapshot.name.clone(), Arc::clone(&seeded));
        seeded
    }

    /// Merge an event onto the flow's map and publish the result
    pub fn apply(&self, event: &StatusEvent) -> Arc<StatusMap> {
        let mut maps = self.maps.write();
        Self::merge_locked(&mut maps, event)
    }

    /// Like [`StatusBoard::apply`], but only when `accept` holds while the
    /// board is locked. `None` leaves the board untouched.
    pub fn apply_if<F>(&self, event: &StatusEvent, accept: F) -> Option<Arc<StatusMap>>
    where
        F: FnOnce() -> bool,
    {
        let mut maps = self.maps.write();
        if !accept() {
            return None;
        }
        Some(Self::merge_locked(&mut maps, event))
    }

    fn merge_locked(maps: &mut HashMap<String, Arc<StatusMap>>, event: &StatusEvent) -> Arc<StatusMap> {
        let mut merged = maps
            .get(&event.flow_name)
            .map(|current| (**current).clone())
            .unwrap_or_default();
        flowtrack_core::status::merge_into(&mut merged, &event.stages);
        let merged = Arc::new(merged);
        maps.insert(event.flow_name.clone(), Arc::clone(&merged));
        merged
    }

    /// Current map of a flow
    pub fn get(&self, name: &str) -> Option<Arc<StatusMap>> {
        self.maps.read().get(name).cloned()
    }

    /// Drop a flow's map
    pub fn remove(&self, name: &str) -> bool {
        self.maps.write().remove(name).is_some()
    }
}

/// Query and update interface over the registry and the status board
#[derive(Debug, Default)]
pub struct Monitor {
    registry: FlowRegistry,
    board: StatusBoard,
}

impl Monitor {
    /// Create an empty monitor
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a flow and seed its status
    pub fn register(&self, config: &FlowConfig) -> Arc<FlowSnapshot> {
        let snapshot = self.registry.register(config);
        self.board.initialize(&snapshot);
        snapshot
    }

    /// Remove a flow and its status; false if it was not registered
    pub fn remove(&self, name: &str) -> bool {
        let removed = self.registry.remove(name);
        self.board.remove(name);
        if removed {
            tracing::info!(flow = %name, "removed flow");
        }
        removed
    }

    /// Registered flows, sorted by name
    pub fn list_flows(&self) -> Vec<FlowSummary> {
        self.registry.list()
    }

    /// Current snapshot of a flow
    pub fn snapshot(&self, name: &str) -> Option<Arc<FlowSnapshot>> {
        self.registry.get(name)
    }

    /// Graph of a registered flow
    pub fn get_flow_graph(&self, name: &str) -> Option<FlowGraph> {
        self.registry.get(name).map(|s| s.graph.clone())
    }

    /// Status map of a registered flow
    pub fn get_status(&self, name: &str) -> Option<StatusMap> {
        if !self.registry.contains(name) {
            return None;
        }
        Some(
            self.board
                .get(name)
                .map(|status| (*status).clone())
                .unwrap_or_default(),
        )
    }

    /// Graph of a registered flow with its current status applied
    pub fn project(&self, name: &str) -> Option<AnnotatedFlowGraph> {
        let snapshot = self.registry.get(name)?;
        let status = self.board.get(name).unwrap_or_default();
        Some(projector::project(&snapshot.graph, &status))
    }

    /// Merge an event for a registered flow
    ///
    /// Registration is checked under the board lock, so an event racing a
    /// [`Monitor::remove`] never resurrects the removed flow's map.
    pub fn apply(&self, event: &StatusEvent) -> Result<Arc<StatusMap>, FeedError> {
        self.board
            .apply_if(event, || self.registry.contains(&event.flow_name))
            .ok_or_else(|| FeedError::FlowNotRegistered {
                name: event.flow_name.clone(),
            })
    }
}
