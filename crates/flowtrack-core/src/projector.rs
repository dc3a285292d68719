//! Status projection
//!
//! Overlays a status map onto a flow graph for rendering. The graph's
//! topology is never touched; only status fields differ in the result.

use serde::{Deserialize, Serialize};

use crate::graph::FlowGraph;
use crate::status::{Status, StatusMap, StatusRecord};

/// Sub-stage status counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusCounts {
    /// Pending sub-stages
    pub pending: usize,
    /// Running sub-stages
    pub running: usize,
    /// Completed sub-stages
    pub completed: usize,
    /// Failed sub-stages
    pub failed: usize,
    /// Sub-stages whose source errored
    pub error: usize,
    /// Sub-stages with no status record
    pub unknown: usize,
}

impl StatusCounts {
    fn add(&mut self, status: Status) {
        match status {
            Status::Pending => self.pending += 1,
            Status::Running => self.running += 1,
            Status::Completed => self.completed += 1,
            Status::Failed => self.failed += 1,
            Status::Error => self.error += 1,
            Status::Unknown => self.unknown += 1,
        }
    }

    /// Total number of sub-stages counted
    pub fn total(&self) -> usize {
        self.pending + self.running + self.completed + self.failed + self.error + self.unknown
    }
}

/// A flow graph with statuses applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedFlowGraph {
    /// Graph with sub-stage and stage statuses filled in
    #[serde(flatten)]
    pub graph: FlowGraph,

    /// Sub-stage status counts
    pub counts: StatusCounts,

    /// Aggregate over every stage
    pub status: Status,
}

/// Aggregate sub-stage statuses into a stage status.
///
/// Failed wins over error, error over running. All completed is completed;
/// anything else (including no sub-stages) is pending.
pub fn aggregate<I>(statuses: I) -> Status
where
    I: IntoIterator<Item = Status>,
{
    let mut any = false;
    let mut failed = false;
    let mut error = false;
    let mut running = false;
    let mut all_completed = true;

    for status in statuses {
        any = true;
        match status {
            Status::Failed => failed = true,
            Status::Error => error = true,
            Status::Running => running = true,
            _ => {}
        }
        if status != Status::Completed {
            all_completed = false;
        }
    }

    if failed {
        Status::Failed
    } else if error {
        Status::Error
    } else if running {
        Status::Running
    } else if any && all_completed {
        Status::Completed
    } else {
        Status::Pending
    }
}

/// Apply `status` to a copy of `graph`.
///
/// Sub-stages without an entry get `unknown`, which is distinct from the
/// `pending` of a declared but not started sub-stage.
pub fn project(graph: &FlowGraph, status: &StatusMap) -> AnnotatedFlowGraph {
    let mut annotated = graph.clone();
    let mut counts = StatusCounts::default();

    for stage in &mut annotated.stages {
        for sub_stage in &mut stage.sub_stages {
            sub_stage.status = status
                .get(&sub_stage.name)
                .cloned()
                .unwrap_or_else(|| StatusRecord::with_status(Status::Unknown));
            counts.add(sub_stage.status.status);
        }
        stage.status = aggregate(stage.sub_stages.iter().map(|s| s.status.status));
    }

    let overall = aggregate(annotated.stages.iter().map(|s| s.status));

    AnnotatedFlowGraph {
        graph: annotated,
        counts,
        status: overall,
    }
}
