//! Plain-text rendering of flows and status

use flowtrack_core::graph::SubStageKind;
use flowtrack_core::projector::AnnotatedFlowGraph;
use flowtrack_core::status::Status;
use flowtrack_runtime::FlowSummary;
use std::fmt::Write;

fn marker(status: Status) -> &'static str {
    match status {
        Status::Pending => "·",
        Status::Running => "▶",
        Status::Completed => "✓",
        Status::Failed => "✗",
        Status::Error => "!",
        Status::Unknown => "?",
    }
}

fn kind_label(kind: Option<SubStageKind>) -> &'static str {
    match kind {
        Some(SubStageKind::Sequential) => "sequential",
        Some(SubStageKind::Parallel) => "parallel",
        Some(SubStageKind::Single) => "single",
        None => "empty",
    }
}

/// Category / stage / sub-stage tree with statuses
pub fn tree(name: &str, view: &AnnotatedFlowGraph) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} [{}] {}/{} completed",
        name,
        view.status,
        view.counts.completed,
        view.counts.total()
    );

    for category in &view.graph.categories {
        let _ = writeln!(out, "{}", category.name);
        for stage in view.graph.stages_of(category.name) {
            let _ = writeln!(
                out,
                "  {} [{}] {}",
                stage.name,
                stage.status,
                kind_label(stage.kind())
            );
            for sub_stage in &stage.sub_stages {
                let _ = writeln!(
                    out,
                    "    {} {}  {}",
                    marker(sub_stage.status.status),
                    sub_stage.name,
                    sub_stage.status.status
                );
            }
        }
    }

    if !view.graph.warnings.is_empty() {
        let _ = writeln!(out, "{} warning(s)", view.graph.warnings.len());
    }
    out
}

/// Flow listing table
pub fn flow_table(flows: &[FlowSummary]) -> String {
    let width = flows
        .iter()
        .map(|f| f.name.len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());

    let mut out = String::new();
    let _ = writeln!(out, "{:<width$}  STAGES  CATEGORIES  EDGES", "NAME");
    for flow in flows {
        let _ = writeln!(
            out,
            "{:<width$}  {:>6}  {:>10}  {:>5}",
            flow.name, flow.stage_count, flow.category_count, flow.edge_count
        );
    }
    out
}
