//! Validate a flow registration payload

use anyhow::{Context, Result};
use flowtrack_core::config::{FlowConfig, FlowDefinition};
use flowtrack_core::dsl;
use flowtrack_core::graph::GraphWarning;

/// Run the validate command
pub async fn run(file: &str, json: bool) -> Result<()> {
    tracing::info!("Validating flow payload: {}", file);

    let config = FlowConfig::load(file).context("Failed to load flow payload")?;
    let graph = config.build_graph();

    if json {
        println!("{}", serde_json::to_string_pretty(&graph)?);
        return Ok(());
    }

    if let FlowDefinition::Text(text) = &config.flow_definition {
        let (_, report) = dsl::parse_with_report(text);
        for dropped in &report.dropped {
            tracing::warn!(
                "line {} ignored ({:?}): {}",
                dropped.line,
                dropped.reason,
                dropped.text
            );
        }
    }

    for warning in &graph.warnings {
        match warning {
            GraphWarning::DuplicateSubStage {
                stage_id,
                name,
                assigned_id,
            } => tracing::warn!("duplicate sub-stage '{}' in {} renamed to {}", name, stage_id, assigned_id),
            GraphWarning::OutlineStageMissing { category, stage } => {
                tracing::warn!("{} stage '{}' in overall flow has no sub-stages", category, stage)
            }
            GraphWarning::EmptyStage { stage_id } => {
                tracing::warn!("stage {} has no sub-stages", stage_id)
            }
        }
    }

    let summary = graph.summary();
    let mappings = config.mappings();
    let mapped = graph.sub_stages().filter(|s| s.target.is_some()).count();

    println!("✓ Flow: {}", config.flow_name);
    println!(
        "✓ {} categories, {} stages, {} sub-stages, {} edges",
        summary.category_count, summary.stage_count, summary.sub_stage_count, summary.edge_count
    );
    println!(
        "✓ Mappings: {} aws, {} on-prem ({}/{} sub-stages mapped)",
        mappings.aws.len(),
        mappings.on_prem.len(),
        mapped,
        summary.sub_stage_count
    );
    if !graph.warnings.is_empty() {
        println!("{} warning(s)", graph.warnings.len());
    }

    tracing::info!("✓ Flow payload is valid");
    Ok(())
}
