//! Integration tests for the definition-to-dashboard pipeline
//!
//! Covers:
//! - DSL text through graph construction
//! - Status events merged and projected onto the graph
//! - Registration payloads stored and reloaded from a config directory

use flowtrack_core::config::{Config, ConfigStore, FlowConfig};
use flowtrack_core::graph::{self, SubStageKind};
use flowtrack_core::status::{self, StatusEvent, StatusPatch};
use flowtrack_core::{Category, ExecutionTarget, Status, dsl, project};
use tempfile::TempDir;

const DERIV: &str = r#"
Overall flow
AWS{Calculator_Runs->Cashflow_Generator} ->On-PREM{BPF}

Sub-stages
AWS
{
Calculator_Runs { Stage_1_1 -> Stage1_2->Stage1_3 }
Cashflow_Generator { Stage_2 }
}
On-PREM
{
BPF { Stage5_1, Stage5_2 }
}
"#;

// =============================================================================
// Graph Pipeline
// =============================================================================

#[test]
fn test_definition_to_graph() {
    let spec = dsl::parse(DERIV);
    let graph = graph::build(&spec);

    let category_ids: Vec<_> = graph.categories.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(category_ids, vec!["category-AWS", "category-On-PREM"]);

    let stage_ids: Vec<_> = graph.stages.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(
        stage_ids,
        vec![
            "stage-AWS-Calculator_Runs",
            "stage-AWS-Cashflow_Generator",
            "stage-On-PREM-BPF"
        ]
    );

    let edges: Vec<_> = graph.edges.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(
        edges,
        vec![
            "edge-stage-AWS-Calculator_Runs-stage-AWS-Cashflow_Generator",
            "edge-stage-AWS-Cashflow_Generator-stage-On-PREM-BPF",
        ]
    );

    let calc = graph
        .stage_named(Category::Aws, "Calculator_Runs")
        .expect("stage exists");
    assert_eq!(calc.kind(), Some(SubStageKind::Sequential));
    assert_eq!(calc.sub_stages.len(), 3);

    let bpf = graph.stage("stage-On-PREM-BPF").expect("stage exists");
    assert_eq!(bpf.kind(), Some(SubStageKind::Parallel));
    assert!(bpf.sub_stages.iter().all(|s| s.next.is_none()));
}

#[test]
fn test_events_flow_into_projection() {
    let graph = graph::build(&dsl::parse(DERIV));
    let mut current = graph.initial_status();

    let started = StatusEvent::new("DERIV")
        .with_stage("Stage_1_1", StatusPatch::status(Status::Running));
    status::merge_into(&mut current, &started.stages);

    let view = project(&graph, &current);
    assert_eq!(view.graph.stages[0].status, Status::Running);
    assert_eq!(view.graph.stages[1].status, Status::Pending);
    assert_eq!(view.status, Status::Running);

    let mut finished = StatusEvent::new("DERIV");
    for sub_stage in graph.sub_stages() {
        finished = finished.with_stage(sub_stage.name.clone(), StatusPatch::status(Status::Completed));
    }
    let merged = status::merge(&current, &finished.stages);

    let view = project(&graph, &merged);
    assert_eq!(view.status, Status::Completed);
    assert_eq!(view.counts.completed, 6);

    // Projection never changes topology
    assert_eq!(view.graph.edges, graph.edges);
    assert_eq!(view.graph.stages.len(), graph.stages.len());
}

#[test]
fn test_feed_payload_with_unknown_names() {
    let graph = graph::build(&dsl::parse(DERIV));
    let event: StatusEvent = serde_json::from_str(
        r#"{
            "flowName": "DERIV",
            "timestamp": "2024-03-01T10:00:00Z",
            "stages": {
                "Stage5_1": {"status": "failed", "end_time": "2024-03-01 09:59:00"},
                "Retired_Stage": {"status": "success"}
            }
        }"#,
    )
    .unwrap();

    let merged = status::merge(&graph.initial_status(), &event.stages);
    assert!(merged.contains_key("Retired_Stage"));

    let view = project(&graph, &merged);
    let bpf = &view.graph.stages[2];
    assert_eq!(bpf.sub_stages[0].status.status, Status::Failed);
    assert!(bpf.sub_stages[0].status.end_time.is_some());
    assert_eq!(bpf.status, Status::Failed);
    assert_eq!(view.status, Status::Failed);
}

// =============================================================================
// Config Store
// =============================================================================

fn setup_deployment() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("flowtrack.yaml"),
        "name: integration-test\nconfig_dir: flows\n",
    )
    .unwrap();
    dir
}

#[test]
fn test_registration_round_trip_through_store() {
    let dir = setup_deployment();
    let config = Config::load(dir.path()).unwrap();
    let store = config.config_store();

    let payload = serde_json::json!({
        "flowName": "DERIV",
        "refreshInterval": 30,
        "flowDefinition": DERIV,
        "stageMappings": {
            "aws": "Stage_1_1: calculator_stage_1_dag\nStage_2: cashflow_dag",
            "onPrem": "BPF: 20010, 10"
        }
    });
    let flow = FlowConfig::from_slice(&serde_json::to_vec(&payload).unwrap()).unwrap();
    store.save(&flow).unwrap();

    assert!(dir.path().join("flows/DERIV.json").exists());

    let reloaded = ConfigStore::new(dir.path().join("flows"))
        .load("DERIV")
        .unwrap()
        .expect("stored config");
    assert_eq!(reloaded.refresh_interval, Some(30));

    let graph = reloaded.build_graph();
    let targets: Vec<_> = graph.sub_stages().map(|s| s.target.clone()).collect();
    assert_eq!(
        targets[0],
        Some(ExecutionTarget::Dag {
            dag_id: "calculator_stage_1_dag".to_string()
        })
    );
    assert_eq!(targets[1], None);
    // Stage-level mapping covers both parallel sub-stages
    assert!(matches!(targets[4], Some(ExecutionTarget::OnPrem(_))));
    assert!(matches!(targets[5], Some(ExecutionTarget::OnPrem(_))));
}

#[test]
fn test_load_all_skips_broken_files() {
    let dir = setup_deployment();
    let store = Config::load(dir.path()).unwrap().config_store();
    std::fs::create_dir_all(store.dir()).unwrap();

    std::fs::write(
        store.dir().join("a.json"),
        r#"{"flowName": "A", "flowDefinition": "Sub-stages\nAWS\nX { y }"}"#,
    )
    .unwrap();
    std::fs::write(store.dir().join("b.json"), r#"{"refreshInterval": 5}"#).unwrap();
    std::fs::write(
        store.dir().join("c.json"),
        r#"{"flowName": "C", "flowDefinition": {"overall": "", "subStages": {"On-PREM": {"P": "q"}}}}"#,
    )
    .unwrap();

    let names: Vec<_> = store
        .load_all()
        .unwrap()
        .into_iter()
        .map(|c| c.flow_name)
        .collect();
    assert_eq!(names, vec!["A", "C"]);
}
