//! Initialize a new Flowtrack deployment

use anyhow::Result;
use flowtrack_core::config::SETTINGS_FILE;
use std::fs;
use std::path::Path;

const EXAMPLE_FLOW: &str = r#"{
  "flowName": "DERIV",
  "refreshInterval": 120,
  "databases": {
    "aws": { "host": "airflow-db.internal", "port": 5432, "database": "airflow" },
    "onPrem": { "host": "batch-db.internal", "port": 5432, "database": "batch" }
  },
  "flowDefinition": "Overall flow\nAWS{Calculator_Runs->Cashflow_Generator} ->On-PREM{BPF}\n\nSub-stages\nAWS\n{\nCalculator_Runs { Stage_1_1 -> Stage1_2 -> Stage1_3 }\nCashflow_Generator { Stage_2 }\n}\nOn-PREM\n{\nBPF { Stage5_1, Stage5_2 }\n}\n",
  "stageMappings": {
    "aws": "Stage_1_1: calculator_stage_1_dag\nStage1_2: calculator_stage_2_dag\nStage1_3: calculator_stage_3_dag\nStage_2: cashflow_generator_dag",
    "onPrem": "Stage5_1: 20010, 10\nStage5_2: 20007, 5"
  }
}
"#;

/// Run the init command
pub async fn run(path: &str, name: Option<&str>) -> Result<()> {
    let deploy_dir = Path::new(path);

    // Create directory if it doesn't exist
    if !deploy_dir.exists() {
        fs::create_dir_all(deploy_dir)?;
    }

    let abs_path = deploy_dir.canonicalize()?;

    // Derive deployment name from directory name if not provided
    let deploy_name = match name {
        Some(n) => n.to_string(),
        None => abs_path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Could not determine deployment name from path"))?,
    };

    if deploy_dir.join(SETTINGS_FILE).exists() {
        anyhow::bail!(
            "Directory '{}' already contains a {}",
            deploy_dir.display(),
            SETTINGS_FILE
        );
    }

    tracing::info!("Creating new Flowtrack deployment: {}", deploy_name);

    fs::create_dir_all(deploy_dir.join("configs"))?;

    let settings = format!(
        r#"# Flowtrack settings
name: {deploy_name}

# Directory of flow registration payloads (<flow>.json)
config_dir: configs

# Status source: mock | database
source: mock

mock:
  interval_secs: 5

database:
  # url: postgres://flowtrack@localhost:5432/airflow
  dag_run_table: dag_run
  stage_status_table: stage_status

# Seconds between refreshes for flows without refreshInterval
default_refresh_interval: 120
"#
    );
    fs::write(deploy_dir.join(SETTINGS_FILE), settings)?;
    fs::write(deploy_dir.join("configs/DERIV.json"), EXAMPLE_FLOW)?;

    tracing::info!(
        "✓ Created deployment '{}' at {}",
        deploy_name,
        abs_path.display()
    );
    tracing::info!("");
    tracing::info!("Next steps:");
    if path != "." {
        tracing::info!("  cd {}", deploy_dir.display());
    }
    tracing::info!("  flowtrack flow list       # Registered flows");
    tracing::info!("  flowtrack watch DERIV     # Follow status updates");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowtrack_core::config::{Config, FlowConfig};

    #[test]
    fn test_example_flow_is_valid() {
        let flow = FlowConfig::from_slice(EXAMPLE_FLOW.as_bytes()).unwrap();
        let graph = flow.build_graph();
        assert_eq!(graph.summary().stage_count, 3);
        assert!(graph.sub_stages().all(|s| s.target.is_some()));
        assert!(graph.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_init_writes_loadable_deployment() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("ops");
        run(target.to_str().unwrap(), None).await.unwrap();

        let config = Config::load(&target).unwrap();
        assert_eq!(config.settings.name, "ops");
        assert_eq!(config.config_store().list().unwrap(), vec!["DERIV.json"]);

        assert!(run(target.to_str().unwrap(), None).await.is_err());
    }
}
