//! Status from execution-system tables
//!
//! Cloud sub-stages map to Airflow DAG ids and read the latest row of the
//! `dag_run` table. On-prem sub-stages map to `(bpf_id, process_id)` and
//! read the `stage_status` table. Both are queried through one PostgreSQL
//! pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowtrack_core::config::DatabaseSettings;
use flowtrack_core::mapping::{ExecutionTarget, OnPremTarget};
use flowtrack_core::status::{Status, StatusEvent, StatusPatch};
use serde_json::{Map, Value, json};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use std::time::Duration;

use super::StatusSource;
use crate::error::{FeedError, Result};
use crate::registry::FlowSnapshot;

/// Latest run of a DAG
#[derive(Debug, Clone, PartialEq)]
pub struct DagRun {
    /// DAG id
    pub dag_id: String,
    /// Airflow state
    pub state: Option<String>,
    /// Run start
    pub start_date: Option<DateTime<Utc>>,
    /// Run end
    pub end_date: Option<DateTime<Utc>>,
}

/// Latest row for an on-prem process
#[derive(Debug, Clone, PartialEq)]
pub struct StageRun {
    /// Status text, e.g. `Not_started`
    pub status: Option<String>,
    /// Start
    pub start_date: Option<DateTime<Utc>>,
    /// End
    pub end_date: Option<DateTime<Utc>>,
}

impl DagRun {
    /// Patch for a sub-stage mapped to this DAG
    pub fn to_patch(&self) -> StatusPatch {
        let state = self.state.as_deref().unwrap_or("unknown");
        StatusPatch {
            status: Some(Status::normalize(state)),
            start_time: Some(self.start_date),
            end_time: Some(self.end_date),
            details: Some(object(json!({"dag_id": self.dag_id, "state": state}))),
        }
    }
}

impl StageRun {
    /// Patch for a sub-stage mapped to this process
    pub fn to_patch(&self, target: OnPremTarget) -> StatusPatch {
        let status = self.status.as_deref().unwrap_or("unknown");
        StatusPatch {
            status: Some(Status::normalize(status)),
            start_time: Some(self.start_date),
            end_time: Some(self.end_date),
            details: Some(object(json!({
                "bpf_id": target.bpf_id,
                "process_id": target.process_id,
                "original_status": status,
            }))),
        }
    }
}

/// Patch for a mapped unit with no row
pub fn missing_patch(details: Value) -> StatusPatch {
    StatusPatch::status(Status::Unknown).with_details(object(details))
}

/// Patch for a unit whose query failed
pub fn error_patch(message: &str) -> StatusPatch {
    StatusPatch::status(Status::Error).with_details(object(json!({"error": message})))
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Accept `table` or `schema.table`
fn check_table_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.split('.').count() <= 2
        && name.split('.').all(|part| {
            !part.is_empty()
                && !part.starts_with(|c: char| c.is_ascii_digit())
                && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if !valid {
        anyhow::bail!("invalid table name '{}'", name);
    }
    Ok(())
}

/// Reads execution-system tables through a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct DatabaseStatusSource {
    pool: PgPool,
    dag_run_table: String,
    stage_status_table: String,
}

impl DatabaseStatusSource {
    /// Connect using the database settings
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        let Some(url) = settings.url.as_deref() else {
            anyhow::bail!("database source selected but database.url is not set");
        };
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await?;
        tracing::info!(
            dag_run_table = %settings.dag_run_table,
            stage_status_table = %settings.stage_status_table,
            "connected to status database"
        );
        Self::new(pool, &settings.dag_run_table, &settings.stage_status_table)
    }

    /// Source over an existing pool
    pub fn new(pool: PgPool, dag_run_table: &str, stage_status_table: &str) -> Result<Self> {
        check_table_name(dag_run_table)?;
        check_table_name(stage_status_table)?;
        Ok(Self {
            pool,
            dag_run_table: dag_run_table.to_string(),
            stage_status_table: stage_status_table.to_string(),
        })
    }

    async fn latest_dag_runs(&self, dag_ids: &[String]) -> std::result::Result<Vec<DagRun>, sqlx::Error> {
        let sql = format!(
            "SELECT DISTINCT ON (dag_id) dag_id, state, start_date, end_date \
             FROM {} WHERE dag_id = ANY($1) \
             ORDER BY dag_id, execution_date DESC",
            self.dag_run_table
        );
        let rows = sqlx::query(&sql).bind(dag_ids).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> std::result::Result<DagRun, sqlx::Error> {
                Ok(DagRun {
                    dag_id: row.try_get("dag_id")?,
                    state: row.try_get("state")?,
                    start_date: row.try_get("start_date")?,
                    end_date: row.try_get("end_date")?,
                })
            })
            .collect()
    }

    async fn latest_stage_run(
        &self,
        target: OnPremTarget,
    ) -> std::result::Result<Option<StageRun>, sqlx::Error> {
        let sql = format!(
            "SELECT status, start_date, end_date FROM {} \
             WHERE bpf_id = $1 AND process_id = $2 \
             ORDER BY start_date DESC NULLS LAST LIMIT 1",
            self.stage_status_table
        );
        let row = sqlx::query(&sql)
            .bind(target.bpf_id)
            .bind(target.process_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| -> std::result::Result<StageRun, sqlx::Error> {
            Ok(StageRun {
                status: row.try_get("status")?,
                start_date: row.try_get("start_date")?,
                end_date: row.try_get("end_date")?,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl StatusSource for DatabaseStatusSource {
    fn name(&self) -> &str {
        "database"
    }

    /// Patches every mapped sub-stage. A failing environment marks its
    /// sub-stages `error`; the fetch fails only when every queried
    /// environment failed.
    async fn fetch(&self, flow: &FlowSnapshot) -> std::result::Result<StatusEvent, FeedError> {
        let mut dags: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut processes: Vec<(String, OnPremTarget)> = Vec::new();
        for sub_stage in flow.graph.sub_stages() {
            match &sub_stage.target {
                Some(ExecutionTarget::Dag { dag_id }) => {
                    dags.entry(dag_id.clone()).or_default().push(sub_stage.name.clone());
                }
                Some(ExecutionTarget::OnPrem(target)) => {
                    processes.push((sub_stage.name.clone(), *target));
                }
                None => {}
            }
        }

        let mut event = StatusEvent::new(&flow.name);
        let mut attempted = 0;
        let mut failures: Vec<sqlx::Error> = Vec::new();

        if !dags.is_empty() {
            attempted += 1;
            let dag_ids: Vec<String> = dags.keys().cloned().collect();
            match self.latest_dag_runs(&dag_ids).await {
                Ok(runs) => {
                    for (dag_id, names) in &dags {
                        let patch = match runs.iter().find(|run| &run.dag_id == dag_id) {
                            Some(run) => run.to_patch(),
                            None => missing_patch(json!({"dag_id": dag_id})),
                        };
                        for name in names {
                            event.stages.insert(name.clone(), patch.clone());
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(flow = %flow.name, error = %e, "failed to read DAG runs");
                    let patch = error_patch(&e.to_string());
                    for name in dags.values().flatten() {
                        event.stages.insert(name.clone(), patch.clone());
                    }
                    failures.push(e);
                }
            }
        }

        if !processes.is_empty() {
            attempted += 1;
            let mut results = Vec::with_capacity(processes.len());
            for (_, target) in &processes {
                results.push(self.latest_stage_run(*target).await);
            }
            if let Some(e) = collect_stage_runs(&flow.name, &processes, results, &mut event) {
                failures.push(e);
            }
        }

        if attempted > 0 && failures.len() == attempted {
            return Err(FeedError::Database(failures.remove(0)));
        }
        Ok(event)
    }
}

/// Record one patch per on-prem sub-stage. Returns an error only when every
/// query failed.
fn collect_stage_runs(
    flow_name: &str,
    processes: &[(String, OnPremTarget)],
    results: Vec<std::result::Result<Option<StageRun>, sqlx::Error>>,
    event: &mut StatusEvent,
) -> Option<sqlx::Error> {
    let mut first_error = None;
    let mut succeeded = 0;
    for ((name, target), result) in processes.iter().zip(results) {
        let patch = match result {
            Ok(Some(run)) => {
                succeeded += 1;
                run.to_patch(*target)
            }
            Ok(None) => {
                succeeded += 1;
                missing_patch(json!({
                    "bpf_id": target.bpf_id,
                    "process_id": target.process_id,
                }))
            }
            Err(e) => {
                tracing::error!(flow = %flow_name, sub_stage = %name, error = %e, "failed to read stage status");
                let patch = error_patch(&e.to_string());
                if first_error.is_none() {
                    first_error = Some(e);
                }
                patch
            }
        };
        event.stages.insert(name.clone(), patch);
    }
    if succeeded > 0 { None } else { first_error }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use flowtrack_core::status::StatusRecord;
    use rstest::rstest;

    #[rstest]
    #[case("dag_run")]
    #[case("schema1.dag_run")]
    #[case("on_prem_schema1.stage_status")]
    fn test_valid_table_names(#[case] name: &str) {
        assert!(check_table_name(name).is_ok());
    }

    #[rstest]
    #[case("")]
    #[case("dag_run; DROP TABLE x")]
    #[case("a.b.c")]
    #[case("1table")]
    #[case("schema.")]
    fn test_invalid_table_names(#[case] name: &str) {
        assert!(check_table_name(name).is_err());
    }

    #[test]
    fn test_dag_run_patch() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let run = DagRun {
            dag_id: "calculator_stage_1_dag".to_string(),
            state: Some("success".to_string()),
            start_date: Some(start),
            end_date: None,
        };

        let mut record = StatusRecord::default();
        run.to_patch().apply(&mut record);
        assert_eq!(record.status, Status::Completed);
        assert_eq!(record.start_time, Some(start));
        assert_eq!(record.end_time, None);
        assert_eq!(record.details["dag_id"], "calculator_stage_1_dag");
    }

    #[rstest]
    #[case(Some("Not_started"), Status::Pending)]
    #[case(Some("Running"), Status::Running)]
    #[case(Some("Failed"), Status::Failed)]
    #[case(Some("Completed"), Status::Completed)]
    #[case(None, Status::Unknown)]
    fn test_stage_run_patch(#[case] status: Option<&str>, #[case] expected: Status) {
        let run = StageRun {
            status: status.map(String::from),
            start_date: None,
            end_date: None,
        };
        let patch = run.to_patch(OnPremTarget {
            bpf_id: 20010,
            process_id: 10,
        });
        assert_eq!(patch.status, Some(expected));
        assert_eq!(patch.details.unwrap()["bpf_id"], 20010);
    }

    #[test]
    fn test_missing_and_error_patches() {
        assert_eq!(missing_patch(json!({})).status, Some(Status::Unknown));
        let patch = error_patch("connection refused");
        assert_eq!(patch.status, Some(Status::Error));
        assert_eq!(patch.details.unwrap()["error"], "connection refused");
    }

    fn processes() -> Vec<(String, OnPremTarget)> {
        vec![
            ("Stage5_1".to_string(), OnPremTarget { bpf_id: 20010, process_id: 10 }),
            ("Stage5_2".to_string(), OnPremTarget { bpf_id: 20007, process_id: 5 }),
        ]
    }

    #[test]
    fn test_partial_stage_failure_keeps_environment() {
        let run = StageRun {
            status: Some("Running".to_string()),
            start_date: None,
            end_date: None,
        };
        let mut event = StatusEvent::new("DERIV");
        let failure = collect_stage_runs(
            "DERIV",
            &processes(),
            vec![Ok(Some(run)), Err(sqlx::Error::PoolTimedOut)],
            &mut event,
        );

        assert!(failure.is_none());
        assert_eq!(event.stages["Stage5_1"].status, Some(Status::Running));
        assert_eq!(event.stages["Stage5_2"].status, Some(Status::Error));
    }

    #[test]
    fn test_all_stage_queries_failing_fails_environment() {
        let mut event = StatusEvent::new("DERIV");
        let failure = collect_stage_runs(
            "DERIV",
            &processes(),
            vec![Err(sqlx::Error::PoolTimedOut), Err(sqlx::Error::PoolClosed)],
            &mut event,
        );

        assert!(matches!(failure, Some(sqlx::Error::PoolTimedOut)));
        assert_eq!(event.stages.len(), 2);
        assert!(event.stages.values().all(|p| p.status == Some(Status::Error)));
    }

    #[test]
    fn test_missing_rows_are_not_failures() {
        let mut event = StatusEvent::new("DERIV");
        let failure = collect_stage_runs("DERIV", &processes(), vec![Ok(None), Ok(None)], &mut event);

        assert!(failure.is_none());
        assert_eq!(event.stages["Stage5_1"].status, Some(Status::Unknown));
    }
}
