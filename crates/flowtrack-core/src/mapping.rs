//! Stage mapping tables
//!
//! Maps stage or sub-stage names to the identifiers the execution systems
//! use: a DAG id in the cloud environment, a `(bpf_id, process_id)` pair
//! on premises.
//!
//! Mapping text is one `name: value` entry per line. Malformed lines are
//! skipped; a repeated name keeps the last value.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ir::Category;

/// On-premises process identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OnPremTarget {
    /// Batch process flow id
    pub bpf_id: i64,
    /// Process id within the batch process flow
    pub process_id: i64,
}

/// Where a unit of work executes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionTarget {
    /// Airflow DAG in the cloud environment
    Dag {
        /// DAG id
        dag_id: String,
    },
    /// On-premises batch process
    OnPrem(OnPremTarget),
}

/// Parsed mapping tables for both environments
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingTable {
    /// Stage or sub-stage name -> DAG id
    #[serde(default)]
    pub aws: IndexMap<String, String>,

    /// Stage or sub-stage name -> on-prem identifiers
    #[serde(default, rename = "onPrem")]
    pub on_prem: IndexMap<String, OnPremTarget>,
}

impl MappingTable {
    /// True when neither table has entries
    pub fn is_empty(&self) -> bool {
        self.aws.is_empty() && self.on_prem.is_empty()
    }

    /// Resolve the execution target of a sub-stage.
    ///
    /// Looks up the sub-stage name first, then the owning stage name, in the
    /// table of the sub-stage's category.
    pub fn target_for(
        &self,
        category: Category,
        stage: &str,
        sub_stage: &str,
    ) -> Option<ExecutionTarget> {
        match category {
            Category::Aws => self
                .aws
                .get(sub_stage)
                .or_else(|| self.aws.get(stage))
                .map(|dag_id| ExecutionTarget::Dag {
                    dag_id: dag_id.clone(),
                }),
            Category::OnPrem => self
                .on_prem
                .get(sub_stage)
                .or_else(|| self.on_prem.get(stage))
                .copied()
                .map(ExecutionTarget::OnPrem),
        }
    }
}

/// Parse both mapping text blocks
pub fn parse_mappings(aws_text: &str, on_prem_text: &str) -> MappingTable {
    MappingTable {
        aws: parse_aws(aws_text),
        on_prem: parse_on_prem(on_prem_text),
    }
}

/// Parse `Stage_1_1: calculator_stage_1_dag` lines
pub fn parse_aws(text: &str) -> IndexMap<String, String> {
    let mut table = IndexMap::new();
    for (name, value) in entries(text) {
        table.insert(name.to_string(), value.to_string());
    }
    table
}

/// Parse `Stage5_1: 20010, 10` lines
pub fn parse_on_prem(text: &str) -> IndexMap<String, OnPremTarget> {
    let mut table = IndexMap::new();
    for (name, value) in entries(text) {
        match parse_id_pair(value) {
            Some(target) => {
                table.insert(name.to_string(), target);
            }
            None => tracing::debug!(name, value, "skipping malformed on-prem mapping"),
        }
    }
    table
}

/// Non-blank `name: value` lines, split on the first colon, both sides trimmed
/// and non-empty
fn entries(text: &str) -> impl Iterator<Item = (&str, &str)> {
    text.lines().filter_map(|line| {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some((name, value)) = line.split_once(':') else {
            tracing::debug!(line, "skipping mapping line without ':'");
            return None;
        };
        let (name, value) = (name.trim(), value.trim());
        if name.is_empty() || value.is_empty() {
            return None;
        }
        Some((name, value))
    })
}

/// Exactly two comma-separated integers
fn parse_id_pair(value: &str) -> Option<OnPremTarget> {
    let mut parts = value.split(',').map(str::trim);
    let bpf_id = parts.next()?.parse().ok()?;
    let process_id = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(OnPremTarget { bpf_id, process_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_parse_on_prem_pair() {
        let table = parse_on_prem("Stage5_1: 20010, 10");
        assert_eq!(
            table["Stage5_1"],
            OnPremTarget {
                bpf_id: 20010,
                process_id: 10
            }
        );
    }

    #[rstest]
    #[case("Stage5_1: 20010")]
    #[case("Stage5_1: 20010, 10, 3")]
    #[case("Stage5_1: abc, 10")]
    #[case("Stage5_1: 20010,")]
    #[case("Stage5_1 20010, 10")]
    #[case(": 20010, 10")]
    #[case("Stage5_1:")]
    fn test_parse_on_prem_skips_malformed(#[case] line: &str) {
        assert!(parse_on_prem(line).is_empty());
    }

    #[test]
    fn test_parse_aws_lines() {
        let text = "\nStage_1_1: calculator_stage_1_dag\n  Stage1_2 :calculator_stage_2_dag  \nbroken line\n";
        let table = parse_aws(text);
        assert_eq!(table.len(), 2);
        assert_eq!(table["Stage_1_1"], "calculator_stage_1_dag");
        assert_eq!(table["Stage1_2"], "calculator_stage_2_dag");
    }

    #[test]
    fn test_aws_splits_on_first_colon_only() {
        let table = parse_aws("Stage_2: dag:with:colons");
        assert_eq!(table["Stage_2"], "dag:with:colons");
    }

    #[test]
    fn test_last_write_wins() {
        let table = parse_mappings("A: one\nA: two", "B: 1, 2\nB: 3, 4");
        assert_eq!(table.aws["A"], "two");
        assert_eq!(table.on_prem["B"].bpf_id, 3);
        assert_eq!(table.aws.len(), 1);
    }

    #[test]
    fn test_target_prefers_sub_stage_then_stage() {
        let table = parse_mappings("Calc: stage_dag\nStage_1_1: sub_dag", "BPF: 20010, 10");

        assert_eq!(
            table.target_for(Category::Aws, "Calc", "Stage_1_1"),
            Some(ExecutionTarget::Dag {
                dag_id: "sub_dag".to_string()
            })
        );
        assert_eq!(
            table.target_for(Category::Aws, "Calc", "Stage1_2"),
            Some(ExecutionTarget::Dag {
                dag_id: "stage_dag".to_string()
            })
        );
        assert_eq!(
            table.target_for(Category::OnPrem, "BPF", "Stage5_1"),
            Some(ExecutionTarget::OnPrem(OnPremTarget {
                bpf_id: 20010,
                process_id: 10
            }))
        );
        // Tables are per-environment
        assert_eq!(table.target_for(Category::OnPrem, "Calc", "Stage_1_1"), None);
    }
}
