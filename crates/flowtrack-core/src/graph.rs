//! Flow graph construction
//!
//! Turns a [`ParsedFlowSpec`] into category nodes, stage nodes and the
//! derived execution-order edges between stages.
//!
//! Containment (category owns stages, stage owns sub-stages) and execution
//! order (edges) are separate relations: edges only ever connect stages.
//! Categories keep the declaration order of the sub-stage block; the overall
//! line is only checked for stages it names but never declares.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::ir::{Category, ParsedFlowSpec};
use crate::mapping::{ExecutionTarget, MappingTable};
use crate::status::{Status, StatusMap, StatusRecord};

/// Horizontal offset of the first category
const CATEGORY_X: i32 = 100;
/// Horizontal distance between categories
const CATEGORY_SPACING: i32 = 600;
/// Vertical position of categories
const CATEGORY_Y: i32 = 100;
/// Default category box size
const CATEGORY_WIDTH: u32 = 500;
const CATEGORY_HEIGHT: u32 = 400;
/// Stage position relative to its category
const STAGE_X: i32 = 50;
const STAGE_SPACING: i32 = 150;
const STAGE_Y: i32 = 80;

/// How the sub-stages of a stage relate to each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubStageKind {
    /// `A->B->C`: run left to right
    Sequential,
    /// `A,B`: run concurrently, order not significant
    Parallel,
    /// `A`: exactly one sub-stage
    Single,
}

/// Split a raw sub-stage expression into its kind and sub-stage names.
///
/// `->` takes precedence over `,`. Tokens are trimmed and empty tokens are
/// dropped.
pub fn derive_sub_stages(expr: &str) -> (SubStageKind, Vec<String>) {
    let (kind, separator) = if expr.contains("->") {
        (SubStageKind::Sequential, "->")
    } else if expr.contains(',') {
        (SubStageKind::Parallel, ",")
    } else {
        (SubStageKind::Single, "")
    };

    let names: Vec<String> = if separator.is_empty() {
        let name = expr.trim();
        if name.is_empty() {
            vec![]
        } else {
            vec![name.to_string()]
        }
    } else {
        expr.split(separator)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    };

    (kind, names)
}

/// Position and size hints for the rendering collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LayoutHints {
    /// Horizontal position (relative to the parent for stages)
    pub x: i32,
    /// Vertical position (relative to the parent for stages)
    pub y: i32,
    /// Suggested width
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Suggested height
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Smallest tracked unit of execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubStageDescriptor {
    /// Graph-wide unique id
    pub id: String,
    /// Name used to correlate status events
    pub name: String,
    /// Concurrency kind shared by all sub-stages of the stage
    pub kind: SubStageKind,
    /// Id of the following sub-stage, for sequential stages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    /// Execution system identifier, when a mapping exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ExecutionTarget>,
    /// Current execution record
    pub status: StatusRecord,
}

/// A named unit of work inside a category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageNode {
    /// Graph-wide unique id
    pub id: String,
    /// Stage name as declared
    pub name: String,
    /// Owning category
    pub category: Category,
    /// Id of the owning category node
    pub parent_id: String,
    /// Sub-stages in declaration order
    pub sub_stages: Vec<SubStageDescriptor>,
    /// Aggregate of the sub-stage statuses
    pub status: Status,
    /// Position inside the category
    pub layout: LayoutHints,
}

impl StageNode {
    /// Concurrency kind of the stage's sub-stages, if it has any
    pub fn kind(&self) -> Option<SubStageKind> {
        self.sub_stages.first().map(|s| s.kind)
    }
}

/// Top-level execution environment grouping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryNode {
    /// Graph-wide unique id
    pub id: String,
    /// Category
    pub name: Category,
    /// Ids of owned stages, in declaration order
    pub stage_ids: Vec<String>,
    /// Position and size
    pub layout: LayoutHints,
}

/// Directed execution-order edge between two stages
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowEdge {
    /// Edge id
    pub id: String,
    /// Source stage id
    pub source: String,
    /// Target stage id
    pub target: String,
}

impl FlowEdge {
    fn between(source: &str, target: &str) -> Self {
        Self {
            id: format!("edge-{}-{}", source, target),
            source: source.to_string(),
            target: target.to_string(),
        }
    }
}

/// Non-fatal problems found while building a graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphWarning {
    /// Sub-stage id collided and received a suffix
    DuplicateSubStage {
        /// Owning stage id
        stage_id: String,
        /// Sub-stage name
        name: String,
        /// Disambiguated id that was assigned
        assigned_id: String,
    },
    /// Stage named in the overall line but never given sub-stages
    OutlineStageMissing {
        /// Category of the outline group
        category: Category,
        /// Stage name
        stage: String,
    },
    /// Stage whose expression produced no sub-stages
    EmptyStage {
        /// Stage id
        stage_id: String,
    },
}

/// Node, edge and category counts of a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GraphSummary {
    /// Category nodes plus stage nodes
    pub node_count: usize,
    /// Execution-order edges
    pub edge_count: usize,
    /// Category nodes
    pub category_count: usize,
    /// Stage nodes
    pub stage_count: usize,
    /// Sub-stage descriptors
    pub sub_stage_count: usize,
}

/// Assembled topology of one flow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowGraph {
    /// Categories with at least one stage, in display order
    pub categories: Vec<CategoryNode>,
    /// All stages, grouped by category in display order
    pub stages: Vec<StageNode>,
    /// Execution-order edges
    pub edges: Vec<FlowEdge>,
    /// Problems resolved while building
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<GraphWarning>,
}

impl FlowGraph {
    /// True when the flow declares no stages
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Look up a stage by id
    pub fn stage(&self, id: &str) -> Option<&StageNode> {
        self.stages.iter().find(|s| s.id == id)
    }

    /// Look up a stage by category and name
    pub fn stage_named(&self, category: Category, name: &str) -> Option<&StageNode> {
        self.stages
            .iter()
            .find(|s| s.category == category && s.name == name)
    }

    /// Stages of a category, in declaration order
    pub fn stages_of(&self, category: Category) -> impl Iterator<Item = &StageNode> {
        self.stages.iter().filter(move |s| s.category == category)
    }

    /// All sub-stage descriptors, in display order
    pub fn sub_stages(&self) -> impl Iterator<Item = &SubStageDescriptor> {
        self.stages.iter().flat_map(|s| s.sub_stages.iter())
    }

    /// Number of duplicate sub-stage ids that were disambiguated
    pub fn duplicate_count(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, GraphWarning::DuplicateSubStage { .. }))
            .count()
    }

    /// Pending record for every declared sub-stage name
    pub fn initial_status(&self) -> StatusMap {
        self.sub_stages()
            .map(|s| (s.name.clone(), StatusRecord::default()))
            .collect()
    }

    /// Counts for listings
    pub fn summary(&self) -> GraphSummary {
        GraphSummary {
            node_count: self.categories.len() + self.stages.len(),
            edge_count: self.edges.len(),
            category_count: self.categories.len(),
            stage_count: self.stages.len(),
            sub_stage_count: self.sub_stages().count(),
        }
    }
}

/// Builds a [`FlowGraph`] from a parsed spec
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphBuilder<'a> {
    mappings: Option<&'a MappingTable>,
}

impl<'a> GraphBuilder<'a> {
    /// Builder without execution-target mappings
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach execution targets from the given tables
    pub fn with_mappings(mut self, mappings: &'a MappingTable) -> Self {
        self.mappings = Some(mappings);
        self
    }

    /// Build the graph. An empty spec yields an empty graph.
    pub fn build(&self, spec: &ParsedFlowSpec) -> FlowGraph {
        let mut graph = FlowGraph::default();
        let mut ids = IdAllocator::default();

        for (&category, stages) in &spec.sub_stages {
            if stages.is_empty() {
                continue;
            }

            let category_id = ids.claim(format!("category-{}", category));
            let mut node = CategoryNode {
                id: category_id.clone(),
                name: category,
                stage_ids: Vec::with_capacity(stages.len()),
                layout: LayoutHints {
                    x: CATEGORY_X + CATEGORY_SPACING * graph.categories.len() as i32,
                    y: CATEGORY_Y,
                    width: Some(CATEGORY_WIDTH),
                    height: Some(CATEGORY_HEIGHT),
                },
            };

            for (index, (stage_name, expr)) in stages.iter().enumerate() {
                let stage = self.build_stage(
                    category,
                    &category_id,
                    stage_name,
                    expr,
                    index,
                    &mut ids,
                    &mut graph.warnings,
                );
                node.stage_ids.push(stage.id.clone());
                graph.stages.push(stage);
            }

            graph.categories.push(node);
        }

        graph.edges = derive_edges(&graph.categories);
        check_outline(spec, &mut graph.warnings);

        tracing::debug!(
            categories = graph.categories.len(),
            stages = graph.stages.len(),
            edges = graph.edges.len(),
            warnings = graph.warnings.len(),
            "built flow graph"
        );
        graph
    }

    #[allow(clippy::too_many_arguments)]
    fn build_stage(
        &self,
        category: Category,
        category_id: &str,
        stage_name: &str,
        expr: &str,
        index: usize,
        ids: &mut IdAllocator,
        warnings: &mut Vec<GraphWarning>,
    ) -> StageNode {
        let stage_id = ids.claim(format!("stage-{}-{}", category, stage_name));
        let (kind, names) = derive_sub_stages(expr);

        let mut sub_stages: Vec<SubStageDescriptor> = Vec::with_capacity(names.len());
        for name in names {
            let base = format!("substage-{}-{}-{}", category, stage_name, name);
            let id = ids.claim(base.clone());
            if id != base {
                tracing::warn!(
                    stage = %stage_id,
                    sub_stage = %name,
                    assigned = %id,
                    "duplicate sub-stage id disambiguated"
                );
                warnings.push(GraphWarning::DuplicateSubStage {
                    stage_id: stage_id.clone(),
                    name: name.clone(),
                    assigned_id: id.clone(),
                });
            }

            let target = self
                .mappings
                .and_then(|m| m.target_for(category, stage_name, &name));

            sub_stages.push(SubStageDescriptor {
                id,
                name,
                kind,
                next: None,
                target,
                status: StatusRecord::default(),
            });
        }

        if kind == SubStageKind::Sequential {
            for i in 1..sub_stages.len() {
                let next_id = sub_stages[i].id.clone();
                sub_stages[i - 1].next = Some(next_id);
            }
        }

        if sub_stages.is_empty() {
            warnings.push(GraphWarning::EmptyStage {
                stage_id: stage_id.clone(),
            });
        }

        StageNode {
            id: stage_id,
            name: stage_name.to_string(),
            category,
            parent_id: category_id.to_string(),
            sub_stages,
            status: Status::Pending,
            layout: LayoutHints {
                x: STAGE_X + STAGE_SPACING * index as i32,
                y: STAGE_Y,
                width: None,
                height: None,
            },
        }
    }
}

/// Build a graph without mappings
pub fn build(spec: &ParsedFlowSpec) -> FlowGraph {
    GraphBuilder::new().build(spec)
}

/// Consecutive stages inside each category, then last stage of each category
/// to first stage of the next. Categories passed in always have stages.
fn derive_edges(categories: &[CategoryNode]) -> Vec<FlowEdge> {
    let mut edges = Vec::new();

    for category in categories {
        for pair in category.stage_ids.windows(2) {
            edges.push(FlowEdge::between(&pair[0], &pair[1]));
        }
    }

    for pair in categories.windows(2) {
        if let (Some(last), Some(first)) = (pair[0].stage_ids.last(), pair[1].stage_ids.first()) {
            edges.push(FlowEdge::between(last, first));
        }
    }

    edges
}

fn check_outline(spec: &ParsedFlowSpec, warnings: &mut Vec<GraphWarning>) {
    for group in spec.outline() {
        let declared = spec.sub_stages.get(&group.category);
        for stage in group.stages {
            if !declared.is_some_and(|stages| stages.contains_key(&stage)) {
                tracing::warn!(category = %group.category, %stage, "stage in overall flow has no sub-stages");
                warnings.push(GraphWarning::OutlineStageMissing {
                    category: group.category,
                    stage,
                });
            }
        }
    }
}

/// Hands out ids, suffixing `-2`, `-3`, ... when a base id is taken
#[derive(Debug, Default)]
struct IdAllocator {
    used: HashSet<String>,
}

impl IdAllocator {
    fn claim(&mut self, base: String) -> String {
        if self.used.insert(base.clone()) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{}-{}", base, n);
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl;
    use crate::mapping::parse_mappings;
    use rstest::rstest;

    fn spec_with(stages: &[(Category, &str, &str)]) -> ParsedFlowSpec {
        let mut spec = ParsedFlowSpec::default();
        for (category, stage, expr) in stages {
            spec.insert_stage(*category, *stage, *expr);
        }
        spec
    }

    #[rstest]
    #[case("A,B", SubStageKind::Parallel, &["A", "B"])]
    #[case("A", SubStageKind::Single, &["A"])]
    #[case("A->B", SubStageKind::Sequential, &["A", "B"])]
    #[case(" A -> B ->  C ", SubStageKind::Sequential, &["A", "B", "C"])]
    #[case("A->B,C", SubStageKind::Sequential, &["A", "B,C"])]
    #[case("A,,B,", SubStageKind::Parallel, &["A", "B"])]
    #[case("->A->", SubStageKind::Sequential, &["A"])]
    #[case("   ", SubStageKind::Single, &[])]
    fn test_derive_sub_stages(
        #[case] expr: &str,
        #[case] kind: SubStageKind,
        #[case] names: &[&str],
    ) {
        let (got_kind, got_names) = derive_sub_stages(expr);
        assert_eq!(got_kind, kind);
        assert_eq!(got_names, names);
    }

    #[test]
    fn test_single_stage_sequential() {
        let spec = dsl::parse("Sub-stages\nAWS\nFoo { A->B->C }\n");
        let graph = build(&spec);

        assert_eq!(graph.stages.len(), 1);
        let stage = &graph.stages[0];
        assert_eq!(stage.name, "Foo");
        assert_eq!(stage.id, "stage-AWS-Foo");
        assert_eq!(stage.parent_id, "category-AWS");
        let names: Vec<_> = stage.sub_stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert!(
            stage
                .sub_stages
                .iter()
                .all(|s| s.kind == SubStageKind::Sequential)
        );
        assert_eq!(stage.sub_stages[0].id, "substage-AWS-Foo-A");
        assert_eq!(stage.sub_stages[0].next.as_deref(), Some("substage-AWS-Foo-B"));
        assert_eq!(stage.sub_stages[2].next, None);
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn test_edges_within_and_across_categories() {
        let spec = spec_with(&[
            (Category::Aws, "S1", "a"),
            (Category::Aws, "S2", "b"),
            (Category::Aws, "S3", "c"),
            (Category::OnPrem, "S4", "d"),
        ]);
        let graph = build(&spec);

        let pairs: Vec<_> = graph
            .edges
            .iter()
            .map(|e| (e.source.as_str(), e.target.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("stage-AWS-S1", "stage-AWS-S2"),
                ("stage-AWS-S2", "stage-AWS-S3"),
                ("stage-AWS-S3", "stage-On-PREM-S4"),
            ]
        );
        assert_eq!(graph.edges[2].id, "edge-stage-AWS-S3-stage-On-PREM-S4");
        assert!(graph.edges.iter().all(|e| e.source != e.target));
    }

    #[test]
    fn test_empty_category_is_skipped() {
        let spec = dsl::parse("Overall flow\nAWS{} -> On-PREM{D}\nSub-stages\nAWS\n{\n}\nOn-PREM\nD { x }\n");
        let graph = build(&spec);

        assert_eq!(graph.categories.len(), 1);
        assert_eq!(graph.categories[0].name, Category::OnPrem);
        assert!(graph.edges.is_empty());
        let stage_ids: HashSet<_> = graph.stages.iter().map(|s| s.id.as_str()).collect();
        for edge in &graph.edges {
            assert!(stage_ids.contains(edge.source.as_str()));
            assert!(stage_ids.contains(edge.target.as_str()));
        }
    }

    #[test]
    fn test_empty_spec_builds_empty_graph() {
        let graph = build(&ParsedFlowSpec::default());
        assert!(graph.is_empty());
        assert!(graph.categories.is_empty());
        assert!(graph.edges.is_empty());
        assert_eq!(graph.summary(), GraphSummary::default());
    }

    #[test]
    fn test_duplicate_sub_stage_names_get_distinct_ids() {
        let spec = spec_with(&[(Category::Aws, "Foo", "A->A->A")]);
        let graph = build(&spec);

        let ids: Vec<_> = graph.stages[0]
            .sub_stages
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(
            ids,
            vec!["substage-AWS-Foo-A", "substage-AWS-Foo-A-2", "substage-AWS-Foo-A-3"]
        );
        assert_eq!(graph.duplicate_count(), 2);
        // One status record per name
        assert_eq!(graph.initial_status().len(), 1);
    }

    #[test]
    fn test_ids_unique_across_stages() {
        // "a-b" + "c" and "a" + "b-c" both format to substage-AWS-a-b-c
        let spec = spec_with(&[(Category::Aws, "a-b", "c"), (Category::Aws, "a", "b-c")]);
        let graph = build(&spec);

        let ids: HashSet<_> = graph.sub_stages().map(|s| s.id.clone()).collect();
        assert_eq!(ids.len(), 2);
        assert_eq!(graph.duplicate_count(), 1);
    }

    #[test]
    fn test_initial_status_covers_every_sub_stage() {
        let spec = spec_with(&[
            (Category::Aws, "Calc", "Stage_1_1->Stage1_2"),
            (Category::OnPrem, "BPF", "Stage5_1, Stage5_2"),
        ]);
        let status = build(&spec).initial_status();

        assert_eq!(
            status.keys().collect::<Vec<_>>(),
            vec!["Stage1_2", "Stage5_1", "Stage5_2", "Stage_1_1"]
        );
        assert!(status.values().all(|r| r.status == Status::Pending));
    }

    #[test]
    fn test_category_order_follows_declaration() {
        let mut spec = spec_with(&[(Category::OnPrem, "P", "p"), (Category::Aws, "A", "a")]);
        spec.overall = "AWS{A} -> On-PREM{P}".to_string();
        let graph = build(&spec);

        assert_eq!(graph.categories[0].name, Category::OnPrem);
        assert_eq!(graph.categories[0].layout.x, 100);
        assert_eq!(graph.categories[1].layout.x, 700);
        assert_eq!(graph.edges[0].source, "stage-On-PREM-P");
        assert_eq!(graph.edges[0].target, "stage-AWS-A");
        assert!(graph.warnings.is_empty());
    }

    #[test]
    fn test_outline_stage_without_sub_stages_is_reported() {
        let mut spec = spec_with(&[(Category::Aws, "A", "a")]);
        spec.overall = "AWS{A->B}".to_string();
        let graph = build(&spec);

        assert_eq!(
            graph.warnings,
            vec![GraphWarning::OutlineStageMissing {
                category: Category::Aws,
                stage: "B".to_string()
            }]
        );
    }

    #[test]
    fn test_mappings_attach_targets() {
        let spec = spec_with(&[
            (Category::Aws, "Calc", "Stage_1_1"),
            (Category::OnPrem, "BPF", "Stage5_1, Stage5_9"),
        ]);
        let mappings = parse_mappings("Stage_1_1: calc_dag", "Stage5_1: 20010, 10");
        let graph = GraphBuilder::new().with_mappings(&mappings).build(&spec);

        let subs: Vec<_> = graph.sub_stages().collect();
        assert_eq!(
            subs[0].target,
            Some(ExecutionTarget::Dag {
                dag_id: "calc_dag".to_string()
            })
        );
        assert!(matches!(subs[1].target, Some(ExecutionTarget::OnPrem(_))));
        assert_eq!(subs[2].target, None);
    }

    #[test]
    fn test_summary_counts() {
        let spec = spec_with(&[
            (Category::Aws, "S1", "a->b"),
            (Category::Aws, "S2", "c"),
            (Category::OnPrem, "S3", "d,e"),
        ]);
        let summary = build(&spec).summary();
        assert_eq!(summary.category_count, 2);
        assert_eq!(summary.stage_count, 3);
        assert_eq!(summary.node_count, 5);
        assert_eq!(summary.edge_count, 2);
        assert_eq!(summary.sub_stage_count, 5);
    }

    #[test]
    fn test_stage_with_empty_expression() {
        let spec = spec_with(&[(Category::Aws, "Hollow", "  ")]);
        let graph = build(&spec);
        assert_eq!(graph.stages.len(), 1);
        assert!(graph.stages[0].sub_stages.is_empty());
        assert_eq!(graph.stages[0].kind(), None);
        assert!(matches!(graph.warnings[0], GraphWarning::EmptyStage { .. }));
    }
}
