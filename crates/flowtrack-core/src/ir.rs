//! Intermediate representation of a flow definition
//!
//! The DSL parser and the structured registration payload both reduce to a
//! [`ParsedFlowSpec`], which is what the graph builder consumes.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution environment grouping at the top of a flow.
///
/// The set is closed: tokens that do not name one of these are ignored by
/// every parser in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    /// Cloud environment (Airflow DAGs)
    #[serde(rename = "AWS")]
    Aws,
    /// On-premises environment (BPF processes)
    #[serde(rename = "On-PREM")]
    OnPrem,
}

impl Category {
    /// All recognized categories, in default declaration order
    pub const ALL: [Category; 2] = [Category::Aws, Category::OnPrem];

    /// Match a token exactly against the recognized category names
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "AWS" => Some(Category::Aws),
            "On-PREM" => Some(Category::OnPrem),
            _ => None,
        }
    }

    /// The token used for this category in the DSL and in node ids
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Aws => "AWS",
            Category::OnPrem => "On-PREM",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Name{ A->B->C }` groups inside the overall line
static OUTLINE_GROUP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z0-9_-]+)\s*\{([^{}]*)\}").expect("outline pattern is valid")
});

/// Parsed flow definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedFlowSpec {
    /// First line of the overall section, verbatim
    pub overall: String,

    /// Raw sub-stage expressions: category -> stage -> text between braces.
    ///
    /// Both levels keep insertion order.
    #[serde(rename = "subStages")]
    pub sub_stages: IndexMap<Category, IndexMap<String, String>>,
}

/// One `Category{A->B}` group of the overall line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineGroup {
    /// Category the group names
    pub category: Category,
    /// Stage names in the order they are chained
    pub stages: Vec<String>,
}

impl ParsedFlowSpec {
    /// Create an empty spec with the given overall line
    pub fn new(overall: impl Into<String>) -> Self {
        Self {
            overall: overall.into(),
            sub_stages: IndexMap::new(),
        }
    }

    /// Record a stage expression, creating the category entry on first use.
    ///
    /// Re-inserting an existing stage overwrites its expression in place.
    pub fn insert_stage(
        &mut self,
        category: Category,
        stage: impl Into<String>,
        expr: impl Into<String>,
    ) {
        self.sub_stages
            .entry(category)
            .or_default()
            .insert(stage.into(), expr.into());
    }

    /// Number of stage entries across all categories
    pub fn stage_count(&self) -> usize {
        self.sub_stages.values().map(IndexMap::len).sum()
    }

    /// Extract the `Category{A->B}` groups of the overall line.
    ///
    /// Groups whose name is not a recognized category are skipped.
    pub fn outline(&self) -> Vec<OutlineGroup> {
        OUTLINE_GROUP
            .captures_iter(&self.overall)
            .filter_map(|caps| {
                let category = Category::from_token(caps.get(1)?.as_str())?;
                let stages = caps
                    .get(2)?
                    .as_str()
                    .split("->")
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
                Some(OutlineGroup { category, stages })
            })
            .collect()
    }

    /// Content hash for change detection between registrations
    pub fn content_hash(&self) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(self.overall.as_bytes());

        for (category, stages) in &self.sub_stages {
            hasher.update(b"\n[");
            hasher.update(category.as_str().as_bytes());
            hasher.update(b"]");
            for (stage, expr) in stages {
                hasher.update(b"\n");
                hasher.update(stage.as_bytes());
                hasher.update(b"{");
                hasher.update(expr.as_bytes());
                hasher.update(b"}");
            }
        }

        hex::encode(hasher.finalize())
    }
}
