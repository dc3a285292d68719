//! Configuration parsing
//!
//! This module handles the two kinds of configuration Flowtrack reads.
//!
//! # Configuration Files
//!
//! - `flowtrack.yaml` - Application settings (status source, config directory)
//! - `configs/*.json` - One flow registration payload per flow

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::dsl;
use crate::error::{Error, Result};
use crate::graph::{FlowGraph, GraphBuilder};
use crate::ir::{Category, ParsedFlowSpec};
use crate::mapping::{self, MappingTable, OnPremTarget};

/// Settings file name looked up inside a directory
pub const SETTINGS_FILE: &str = "flowtrack.yaml";

fn default_refresh_interval() -> u64 {
    120
}

/// Flow registration payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowConfig {
    /// Flow name (unique per registry)
    #[serde(default)]
    pub flow_name: String,

    /// Seconds between status refreshes; the settings default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<u64>,

    /// Connection details for the execution systems, passed through as-is
    #[serde(default)]
    pub databases: IndexMap<String, serde_json::Value>,

    /// Stages and sub-stages
    #[serde(default)]
    pub flow_definition: FlowDefinition,

    /// Execution-target mappings
    #[serde(default)]
    pub stage_mappings: StageMappings,
}

/// Flow definition, as DSL text or pre-split structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlowDefinition {
    /// DSL text
    Text(String),

    /// `{ overall, subStages: { category: { stage: expr } } }`
    Structured {
        /// Overall ordering hint
        #[serde(default)]
        overall: String,

        /// Raw sub-stage expressions by category name and stage name
        #[serde(default, rename = "subStages")]
        sub_stages: IndexMap<String, IndexMap<String, String>>,
    },
}

impl Default for FlowDefinition {
    fn default() -> Self {
        FlowDefinition::Structured {
            overall: String::new(),
            sub_stages: IndexMap::new(),
        }
    }
}

impl FlowDefinition {
    /// Reduce either form to a [`ParsedFlowSpec`].
    ///
    /// Unrecognized category names in the structured form are ignored.
    pub fn to_spec(&self) -> ParsedFlowSpec {
        match self {
            FlowDefinition::Text(text) => dsl::parse(text),
            FlowDefinition::Structured {
                overall,
                sub_stages,
            } => {
                let mut spec = ParsedFlowSpec::new(overall.trim());
                for (name, stages) in sub_stages {
                    let Some(category) = Category::from_token(name.trim()) else {
                        tracing::debug!(category = %name, "ignoring unrecognized category");
                        continue;
                    };
                    spec.sub_stages.entry(category).or_default();
                    for (stage, expr) in stages {
                        let stage = stage.trim();
                        if stage.is_empty() {
                            continue;
                        }
                        spec.insert_stage(category, stage, expr.trim());
                    }
                }
                spec
            }
        }
    }
}

/// One environment's mappings, as text lines or a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MappingSource<T> {
    /// `name: value` lines
    Text(String),
    /// Already structured
    Table(IndexMap<String, T>),
}

impl<T> Default for MappingSource<T> {
    fn default() -> Self {
        MappingSource::Table(IndexMap::new())
    }
}

/// Stage mappings for both environments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageMappings {
    /// Cloud: name -> DAG id
    #[serde(default)]
    pub aws: MappingSource<String>,

    /// On premises: name -> `{ bpf_id, process_id }`
    #[serde(default, rename = "onPrem")]
    pub on_prem: MappingSource<OnPremTarget>,
}

impl StageMappings {
    /// Resolve both sources into typed tables
    pub fn to_table(&self) -> MappingTable {
        MappingTable {
            aws: match &self.aws {
                MappingSource::Text(text) => mapping::parse_aws(text),
                MappingSource::Table(table) => table.clone(),
            },
            on_prem: match &self.on_prem {
                MappingSource::Text(text) => mapping::parse_on_prem(text),
                MappingSource::Table(table) => table.clone(),
            },
        }
    }
}

impl FlowConfig {
    /// Parse a JSON registration payload
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let config: FlowConfig = serde_json::from_slice(bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON registration payload from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::ConfigNotFound {
                path: path.display().to_string(),
            });
        }
        let bytes = std::fs::read(path)?;
        Self::from_slice(&bytes)
    }

    fn validate(&self) -> Result<()> {
        check_flow_name(&self.flow_name)?;
        if self.refresh_interval == Some(0) {
            return Err(Error::InvalidFlow {
                flow_name: self.flow_name.clone(),
                message: "refreshInterval must be at least 1 second".to_string(),
            });
        }
        Ok(())
    }

    /// Refresh interval in seconds, or `default` when the payload has none
    pub fn refresh_secs(&self, default: u64) -> u64 {
        self.refresh_interval.unwrap_or(default)
    }

    /// Parsed flow definition
    pub fn spec(&self) -> ParsedFlowSpec {
        self.flow_definition.to_spec()
    }

    /// Parsed mapping tables
    pub fn mappings(&self) -> MappingTable {
        self.stage_mappings.to_table()
    }

    /// Build the flow graph with execution targets attached
    pub fn build_graph(&self) -> FlowGraph {
        let mappings = self.mappings();
        GraphBuilder::new()
            .with_mappings(&mappings)
            .build(&self.spec())
    }

    /// File name used by [`ConfigStore`]
    pub fn file_name(&self) -> String {
        config_file_name(&self.flow_name)
    }
}

fn config_file_name(flow_name: &str) -> String {
    format!("{}.json", flow_name)
}

/// Flow names double as store file names: they must be non-blank and must
/// not contain path separators, `..` or control characters.
pub fn check_flow_name(flow_name: &str) -> Result<()> {
    if flow_name.trim().is_empty() {
        return Err(Error::ConfigInvalid {
            message: "missing flowName".to_string(),
        });
    }
    if flow_name.contains(['/', '\\'])
        || flow_name.contains("..")
        || flow_name.chars().any(char::is_control)
    {
        return Err(Error::ConfigInvalid {
            message: format!("flowName '{}' is not a valid file name", flow_name.escape_debug()),
        });
    }
    Ok(())
}

/// Which status source the host wires in
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Simulated progression, no external systems
    #[default]
    Mock,
    /// Execution system databases
    Database,
}

/// Mock source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockSettings {
    /// Seconds between simulated updates
    #[serde(default = "default_mock_interval")]
    pub interval_secs: u64,
}

impl Default for MockSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_mock_interval(),
        }
    }
}

fn default_mock_interval() -> u64 {
    5
}

/// Database source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// PostgreSQL connection URL
    #[serde(default)]
    pub url: Option<String>,

    /// Table holding Airflow DAG runs
    #[serde(default = "default_dag_run_table")]
    pub dag_run_table: String,

    /// Table holding on-prem stage status rows
    #[serde(default = "default_stage_status_table")]
    pub stage_status_table: String,

    /// Connection pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            dag_run_table: default_dag_run_table(),
            stage_status_table: default_stage_status_table(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_dag_run_table() -> String {
    "dag_run".to_string()
}

fn default_stage_status_table() -> String {
    "stage_status".to_string()
}

fn default_max_connections() -> u32 {
    5
}

/// Application settings from `flowtrack.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Deployment name
    #[serde(default = "default_name")]
    pub name: String,

    /// Directory holding flow registration payloads
    #[serde(default = "default_config_dir")]
    pub config_dir: String,

    /// Status source to use
    #[serde(default)]
    pub source: SourceKind,

    /// Mock source settings
    #[serde(default)]
    pub mock: MockSettings,

    /// Database source settings
    #[serde(default)]
    pub database: DatabaseSettings,

    /// Refresh interval for flows that do not set one
    #[serde(default = "default_refresh_interval")]
    pub default_refresh_interval: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            name: default_name(),
            config_dir: default_config_dir(),
            source: SourceKind::default(),
            mock: MockSettings::default(),
            database: DatabaseSettings::default(),
            default_refresh_interval: default_refresh_interval(),
        }
    }
}

fn default_name() -> String {
    "flowtrack".to_string()
}

fn default_config_dir() -> String {
    "configs".to_string()
}

/// Main configuration container
#[derive(Debug, Clone)]
pub struct Config {
    /// Application settings
    pub settings: Settings,

    /// Directory the settings were loaded from
    pub base_path: PathBuf,
}

impl Config {
    /// Load settings from a directory or a `flowtrack.yaml` path
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let config = Config::load("./deploy")?;
    /// println!("Configs in {}", config.config_dir().display());
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let (settings_path, base_path) = Self::resolve(path.as_ref());

        if !settings_path.exists() {
            return Err(Error::ConfigNotFound {
                path: settings_path.display().to_string(),
            });
        }

        let contents = std::fs::read_to_string(&settings_path)?;
        let settings: Settings = serde_yaml::from_str(&contents)?;

        Ok(Self {
            settings,
            base_path,
        })
    }

    /// Like [`Config::load`], falling back to defaults when the file is missing
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        match Self::load(path.as_ref()) {
            Err(Error::ConfigNotFound { path: missing }) => {
                tracing::debug!(path = %missing, "settings not found, using defaults");
                let (_, base_path) = Self::resolve(path.as_ref());
                Ok(Self {
                    settings: Settings::default(),
                    base_path,
                })
            }
            other => other,
        }
    }

    fn resolve(path: &Path) -> (PathBuf, PathBuf) {
        if path.is_dir() {
            (path.join(SETTINGS_FILE), path.to_path_buf())
        } else {
            (
                path.to_path_buf(),
                path.parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or(Path::new("."))
                    .to_path_buf(),
            )
        }
    }

    /// Absolute or base-relative config directory
    pub fn config_dir(&self) -> PathBuf {
        self.base_path.join(&self.settings.config_dir)
    }

    /// Store over the config directory
    pub fn config_store(&self) -> ConfigStore {
        ConfigStore::new(self.config_dir())
    }
}

/// Directory of flow registration payloads, one `<name>.json` per flow
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    /// Store rooted at `dir` (created on first save)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a flow's payload is stored at. Names are case-sensitive, matching
    /// the registry.
    pub fn path_for(&self, flow_name: &str) -> Result<PathBuf> {
        check_flow_name(flow_name)?;
        Ok(self.dir.join(config_file_name(flow_name)))
    }

    /// Write a payload, replacing any previous one for the flow
    pub fn save(&self, config: &FlowConfig) -> Result<PathBuf> {
        let path = self.path_for(&config.flow_name)?;
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(&path, serde_json::to_string_pretty(config)?)?;
        tracing::info!(flow = %config.flow_name, path = %path.display(), "saved flow configuration");
        Ok(path)
    }

    /// Load a flow's payload, `None` when nothing is stored
    pub fn load(&self, flow_name: &str) -> Result<Option<FlowConfig>> {
        let path = self.path_for(flow_name)?;
        if !path.exists() {
            return Ok(None);
        }
        FlowConfig::load(&path).map(Some)
    }

    /// Stored file names, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(vec![]);
        }
        let mut names: Vec<String> = std::fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
            .filter_map(|e| e.file_name().to_str().map(String::from))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Remove a flow's payload; false when nothing was stored
    pub fn delete(&self, flow_name: &str) -> Result<bool> {
        let path = self.path_for(flow_name)?;
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)?;
        tracing::info!(flow = %flow_name, "deleted flow configuration");
        Ok(true)
    }

    /// Every loadable payload, sorted by file name. Unloadable files are
    /// logged and skipped.
    pub fn load_all(&self) -> Result<Vec<FlowConfig>> {
        let mut configs = Vec::new();
        for name in self.list()? {
            let path = self.dir.join(&name);
            match FlowConfig::load(&path) {
                Ok(config) => configs.push(config),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping flow configuration"),
            }
        }
        Ok(configs)
    }
}
