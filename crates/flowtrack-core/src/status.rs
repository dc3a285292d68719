//! Sub-stage status model
//!
//! Status is tracked per sub-stage name. Execution events carry partial
//! records that are merged onto the current map with [`merge`].

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Execution status of a sub-stage (or the aggregate of a stage)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Declared, not started
    #[default]
    Pending,
    /// Currently executing
    Running,
    /// Finished successfully
    Completed,
    /// Finished unsuccessfully
    Failed,
    /// Status could not be determined because the source failed
    Error,
    /// No record exists for the sub-stage
    Unknown,
}

impl Status {
    /// Normalize a status string reported by an execution system.
    ///
    /// Matching is case-insensitive; unrecognized text maps to `Unknown`.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "pending" | "queued" | "scheduled" | "not_started" | "none" => Status::Pending,
            "running" | "up_for_retry" | "restarting" => Status::Running,
            "completed" | "success" => Status::Completed,
            "failed" | "upstream_failed" => Status::Failed,
            "error" => Status::Error,
            _ => Status::Unknown,
        }
    }

    /// Lowercase name, as used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Running => "running",
            Status::Completed => "completed",
            Status::Failed => "failed",
            Status::Error => "error",
            Status::Unknown => "unknown",
        }
    }

    /// Whether the status is final
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Failed | Status::Error)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Status::normalize(&raw))
    }
}

/// Execution record of one sub-stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Current status
    pub status: Status,

    /// When execution started
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,

    /// When execution ended
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,

    /// Opaque source-specific details
    #[serde(default)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl StatusRecord {
    /// A record with the given status and no timestamps
    pub fn with_status(status: Status) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }
}

/// Partial record carried by a status event.
///
/// `None` leaves the field untouched. For the timestamps, `Some(None)` is
/// an explicit clear (a JSON `null`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusPatch {
    /// New status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,

    /// New start time
    #[serde(
        default,
        deserialize_with = "explicit_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_time: Option<Option<DateTime<Utc>>>,

    /// New end time
    #[serde(
        default,
        deserialize_with = "explicit_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_time: Option<Option<DateTime<Utc>>>,

    /// Replacement details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Map<String, serde_json::Value>>,
}

impl StatusPatch {
    /// A patch that only sets the status
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Set the start time
    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.start_time = Some(Some(at));
        self
    }

    /// Set the end time
    pub fn ended_at(mut self, at: DateTime<Utc>) -> Self {
        self.end_time = Some(Some(at));
        self
    }

    /// Replace the details
    pub fn with_details(mut self, details: serde_json::Map<String, serde_json::Value>) -> Self {
        self.details = Some(details);
        self
    }

    /// Overwrite the provided fields of `record`
    pub fn apply(&self, record: &mut StatusRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(start_time) = self.start_time {
            record.start_time = start_time;
        }
        if let Some(end_time) = self.end_time {
            record.end_time = end_time;
        }
        if let Some(details) = &self.details {
            record.details = details.clone();
        }
    }
}

/// Status records keyed by sub-stage name
pub type StatusMap = BTreeMap<String, StatusRecord>;

/// Partial records keyed by sub-stage name
pub type StatusPatches = BTreeMap<String, StatusPatch>;

/// Merge incoming partial records onto the current map.
///
/// Names absent from `incoming` are left untouched. Names absent from
/// `current` are added, starting from a pending record.
pub fn merge(current: &StatusMap, incoming: &StatusPatches) -> StatusMap {
    let mut merged = current.clone();
    merge_into(&mut merged, incoming);
    merged
}

/// In-place form of [`merge`]
pub fn merge_into(current: &mut StatusMap, incoming: &StatusPatches) {
    for (name, patch) in incoming {
        patch.apply(current.entry(name.clone()).or_default());
    }
}

/// Status update for one flow, as delivered by a status feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Flow the update belongs to
    #[serde(rename = "flowName", alias = "flow_name")]
    pub flow_name: String,

    /// When the update was produced
    #[serde(default = "Utc::now", deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,

    /// Partial records by sub-stage name
    #[serde(default, alias = "status")]
    pub stages: StatusPatches,
}

impl StatusEvent {
    /// An empty event stamped now
    pub fn new(flow_name: impl Into<String>) -> Self {
        Self {
            flow_name: flow_name.into(),
            timestamp: Utc::now(),
            stages: StatusPatches::new(),
        }
    }

    /// Add a patch for a sub-stage
    pub fn with_stage(mut self, name: impl Into<String>, patch: StatusPatch) -> Self {
        self.stages.insert(name.into(), patch);
        self
    }
}

/// Parse RFC 3339 or `YYYY-MM-DD HH:MM:SS[.f]` (taken as UTC)
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Any format [`parse_timestamp`] accepts; anything else is an error
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
}

/// `null` -> `Some(None)`; a parseable timestamp -> `Some(Some(ts))`;
/// unparseable text -> `None` (field left untouched)
fn explicit_timestamp<'de, D>(deserializer: D) -> Result<Option<Option<DateTime<Utc>>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(match raw {
        None => Some(None),
        Some(text) => match parse_timestamp(&text) {
            Some(ts) => Some(Some(ts)),
            None => {
                tracing::debug!(value = %text, "ignoring unparseable timestamp");
                None
            }
        },
    })
}
