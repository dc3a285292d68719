//! Error types for flowtrack-core
//!
//! Parsing the flow DSL and mapping text never fails; these errors cover
//! loading registration payloads and settings from disk.

use thiserror::Error;

/// Result type alias for flowtrack-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in flowtrack-core
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file could not be found
    #[error("configuration file not found: {path}")]
    ConfigNotFound {
        /// Path that was searched
        path: String,
    },

    /// Failed to parse YAML settings
    #[error("failed to parse settings: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {message}")]
    ConfigInvalid {
        /// Description of what's invalid
        message: String,
    },

    /// Flow registration payload is unusable
    #[error("invalid flow '{flow_name}': {message}")]
    InvalidFlow {
        /// Name of the flow with the error
        flow_name: String,
        /// Description of the error
        message: String,
    },

    /// No stored configuration exists for the flow
    #[error("flow not found: {name}")]
    FlowNotFound {
        /// Requested flow name
        name: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
