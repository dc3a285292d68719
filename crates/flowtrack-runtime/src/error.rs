//! Runtime error types

use thiserror::Error;

/// Result type for runtime operations
pub type Result<T> = anyhow::Result<T>;

/// Runtime error (re-export anyhow for application-level errors)
pub type Error = anyhow::Error;

/// Failures delivered on a subscription's error channel
#[derive(Error, Debug)]
pub enum FeedError {
    /// Source could not produce an update
    #[error("status source '{source_name}' failed: {message}")]
    Fetch {
        /// Source that failed
        source_name: String,
        /// Description of the failure
        message: String,
    },

    /// Database query failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Update names a flow that is not registered
    #[error("flow not registered: {name}")]
    FlowNotRegistered {
        /// Flow name
        name: String,
    },
}
