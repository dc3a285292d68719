//! Status sources
//!
//! A [`StatusSource`] produces [`StatusEvent`]s for a registered flow. The
//! host picks one implementation at construction time:
//!
//! - [`MockStatusSource`] - simulated progression, no external systems
//! - [`DatabaseStatusSource`] - execution-system tables over PostgreSQL

mod database;
mod mock;

pub use database::{DagRun, DatabaseStatusSource, StageRun};
pub use mock::MockStatusSource;

use async_trait::async_trait;
use flowtrack_core::config::{Settings, SourceKind};
use flowtrack_core::status::StatusEvent;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{FeedError, Result};
use crate::registry::FlowSnapshot;

/// Produces status updates for flows
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    /// Fixed polling cadence, overriding per-flow refresh intervals
    fn poll_interval(&self) -> Option<Duration> {
        None
    }

    /// Fetch the current status of `flow`
    async fn fetch(&self, flow: &FlowSnapshot) -> std::result::Result<StatusEvent, FeedError>;
}

/// Build the source selected in `settings`
pub async fn from_settings(settings: &Settings) -> Result<Arc<dyn StatusSource>> {
    match settings.source {
        SourceKind::Mock => {
            let interval = Duration::from_secs(settings.mock.interval_secs.max(1));
            Ok(Arc::new(MockStatusSource::new().with_interval(interval)))
        }
        SourceKind::Database => {
            let source = DatabaseStatusSource::connect(&settings.database).await?;
            Ok(Arc::new(source))
        }
    }
}
