//! Flowtrack Runtime
//!
//! This crate keeps registered flows and their live status.
//!
//! # Features
//!
//! - Flow registry with atomic snapshot replacement
//! - Per-flow status board fed by status events
//! - Mock and database status sources behind one trait
//! - Polling subscriptions with clean teardown
//!
//! # Usage
//!
//! ```rust,ignore
//! use flowtrack_runtime::{Runtime, source};
//!
//! let source = source::from_settings(&config.settings).await?;
//! let runtime = Runtime::new(config, source);
//! runtime.start().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod feed;
pub mod registry;
pub mod source;

pub use engine::{LogListener, Runtime};
pub use error::{Error, FeedError, Result};
pub use feed::{
    ChannelListener, FeedUpdate, StatusListener, SubscriptionHandle, Subscriptions, subscribe,
};
pub use registry::{FlowRegistry, FlowSnapshot, FlowSummary, Monitor, StatusBoard};
pub use source::{DatabaseStatusSource, MockStatusSource, StatusSource};
