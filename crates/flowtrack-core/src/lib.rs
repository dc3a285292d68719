//! Flowtrack Core Library
//!
//! This crate provides the core functionality for Flowtrack:
//! - Flow definition DSL parsing
//! - Stage mapping tables
//! - Flow graph construction
//! - Status model, merging and projection
//! - Configuration parsing and the flow config store
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  DSL text   │────▶│ FlowGraph   │────▶│  Projector  │
//! │ (or JSON)   │     │  Builder    │     │ (+ status)  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                                                ▲
//!                          StatusEvent ── merge ─┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use flowtrack_core::{dsl, graph, projector};
//!
//! let spec = dsl::parse(&text);
//! let graph = graph::build(&spec);
//! let view = projector::project(&graph, &graph.initial_status());
//! println!("{} is {}", spec.overall, view.status);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod dsl;
pub mod error;
pub mod graph;
pub mod ir;
pub mod mapping;
pub mod projector;
pub mod status;

pub use config::{Config, ConfigStore, FlowConfig, Settings, SourceKind};
pub use error::{Error, Result};
pub use graph::{FlowGraph, GraphBuilder};
pub use ir::{Category, ParsedFlowSpec};
pub use mapping::{ExecutionTarget, MappingTable, OnPremTarget};
pub use projector::{AnnotatedFlowGraph, project};
pub use status::{Status, StatusEvent, StatusMap, StatusPatch, StatusRecord};
