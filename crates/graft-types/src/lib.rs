//! Shared data model for the graft workspace.
//!
//! This crate holds the types that cross crate boundaries: run
//! configuration, the streaming event protocol, output-schema
//! descriptions, workflow definitions, seed data, run manifests, and
//! the error taxonomy. It deliberately contains no I/O so that every
//! other crate can depend on it without dragging in a runtime.

pub mod config;
pub mod error;
pub mod event;
pub mod manifest;
pub mod schema;
pub mod seed;
pub mod session;
pub mod workflow;

pub use config::{ChatSessionConfig, ChunkConfig, OutputFormat, TransformConfig, TransformMode};
pub use error::{GraftError, Result};
pub use event::{EventCallback, TransformEvent};
pub use manifest::{LearnedSkill, RunDebug, ToolCallRecord, TransformManifest, TransformRun};
pub use schema::{compute_schema_hash, FieldSpec, ItemSchema, OutputModel, ValueKind};
pub use seed::{SeedData, SeedDataModel, SeedEdge, SeedNode};
pub use session::{ChatMessage, ChatRole, ChatSessionInfo};
pub use workflow::{
    EdgeTypeDef, FieldDef, FieldKind, NodeStates, NodeTypeDef, StateTransition,
    WorkflowDefinition,
};
