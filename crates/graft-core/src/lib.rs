//! Core engine for the graft workspace.
//!
//! Three tightly coupled subsystems live here:
//!
//! 1. **Transformer orchestrator** ([`transform`]) -- drives an
//!    external coding agent through a sandboxed tool loop until it
//!    produces a schema-valid artifact, with optional chunked
//!    generation and skill learning.
//! 2. **Validation engine** ([`validate`]) -- structural checks against
//!    an output model plus pluggable domain validators whose issues
//!    flow back to the agent as correction signals.
//! 3. **Session manager** ([`session`]) -- long-lived multi-turn
//!    conversations that reuse the same agent/tool protocol, with
//!    idle-timeout eviction.
//!
//! The agent itself is a capability ([`agent::AgentConnector`]): the
//! crate defines the contract and the driving loop, not the provider.

pub mod agent;
pub mod sandbox;
pub mod schema_dsl;
pub mod seeder;
pub mod session;
pub mod tools;
pub mod transform;
pub mod validate;

pub use sandbox::ToolContext;
pub use tools::registry::{Tool, ToolError, ToolRegistry, ToolSetBuilder};
pub use transform::{ChunkedTransformer, DataTransformer, SkillStore};
pub use validate::{CustomIssue, IssueSeverity, DomainValidator, ValidationReport, ValidationResult};
