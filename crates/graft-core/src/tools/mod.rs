//! Tool contract and registry infrastructure.
//!
//! Tool implementations live in the `graft-tools` crate; this module
//! only defines the contract ([`registry::Tool`]), the dispatch
//! registry, and the builder seam through which the orchestrator and
//! sessions obtain their tool sets.

pub mod registry;
