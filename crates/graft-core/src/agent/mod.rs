//! Agent capability: the contract between this crate and the external
//! reasoning model, plus the loop that drives it.
//!
//! The provider itself lives outside the workspace; anything that can
//! stream text and tool-use blocks and accept tool results back
//! satisfies [`client::AgentClient`]. The [`driver`] module owns the
//! consume-execute-respond cycle shared by the orchestrator and chat
//! sessions.

pub mod client;
pub mod driver;
#[doc(hidden)]
pub mod testing;

pub use client::{AgentBlock, AgentClient, AgentConnector, AgentOptions, PermissionMode};
pub use driver::{drive, DriverOutcome, DriverSignal};
