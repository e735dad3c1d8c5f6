//! Streaming session manager: long-lived conversational sessions that
//! reuse the agent/tool protocol, with per-session work directories,
//! single-flight queries, and idle-timeout eviction.

pub mod chat;
pub mod frames;
pub mod graph_asset;
pub mod manager;

pub use chat::ChatSession;
pub use frames::parse_incoming_frame;
pub use graph_asset::install_graph_api;
pub use manager::{SessionManager, DEFAULT_IDLE_TIMEOUT};
