//! Chat-session message history types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a message in a session's ordered history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    /// Message sent by the user.
    User,
    /// Compact marker for an agent response.
    Assistant,
}

/// One entry of a session's message history.
///
/// Assistant entries carry only a compact summary of the response (a
/// tool-call count), not the verbatim text, to bound per-session memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who produced the message.
    pub role: ChatRole,

    /// Message content or compact marker.
    pub content: String,

    /// When the message was recorded.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// A user message recorded now.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// A compact assistant marker recorded now.
    pub fn assistant_marker(tool_calls: usize) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: format!("[response: {tool_calls} tool calls]"),
            timestamp: Utc::now(),
        }
    }
}

/// Summary of a live session, as reported by the manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSessionInfo {
    /// Session identifier.
    pub session_id: String,

    /// Workflow the session operates on.
    pub workflow_id: String,

    /// When the session was created.
    pub created_at: DateTime<Utc>,

    /// When the session was last touched.
    pub last_activity: DateTime<Utc>,

    /// Number of history entries.
    pub message_count: usize,

    /// Whether the agent client is open.
    pub is_active: bool,

    /// Whether a query is currently in flight.
    pub is_processing: bool,
}
