//! Agent client contract.
//!
//! An agent is opened per run (or per session) with a fixed system
//! prompt, working directory, tool descriptors, and allowed-tool list.
//! After a `query` the client yields a stream of blocks; tool-use
//! blocks are answered by feeding the execution result back through
//! [`AgentClient::tool_result`] before the stream continues.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use graft_types::Result;

/// Permission mode requested from the agent runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionMode {
    /// File edits inside the working directory are accepted without
    /// prompting.
    #[default]
    AcceptEdits,
    /// No writes; read-only exploration.
    ReadOnly,
}

/// Options handed to the agent runtime when opening a client.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// System prompt guiding the whole conversation.
    pub system_prompt: String,

    /// Working directory (the sandbox root).
    pub cwd: PathBuf,

    /// Upper bound on agent turns per query.
    pub max_turns: usize,

    /// Names of tools the agent may invoke.
    pub allowed_tools: Vec<String>,

    /// Agent-bound tool descriptors (name, description, input schema).
    pub tool_descriptors: Vec<Value>,

    /// Permission mode.
    pub permission_mode: PermissionMode,
}

/// One block of an agent's response stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentBlock {
    /// Plain text output.
    Text(String),

    /// The agent requests a tool invocation. The driver must answer
    /// with [`AgentClient::tool_result`] before reading further blocks.
    ToolUse {
        /// Correlation id echoed back with the result.
        id: String,
        /// Tool name.
        name: String,
        /// Tool input arguments.
        input: Value,
    },

    /// The agent finished one turn.
    TurnComplete,
}

/// A live agent conversation.
///
/// Not `Sync`: a client is owned by exactly one driving task.
#[async_trait]
pub trait AgentClient: Send {
    /// Submit a user message, starting a response stream.
    async fn query(&mut self, message: &str) -> Result<()>;

    /// Pull the next block of the response stream. `None` means the
    /// stream for the current query has ended.
    async fn next_block(&mut self) -> Result<Option<AgentBlock>>;

    /// Feed a tool execution result back to the agent.
    async fn tool_result(&mut self, tool_use_id: &str, result: Value) -> Result<()>;

    /// Close the conversation and release provider resources.
    async fn close(&mut self) -> Result<()>;
}

/// Factory for agent clients; the seam the provider plugs into.
#[async_trait]
pub trait AgentConnector: Send + Sync {
    /// Open a new client with the given options.
    async fn open(&self, options: AgentOptions) -> Result<Box<dyn AgentClient>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_mode_defaults_to_accept_edits() {
        assert_eq!(PermissionMode::default(), PermissionMode::AcceptEdits);
    }

    #[test]
    fn options_are_cloneable() {
        let options = AgentOptions {
            system_prompt: "prompt".into(),
            cwd: PathBuf::from("/tmp/work"),
            max_turns: 10,
            allowed_tools: vec!["read_file".into()],
            tool_descriptors: vec![],
            permission_mode: PermissionMode::AcceptEdits,
        };
        let copy = options.clone();
        assert_eq!(copy.max_turns, 10);
        assert_eq!(copy.allowed_tools, vec!["read_file".to_string()]);
    }
}
