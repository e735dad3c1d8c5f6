//! Scripted agent doubles for tests.
//!
//! A [`ScriptedAgent`] replays a pre-planned block sequence per query;
//! tools are still executed for real against the sandbox by the
//! driver, so orchestrator tests exercise genuine file writes,
//! subprocess runs, and validation.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use graft_types::Result;

use super::client::{AgentBlock, AgentClient, AgentConnector, AgentOptions};

/// One scripted block of a response stream.
#[derive(Debug, Clone)]
pub enum ScriptedBlock {
    /// Text output.
    Text(String),
    /// Tool invocation request.
    ToolUse {
        /// Tool name.
        name: String,
        /// Tool input.
        input: Value,
    },
    /// End of one turn.
    TurnComplete,
}

impl ScriptedBlock {
    /// Text block.
    pub fn text(text: impl Into<String>) -> Self {
        ScriptedBlock::Text(text.into())
    }

    /// Tool-use block.
    pub fn tool_use(name: impl Into<String>, input: Value) -> Self {
        ScriptedBlock::ToolUse { name: name.into(), input }
    }
}

/// An agent that replays scripted responses.
pub struct ScriptedAgent {
    /// Remaining scripts, one per expected query.
    queries: VecDeque<Vec<ScriptedBlock>>,
    /// Blocks still to yield for the current query.
    current: VecDeque<ScriptedBlock>,
    /// Tool results fed back by the driver, for assertions.
    pub tool_results: Vec<(String, Value)>,
    /// Queries received, for assertions.
    pub queries_seen: Vec<String>,
    next_tool_id: usize,
    closed: bool,
}

impl ScriptedAgent {
    /// An agent answering exactly one query with the given blocks.
    pub fn single_query(blocks: Vec<ScriptedBlock>) -> Self {
        Self::new(vec![blocks])
    }

    /// An agent answering successive queries with successive scripts.
    pub fn new(queries: Vec<Vec<ScriptedBlock>>) -> Self {
        Self {
            queries: queries.into(),
            current: VecDeque::new(),
            tool_results: Vec::new(),
            queries_seen: Vec::new(),
            next_tool_id: 0,
            closed: false,
        }
    }

    /// Whether `close` was called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait]
impl AgentClient for ScriptedAgent {
    async fn query(&mut self, message: &str) -> Result<()> {
        self.queries_seen.push(message.to_string());
        self.current = self.queries.pop_front().unwrap_or_default().into();
        Ok(())
    }

    async fn next_block(&mut self) -> Result<Option<AgentBlock>> {
        let block = match self.current.pop_front() {
            Some(block) => block,
            None => return Ok(None),
        };

        Ok(Some(match block {
            ScriptedBlock::Text(text) => AgentBlock::Text(text),
            ScriptedBlock::ToolUse { name, input } => {
                self.next_tool_id += 1;
                AgentBlock::ToolUse {
                    id: format!("tu_{}", self.next_tool_id),
                    name,
                    input,
                }
            }
            ScriptedBlock::TurnComplete => AgentBlock::TurnComplete,
        }))
    }

    async fn tool_result(&mut self, tool_use_id: &str, result: Value) -> Result<()> {
        self.tool_results.push((tool_use_id.to_string(), result));
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Connector handing out scripted agents, one per `open` call.
pub struct ScriptedConnector {
    sessions: Mutex<VecDeque<Vec<Vec<ScriptedBlock>>>>,
    /// Options captured from each `open`, for assertions.
    pub opened_with: Mutex<Vec<AgentOptions>>,
}

impl ScriptedConnector {
    /// A connector whose first client answers one query with `blocks`.
    pub fn single_run(blocks: Vec<ScriptedBlock>) -> Arc<Self> {
        Self::sequence(vec![vec![blocks]])
    }

    /// A connector handing out one scripted client per `open` call.
    pub fn sequence(sessions: Vec<Vec<Vec<ScriptedBlock>>>) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(sessions.into()),
            opened_with: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl AgentConnector for ScriptedConnector {
    async fn open(&self, options: AgentOptions) -> Result<Box<dyn AgentClient>> {
        self.opened_with.lock().unwrap().push(options);
        let script = self
            .sessions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        Ok(Box::new(ScriptedAgent::new(script)))
    }
}
