//! Long-lived multi-turn chat sessions.
//!
//! A session owns exactly one work directory and one agent client. At
//! most one query is in flight at a time; a concurrent attempt fails
//! fast rather than queuing. Assistant history entries are compact
//! markers, not verbatim text, to bound per-session memory.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use graft_types::{
    ChatMessage, ChatSessionConfig, ChatSessionInfo, EventCallback, GraftError, Result,
    TransformEvent,
};

use crate::agent::client::{AgentClient, AgentConnector, AgentOptions, PermissionMode};
use crate::agent::driver::{drive, DriverSignal};
use crate::sandbox::ToolContext;
use crate::tools::registry::{ToolRegistry, ToolSetBuilder};

use super::graph_asset::install_graph_api;

/// Default backing store path when the caller does not name one.
const DEFAULT_DB_PATH: &str = "./data/workflow.db";

/// Display truncation for tool results in events.
const EVENT_RESULT_CHARS: usize = 500;

const SYSTEM_PROMPT_WITH_SCHEMA: &str = "You are an expert assistant helping users interact with a workflow graph.

You have access to the workflow's data through graph_api.py. This module provides READ-ONLY access to query the workflow graph.

## Workflow Schema

{schema_dsl}

## Graph Query API

Available functions in graph_api.py:
- search_nodes(node_type, properties=None, title_contains=None, title_exact=None, status=None, limit=100) - Search for nodes
- get_node(node_id) - Get a specific node by ID
- get_neighbors(node_id, edge_type=None) - Get connected nodes (incoming and outgoing)
- count_nodes(node_type=None) - Count nodes, optionally by type

To query the graph:
1. Write a script that imports from graph_api (write_file)
2. Run it with run_script

Use the node types, edge types, and field definitions from the schema above when querying.
Be helpful and concise. When showing results, format them clearly.
";

const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert assistant helping users interact with a workflow graph.

You have access to the workflow's data through graph_api.py. This module provides READ-ONLY access to query the workflow graph.

Available functions:
- search_nodes(node_type, properties=None, title_contains=None, title_exact=None, status=None, limit=100) - Search for nodes
- get_node(node_id) - Get a specific node by ID
- get_neighbors(node_id, edge_type=None) - Get connected nodes (incoming and outgoing)
- count_nodes(node_type=None) - Count nodes, optionally by type

To query the graph:
1. Write a script that imports from graph_api (write_file)
2. Run it with run_script

Be helpful and concise. When showing results, format them clearly.
";

struct ClientState {
    client: Box<dyn AgentClient>,
    registry: ToolRegistry,
    allowed: Vec<String>,
}

struct HistoryState {
    messages: Vec<ChatMessage>,
    context_emitted: bool,
    system_prompt: String,
}

/// Resets the single-flight flag on every exit path of a query.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A long-lived conversational session bound to one workflow.
pub struct ChatSession {
    session_id: String,
    workflow_id: String,
    work_dir: PathBuf,
    config: ChatSessionConfig,
    created_at: DateTime<Utc>,
    last_activity: StdMutex<DateTime<Utc>>,
    history: Mutex<HistoryState>,
    client: Mutex<Option<ClientState>>,
    processing: AtomicBool,
}

impl ChatSession {
    /// Create an uninitialised session; call
    /// [`initialize`](ChatSession::initialize) before querying.
    pub fn new(
        session_id: String,
        workflow_id: String,
        work_dir: PathBuf,
        config: ChatSessionConfig,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            workflow_id,
            work_dir,
            config,
            created_at: now,
            last_activity: StdMutex::new(now),
            history: Mutex::new(HistoryState {
                messages: Vec::new(),
                context_emitted: false,
                system_prompt: String::new(),
            }),
            client: Mutex::new(None),
            processing: AtomicBool::new(false),
        }
    }

    /// Session identifier.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Workflow this session operates on.
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Work directory owned by this session.
    pub fn work_dir(&self) -> &std::path::Path {
        &self.work_dir
    }

    /// Whether the agent client is open.
    pub fn is_active(&self) -> bool {
        self.client.try_lock().map(|c| c.is_some()).unwrap_or(true)
    }

    /// Whether a query is currently in flight.
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Refresh the idle clock.
    pub fn touch(&self) {
        *self.last_activity.lock().unwrap() = Utc::now();
    }

    /// When the session was last touched.
    pub fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.lock().unwrap()
    }

    /// Provision the work directory and open the agent client.
    pub async fn initialize(
        &self,
        connector: &dyn AgentConnector,
        tools: &dyn ToolSetBuilder,
    ) -> Result<()> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        tokio::fs::create_dir_all(self.work_dir.join(".claude").join("skills")).await?;

        if self.config.include_graph_api {
            let workflow_id = self.config.workflow_id.as_deref().unwrap_or(&self.workflow_id);
            let db_path = self
                .config
                .db_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));
            install_graph_api(&self.work_dir, workflow_id, &db_path).await?;
        }

        let system_prompt = if let Some(prompt) = &self.config.system_prompt {
            prompt.clone()
        } else if let Some(schema_dsl) = &self.config.schema_dsl {
            SYSTEM_PROMPT_WITH_SCHEMA.replace("{schema_dsl}", schema_dsl)
        } else {
            warn!(session_id = %self.session_id, "no schema for session, using default prompt");
            DEFAULT_SYSTEM_PROMPT.to_string()
        };

        let ctx = ToolContext::for_session(self.work_dir.clone());
        let registry = tools.build(&ctx);
        let allowed = self.config.tools.clone().unwrap_or_else(|| registry.list());

        let options = AgentOptions {
            system_prompt: system_prompt.clone(),
            cwd: self.work_dir.clone(),
            max_turns: self.config.max_turns,
            allowed_tools: allowed.clone(),
            tool_descriptors: registry.descriptors(),
            permission_mode: PermissionMode::AcceptEdits,
        };

        let client = connector.open(options).await?;

        {
            let mut history = self.history.lock().await;
            history.system_prompt = system_prompt;
        }
        *self.client.lock().await = Some(ClientState { client, registry, allowed });

        info!(session_id = %self.session_id, workflow_id = %self.workflow_id, "chat session initialized");
        Ok(())
    }

    /// Submit one user message and stream events to the callback.
    ///
    /// Fails fast with [`GraftError::SessionBusy`] when a query is
    /// already in flight. Any error inside the loop is surfaced as an
    /// `error` event for this query only; the session stays usable.
    pub async fn query(&self, message: &str, on_event: Option<EventCallback>) -> Result<()> {
        if self.processing.swap(true, Ordering::SeqCst) {
            let err = GraftError::SessionBusy;
            if let Some(cb) = &on_event {
                cb(&TransformEvent::Error { message: err.to_string() });
            }
            return Err(err);
        }
        let _guard = ProcessingGuard(&self.processing);

        self.touch();

        let emit = |event: TransformEvent| {
            if let Some(cb) = &on_event {
                cb(&event);
            }
        };

        {
            let mut history = self.history.lock().await;
            if !history.context_emitted {
                history.context_emitted = true;
                emit(TransformEvent::SystemPrompt { prompt: history.system_prompt.clone() });
            }
            history.messages.push(ChatMessage::user(message));
        }

        let result = self.run_query(message, &emit).await;

        match result {
            Ok(tool_calls) => {
                self.history
                    .lock()
                    .await
                    .messages
                    .push(ChatMessage::assistant_marker(tool_calls));
                emit(TransformEvent::MessageComplete);
                Ok(())
            }
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "query failed");
                emit(TransformEvent::Error { message: e.to_string() });
                Err(e)
            }
        }
    }

    async fn run_query(&self, message: &str, emit: &impl Fn(TransformEvent)) -> Result<usize> {
        let mut slot = self.client.lock().await;
        let state = slot.as_mut().ok_or_else(|| GraftError::SessionInactive {
            reason: "session not initialized".into(),
        })?;

        state.client.query(message).await?;

        let outcome = drive(
            state.client.as_mut(),
            &state.registry,
            &state.allowed,
            self.config.max_turns,
            None,
            |signal| match signal {
                DriverSignal::Text(text) => {
                    emit(TransformEvent::Text { text: text.to_string() });
                }
                DriverSignal::PreTool { name, input, .. } => {
                    emit(TransformEvent::ToolCall {
                        tool: name.to_string(),
                        input: input.clone(),
                    });
                }
                DriverSignal::PostTool { name, result } => {
                    let rendered = serde_json::to_string(result).unwrap_or_default();
                    let clipped: String = rendered.chars().take(EVENT_RESULT_CHARS).collect();
                    emit(TransformEvent::ToolResult { tool: name.to_string(), result: clipped });
                }
                DriverSignal::TurnComplete { .. } => {}
            },
        )
        .await?;

        Ok(outcome.tool_calls)
    }

    /// Close the agent client. The work directory is retained for
    /// post-mortem inspection. Idempotent.
    pub async fn close(&self) {
        let mut slot = self.client.lock().await;
        if let Some(mut state) = slot.take() {
            if let Err(e) = state.client.close().await {
                warn!(session_id = %self.session_id, error = %e, "error closing agent client");
            }
            debug!(session_id = %self.session_id, "chat session closed");
        }
    }

    /// Current message history length.
    pub async fn message_count(&self) -> usize {
        self.history.lock().await.messages.len()
    }

    /// Snapshot of the session for listings.
    pub async fn info(&self) -> ChatSessionInfo {
        ChatSessionInfo {
            session_id: self.session_id.clone(),
            workflow_id: self.workflow_id.clone(),
            created_at: self.created_at,
            last_activity: self.last_activity(),
            message_count: self.message_count().await,
            is_active: self.client.lock().await.is_some(),
            is_processing: self.is_processing(),
        }
    }
}
