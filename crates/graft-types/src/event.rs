//! The streaming event protocol.
//!
//! Every step of a transformation, chunked run, or chat session is
//! surfaced as a [`TransformEvent`]. Events serialize as flat JSON
//! objects tagged by an `event` field so they can be forwarded over
//! SSE or WebSocket transports without re-shaping; intermediaries that
//! do not understand a kind are expected to pass it through untouched.
//!
//! Ordering is monotonic per run: a `tool_result` never precedes its
//! `tool_call`, and the terminal `complete` event is last.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A streaming event emitted by the orchestrator, the chunked
/// transformer, or a chat session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TransformEvent {
    /// A block of agent text output.
    Text {
        /// The text content.
        text: String,
    },

    /// The agent is about to invoke a tool.
    ToolCall {
        /// Tool name.
        tool: String,
        /// Tool input arguments.
        input: Value,
    },

    /// A tool invocation finished.
    ToolResult {
        /// Tool name.
        tool: String,
        /// Serialized result, truncated for display.
        result: String,
    },

    /// A structural validation outcome observed in the tool stream.
    Validation {
        /// Whether validation passed.
        valid: bool,
        /// Number of items validated.
        item_count: usize,
        /// Bounded list of validation errors.
        errors: Vec<String>,
    },

    /// Non-blocking domain warnings surfaced at the final gate.
    ValidationWarning {
        /// `path: message` strings.
        warnings: Vec<String>,
    },

    /// A new agent iteration is starting.
    IterationStart {
        /// 1-based iteration number.
        iteration: usize,
        /// Upper bound on iterations for this run.
        max: usize,
    },

    /// A chunked run is starting.
    ChunkedStart {
        /// Items requested per chunk.
        chunk_size: usize,
        /// Safety limit on chunk count.
        max_chunks: usize,
        /// Items of overlap carried between chunks.
        overlap_context: usize,
    },

    /// One chunk is starting.
    ChunkStart {
        /// 1-based chunk number.
        chunk_num: usize,
        /// Items accumulated before this chunk.
        items_so_far: usize,
    },

    /// One chunk finished and validated.
    ChunkComplete {
        /// 1-based chunk number.
        chunk_num: usize,
        /// Items produced by this chunk.
        items_in_chunk: usize,
        /// Items accumulated including this chunk.
        total_so_far: usize,
    },

    /// A chunk produced fewer items than the underflow threshold.
    ChunkUnderflow {
        /// Items requested.
        expected: usize,
        /// Items received.
        got: usize,
        /// The threshold that triggered the stop.
        threshold: f64,
        /// Human-readable explanation.
        message: String,
    },

    /// A chunk produced zero items.
    ChunkEmpty {
        /// 1-based chunk number.
        chunk_num: usize,
        /// Human-readable explanation.
        message: String,
    },

    /// A chunk failed after the first; generation stops with what it has.
    ChunkError {
        /// 1-based chunk number.
        chunk_num: usize,
        /// Error description.
        error: String,
    },

    /// A chunked run finished.
    ChunkedComplete {
        /// Number of chunks generated.
        total_chunks: usize,
        /// Total items across all chunks.
        total_items: usize,
    },

    /// Periodic liveness signal while an agent is quiet.
    Keepalive,

    /// A session finished responding to one user message.
    MessageComplete,

    /// A run finished successfully.
    Complete {
        /// Number of items in the artifact.
        item_count: usize,
        /// Absolute path of the artifact.
        artifact_path: String,
        /// Tool calls consumed by the run.
        iterations: usize,
    },

    /// A fatal error for the current run or query.
    Error {
        /// User-visible message.
        message: String,
    },

    /// A phase transition in a multi-phase operation.
    Phase {
        /// Phase name (e.g. "transforming", "inserting").
        phase: String,
        /// Human-readable description.
        message: String,
    },

    /// Incremental progress within a phase.
    Progress {
        /// Items processed so far.
        current: usize,
        /// Total items expected.
        total: usize,
        /// Human-readable description.
        message: String,
    },

    /// The system prompt guiding a session, emitted once per session
    /// for observability.
    SystemPrompt {
        /// The full prompt text.
        prompt: String,
    },
}

impl TransformEvent {
    /// The wire discriminator for this event (the value of the `event`
    /// field after serialization).
    pub fn kind(&self) -> &'static str {
        match self {
            TransformEvent::Text { .. } => "text",
            TransformEvent::ToolCall { .. } => "tool_call",
            TransformEvent::ToolResult { .. } => "tool_result",
            TransformEvent::Validation { .. } => "validation",
            TransformEvent::ValidationWarning { .. } => "validation_warning",
            TransformEvent::IterationStart { .. } => "iteration_start",
            TransformEvent::ChunkedStart { .. } => "chunked_start",
            TransformEvent::ChunkStart { .. } => "chunk_start",
            TransformEvent::ChunkComplete { .. } => "chunk_complete",
            TransformEvent::ChunkUnderflow { .. } => "chunk_underflow",
            TransformEvent::ChunkEmpty { .. } => "chunk_empty",
            TransformEvent::ChunkError { .. } => "chunk_error",
            TransformEvent::ChunkedComplete { .. } => "chunked_complete",
            TransformEvent::Keepalive => "keepalive",
            TransformEvent::MessageComplete => "message_complete",
            TransformEvent::Complete { .. } => "complete",
            TransformEvent::Error { .. } => "error",
            TransformEvent::Phase { .. } => "phase",
            TransformEvent::Progress { .. } => "progress",
            TransformEvent::SystemPrompt { .. } => "system_prompt",
        }
    }
}

/// Callback invoked for every event of a run.
///
/// Invoked synchronously from the run's own task; implementations must
/// not block for long and are never called concurrently for one run.
pub type EventCallback = Arc<dyn Fn(&TransformEvent) + Send + Sync>;
