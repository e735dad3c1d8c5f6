//! Run and session configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How the agent produces the output artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformMode {
    /// The agent writes the artifact itself.
    #[default]
    Direct,
    /// The agent writes a transformer script and executes it.
    Code,
}

/// Output artifact format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// A single JSON object.
    Json,
    /// One JSON object per non-blank line.
    #[default]
    Jsonl,
}

impl OutputFormat {
    /// File extension for this format (no leading dot).
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Jsonl => "jsonl",
        }
    }

    /// Sandbox-relative artifact filename, e.g. `output.jsonl`.
    pub fn artifact_name(&self) -> String {
        format!("output.{}", self.extension())
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Immutable configuration for one transformation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformConfig {
    /// How the agent produces the artifact.
    #[serde(default)]
    pub mode: TransformMode,

    /// Artifact format.
    #[serde(default)]
    pub output_format: OutputFormat,

    /// Upper bound on agent turns. Must be at least 1.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Produce a learned-skill document on success.
    #[serde(default)]
    pub learn: bool,

    /// Explicit work directory. When absent a fresh scoped directory is
    /// created and destroyed on exit.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    /// Expose the persistent scripting kernel for huge inputs.
    #[serde(default)]
    pub enable_rlm: bool,

    /// Workflow this run seeds, if any. Used by the graph-query sidecar.
    #[serde(default)]
    pub workflow_id: Option<String>,

    /// Backing store path for the graph-query sidecar.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

fn default_max_iterations() -> usize {
    30
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            mode: TransformMode::default(),
            output_format: OutputFormat::default(),
            max_iterations: default_max_iterations(),
            learn: false,
            work_dir: None,
            enable_rlm: false,
            workflow_id: None,
            db_path: None,
        }
    }
}

/// Configuration for chunked (unbounded) generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Items to generate per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Safety limit on chunk count.
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,

    /// Items from the previous chunk attached as style context.
    #[serde(default = "default_overlap_context")]
    pub overlap_context: usize,

    /// Stop generation when a chunk falls below the underflow threshold.
    #[serde(default = "default_true")]
    pub stop_on_underflow: bool,

    /// Underflow threshold as a fraction of `chunk_size`.
    #[serde(default = "default_underflow_threshold")]
    pub underflow_threshold: f64,
}

fn default_chunk_size() -> usize {
    50
}

fn default_max_chunks() -> usize {
    100
}

fn default_overlap_context() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn default_underflow_threshold() -> f64 {
    0.5
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_chunks: default_max_chunks(),
            overlap_context: default_overlap_context(),
            stop_on_underflow: true,
            underflow_threshold: default_underflow_threshold(),
        }
    }
}

/// Configuration for a long-lived chat session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSessionConfig {
    /// Workflow the session operates on.
    #[serde(default)]
    pub workflow_id: Option<String>,

    /// Custom system prompt; overrides the schema-aware default.
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Allowed tool names; `None` uses the session default set.
    #[serde(default)]
    pub tools: Option<Vec<String>>,

    /// Install the read-only graph-query module into the work directory.
    #[serde(default = "default_true")]
    pub include_graph_api: bool,

    /// Workflow schema rendered in the compact DSL, for the system prompt.
    #[serde(default)]
    pub schema_dsl: Option<String>,

    /// Upper bound on agent turns per query.
    #[serde(default = "default_session_max_turns")]
    pub max_turns: usize,

    /// Backing store path for the graph-query sidecar.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

fn default_session_max_turns() -> usize {
    25
}

impl Default for ChatSessionConfig {
    fn default() -> Self {
        Self {
            workflow_id: None,
            system_prompt: None,
            tools: None,
            include_graph_api: true,
            schema_dsl: None,
            max_turns: default_session_max_turns(),
            db_path: None,
        }
    }
}
