//! Run results: manifests, learned skills, and debug summaries.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::OutputFormat;

/// Immutable summary of a successful transformation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformManifest {
    /// Absolute path of the artifact file.
    pub artifact_path: PathBuf,

    /// Artifact format.
    pub artifact_format: OutputFormat,

    /// Number of validated items in the artifact.
    pub item_count: usize,

    /// Stable hash of the output model's schema description.
    pub schema_hash: String,

    /// Always true for a manifest; runs that fail validation never
    /// produce one.
    pub validation_passed: bool,

    /// Bounded sample of parsed items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<Vec<Value>>,

    /// Opaque run identifier.
    pub run_id: String,
}

/// A reusable transformation memo, optionally with a script body,
/// produced by a successful run when learning is enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedSkill {
    /// Stable slug the skill is persisted and re-injected under.
    pub slug: String,

    /// Natural-language memo describing the transformation.
    pub memo: String,

    /// Transformer script body, present in code mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,

    /// Schema hash of the output model the skill was learned against.
    pub schema_hash: String,
}

/// Debug information collected during a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunDebug {
    /// Tool calls consumed by the run.
    pub iterations: usize,

    /// Ordered tool-call history.
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,

    /// Wall-clock seconds for the whole run.
    #[serde(default)]
    pub elapsed_seconds: f64,

    /// Mode and format the run used, plus any extra markers.
    #[serde(default)]
    pub info: BTreeMap<String, String>,
}

/// One entry of the tool-call history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// 1-based position in the run.
    pub call_number: usize,

    /// Tool name.
    pub tool: String,

    /// Tool input arguments.
    pub input: Value,
}

/// The result of a transformation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformRun {
    /// Run summary.
    pub manifest: TransformManifest,

    /// Parsed items, materialised only for small outputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<Value>>,

    /// Learned skill, present when learning was enabled and succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learned: Option<LearnedSkill>,

    /// Debug information.
    #[serde(default)]
    pub debug: RunDebug,
}
