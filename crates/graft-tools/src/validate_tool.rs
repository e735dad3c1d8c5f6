//! The `validate_artifact` tool.
//!
//! Runs the validation engine against a sandbox file with the run's
//! output model and format, serialising the outcome (structural errors,
//! domain issues, bounded sample) into a JSON-safe shape the agent can
//! act on.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use graft_core::sandbox::resolve_for_write;
use graft_core::tools::registry::{Tool, ToolError};
use graft_core::validate::validate_artifact_with_custom;
use graft_core::ToolContext;

/// Validate an artifact against the run's output model.
pub struct ValidateArtifactTool {
    ctx: ToolContext,
}

impl ValidateArtifactTool {
    /// Create a validator tool bound to the run context.
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for ValidateArtifactTool {
    fn name(&self) -> &str {
        "validate_artifact"
    }

    fn description(&self) -> &str {
        "Validate the output file against the required schema. Call this after writing output to check if it matches the expected structure. Returns validation errors if any, which you should fix and retry."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the output file to validate (e.g., './output.jsonl')"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let file_path = args
            .get("file_path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArgs("missing required field: file_path".into()))?;

        // The file may not exist yet; the validator reports that as an
        // ordinary error the agent can react to, so resolution only
        // enforces containment.
        let resolved = resolve_for_write(file_path, &self.ctx.work_dir)?;

        let model = self
            .ctx
            .output_model
            .as_ref()
            .ok_or_else(|| ToolError::ExecutionFailed("no output model for this context".into()))?;

        let report = validate_artifact_with_custom(
            &resolved,
            model.as_ref(),
            self.ctx.output_format,
            self.ctx.domain.as_deref(),
        );

        debug!(
            file = %resolved.display(),
            valid = report.is_valid(),
            items = report.structural.item_count,
            "artifact validated"
        );

        Ok(report.to_tool_json())
    }
}
