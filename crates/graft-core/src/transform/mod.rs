//! The transformer: orchestrator, chunked generation, prompts,
//! learned-skill persistence, and the optional scripting kernel.

pub mod chunked;
pub mod kernel;
pub mod learning;
pub mod orchestrator;
pub mod prompts;

pub use chunked::ChunkedTransformer;
pub use kernel::{KernelResult, RlmKernel};
pub use learning::SkillStore;
pub use orchestrator::DataTransformer;

/// Minimal in-crate tool set for orchestrator-level tests: a sandboxed
/// `write_file` plus the real `validate_artifact`. The full fixed tool
/// set lives in `graft-tools`.
#[cfg(test)]
pub(crate) fn testing_toolset(ctx: &crate::sandbox::ToolContext) -> crate::tools::registry::ToolRegistry {
    use std::path::PathBuf;
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::sandbox::{resolve_existing, resolve_for_write, ToolContext};
    use crate::tools::registry::{Tool, ToolError, ToolRegistry};
    use crate::validate::validate_artifact_with_custom;

    struct WriteTool {
        work_dir: PathBuf,
    }

    #[async_trait]
    impl Tool for WriteTool {
        fn name(&self) -> &str {
            "write_file"
        }
        fn description(&self) -> &str {
            "Write content to a file"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {
                "file_path": {"type": "string"},
                "content": {"type": "string"}
            }, "required": ["file_path", "content"]})
        }
        async fn execute(&self, args: Value) -> std::result::Result<Value, ToolError> {
            let path = args["file_path"]
                .as_str()
                .ok_or_else(|| ToolError::InvalidArgs("missing required field: file_path".into()))?;
            let content = args["content"]
                .as_str()
                .ok_or_else(|| ToolError::InvalidArgs("missing required field: content".into()))?;
            let resolved = resolve_for_write(path, &self.work_dir)?;
            std::fs::write(&resolved, content)
                .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
            Ok(json!({"success": true}))
        }
    }

    struct ValidateTool {
        ctx: ToolContext,
    }

    #[async_trait]
    impl Tool for ValidateTool {
        fn name(&self) -> &str {
            "validate_artifact"
        }
        fn description(&self) -> &str {
            "Validate the output file"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {"file_path": {"type": "string"}},
                   "required": ["file_path"]})
        }
        async fn execute(&self, args: Value) -> std::result::Result<Value, ToolError> {
            let path = args["file_path"]
                .as_str()
                .ok_or_else(|| ToolError::InvalidArgs("missing required field: file_path".into()))?;
            let resolved = resolve_existing(path, &self.ctx.work_dir)?;
            let model = self.ctx.output_model.as_ref().expect("run context has model");
            let report = validate_artifact_with_custom(
                &resolved,
                model.as_ref(),
                self.ctx.output_format,
                self.ctx.domain.as_deref(),
            );
            Ok(report.to_tool_json())
        }
    }

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(WriteTool { work_dir: ctx.work_dir.clone() }));
    registry.register(Arc::new(ValidateTool { ctx: ctx.clone() }));
    registry
}
