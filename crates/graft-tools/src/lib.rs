//! Tool implementations for the graft agent loop.
//!
//! Tools are registered per run (or per session) through the
//! [`ToolSetBuilder`] implementations at the bottom of this crate:
//!
//! - [`TransformerToolSet`] -- the fixed transformer set: `list_files`,
//!   `read_file`, `write_file`, `validate_artifact`, plus
//!   `run_transformer` in code mode and `run_repl` when the scripting
//!   kernel is enabled.
//! - [`SessionToolSet`] -- the chat-session set: the file tools plus a
//!   `run_script` runner for graph queries.
//!
//! Every path a tool accepts is resolved against the sandbox and
//! rejected if it escapes.

pub mod file_tools;
pub mod repl_tool;
pub mod run_tool;
pub mod validate_tool;

use std::path::PathBuf;
use std::sync::Arc;

use graft_core::tools::registry::{ToolRegistry, ToolSetBuilder};
use graft_core::ToolContext;
use graft_types::TransformMode;

pub use file_tools::{ListFilesTool, ReadFileTool, WriteFileTool};
pub use repl_tool::RunReplTool;
pub use run_tool::ScriptRunnerTool;
pub use validate_tool::ValidateArtifactTool;

/// The fixed tool set exposed to transformer runs.
pub struct TransformerToolSet {
    interpreter: Option<PathBuf>,
}

impl TransformerToolSet {
    /// Tool set using the default script interpreter (`python3`).
    pub fn new() -> Self {
        Self { interpreter: None }
    }

    /// Tool set with an explicit script interpreter binary.
    pub fn with_interpreter(interpreter: PathBuf) -> Self {
        Self { interpreter: Some(interpreter) }
    }
}

impl Default for TransformerToolSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolSetBuilder for TransformerToolSet {
    fn build(&self, ctx: &ToolContext) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(ListFilesTool::new(ctx.work_dir.clone())));
        registry.register(Arc::new(ReadFileTool::new(ctx.work_dir.clone())));
        registry.register(Arc::new(WriteFileTool::new(ctx.work_dir.clone())));
        registry.register(Arc::new(ValidateArtifactTool::new(ctx.clone())));

        if ctx.mode == TransformMode::Code {
            let mut runner = ScriptRunnerTool::run_transformer(ctx.work_dir.clone());
            if let Some(interpreter) = &self.interpreter {
                runner = runner.with_interpreter(interpreter.clone());
            }
            registry.register(Arc::new(runner));
        }

        if let Some(kernel) = &ctx.kernel {
            registry.register(Arc::new(RunReplTool::new(kernel.clone())));
        }

        registry
    }
}

/// The tool set exposed to chat sessions.
pub struct SessionToolSet {
    interpreter: Option<PathBuf>,
}

impl SessionToolSet {
    /// Tool set using the default script interpreter (`python3`).
    pub fn new() -> Self {
        Self { interpreter: None }
    }

    /// Tool set with an explicit script interpreter binary.
    pub fn with_interpreter(interpreter: PathBuf) -> Self {
        Self { interpreter: Some(interpreter) }
    }
}

impl Default for SessionToolSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolSetBuilder for SessionToolSet {
    fn build(&self, ctx: &ToolContext) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(ListFilesTool::new(ctx.work_dir.clone())));
        registry.register(Arc::new(ReadFileTool::new(ctx.work_dir.clone())));
        registry.register(Arc::new(WriteFileTool::new(ctx.work_dir.clone())));

        let mut runner = ScriptRunnerTool::run_script(ctx.work_dir.clone());
        if let Some(interpreter) = &self.interpreter {
            runner = runner.with_interpreter(interpreter.clone());
        }
        registry.register(Arc::new(runner));

        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_types::{ItemSchema, OutputFormat};

    fn run_ctx(mode: TransformMode) -> (tempfile::TempDir, ToolContext) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::for_run(
            dir.path().to_path_buf(),
            Arc::new(ItemSchema::new("Item", vec![])),
            OutputFormat::Jsonl,
            mode,
        );
        (dir, ctx)
    }

    #[test]
    fn direct_mode_omits_script_runner() {
        let (_dir, ctx) = run_ctx(TransformMode::Direct);
        let registry = TransformerToolSet::new().build(&ctx);
        assert_eq!(
            registry.list(),
            vec!["list_files", "read_file", "validate_artifact", "write_file"]
        );
    }

    #[test]
    fn code_mode_exposes_run_transformer() {
        let (_dir, ctx) = run_ctx(TransformMode::Code);
        let registry = TransformerToolSet::new().build(&ctx);
        assert!(registry.get("run_transformer").is_some());
    }

    #[test]
    fn session_set_has_script_runner_but_no_validator() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::for_session(dir.path().to_path_buf());
        let registry = SessionToolSet::new().build(&ctx);
        assert!(registry.get("run_script").is_some());
        assert!(registry.get("validate_artifact").is_none());
        assert!(registry.get("run_transformer").is_none());
    }
}
