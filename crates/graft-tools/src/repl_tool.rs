//! The `run_repl` tool: iterative scripting against the persistent
//! kernel.
//!
//! Exposed only when a run enables the kernel. State persists across
//! invocations, so the agent can load a huge input once and then
//! iterate with small snippets.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use graft_core::tools::registry::{Tool, ToolError};
use graft_core::transform::kernel::RlmKernel;

use graft_types::GraftError;

/// Default per-snippet timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Upper bound on the per-snippet timeout.
const MAX_TIMEOUT_SECS: u64 = 300;

/// Execute code in the persistent scripting kernel.
pub struct RunReplTool {
    kernel: Arc<RlmKernel>,
}

impl RunReplTool {
    /// Create a REPL tool over a running kernel.
    pub fn new(kernel: Arc<RlmKernel>) -> Self {
        Self { kernel }
    }
}

#[async_trait]
impl Tool for RunReplTool {
    fn name(&self) -> &str {
        "run_repl"
    }

    fn description(&self) -> &str {
        "Execute code in a persistent interpreter session. Variables persist across calls; use this to explore and transform data too large to read directly. Helpers chunk(data, size) and chunk_lines(data, n) are pre-loaded."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "Code to execute in the kernel namespace"
                },
                "timeout": {
                    "type": "integer",
                    "description": format!("Timeout in seconds (default {DEFAULT_TIMEOUT_SECS}, max {MAX_TIMEOUT_SECS})")
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let code = args
            .get("code")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArgs("missing required field: code".into()))?;
        let timeout_secs = args
            .get("timeout")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .min(MAX_TIMEOUT_SECS);

        let result = self
            .kernel
            .execute(code, Duration::from_secs(timeout_secs))
            .await
            .map_err(|e| match e {
                GraftError::Timeout { .. } => ToolError::Timeout(timeout_secs),
                other => ToolError::ExecutionFailed(other.to_string()),
            })?;

        Ok(json!({
            "success": result.ok,
            "output": result.output,
        }))
    }
}
