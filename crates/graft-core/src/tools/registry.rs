//! Tool registry and [`Tool`] trait definition.
//!
//! Defines the interface that all tool implementations must satisfy
//! ([`Tool`]) and provides a [`ToolRegistry`] that stores registered
//! tools and dispatches execution requests by name, enforcing the
//! run's allowed-tool whitelist.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::sandbox::ToolContext;

/// Error type for tool execution.
///
/// Tool errors are returned to the agent as tool results; they are
/// never fatal to the run that observed them.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The requested tool was not found in the registry.
    #[error("tool not found: {0}")]
    NotFound(String),

    /// The tool is not in the run's allowed-tool whitelist.
    #[error("tool not allowed: {0}")]
    NotAllowed(String),

    /// The arguments provided to the tool are invalid.
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    /// The tool execution failed at runtime.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// A file or resource the tool needs was not found.
    #[error("not found: {0}")]
    FileNotFound(String),

    /// A filesystem path resolves outside the sandbox.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The tool execution exceeded the allowed time limit.
    #[error("timeout after {0}s")]
    Timeout(u64),
}

impl ToolError {
    /// Render this error as a JSON-safe tool result payload.
    pub fn into_result(self) -> serde_json::Value {
        serde_json::json!({ "success": false, "error": self.to_string() })
    }
}

/// A tool that can be invoked by the agent loop.
///
/// Implementations provide a name, description, JSON Schema for
/// parameters, and an async `execute` method. Tools are registered in
/// a [`ToolRegistry`] and dispatched when the agent emits a tool-use
/// block.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// A human-readable description of what this tool does.
    fn description(&self) -> &str;

    /// JSON Schema describing the tool's parameters.
    fn parameters(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    ///
    /// Arguments are a JSON object matching the schema from
    /// [`parameters`](Tool::parameters).
    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError>;
}

/// Builds the tool set for one run or session.
///
/// Implemented in `graft-tools`; the orchestrator calls it once per
/// run after the sandbox is materialised.
pub trait ToolSetBuilder: Send + Sync {
    /// Build a registry bound to the given per-run context.
    fn build(&self, ctx: &ToolContext) -> ToolRegistry;
}

/// Registry of available tools, indexed by name.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty tool registry.
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    /// Register a tool. If a tool with the same name already exists,
    /// it is replaced.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        debug!(tool = %name, "registering tool");
        self.tools.insert(name, tool);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// List all registered tool names (sorted alphabetically).
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Generate agent-bound tool descriptors.
    ///
    /// Returns one descriptor per registered tool, sorted by name for
    /// deterministic output:
    ///
    /// ```json
    /// {
    ///   "name": "tool_name",
    ///   "description": "tool description",
    ///   "input_schema": { ... json schema ... }
    /// }
    /// ```
    pub fn descriptors(&self) -> Vec<serde_json::Value> {
        let mut descriptors: Vec<(String, serde_json::Value)> = self
            .tools
            .iter()
            .map(|(name, tool)| {
                let descriptor = serde_json::json!({
                    "name": name,
                    "description": tool.description(),
                    "input_schema": tool.parameters(),
                });
                (name.clone(), descriptor)
            })
            .collect();

        descriptors.sort_by(|a, b| a.0.cmp(&b.0));
        descriptors.into_iter().map(|(_, v)| v).collect()
    }

    /// Execute a tool by name, enforcing an optional allowlist.
    ///
    /// When `allowed` is `Some`, a name outside the list is rejected
    /// with [`ToolError::NotAllowed`] before the registry is consulted
    /// for anything but existence. `NotFound` fires first so a missing
    /// tool is never reported as a permission problem.
    pub async fn execute(
        &self,
        name: &str,
        args: serde_json::Value,
        allowed: Option<&[String]>,
    ) -> Result<serde_json::Value, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        if let Some(allowed) = allowed {
            if !allowed.iter().any(|a| a == name) {
                return Err(ToolError::NotAllowed(name.to_string()));
            }
        }

        debug!(tool = %name, "executing tool");
        tool.execute(args).await
    }

    /// Return the number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Return true if no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool that echoes its input.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo back the input text"
        }

        fn parameters(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string", "description": "Text to echo" }
                },
                "required": ["text"]
            })
        }

        async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
            let text = args
                .get("text")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ToolError::InvalidArgs("missing 'text' field".into()))?;
            Ok(serde_json::json!({ "output": text }))
        }
    }

    /// A tool that always fails, for error paths.
    struct FailTool;

    #[async_trait]
    impl Tool for FailTool {
        fn name(&self) -> &str {
            "fail"
        }

        fn description(&self) -> &str {
            "A tool that always fails"
        }

        fn parameters(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object", "properties": {} })
        }

        async fn execute(&self, _args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
            Err(ToolError::ExecutionFailed("intentional failure".into()))
        }
    }

    #[test]
    fn new_registry_is_empty() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.list().is_empty());
    }

    #[test]
    fn register_and_get() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let tool = registry.get("echo").unwrap();
        assert_eq!(tool.name(), "echo");
    }

    #[test]
    fn list_returns_sorted_names() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FailTool));
        registry.register(Arc::new(EchoTool));
        assert_eq!(registry.list(), vec!["echo", "fail"]);
    }

    #[test]
    fn descriptors_are_agent_bound_shape() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let descriptors = registry.descriptors();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0]["name"], "echo");
        assert_eq!(descriptors[0]["description"], "Echo back the input text");
        assert!(descriptors[0]["input_schema"]["properties"].get("text").is_some());
    }

    #[tokio::test]
    async fn execute_dispatches_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let result = registry
            .execute("echo", serde_json::json!({ "text": "hello" }), None)
            .await
            .unwrap();
        assert_eq!(result["output"], "hello");
    }

    #[tokio::test]
    async fn execute_not_found() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute("missing", serde_json::json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn execute_enforces_allowlist() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let allowed = vec!["read_file".to_string()];
        let err = registry
            .execute("echo", serde_json::json!({ "text": "hi" }), Some(&allowed))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotAllowed(_)));
    }

    #[tokio::test]
    async fn not_found_fires_before_allowlist() {
        let registry = ToolRegistry::new();
        let allowed: Vec<String> = vec![];
        let err = registry
            .execute("missing", serde_json::json!({}), Some(&allowed))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn failing_tool_surfaces_execution_error() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FailTool));

        let err = registry
            .execute("fail", serde_json::json!({}), None)
            .await
            .unwrap_err();
        match err {
            ToolError::ExecutionFailed(msg) => assert_eq!(msg, "intentional failure"),
            other => panic!("expected ExecutionFailed, got: {other}"),
        }
    }

    #[test]
    fn tool_error_into_result_is_json_safe() {
        let payload = ToolError::InvalidPath("../escape".into()).into_result();
        assert_eq!(payload["success"], false);
        assert!(payload["error"].as_str().unwrap().contains("invalid path"));
    }

    #[test]
    fn tool_error_display() {
        assert_eq!(
            ToolError::NotFound("web_search".into()).to_string(),
            "tool not found: web_search"
        );
        assert_eq!(
            ToolError::NotAllowed("run_transformer".into()).to_string(),
            "tool not allowed: run_transformer"
        );
        assert_eq!(ToolError::Timeout(60).to_string(), "timeout after 60s");
    }
}
