//! Script execution tools.
//!
//! [`ScriptRunnerTool`] runs an interpreter script inside the sandbox
//! with a timeout, captured output tails, and the exit code surfaced
//! to the agent. It is registered as `run_transformer` for code-mode
//! transformer runs and as `run_script` for chat sessions.

use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use graft_core::sandbox::resolve_existing;
use graft_core::tools::registry::{Tool, ToolError};

/// Default per-invocation timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Upper bound on the per-invocation timeout.
const MAX_TIMEOUT_SECS: u64 = 600;

/// Captured stdout/stderr are tail-truncated to this many bytes.
const MAX_OUTPUT_BYTES: usize = 4000;

fn tail(output: &[u8]) -> String {
    let text = String::from_utf8_lossy(output);
    if text.len() > MAX_OUTPUT_BYTES {
        let start = text.len() - MAX_OUTPUT_BYTES;
        // Avoid splitting a multi-byte character.
        let start = (start..text.len()).find(|i| text.is_char_boundary(*i)).unwrap_or(start);
        text[start..].to_string()
    } else {
        text.into_owned()
    }
}

/// Run an interpreter script inside the work directory.
pub struct ScriptRunnerTool {
    name: &'static str,
    description: &'static str,
    default_script: &'static str,
    work_dir: PathBuf,
    interpreter: Option<PathBuf>,
}

impl ScriptRunnerTool {
    /// The code-mode transformer runner (`run_transformer`, default
    /// script `./transform.py`).
    pub fn run_transformer(work_dir: PathBuf) -> Self {
        Self {
            name: "run_transformer",
            description: "Execute the transform.py script you wrote to transform the input files. The script should read inputs from the working directory and write to the output file. Returns the script's stdout/stderr and exit code.",
            default_script: "./transform.py",
            work_dir,
            interpreter: None,
        }
    }

    /// The session script runner (`run_script`, default script
    /// `./script.py`).
    pub fn run_script(work_dir: PathBuf) -> Self {
        Self {
            name: "run_script",
            description: "Execute a script you wrote in the working directory (e.g., a graph_api query). Returns the script's stdout/stderr and exit code.",
            default_script: "./script.py",
            work_dir,
            interpreter: None,
        }
    }

    /// Override the interpreter binary (default: `python3` from PATH).
    pub fn with_interpreter(mut self, interpreter: PathBuf) -> Self {
        self.interpreter = Some(interpreter);
        self
    }

    fn resolve_interpreter(&self) -> Result<PathBuf, ToolError> {
        match &self.interpreter {
            Some(interpreter) => Ok(interpreter.clone()),
            None => which::which("python3")
                .map_err(|e| ToolError::ExecutionFailed(format!("python3 not found: {e}"))),
        }
    }
}

#[async_trait]
impl Tool for ScriptRunnerTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "script_path": {
                    "type": "string",
                    "description": format!("Path to the script (default: '{}')", self.default_script)
                },
                "timeout": {
                    "type": "integer",
                    "description": format!("Timeout in seconds (default {DEFAULT_TIMEOUT_SECS}, max {MAX_TIMEOUT_SECS})")
                }
            },
            "required": []
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let script_path = args
            .get("script_path")
            .and_then(|v| v.as_str())
            .unwrap_or(self.default_script);
        let timeout_secs = args
            .get("timeout")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .min(MAX_TIMEOUT_SECS);

        let resolved = resolve_existing(script_path, &self.work_dir)
            .map_err(|e| match e {
                ToolError::FileNotFound(_) => {
                    ToolError::FileNotFound(format!("Script not found: {script_path}"))
                }
                other => other,
            })?;

        let interpreter = self.resolve_interpreter()?;

        debug!(script = %resolved.display(), timeout_secs, "running script");
        let start = Instant::now();

        let mut child = tokio::process::Command::new(&interpreter)
            .arg(&resolved)
            .current_dir(&self.work_dir)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to spawn script: {e}")))?;

        let stdout_handle = child.stdout.take();
        let stderr_handle = child.stderr.take();

        let wait_result = tokio::time::timeout(
            std::time::Duration::from_secs(timeout_secs),
            child.wait(),
        )
        .await;

        let status = match wait_result {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                return Err(ToolError::ExecutionFailed(format!("process error: {e}")));
            }
            Err(_) => {
                let _ = child.kill().await;
                return Err(ToolError::Timeout(timeout_secs));
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = status.code().unwrap_or(-1);

        let stdout = if let Some(mut handle) = stdout_handle {
            use tokio::io::AsyncReadExt;
            let mut buf = Vec::new();
            let _ = handle.read_to_end(&mut buf).await;
            tail(&buf)
        } else {
            String::new()
        };

        let stderr = if let Some(mut handle) = stderr_handle {
            use tokio::io::AsyncReadExt;
            let mut buf = Vec::new();
            let _ = handle.read_to_end(&mut buf).await;
            tail(&buf)
        } else {
            String::new()
        };

        Ok(json!({
            "success": exit_code == 0,
            "exit_code": exit_code,
            "stdout": stdout,
            "stderr": stderr,
            "duration_ms": duration_ms,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh() -> PathBuf {
        PathBuf::from("/bin/sh")
    }

    async fn tool_with_script(content: &str) -> (ScriptRunnerTool, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("transform.py"), content).await.unwrap();
        let tool =
            ScriptRunnerTool::run_transformer(dir.path().to_path_buf()).with_interpreter(sh());
        (tool, dir)
    }

    #[tokio::test]
    async fn successful_script_reports_exit_zero() {
        let (tool, _dir) = tool_with_script("echo transformed\n").await;
        let result = tool.execute(json!({})).await.unwrap();
        assert_eq!(result["success"], true);
        assert_eq!(result["exit_code"], 0);
        assert_eq!(result["stdout"].as_str().unwrap().trim(), "transformed");
        assert!(result["duration_ms"].as_u64().is_some());
    }

    #[tokio::test]
    async fn failing_script_surfaces_exit_code_and_stderr() {
        let (tool, _dir) = tool_with_script("echo broken >&2\nexit 3\n").await;
        let result = tool.execute(json!({})).await.unwrap();
        assert_eq!(result["success"], false);
        assert_eq!(result["exit_code"], 3);
        assert_eq!(result["stderr"].as_str().unwrap().trim(), "broken");
    }

    #[tokio::test]
    async fn script_runs_with_sandbox_as_cwd() {
        let (tool, dir) = tool_with_script("pwd\n").await;
        let result = tool.execute(json!({})).await.unwrap();
        let stdout = result["stdout"].as_str().unwrap().trim();
        assert_eq!(
            std::fs::canonicalize(stdout).unwrap(),
            std::fs::canonicalize(dir.path()).unwrap()
        );
    }

    #[tokio::test]
    async fn missing_script_reported() {
        let dir = tempfile::tempdir().unwrap();
        let tool =
            ScriptRunnerTool::run_transformer(dir.path().to_path_buf()).with_interpreter(sh());
        let err = tool.execute(json!({})).await.unwrap_err();
        match err {
            ToolError::FileNotFound(msg) => assert!(msg.contains("Script not found")),
            other => panic!("expected FileNotFound, got {other}"),
        }
    }

    #[tokio::test]
    async fn timeout_kills_the_script() {
        let (tool, _dir) = tool_with_script("sleep 30\n").await;
        let err = tool.execute(json!({"timeout": 1})).await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout(1)));
    }

    #[tokio::test]
    async fn output_tails_are_bounded() {
        let (tool, _dir) =
            tool_with_script("i=0\nwhile [ $i -lt 2000 ]; do echo 'aaaaaaaaaa'; i=$((i+1)); done\n")
                .await;
        let result = tool.execute(json!({})).await.unwrap();
        assert!(result["stdout"].as_str().unwrap().len() <= MAX_OUTPUT_BYTES);
    }

    #[tokio::test]
    async fn escaping_script_path_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tool =
            ScriptRunnerTool::run_transformer(dir.path().to_path_buf()).with_interpreter(sh());
        let err = tool
            .execute(json!({"script_path": "../outside.py"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidPath(_) | ToolError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn session_variant_uses_script_default() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("script.py"), "echo queried\n").await.unwrap();
        let tool = ScriptRunnerTool::run_script(dir.path().to_path_buf()).with_interpreter(sh());
        assert_eq!(tool.name(), "run_script");
        let result = tool.execute(json!({})).await.unwrap();
        assert_eq!(result["stdout"].as_str().unwrap().trim(), "queried");
    }
}
