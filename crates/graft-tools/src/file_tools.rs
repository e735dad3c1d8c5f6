//! File tools: list directory, bounded read, and write.
//!
//! All tools resolve their paths against the sandbox and refuse
//! anything that escapes it.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use graft_core::sandbox::{resolve_existing, resolve_for_write};
use graft_core::tools::registry::{Tool, ToolError};

/// Default directory listed when none is given.
const DEFAULT_LIST_DIR: &str = "./inputs";

/// Default line budget for reads.
const DEFAULT_MAX_LINES: usize = 100;

fn required_str(args: &serde_json::Value, field: &str) -> Result<String, ToolError> {
    args.get(field)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| ToolError::InvalidArgs(format!("missing required field: {field}")))
}

// ---------------------------------------------------------------------------
// ListFilesTool
// ---------------------------------------------------------------------------

/// Enumerate names, types, and sizes in a sandbox directory.
pub struct ListFilesTool {
    work_dir: PathBuf,
}

impl ListFilesTool {
    /// Create a `ListFilesTool` sandboxed to `work_dir`.
    pub fn new(work_dir: PathBuf) -> Self {
        Self { work_dir }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files in a directory. Use this to see what input files are available."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "directory": {
                    "type": "string",
                    "description": "Directory path to list (default: './inputs')"
                }
            },
            "required": []
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let directory = args
            .get("directory")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_LIST_DIR);
        let resolved = resolve_existing(directory, &self.work_dir)
            .map_err(|_| ToolError::FileNotFound(format!("Directory not found: {directory}")))?;

        if !resolved.is_dir() {
            return Err(ToolError::InvalidArgs(format!("Not a directory: {directory}")));
        }

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&resolved)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to list directory: {e}")))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to list directory: {e}")))?
        {
            let meta = entry
                .metadata()
                .await
                .map_err(|e| ToolError::ExecutionFailed(format!("failed to stat entry: {e}")))?;
            files.push(json!({
                "name": entry.file_name().to_string_lossy(),
                "type": if meta.is_dir() { "directory" } else { "file" },
                "size": if meta.is_file() { Some(meta.len()) } else { None },
            }));
        }

        files.sort_by(|a, b| {
            let key = |v: &serde_json::Value| {
                (v["type"].as_str().unwrap_or("").to_string(), v["name"].as_str().unwrap_or("").to_string())
            };
            key(a).cmp(&key(b))
        });

        debug!(directory, count = files.len(), "listed files");
        Ok(json!({ "success": true, "files": files }))
    }
}

// ---------------------------------------------------------------------------
// ReadFileTool
// ---------------------------------------------------------------------------

/// Read a file head-bounded by a line budget.
pub struct ReadFileTool {
    work_dir: PathBuf,
}

impl ReadFileTool {
    /// Create a `ReadFileTool` sandboxed to `work_dir`.
    pub fn new(work_dir: PathBuf) -> Self {
        Self { work_dir }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Use this to explore input files and understand their structure before transforming them."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file to read (e.g., './data.csv')"
                },
                "max_lines": {
                    "type": "integer",
                    "description": "Maximum number of lines to read (default: 100)"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let file_path = required_str(&args, "file_path")?;
        let max_lines = args
            .get("max_lines")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_MAX_LINES);

        let resolved = resolve_existing(&file_path, &self.work_dir)?;

        let content = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to read file: {e}")))?;

        let mut lines: Vec<String> = Vec::new();
        for (i, line) in content.lines().enumerate() {
            if i >= max_lines {
                lines.push(format!("... (truncated after {max_lines} lines)"));
                break;
            }
            lines.push(line.to_string());
        }

        Ok(json!({
            "success": true,
            "content": lines.join("\n"),
            "line_count": lines.len(),
        }))
    }
}

// ---------------------------------------------------------------------------
// WriteFileTool
// ---------------------------------------------------------------------------

/// Write text content to a sandbox file, creating parent directories.
pub struct WriteFileTool {
    work_dir: PathBuf,
}

impl WriteFileTool {
    /// Create a `WriteFileTool` sandboxed to `work_dir`.
    pub fn new(work_dir: PathBuf) -> Self {
        Self { work_dir }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file. Use this to write your transformed output or transformer code."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file to write (e.g., './output.jsonl')"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file"
                }
            },
            "required": ["file_path", "content"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let file_path = required_str(&args, "file_path")?;
        let content = required_str(&args, "content")?;

        let resolved = resolve_for_write(&file_path, &self.work_dir)?;
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::ExecutionFailed(format!("failed to create parents: {e}")))?;
        }

        tokio::fs::write(&resolved, &content)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to write file: {e}")))?;

        debug!(path = %resolved.display(), bytes = content.len(), "wrote file");
        Ok(json!({
            "success": true,
            "bytes_written": content.len(),
            "path": resolved.to_string_lossy(),
        }))
    }
}
