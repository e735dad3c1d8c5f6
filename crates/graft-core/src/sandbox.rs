//! Per-run sandbox: provisioning, containment, and the tool context.
//!
//! Every transformation run and chat session owns exactly one work
//! directory. All tool paths are resolved relative to it, and any path
//! that resolves outside it is rejected before the filesystem is
//! touched.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tracing::{debug, warn};

use graft_types::{GraftError, OutputFormat, Result, TransformMode};

use crate::tools::registry::ToolError;
use crate::transform::kernel::RlmKernel;
use crate::validate::DomainValidator;

/// Owns the work directory for the duration of one run.
///
/// A scoped directory is deleted on drop (including cancelled and
/// failing exit paths); an external directory supplied by the caller
/// is left in place.
#[derive(Debug)]
pub enum SandboxGuard {
    /// Fresh scoped directory, removed on drop.
    Scoped(TempDir),
    /// Caller-supplied directory, retained.
    External(PathBuf),
}

impl SandboxGuard {
    /// Absolute path of the work directory.
    pub fn path(&self) -> &Path {
        match self {
            SandboxGuard::Scoped(dir) => dir.path(),
            SandboxGuard::External(path) => path,
        }
    }
}

/// Materialise the sandbox for one run.
///
/// When `work_dir` is given it is created (with parents) and retained
/// after the run; otherwise a fresh directory with the given prefix is
/// created and removed on all exit paths. Each input is copied in
/// under its base name; directories are copied recursively. Any I/O
/// failure aborts before the agent is invoked.
pub async fn provision(
    work_dir: Option<&Path>,
    prefix: &str,
    input_paths: &[PathBuf],
) -> Result<SandboxGuard> {
    let guard = match work_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir).await.map_err(|e| GraftError::Sandbox {
                reason: format!("failed to create work directory {}: {e}", dir.display()),
            })?;
            SandboxGuard::External(dir.to_path_buf())
        }
        None => {
            let dir = tempfile::Builder::new().prefix(prefix).tempdir().map_err(|e| {
                GraftError::Sandbox {
                    reason: format!("failed to create scoped work directory: {e}"),
                }
            })?;
            SandboxGuard::Scoped(dir)
        }
    };

    for input in input_paths {
        let name = input.file_name().ok_or_else(|| GraftError::Sandbox {
            reason: format!("input path has no base name: {}", input.display()),
        })?;
        let dest = guard.path().join(name);
        copy_recursive(input, &dest).await.map_err(|e| GraftError::Sandbox {
            reason: format!("failed to copy input {}: {e}", input.display()),
        })?;
    }

    debug!(work_dir = %guard.path().display(), inputs = input_paths.len(), "sandbox provisioned");
    Ok(guard)
}

/// Copy a file or directory tree. Symlinks are not followed into the
/// sandbox; they are skipped with a warning.
async fn copy_recursive(src: &Path, dest: &Path) -> std::io::Result<()> {
    let meta = tokio::fs::symlink_metadata(src).await?;

    if meta.is_symlink() {
        warn!(path = %src.display(), "skipping symlink input");
        return Ok(());
    }

    if meta.is_file() {
        tokio::fs::copy(src, dest).await?;
        return Ok(());
    }

    tokio::fs::create_dir_all(dest).await?;
    let mut entries = tokio::fs::read_dir(src).await?;
    while let Some(entry) = entries.next_entry().await? {
        let child_dest = dest.join(entry.file_name());
        Box::pin(copy_recursive(&entry.path(), &child_dest)).await?;
    }
    Ok(())
}

/// Normalise a tool-supplied path: strip a leading `./`.
fn normalise(path: &str) -> &str {
    path.strip_prefix("./").unwrap_or(path)
}

/// Resolve a path that must already exist within the sandbox.
///
/// Canonicalises both sides so symlinked escapes are caught, then
/// verifies the sandbox is a prefix of the resolved path.
pub fn resolve_existing(path: &str, work_dir: &Path) -> std::result::Result<PathBuf, ToolError> {
    let joined = work_dir.join(normalise(path));
    let canonical = joined
        .canonicalize()
        .map_err(|_| ToolError::FileNotFound(path.to_string()))?;

    let work_canonical = work_dir
        .canonicalize()
        .map_err(|e| ToolError::ExecutionFailed(format!("bad work directory: {e}")))?;

    if !canonical.starts_with(&work_canonical) {
        return Err(ToolError::InvalidPath(format!("path escapes work directory: {path}")));
    }
    Ok(canonical)
}

/// Resolve a path for writing: the file may not exist yet, so the
/// containment check walks up to the deepest existing ancestor.
pub fn resolve_for_write(path: &str, work_dir: &Path) -> std::result::Result<PathBuf, ToolError> {
    let joined = work_dir.join(normalise(path));

    let mut ancestor = joined.as_path();
    loop {
        if ancestor.exists() {
            break;
        }
        ancestor = ancestor
            .parent()
            .ok_or_else(|| ToolError::InvalidPath(format!("path escapes work directory: {path}")))?;
    }

    let canonical_ancestor = ancestor
        .canonicalize()
        .map_err(|e| ToolError::ExecutionFailed(format!("resolve failed: {e}")))?;

    let work_canonical = work_dir
        .canonicalize()
        .map_err(|e| ToolError::ExecutionFailed(format!("bad work directory: {e}")))?;

    if !canonical_ancestor.starts_with(&work_canonical) {
        return Err(ToolError::InvalidPath(format!("path escapes work directory: {path}")));
    }
    Ok(joined)
}

/// Per-run context handed to the tool set.
///
/// Exclusively owned by one orchestrator run (or one session) for its
/// duration; nothing in it is shared across sandboxes.
#[derive(Clone)]
pub struct ToolContext {
    /// Absolute path of the sandbox.
    pub work_dir: PathBuf,

    /// Artifact format for this run.
    pub output_format: OutputFormat,

    /// Output model, absent for sessions (which never validate).
    pub output_model: Option<Arc<dyn graft_types::OutputModel>>,

    /// Run mode; `Code` additionally exposes the script runner.
    pub mode: TransformMode,

    /// Domain validator whose issues are surfaced with structural ones.
    pub domain: Option<Arc<dyn DomainValidator>>,

    /// Scripting kernel, present when the run enables it.
    pub kernel: Option<Arc<RlmKernel>>,
}

impl ToolContext {
    /// Context for a transformation run.
    pub fn for_run(
        work_dir: PathBuf,
        output_model: Arc<dyn graft_types::OutputModel>,
        output_format: OutputFormat,
        mode: TransformMode,
    ) -> Self {
        Self {
            work_dir,
            output_format,
            output_model: Some(output_model),
            mode,
            domain: None,
            kernel: None,
        }
    }

    /// Context for a chat session (no output model, direct mode).
    pub fn for_session(work_dir: PathBuf) -> Self {
        Self {
            work_dir,
            output_format: OutputFormat::Jsonl,
            output_model: None,
            mode: TransformMode::Direct,
            domain: None,
            kernel: None,
        }
    }

    /// Attach a domain validator.
    pub fn with_domain(mut self, domain: Arc<dyn DomainValidator>) -> Self {
        self.domain = Some(domain);
        self
    }

    /// Attach a scripting kernel.
    pub fn with_kernel(mut self, kernel: Arc<RlmKernel>) -> Self {
        self.kernel = Some(kernel);
        self
    }

    /// Sandbox-relative artifact path (`<work_dir>/output.<format>`).
    pub fn artifact_path(&self) -> PathBuf {
        self.work_dir.join(self.output_format.artifact_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn sandbox_with_file(name: &str, content: &str) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join(name), content).await.unwrap();
        dir
    }

    #[tokio::test]
    async fn provision_scoped_copies_files() {
        let src = sandbox_with_file("data.csv", "a,b\n1,2\n").await;
        let guard = provision(None, "transform_", &[src.path().join("data.csv")])
            .await
            .unwrap();
        let copied = guard.path().join("data.csv");
        assert!(copied.exists());
        assert_eq!(std::fs::read_to_string(copied).unwrap(), "a,b\n1,2\n");
    }

    #[tokio::test]
    async fn provision_copies_directories_recursively() {
        let src = tempfile::tempdir().unwrap();
        let inputs = src.path().join("inputs");
        std::fs::create_dir_all(inputs.join("nested")).unwrap();
        std::fs::write(inputs.join("a.txt"), "a").unwrap();
        std::fs::write(inputs.join("nested").join("b.txt"), "b").unwrap();

        let guard = provision(None, "transform_", &[inputs.clone()]).await.unwrap();
        assert!(guard.path().join("inputs").join("a.txt").exists());
        assert!(guard.path().join("inputs").join("nested").join("b.txt").exists());
    }

    #[tokio::test]
    async fn provision_missing_input_is_sandbox_error() {
        let err = provision(None, "transform_", &[PathBuf::from("/definitely/missing/input.csv")])
            .await
            .unwrap_err();
        assert!(matches!(err, GraftError::Sandbox { .. }));
    }

    #[tokio::test]
    async fn provision_external_dir_is_retained() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("work");
        {
            let guard = provision(Some(&target), "transform_", &[]).await.unwrap();
            assert_eq!(guard.path(), target.as_path());
        }
        // External directories survive the guard.
        assert!(target.exists());
    }

    #[tokio::test]
    async fn scoped_dir_removed_on_drop() {
        let path = {
            let guard = provision(None, "transform_", &[]).await.unwrap();
            guard.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn resolve_existing_accepts_inside_paths() {
        let dir = sandbox_with_file("data.csv", "x").await;
        let resolved = resolve_existing("./data.csv", dir.path()).unwrap();
        assert!(resolved.ends_with("data.csv"));
    }

    #[tokio::test]
    async fn resolve_existing_rejects_escape() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_existing("../../etc/passwd", dir.path()).unwrap_err();
        // Either the traversal target does not exist or it escapes;
        // both refuse the path.
        assert!(matches!(err, ToolError::InvalidPath(_) | ToolError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn resolve_existing_rejects_symlink_escape() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "s").unwrap();
        let dir = tempfile::tempdir().unwrap();
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(
                outside.path().join("secret.txt"),
                dir.path().join("link.txt"),
            )
            .unwrap();
            let err = resolve_existing("link.txt", dir.path()).unwrap_err();
            assert!(matches!(err, ToolError::InvalidPath(_)));
        }
    }

    #[tokio::test]
    async fn resolve_for_write_allows_new_files() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_for_write("./out/new.jsonl", dir.path()).unwrap();
        assert!(resolved.starts_with(dir.path()));
    }

    #[tokio::test]
    async fn resolve_for_write_rejects_escape() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_for_write("../outside.txt", dir.path()).unwrap_err();
        assert!(matches!(err, ToolError::InvalidPath(_)));
    }

    #[test]
    fn artifact_path_uses_format_extension() {
        let ctx = ToolContext::for_session(PathBuf::from("/tmp/work"));
        assert_eq!(ctx.artifact_path(), PathBuf::from("/tmp/work/output.jsonl"));
    }
}
