//! Persistent scripting kernel for huge inputs.
//!
//! The kernel keeps an interpreter subprocess alive across executions
//! so massive context can live in kernel memory instead of the agent's
//! context window: the agent loads data once, then iterates with small
//! code snippets through the `run_repl` tool.
//!
//! Wire protocol with the child (all over stdio):
//! - request: one line with the code's byte length, then the code bytes
//! - response: one line `"<len> <ok|err>"`, then `len` bytes of output
//!
//! The driver program is injected with `-c` at spawn time and holds a
//! single shared namespace, pre-seeded with `chunk` and `chunk_lines`
//! helpers for splitting large strings.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use graft_types::{GraftError, Result};

/// Default per-execution timeout.
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(60);

const DRIVER: &str = r#"
import io, sys, traceback

ns = {}

def _chunk(data, size=2000):
    return [data[i:i + size] for i in range(0, len(data), size)]

def _chunk_lines(data, n=100):
    lines = data.splitlines()
    return ["\n".join(lines[i:i + n]) for i in range(0, len(lines), n)]

ns["chunk"] = _chunk
ns["chunk_lines"] = _chunk_lines

while True:
    header = sys.stdin.buffer.readline()
    if not header:
        break
    try:
        n = int(header.strip())
    except ValueError:
        continue
    code = sys.stdin.buffer.read(n).decode("utf-8", "replace")
    buf = io.StringIO()
    old = sys.stdout
    sys.stdout = buf
    status = "ok"
    try:
        exec(code, ns)
    except BaseException:
        traceback.print_exc(file=buf)
        status = "err"
    finally:
        sys.stdout = old
    payload = buf.getvalue().encode("utf-8", "replace")
    frame = (str(len(payload)) + " " + status + "\n").encode("ascii")
    sys.stdout.buffer.write(frame)
    sys.stdout.buffer.write(payload)
    sys.stdout.buffer.flush()
"#;

/// Result of one kernel execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelResult {
    /// Whether the snippet ran without raising.
    pub ok: bool,
    /// Captured stdout (or the traceback on failure).
    pub output: String,
}

struct KernelProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// A persistent interpreter subprocess with a shared namespace.
pub struct RlmKernel {
    work_dir: PathBuf,
    process: Mutex<Option<KernelProcess>>,
    interpreter: String,
}

impl RlmKernel {
    /// Create a kernel rooted in the given work directory, locating
    /// `python3` on the path.
    pub fn new(work_dir: PathBuf) -> Result<Self> {
        let interpreter = which::which("python3")
            .map_err(|e| GraftError::Config { reason: format!("python3 not found: {e}") })?;
        Ok(Self::with_interpreter(work_dir, interpreter.to_string_lossy().into_owned()))
    }

    /// Create a kernel with an explicit interpreter binary.
    pub fn with_interpreter(work_dir: PathBuf, interpreter: String) -> Self {
        Self { work_dir, process: Mutex::new(None), interpreter }
    }

    async fn ensure_started(
        &self,
        slot: &mut Option<KernelProcess>,
    ) -> Result<()> {
        if slot.is_some() {
            return Ok(());
        }

        let mut child = Command::new(&self.interpreter)
            .arg("-u")
            .arg("-c")
            .arg(DRIVER)
            .current_dir(&self.work_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| GraftError::Sandbox {
                reason: format!("failed to start kernel: {e}"),
            })?;

        let stdin = child.stdin.take().expect("kernel stdin piped");
        let stdout = BufReader::new(child.stdout.take().expect("kernel stdout piped"));

        debug!(interpreter = %self.interpreter, "kernel started");
        *slot = Some(KernelProcess { child, stdin, stdout });
        Ok(())
    }

    /// Execute a snippet in the kernel namespace.
    ///
    /// On timeout the child is killed (state is lost; the next call
    /// starts a fresh kernel) and [`GraftError::Timeout`] is returned.
    pub async fn execute(&self, code: &str, timeout: Duration) -> Result<KernelResult> {
        let mut slot = self.process.lock().await;
        self.ensure_started(&mut slot).await?;
        let process = slot.as_mut().expect("kernel started above");

        let exchange = async {
            let payload = code.as_bytes();
            process
                .stdin
                .write_all(format!("{}\n", payload.len()).as_bytes())
                .await?;
            process.stdin.write_all(payload).await?;
            process.stdin.flush().await?;

            let mut header = String::new();
            process.stdout.read_line(&mut header).await?;
            let mut parts = header.split_whitespace();
            let len: usize = parts
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| std::io::Error::other("malformed kernel response header"))?;
            let ok = parts.next() == Some("ok");

            let mut buf = vec![0u8; len];
            process.stdout.read_exact(&mut buf).await?;
            std::io::Result::Ok(KernelResult {
                ok,
                output: String::from_utf8_lossy(&buf).into_owned(),
            })
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => {
                let _ = slot.take();
                Err(GraftError::Sandbox { reason: format!("kernel io failed: {e}") })
            }
            Err(_) => {
                if let Some(mut process) = slot.take() {
                    let _ = process.child.kill().await;
                }
                warn!("kernel execution timed out, process killed");
                Err(GraftError::Timeout { operation: "kernel execution".into() })
            }
        }
    }

    /// Load a file's contents into the kernel namespace as `context`.
    pub async fn load_context(&self, path: &std::path::Path) -> Result<KernelResult> {
        let escaped = path.to_string_lossy().replace('\\', "\\\\").replace('\'', "\\'");
        let code = format!(
            "context = open('{escaped}', encoding='utf-8', errors='replace').read()\nprint(len(context))"
        );
        self.execute(&code, DEFAULT_EXEC_TIMEOUT).await
    }

    /// Kill the kernel subprocess, if running.
    pub async fn shutdown(&self) {
        let mut slot = self.process.lock().await;
        if let Some(mut process) = slot.take() {
            let _ = process.child.kill().await;
            debug!("kernel shut down");
        }
    }
}
