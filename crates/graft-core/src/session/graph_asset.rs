//! Installation of the read-only graph-query module into a sandbox.
//!
//! The query module runs inside the agent's subprocess, so the
//! interface is file-based: the module source is written next to the
//! agent's scripts and a `.graph_config.json` sidecar names the
//! workflow and the backing store.

use std::path::Path;

use serde_json::json;
use tracing::debug;

use graft_types::Result;

/// Source of the read-only graph query module.
pub const GRAPH_API_MODULE: &str = include_str!("../../assets/graph_api.py");

/// File name the module is installed under.
pub const GRAPH_API_FILE: &str = "graph_api.py";

/// Sidecar file naming the workflow and backing store.
pub const GRAPH_CONFIG_FILE: &str = ".graph_config.json";

/// Install the graph query module and its config sidecar into
/// `work_dir`. The database path is made absolute because agent
/// scripts run with the sandbox as their working directory.
pub async fn install_graph_api(
    work_dir: &Path,
    workflow_id: &str,
    db_path: &Path,
) -> Result<()> {
    tokio::fs::write(work_dir.join(GRAPH_API_FILE), GRAPH_API_MODULE).await?;

    let absolute_db = if db_path.is_absolute() {
        db_path.to_path_buf()
    } else {
        std::env::current_dir()?.join(db_path)
    };

    let config = json!({
        "workflow_id": workflow_id,
        "db_path": absolute_db.to_string_lossy(),
    });
    tokio::fs::write(
        work_dir.join(GRAPH_CONFIG_FILE),
        serde_json::to_string(&config)?,
    )
    .await?;

    debug!(workflow_id, work_dir = %work_dir.display(), "graph query module installed");
    Ok(())
}
