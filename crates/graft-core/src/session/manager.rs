//! Session lifecycle management.
//!
//! The manager owns the in-memory session map; all mutations (create,
//! close, evict) happen through it. A background eviction task wakes
//! every minute and closes sessions idle past the configured timeout.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use graft_types::{ChatSessionConfig, ChatSessionInfo, Result};

use crate::agent::client::AgentConnector;
use crate::tools::registry::ToolSetBuilder;

use super::chat::ChatSession;

/// Default idle timeout before a session is evicted.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Eviction scan interval.
const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

/// Owns and evicts chat sessions.
pub struct SessionManager {
    connector: Arc<dyn AgentConnector>,
    tools: Arc<dyn ToolSetBuilder>,
    sessions: Arc<Mutex<HashMap<String, Arc<ChatSession>>>>,
    idle_timeout: Duration,
    cancel: CancellationToken,
    eviction: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Create a manager with the default idle timeout.
    pub fn new(connector: Arc<dyn AgentConnector>, tools: Arc<dyn ToolSetBuilder>) -> Self {
        Self::with_idle_timeout(connector, tools, DEFAULT_IDLE_TIMEOUT)
    }

    /// Create a manager with an explicit idle timeout.
    pub fn with_idle_timeout(
        connector: Arc<dyn AgentConnector>,
        tools: Arc<dyn ToolSetBuilder>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            connector,
            tools,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            idle_timeout,
            cancel: CancellationToken::new(),
            eviction: std::sync::Mutex::new(None),
        }
    }

    /// Start the background eviction task. Call once at startup.
    pub fn start(&self) {
        let mut slot = self.eviction.lock().unwrap();
        if slot.is_some() {
            return;
        }

        let sessions = self.sessions.clone();
        let idle_timeout = self.idle_timeout;
        let cancel = self.cancel.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(EVICTION_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it.
            interval.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let evicted = evict_expired(&sessions, idle_timeout).await;
                        if evicted > 0 {
                            info!(evicted, "evicted idle chat sessions");
                        }
                    }
                }
            }
        });

        *slot = Some(handle);
        info!("session eviction task started");
    }

    /// Create, initialise, and register a new session.
    pub async fn create_session(
        &self,
        workflow_id: &str,
        config: ChatSessionConfig,
    ) -> Result<Arc<ChatSession>> {
        let session_id: String = uuid::Uuid::new_v4().simple().to_string()[..12].to_string();

        let prefix: String = workflow_id.chars().take(8).collect();
        let work_dir = tempfile::Builder::new()
            .prefix(&format!("chat_{prefix}_"))
            .tempdir()
            .map_err(|e| graft_types::GraftError::Sandbox {
                reason: format!("failed to create session work directory: {e}"),
            })?
            .keep();

        let session = Arc::new(ChatSession::new(
            session_id.clone(),
            workflow_id.to_string(),
            work_dir,
            config,
        ));
        session.initialize(self.connector.as_ref(), self.tools.as_ref()).await?;

        let mut sessions = self.sessions.lock().await;
        sessions.insert(session_id.clone(), session.clone());
        info!(
            session_id,
            workflow_id,
            total = sessions.len(),
            "chat session created"
        );

        Ok(session)
    }

    /// Look up a session, refreshing its idle clock on hit.
    pub async fn get_session(&self, session_id: &str) -> Option<Arc<ChatSession>> {
        let sessions = self.sessions.lock().await;
        let session = sessions.get(session_id).cloned();
        if let Some(session) = &session {
            session.touch();
        }
        session
    }

    /// Close and remove a session. Returns whether it existed.
    pub async fn close_session(&self, session_id: &str) -> bool {
        let session = self.sessions.lock().await.remove(session_id);
        match session {
            Some(session) => {
                session.close().await;
                info!(session_id, "chat session closed");
                true
            }
            None => false,
        }
    }

    /// Close every session belonging to a workflow. Returns the count.
    pub async fn close_workflow_sessions(&self, workflow_id: &str) -> usize {
        let ids: Vec<String> = {
            let sessions = self.sessions.lock().await;
            sessions
                .iter()
                .filter(|(_, s)| s.workflow_id() == workflow_id)
                .map(|(id, _)| id.clone())
                .collect()
        };
        let mut closed = 0;
        for id in ids {
            if self.close_session(&id).await {
                closed += 1;
            }
        }
        closed
    }

    /// List summaries of all live sessions.
    pub async fn list_sessions(&self) -> Vec<ChatSessionInfo> {
        let sessions: Vec<Arc<ChatSession>> =
            self.sessions.lock().await.values().cloned().collect();
        let mut infos = Vec::with_capacity(sessions.len());
        for session in sessions {
            infos.push(session.info().await);
        }
        infos
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Close sessions idle past the timeout. Returns the count.
    pub async fn cleanup_expired(&self) -> usize {
        evict_expired(&self.sessions, self.idle_timeout).await
    }

    /// Cancel the eviction task, wait for it, then close all sessions.
    /// Idempotent.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.eviction.lock().unwrap().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "eviction task join failed");
            }
        }

        let ids: Vec<String> = self.sessions.lock().await.keys().cloned().collect();
        for id in ids {
            self.close_session(&id).await;
        }
        info!("session manager shutdown complete");
    }

    /// Whether the eviction task is currently scheduled.
    pub fn eviction_running(&self) -> bool {
        self.eviction.lock().unwrap().is_some()
    }
}

async fn evict_expired(
    sessions: &Mutex<HashMap<String, Arc<ChatSession>>>,
    idle_timeout: Duration,
) -> usize {
    let now = Utc::now();
    let expired: Vec<(String, Arc<ChatSession>)> = {
        let map = sessions.lock().await;
        map.iter()
            .filter(|(_, s)| {
                let idle = now.signed_duration_since(s.last_activity());
                idle.to_std().map(|d| d > idle_timeout).unwrap_or(false)
            })
            .map(|(id, s)| (id.clone(), s.clone()))
            .collect()
    };

    let mut evicted = 0;
    for (id, session) in expired {
        info!(session_id = %id, "evicting expired session");
        sessions.lock().await.remove(&id);
        session.close().await;
        evicted += 1;
    }
    evicted
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::agent::testing::{ScriptedBlock, ScriptedConnector};
    use crate::sandbox::ToolContext;
    use crate::tools::registry::ToolRegistry;

    struct EmptyToolSet;

    impl ToolSetBuilder for EmptyToolSet {
        fn build(&self, _ctx: &ToolContext) -> ToolRegistry {
            ToolRegistry::new()
        }
    }

    fn manager_with_sessions(n: usize, idle_timeout: Duration) -> SessionManager {
        let scripts = (0..n)
            .map(|_| vec![vec![ScriptedBlock::text("ok"), ScriptedBlock::TurnComplete]])
            .collect();
        SessionManager::with_idle_timeout(
            ScriptedConnector::sequence(scripts),
            Arc::new(EmptyToolSet),
            idle_timeout,
        )
    }

    fn config() -> ChatSessionConfig {
        ChatSessionConfig { include_graph_api: false, ..ChatSessionConfig::default() }
    }

    #[tokio::test]
    async fn create_get_close_lifecycle() {
        let manager = manager_with_sessions(1, DEFAULT_IDLE_TIMEOUT);

        let session = manager.create_session("wf-1", config()).await.unwrap();
        let id = session.session_id().to_string();
        assert_eq!(manager.session_count().await, 1);

        let fetched = manager.get_session(&id).await.unwrap();
        assert_eq!(fetched.workflow_id(), "wf-1");

        assert!(manager.close_session(&id).await);
        assert!(!manager.close_session(&id).await);
        assert_eq!(manager.session_count().await, 0);

        // Work dir retained for post-mortem.
        assert!(session.work_dir().exists());
        let _ = std::fs::remove_dir_all(session.work_dir());
    }

    #[tokio::test]
    async fn get_refreshes_last_activity() {
        let manager = manager_with_sessions(1, DEFAULT_IDLE_TIMEOUT);
        let session = manager.create_session("wf-1", config()).await.unwrap();
        let before = session.last_activity();

        tokio::time::sleep(Duration::from_millis(15)).await;
        manager.get_session(session.session_id()).await.unwrap();
        assert!(session.last_activity() > before);

        manager.shutdown().await;
        let _ = std::fs::remove_dir_all(session.work_dir());
    }

    #[tokio::test]
    async fn cleanup_evicts_only_idle_sessions() {
        let manager = manager_with_sessions(2, Duration::from_millis(50));
        let old = manager.create_session("wf-1", config()).await.unwrap();
        let fresh = manager.create_session("wf-2", config()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        fresh.touch();

        let evicted = manager.cleanup_expired().await;
        assert_eq!(evicted, 1);
        assert!(manager.get_session(old.session_id()).await.is_none());
        assert!(manager.get_session(fresh.session_id()).await.is_some());

        manager.shutdown().await;
        let _ = std::fs::remove_dir_all(old.work_dir());
        let _ = std::fs::remove_dir_all(fresh.work_dir());
    }

    #[tokio::test]
    async fn close_workflow_sessions_filters_by_workflow() {
        let manager = manager_with_sessions(3, DEFAULT_IDLE_TIMEOUT);
        let a1 = manager.create_session("wf-a", config()).await.unwrap();
        let a2 = manager.create_session("wf-a", config()).await.unwrap();
        let b = manager.create_session("wf-b", config()).await.unwrap();

        assert_eq!(manager.close_workflow_sessions("wf-a").await, 2);
        assert_eq!(manager.session_count().await, 1);

        manager.shutdown().await;
        for s in [a1, a2, b] {
            let _ = std::fs::remove_dir_all(s.work_dir());
        }
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_clears_everything() {
        let manager = manager_with_sessions(1, DEFAULT_IDLE_TIMEOUT);
        manager.start();
        assert!(manager.eviction_running());
        let session = manager.create_session("wf-1", config()).await.unwrap();

        manager.shutdown().await;
        assert_eq!(manager.session_count().await, 0);
        assert!(!manager.eviction_running());

        // Second shutdown is a no-op.
        manager.shutdown().await;

        let _ = std::fs::remove_dir_all(session.work_dir());
    }

    #[tokio::test]
    async fn start_twice_spawns_one_task() {
        let manager = manager_with_sessions(0, DEFAULT_IDLE_TIMEOUT);
        manager.start();
        manager.start();
        assert!(manager.eviction_running());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn list_sessions_reports_all() {
        let manager = manager_with_sessions(2, DEFAULT_IDLE_TIMEOUT);
        let s1 = manager.create_session("wf-1", config()).await.unwrap();
        let s2 = manager.create_session("wf-2", config()).await.unwrap();

        let infos = manager.list_sessions().await;
        assert_eq!(infos.len(), 2);
        assert!(infos.iter().all(|i| i.is_active));

        manager.shutdown().await;
        for s in [s1, s2] {
            let _ = std::fs::remove_dir_all(s.work_dir());
        }
    }
}
