use crate::engine::Orchestrator;
use crate::task_queue::TaskQueue;
use crate::types::Task;
use cadre_core::{CadreError, CadreResult, Message, MessageFilter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

/// Format version written into every export.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Best-effort dump of the task ledger and bus history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub version: u32,
    pub session_id: Uuid,
    pub exported_at: DateTime<Utc>,
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Orchestrator {
    /// Current ledger and bus history as a snapshot.
    pub async fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            version: SNAPSHOT_VERSION,
            session_id: self.session.id,
            exported_at: Utc::now(),
            tasks: self.queue.read().await.to_vec(),
            messages: self.bus.history(&MessageFilter::default()),
        }
    }

    /// Write the snapshot to `path` as pretty JSON, creating parent
    /// directories as needed.
    pub async fn export_state(&self, path: &Path) -> CadreResult<()> {
        let snapshot = self.snapshot().await;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(path, json).await?;
        info!(
            path = %path.display(),
            tasks = snapshot.tasks.len(),
            messages = snapshot.messages.len(),
            "State exported"
        );
        Ok(())
    }

    /// Replace the task ledger with the one stored at `path`. Returns the
    /// number of tasks restored.
    ///
    /// The file is fully parsed and checked before the ledger is touched.
    /// Bus history is not replayed.
    pub async fn import_state(&self, path: &Path) -> CadreResult<usize> {
        let data = tokio::fs::read_to_string(path).await?;
        let snapshot: StateSnapshot = serde_json::from_str(&data)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(CadreError::Config(format!(
                "unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
                snapshot.version
            )));
        }
        let restored = TaskQueue::from_tasks(snapshot.tasks)?;
        let count = restored.len();
        *self.queue.write().await = restored;
        info!(
            path = %path.display(),
            tasks = count,
            from_session = %snapshot.session_id,
            "State imported"
        );
        Ok(count)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::TeamConfig;
    use crate::types::TaskFilter;
    use cadre_core::TaskStatus;

    async fn orchestrator() -> Orchestrator {
        let mut orchestrator = Orchestrator::with_builtin_roles(TeamConfig::default_team()).unwrap();
        orchestrator.initialize().await.unwrap();
        orchestrator
    }

    #[tokio::test]
    async fn test_export_then_import_restores_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/cadre.json");

        let source = orchestrator().await;
        source
            .execute_task("analyst", "summarize", "The parser must be fast.")
            .await
            .unwrap();
        source
            .execute_task("reviewer", "review_code", "")
            .await
            .unwrap_err();
        source.export_state(&path).await.unwrap();

        let target = orchestrator().await;
        assert_eq!(target.import_state(&path).await.unwrap(), 2);
        let tasks = target.list_tasks(&TaskFilter::default()).await;
        assert_eq!(tasks[0].status, TaskStatus::Completed);
        assert_eq!(tasks[1].status, TaskStatus::Blocked);
    }

    #[tokio::test]
    async fn test_bad_import_leaves_ledger_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let orchestrator = orchestrator().await;
        orchestrator
            .execute_task("analyst", "summarize", "Keep me.")
            .await
            .unwrap();

        assert!(matches!(
            orchestrator.import_state(&path).await,
            Err(CadreError::Json(_))
        ));
        assert!(orchestrator.import_state(&dir.path().join("missing.json")).await.is_err());
        assert_eq!(orchestrator.queue().read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_version_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.json");
        let orchestrator = orchestrator().await;
        let mut snapshot = orchestrator.snapshot().await;
        snapshot.version = 99;
        tokio::fs::write(&path, serde_json::to_string(&snapshot).unwrap())
            .await
            .unwrap();

        assert!(matches!(
            orchestrator.import_state(&path).await,
            Err(CadreError::Config(_))
        ));
    }
}
