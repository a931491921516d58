//! Coordination status document
//!
//! One JSON document per run at `<state_dir>/runs/<run_id>/status.json`,
//! rewritten whole. A write goes to a sibling temp file that is flushed and
//! then renamed over the target, so readers never see a partial document.

use crate::budget_ledger::BudgetWarning;
use crate::executor::Fallback;
use braid_core::{BraidError, Conflict, Resource, Result, Severity, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Partial,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Partial => write!(f, "partial"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedTask {
    pub task_id: TaskId,
    pub worker_id: String,
    pub summary: String,
    /// Resources the worker produced content for
    pub artifacts: Vec<Resource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedTask {
    pub task_id: TaskId,
    pub worker_id: String,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Fallback>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateOutcome {
    Merged,
    /// No successful contributor produced content for the resource
    Skipped,
    Failed,
}

/// Result of applying one shared resource after the parallel phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedResourceUpdate {
    pub resource: Resource,
    pub severity: Severity,
    /// Successful tasks whose content was folded in, in task order
    pub contributors: Vec<TaskId>,
    pub strategy: String,
    pub outcome: UpdateOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationConflictKind {
    /// Several tasks produced the same resource outside the shared list
    Overlap,
    /// A task produced a resource its cluster does not own
    Ownership,
    /// The merge strategy rejected a shared resource
    Merge,
}

/// Left for a human; never auto-resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationConflict {
    pub resource: Resource,
    pub tasks: Vec<TaskId>,
    pub kind: IntegrationConflictKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    pub run_id: String,
    pub status: RunStatus,
    pub timestamp: DateTime<Utc>,
    pub completed_tasks: Vec<CompletedTask>,
    pub failed_tasks: Vec<FailedTask>,
    pub conflicts: Vec<Conflict>,
    pub shared_resource_updates: Vec<SharedResourceUpdate>,
    #[serde(default)]
    pub integration_conflicts: Vec<IntegrationConflict>,
    #[serde(default)]
    pub budget_warnings: Vec<BudgetWarning>,
}

/// Reads and writes status documents under a state directory
#[derive(Debug, Clone)]
pub struct StatusStore {
    state_dir: PathBuf,
}

impl StatusStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.state_dir.join("runs").join(run_id)
    }

    pub fn status_path(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("status.json")
    }

    /// Durably replace the run's status document
    pub async fn write(&self, record: &StatusRecord) -> Result<PathBuf> {
        let path = self.status_path(&record.run_id);
        let json = serde_json::to_vec_pretty(record)?;
        write_atomic(&path, &json)
            .await
            .map_err(|source| BraidError::StatusWrite {
                path: path.clone(),
                source,
            })?;
        info!(run_id = %record.run_id, status = %record.status, "Wrote status document");
        Ok(path)
    }

    pub async fn read(&self, run_id: &str) -> Result<StatusRecord> {
        let path = self.status_path(run_id);
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            BraidError::Other(format!("No status for run {} at {}: {}", run_id, path.display(), e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    let tmp = path.with_extension("json.tmp");

    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await
}
