//! Worker registry
//!
//! In-memory table of every worker launched in a run, optionally mirrored
//! to one JSON file per worker for outside observers. Mirroring is
//! fail-open.

use crate::service::{Artifact, WorkerRequest};
use braid_core::fail_open::fail_open;
use braid_core::{BraidError, Result, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRecord {
    pub worker_id: String,
    pub task_id: TaskId,
    pub task_description: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub outputs: Vec<Artifact>,
    #[serde(default)]
    pub resource_usage: u64,
    pub status: WorkerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkerRecord {
    pub fn running(request: &WorkerRequest, start_time: DateTime<Utc>) -> Self {
        let task = &request.task;
        let task_description = if task.description.is_empty() {
            task.title.clone()
        } else {
            format!("{}\n\n{}", task.title, task.description)
        };
        Self {
            worker_id: request.worker_id.clone(),
            task_id: task.id.clone(),
            task_description,
            start_time,
            outputs: Vec::new(),
            resource_usage: 0,
            status: WorkerStatus::Running,
            end_time: None,
            error: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct WorkerRegistry {
    records: HashMap<String, WorkerRecord>,
    persist_dir: Option<PathBuf>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror every record change to `<dir>/<worker_id>.json`
    pub fn with_persistence(mut self, dir: impl Into<PathBuf>) -> Self {
        self.persist_dir = Some(dir.into());
        self
    }

    pub async fn register(&mut self, record: WorkerRecord) {
        debug!(worker_id = %record.worker_id, task_id = %record.task_id, "Registering worker");
        self.records.insert(record.worker_id.clone(), record.clone());
        self.persist(&record).await;
    }

    pub async fn complete(
        &mut self,
        worker_id: &str,
        outputs: Vec<Artifact>,
        resource_usage: u64,
        end_time: DateTime<Utc>,
    ) {
        let Some(record) = self.records.get_mut(worker_id) else {
            debug!("Completion for unknown worker {}", worker_id);
            return;
        };
        record.status = WorkerStatus::Completed;
        record.outputs = outputs;
        record.resource_usage = resource_usage;
        record.end_time = Some(end_time);
        let record = record.clone();
        self.persist(&record).await;
    }

    pub async fn fail(&mut self, worker_id: &str, error: String, end_time: DateTime<Utc>) {
        let Some(record) = self.records.get_mut(worker_id) else {
            debug!("Failure for unknown worker {}", worker_id);
            return;
        };
        record.status = WorkerStatus::Error;
        record.error = Some(error);
        record.end_time = Some(end_time);
        let record = record.clone();
        self.persist(&record).await;
    }

    pub fn get(&self, worker_id: &str) -> Option<&WorkerRecord> {
        self.records.get(worker_id)
    }

    /// Workers currently running
    pub fn active(&self) -> Vec<&WorkerRecord> {
        self.records
            .values()
            .filter(|r| r.status == WorkerStatus::Running)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    async fn persist(&self, record: &WorkerRecord) {
        if let Some(dir) = &self.persist_dir {
            fail_open("worker_registry", || write_record(dir, record)).await;
        }
    }
}

async fn write_record(dir: &Path, record: &WorkerRecord) -> Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}.json", record.worker_id));
    let json = serde_json::to_string_pretty(record)?;
    tokio::fs::write(&path, json).await?;
    Ok(())
}

/// Load a persisted worker record
pub async fn read_record(dir: &Path, worker_id: &str) -> Result<WorkerRecord> {
    let path = dir.join(format!("{}.json", worker_id));
    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| BraidError::Other(format!("Failed to read {}: {}", path.display(), e)))?;
    Ok(serde_json::from_str(&content)?)
}
