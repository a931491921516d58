//! End-to-end scheduling run
//!
//! `Coordinator` is the explicit run context: configuration, worker
//! service, merge strategy and state directory are passed in rather than
//! looked up globally.

use crate::budget_ledger::BudgetLedger;
use crate::executor::{Orchestrator, WorkerLaunch, WorkerResult};
use crate::merge::{ConcatMerge, MergeStrategy};
use crate::reconciler::IntegrationReconciler;
use crate::service::WorkerService;
use crate::status::{StatusRecord, StatusStore};
use braid_core::{BraidConfig, BraidError, Result, Task};
use braid_planning::{plan_tasks, SchedulePlan};
use chrono::Utc;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub plan: SchedulePlan,
    /// One per task, in task input order
    pub results: Vec<WorkerResult>,
    pub status: StatusRecord,
    pub status_path: PathBuf,
}

pub struct Coordinator {
    config: BraidConfig,
    state_dir: PathBuf,
    service: Arc<dyn WorkerService>,
    merge: Arc<dyn MergeStrategy>,
}

impl Coordinator {
    pub fn new(
        config: BraidConfig,
        state_dir: impl Into<PathBuf>,
        service: Arc<dyn WorkerService>,
    ) -> Self {
        Self {
            config,
            state_dir: state_dir.into(),
            service,
            merge: Arc::new(ConcatMerge),
        }
    }

    pub fn with_merge_strategy(mut self, merge: Arc<dyn MergeStrategy>) -> Self {
        self.merge = merge;
        self
    }

    pub fn config(&self) -> &BraidConfig {
        &self.config
    }

    pub fn status_store(&self) -> StatusStore {
        StatusStore::new(&self.state_dir)
    }

    /// Plan, execute and reconcile `tasks`.
    ///
    /// Worker failures end up in the report. The only error returned after
    /// validation is a failure to write the status document.
    pub async fn run(&self, tasks: &[Task], run_id: Option<String>) -> Result<RunReport> {
        validate_tasks(tasks)?;
        let run_id = match run_id {
            Some(id) => validate_run_id(id)?,
            None => new_run_id(),
        };
        info!(run_id = %run_id, tasks = tasks.len(), "Starting run");

        let plan = plan_tasks(tasks, &self.config);
        let store = self.status_store();

        let mut orchestrator = Orchestrator::new(Arc::clone(&self.service), &self.config.scheduler)
            .with_ledger(BudgetLedger::new(self.config.budget.warning_threshold))
            .with_registry_dir(store.run_dir(&run_id).join("workers"));
        let results = orchestrator
            .launch_many(WorkerLaunch::from_plan(tasks, &plan))
            .await;

        let status = IntegrationReconciler::new(Arc::clone(&self.merge)).reconcile(
            &run_id,
            &results,
            &plan.partition,
            orchestrator.ledger().warnings(),
        );
        let status_path = store.write(&status).await?;

        info!(run_id = %run_id, status = %status.status, "Run finished");
        Ok(RunReport {
            run_id,
            plan,
            results,
            status,
            status_path,
        })
    }
}

pub fn new_run_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("run-{}-{}", Utc::now().format("%Y%m%dT%H%M%S"), &suffix[..8])
}

fn validate_run_id(id: String) -> Result<String> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !id.starts_with('.');
    if valid {
        Ok(id)
    } else {
        Err(BraidError::Config(format!("Invalid run id: {:?}", id)))
    }
}

fn validate_tasks(tasks: &[Task]) -> Result<()> {
    let mut seen = HashSet::new();
    for task in tasks {
        if task.id.trim().is_empty() {
            return Err(BraidError::Config(format!(
                "Task {:?} has an empty id",
                task.title
            )));
        }
        if !seen.insert(task.id.as_str()) {
            return Err(BraidError::Config(format!("Duplicate task id: {}", task.id)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::MockWorkerService;
    use tempfile::TempDir;

    #[test]
    fn test_run_id_validation() {
        assert!(validate_run_id("nightly-42".to_string()).is_ok());
        assert!(validate_run_id("../etc".to_string()).is_err());
        assert!(validate_run_id("a/b".to_string()).is_err());
        assert!(validate_run_id(String::new()).is_err());
        assert!(new_run_id().starts_with("run-"));
    }

    #[tokio::test]
    async fn test_duplicate_task_ids_rejected() {
        let temp = TempDir::new().unwrap();
        let coordinator = Coordinator::new(
            BraidConfig::default(),
            temp.path(),
            Arc::new(MockWorkerService::new()),
        );
        let tasks = vec![Task::new("A", "one"), Task::new("A", "two")];

        let err = coordinator.run(&tasks, None).await.unwrap_err();
        assert!(matches!(err, BraidError::Config(_)));
    }

    #[tokio::test]
    async fn test_empty_run_completes() {
        let temp = TempDir::new().unwrap();
        let coordinator = Coordinator::new(
            BraidConfig::default(),
            temp.path(),
            Arc::new(MockWorkerService::new()),
        );

        let report = coordinator.run(&[], Some("empty".to_string())).await.unwrap();
        assert!(report.results.is_empty());
        assert_eq!(report.status.status, crate::status::RunStatus::Completed);
        assert!(report.status_path.exists());
    }

    #[tokio::test]
    async fn test_unwritable_state_dir_fails_run() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("state");
        std::fs::write(&blocker, "not a directory").unwrap();
        let service = MockWorkerService::new();
        let coordinator = Coordinator::new(
            BraidConfig::default(),
            blocker.clone(),
            Arc::new(service.clone()),
        );

        let err = coordinator
            .run(&[Task::new("A", "Edit src/a.rs")], Some("r1".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, BraidError::StatusWrite { .. }));
        // Workers still ran; registry persistence fails open
        assert_eq!(service.calls(), vec!["A"]);
    }
}
