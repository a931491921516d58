//! Integration tests for a full scheduling run
//!
//! Covers planning, batched execution with the mock worker service,
//! reconciliation of shared resources and the persisted status document.

use braid_core::{BraidConfig, Complexity, Priority, Task, TaskAttributes, TaskType};
use braid_orchestrator::registry::read_record;
use braid_orchestrator::{
    Coordinator, IntegrationConflictKind, MockWorkerService, RunStatus, UpdateOutcome,
    WorkerOutput, WorkerStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Helper to create a sprint of tasks touching overlapping files
fn sprint() -> Vec<Task> {
    vec![
        Task::new("T-1", "Add login form")
            .with_resources(["src/auth/mod.rs", "Cargo.toml"])
            .with_attributes(
                TaskAttributes::new()
                    .with_complexity(Complexity::Complex)
                    .with_priority(Priority::Critical)
                    .with_task_type(TaskType::Coding),
            ),
        Task::new("T-2", "Session storage").with_resources(["src/auth/mod.rs", "src/session.rs"]),
        Task::new("T-3", "Parser cleanup").with_resources(["src/parser.rs"]),
        Task::new("T-4", "Add metrics dependency").with_resources(["Cargo.toml", "src/metrics.rs"]),
        Task::new("T-5", "Think about naming"),
    ]
}

fn service() -> MockWorkerService {
    MockWorkerService::new()
        .with_output(
            "T-1",
            WorkerOutput::summary_only("login form added")
                .with_artifact("src/auth/mod.rs", "pub mod login;")
                .with_artifact("Cargo.toml", "argon2 = \"0.5\"")
                .with_usage(20_000),
        )
        .with_output(
            "T-2",
            WorkerOutput::summary_only("sessions stored")
                .with_artifact("src/auth/mod.rs", "pub mod session;")
                .with_artifact("src/session.rs", "pub struct Session;"),
        )
        .with_output(
            "T-3",
            WorkerOutput::summary_only("parser tidied").with_artifact("src/parser.rs", "// tidy"),
        )
        .with_output(
            "T-4",
            WorkerOutput::summary_only("metrics wired")
                .with_artifact("Cargo.toml", "metrics = \"0.22\"")
                .with_artifact("src/metrics.rs", "pub fn init() {}"),
        )
        .with_default_delay(Duration::from_millis(10))
}

#[tokio::test]
async fn test_full_run_reconciles_shared_resources() {
    let temp = TempDir::new().unwrap();
    let coordinator = Coordinator::new(BraidConfig::default(), temp.path(), Arc::new(service()));

    let tasks = sprint();
    let report = coordinator
        .run(&tasks, Some("sprint-1".to_string()))
        .await
        .expect("run should succeed");

    // T-1, T-2 and T-4 are linked through shared files
    let partition = &report.plan.partition;
    let cluster = partition.cluster_of("T-1").unwrap();
    assert!(cluster.contains_task("T-2"));
    assert!(cluster.contains_task("T-4"));
    assert!(!cluster.contains_task("T-3"));
    assert_eq!(partition.deferred.len(), 1);
    assert_eq!(partition.deferred[0].resource, "Cargo.toml");
    assert_eq!(partition.ambiguities.len(), 1);
    assert_eq!(partition.ambiguities[0].task_id, "T-5");

    // Results keep input order
    let ids: Vec<&str> = report.results.iter().map(|r| r.task_id.as_str()).collect();
    assert_eq!(ids, vec!["T-1", "T-2", "T-3", "T-4", "T-5"]);

    let status = &report.status;
    assert_eq!(status.status, RunStatus::Completed);
    assert_eq!(status.completed_tasks.len(), 5);
    assert!(status.failed_tasks.is_empty());

    let resources: Vec<&str> = status
        .shared_resource_updates
        .iter()
        .map(|u| u.resource.as_str())
        .collect();
    assert_eq!(resources, vec!["Cargo.toml", "src/auth/mod.rs"]);
    let cargo = &status.shared_resource_updates[0];
    assert_eq!(cargo.outcome, UpdateOutcome::Merged);
    assert_eq!(cargo.contributors, vec!["T-1", "T-4"]);

    // T-1 was budgeted 23000 and used 20000
    assert_eq!(report.plan.allocation_for("T-1"), Some(23_000));
    assert_eq!(status.budget_warnings.len(), 1);

    // Status document on disk matches the report
    assert!(report.status_path.ends_with("runs/sprint-1/status.json"));
    let stored = coordinator.status_store().read("sprint-1").await.unwrap();
    assert_eq!(&stored, status);

    // One registry record per worker
    let workers_dir = temp.path().join("runs/sprint-1/workers");
    for result in &report.results {
        let record = read_record(&workers_dir, &result.worker_id).await.unwrap();
        assert_eq!(record.status, WorkerStatus::Completed);
        assert_eq!(record.task_id, result.task_id);
    }
}

#[tokio::test]
async fn test_failures_and_stray_writes_make_run_partial() {
    let temp = TempDir::new().unwrap();
    let service = service()
        .with_failure("T-2", "session store unavailable")
        .with_output(
            "T-3",
            WorkerOutput::summary_only("wandered off").with_artifact("src/metrics.rs", "oops"),
        );
    let coordinator = Coordinator::new(BraidConfig::default(), temp.path(), Arc::new(service));

    let report = coordinator.run(&sprint(), None).await.unwrap();
    let status = &report.status;

    assert_eq!(status.status, RunStatus::Partial);
    assert_eq!(status.failed_tasks.len(), 1);
    assert_eq!(status.failed_tasks[0].task_id, "T-2");

    let auth = status
        .shared_resource_updates
        .iter()
        .find(|u| u.resource == "src/auth/mod.rs")
        .unwrap();
    assert_eq!(auth.contributors, vec!["T-1"]);

    let kinds: Vec<IntegrationConflictKind> =
        status.integration_conflicts.iter().map(|c| c.kind).collect();
    assert!(kinds.contains(&IntegrationConflictKind::Overlap));
    assert!(kinds.contains(&IntegrationConflictKind::Ownership));
}

#[tokio::test]
async fn test_batches_bounded_by_config() {
    let temp = TempDir::new().unwrap();
    let mut config = BraidConfig::default();
    config.scheduler.max_concurrent = 2;

    let service = MockWorkerService::new().with_default_delay(Duration::from_millis(15));
    let coordinator = Coordinator::new(config, temp.path(), Arc::new(service.clone()));

    let tasks: Vec<Task> = (0..7)
        .map(|i| Task::new(format!("T{}", i), "work").with_resources([format!("src/m{}.rs", i)]))
        .collect();
    let report = coordinator.run(&tasks, None).await.unwrap();

    assert_eq!(report.results.len(), 7);
    assert_eq!(service.peak_concurrency(), 2);
    assert_eq!(report.plan.partition.clusters.len(), 3);
    assert_eq!(report.status.status, RunStatus::Completed);
}
