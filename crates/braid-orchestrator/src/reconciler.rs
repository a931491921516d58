//! Integration reconciler
//!
//! Runs after the parallel phase. Shared resources are applied one at a
//! time (deferred critical resources first), then a second pass records
//! overlaps the plan did not anticipate.

use crate::budget_ledger::BudgetWarning;
use crate::executor::WorkerResult;
use crate::merge::{Contribution, MergeStrategy};
use crate::status::{
    CompletedTask, FailedTask, IntegrationConflict, IntegrationConflictKind, RunStatus,
    SharedResourceUpdate, StatusRecord, UpdateOutcome,
};
use braid_core::{Conflict, Resource, TaskId};
use braid_planning::PartitionPlan;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct IntegrationReconciler {
    strategy: Arc<dyn MergeStrategy>,
}

impl IntegrationReconciler {
    pub fn new(strategy: Arc<dyn MergeStrategy>) -> Self {
        Self { strategy }
    }

    /// Build the run's status record from ordered worker results
    pub fn reconcile(
        &self,
        run_id: &str,
        results: &[WorkerResult],
        plan: &PartitionPlan,
        budget_warnings: &[BudgetWarning],
    ) -> StatusRecord {
        let mut completed_tasks = Vec::new();
        let mut failed_tasks = Vec::new();
        for result in results {
            match &result.output {
                Some(output) if result.is_success() => completed_tasks.push(CompletedTask {
                    task_id: result.task_id.clone(),
                    worker_id: result.worker_id.clone(),
                    summary: output.summary.clone(),
                    artifacts: output.artifacts.iter().map(|a| a.resource.clone()).collect(),
                }),
                _ => failed_tasks.push(FailedTask {
                    task_id: result.task_id.clone(),
                    worker_id: result.worker_id.clone(),
                    error: result
                        .error
                        .clone()
                        .unwrap_or_else(|| "worker reported no output".to_string()),
                    fallback: result.fallback,
                }),
            }
        }

        let mut integration_conflicts = Vec::new();
        let mut shared_resource_updates = Vec::new();
        for conflict in plan.resolution_order() {
            let update = self.apply_shared(conflict, results);
            for writer in update
                .contributors
                .iter()
                .filter(|task_id| !conflict.tasks.contains(*task_id))
            {
                integration_conflicts.push(IntegrationConflict {
                    resource: update.resource.clone(),
                    tasks: vec![writer.clone()],
                    kind: IntegrationConflictKind::Ownership,
                });
            }
            if update.outcome == UpdateOutcome::Failed {
                integration_conflicts.push(IntegrationConflict {
                    resource: update.resource.clone(),
                    tasks: update.contributors.clone(),
                    kind: IntegrationConflictKind::Merge,
                });
            }
            shared_resource_updates.push(update);
        }

        integration_conflicts.extend(residual_conflicts(results, plan));
        for conflict in &integration_conflicts {
            warn!(
                resource = %conflict.resource,
                tasks = ?conflict.tasks,
                "Integration conflict ({:?})",
                conflict.kind
            );
        }

        let status = run_status(
            completed_tasks.len(),
            failed_tasks.len(),
            integration_conflicts.is_empty(),
        );
        info!(
            run_id,
            %status,
            completed = completed_tasks.len(),
            failed = failed_tasks.len(),
            "Reconciled run"
        );

        StatusRecord {
            run_id: run_id.to_string(),
            status,
            timestamp: Utc::now(),
            completed_tasks,
            failed_tasks,
            conflicts: plan.conflicts.clone(),
            shared_resource_updates,
            integration_conflicts,
            budget_warnings: budget_warnings.to_vec(),
        }
    }

    fn apply_shared(&self, conflict: &Conflict, results: &[WorkerResult]) -> SharedResourceUpdate {
        // Every successful writer contributes, including ones the plan did
        // not predict
        let contributions: Vec<Contribution<'_>> = results
            .iter()
            .filter(|r| r.is_success())
            .filter_map(|result| {
                let artifact = result.output.as_ref()?.artifact_for(&conflict.resource)?;
                Some(Contribution {
                    task_id: &result.task_id,
                    content: &artifact.content,
                })
            })
            .collect();

        let mut update = SharedResourceUpdate {
            resource: conflict.resource.clone(),
            severity: conflict.severity,
            contributors: contributions.iter().map(|c| c.task_id.to_string()).collect(),
            strategy: self.strategy.name().to_string(),
            outcome: UpdateOutcome::Skipped,
            merged: None,
            error: None,
        };

        if contributions.is_empty() {
            debug!(resource = %conflict.resource, "No contributions for shared resource");
            return update;
        }

        match self.strategy.merge(&conflict.resource, &contributions) {
            Ok(merged) => {
                debug!(
                    resource = %conflict.resource,
                    contributors = contributions.len(),
                    "Applied shared resource"
                );
                update.outcome = UpdateOutcome::Merged;
                update.merged = Some(merged);
            }
            Err(e) => {
                update.outcome = UpdateOutcome::Failed;
                update.error = Some(e.to_string());
            }
        }
        update
    }
}

fn run_status(completed: usize, failed: usize, integration_clean: bool) -> RunStatus {
    if completed == 0 && failed > 0 {
        RunStatus::Failed
    } else if failed == 0 && integration_clean {
        RunStatus::Completed
    } else {
        RunStatus::Partial
    }
}

/// Overlaps and ownership breaches among successful outputs, for resources
/// outside the shared list, in discovery order
fn residual_conflicts(results: &[WorkerResult], plan: &PartitionPlan) -> Vec<IntegrationConflict> {
    let mut writers: BTreeMap<&str, Vec<TaskId>> = BTreeMap::new();
    let mut discovery: Vec<&str> = Vec::new();
    let mut ownership = Vec::new();

    for result in results.iter().filter(|r| r.is_success()) {
        let Some(output) = &result.output else {
            continue;
        };
        let cluster = plan.clusters.iter().find(|c| c.id == result.cluster);

        for artifact in &output.artifacts {
            let resource = artifact.resource.as_str();
            if plan.is_shared(resource) {
                continue;
            }

            let tasks = writers.entry(resource).or_insert_with(|| {
                discovery.push(resource);
                Vec::new()
            });
            if !tasks.contains(&result.task_id) {
                tasks.push(result.task_id.clone());
            }

            if !cluster.is_some_and(|c| c.owns(resource)) {
                ownership.push(IntegrationConflict {
                    resource: Resource::from(resource),
                    tasks: vec![result.task_id.clone()],
                    kind: IntegrationConflictKind::Ownership,
                });
            }
        }
    }

    let mut conflicts: Vec<IntegrationConflict> = discovery
        .into_iter()
        .filter_map(|resource| {
            let tasks = writers.get(resource)?;
            (tasks.len() > 1).then(|| IntegrationConflict {
                resource: resource.to_string(),
                tasks: tasks.clone(),
                kind: IntegrationConflictKind::Overlap,
            })
        })
        .collect();
    conflicts.extend(ownership);
    conflicts
}
