//! Planning pass: analysis, partitioning and budgets in one call

use crate::analyzer::DependencyAnalyzer;
use crate::budget::{BatchTier, BudgetCalculator};
use crate::partitioner::{OwnershipPartitioner, PartitionPlan};
use braid_core::{BraidConfig, Task, TaskId};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Allocation assigned to one task before launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskBudget {
    pub task_id: TaskId,
    pub cluster: usize,
    pub allocated: u64,
}

/// Everything the orchestrator needs before launching workers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePlan {
    pub partition: PartitionPlan,
    /// One entry per task, in task input order
    pub budgets: Vec<TaskBudget>,
}

impl SchedulePlan {
    pub fn allocation_for(&self, task_id: &str) -> Option<u64> {
        self.budgets
            .iter()
            .find(|b| b.task_id == task_id)
            .map(|b| b.allocated)
    }

    pub fn summarize(&self) -> ScheduleSummary {
        ScheduleSummary {
            total_tasks: self.budgets.len(),
            clusters: self.partition.clusters.len(),
            conflicts: self.partition.conflicts.len(),
            deferred: self.partition.deferred.len(),
            ambiguities: self.partition.ambiguities.len(),
            total_budget: self.budgets.iter().map(|b| b.allocated).sum(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSummary {
    pub total_tasks: usize,
    pub clusters: usize,
    pub conflicts: usize,
    pub deferred: usize,
    pub ambiguities: usize,
    pub total_budget: u64,
}

/// Analyze, partition and budget a task list
pub fn plan_tasks(tasks: &[Task], config: &BraidConfig) -> SchedulePlan {
    let analysis = DependencyAnalyzer::new(config).analyze(tasks);
    let partition = OwnershipPartitioner::new(config).partition(&analysis);
    let calculator = BudgetCalculator::from_settings(&config.budget);

    let budgets = tasks
        .iter()
        .map(|task| TaskBudget {
            task_id: task.id.clone(),
            cluster: partition.cluster_of(&task.id).map_or(0, |c| c.id),
            allocated: calculator.for_task(task, BatchTier::Implementation),
        })
        .collect();

    let plan = SchedulePlan { partition, budgets };
    let summary = plan.summarize();
    info!(
        tasks = summary.total_tasks,
        clusters = summary.clusters,
        conflicts = summary.conflicts,
        deferred = summary.deferred,
        "Planned schedule"
    );
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_core::{Complexity, TaskAttributes};

    #[test]
    fn test_plan_covers_every_task() {
        let tasks = vec![
            Task::new("A", "Touch parser").with_resources(["src/parser.rs"]),
            Task::new("B", "Touch lexer")
                .with_resources(["src/lexer.rs"])
                .with_attributes(TaskAttributes::new().with_complexity(Complexity::Complex)),
            Task::new("C", "Touch parser again").with_resources(["src/parser.rs"]),
        ];
        let plan = plan_tasks(&tasks, &BraidConfig::default());

        assert_eq!(plan.budgets.len(), 3);
        assert_eq!(plan.budgets[0].cluster, plan.budgets[2].cluster);
        assert_ne!(plan.budgets[0].cluster, plan.budgets[1].cluster);
        assert_eq!(plan.allocation_for("A"), Some(15_000));
        assert_eq!(plan.allocation_for("B"), Some(15_000));
        assert_eq!(plan.allocation_for("missing"), None);

        let summary = plan.summarize();
        assert_eq!(summary.clusters, 2);
        assert_eq!(summary.conflicts, 1);
        assert_eq!(summary.total_budget, 45_000);
    }

    #[test]
    fn test_plan_serializes_camel_case() {
        let tasks = vec![Task::new("A", "Edit src/lib.rs")];
        let plan = plan_tasks(&tasks, &BraidConfig::default());
        let json = serde_json::to_value(&plan).unwrap();

        assert_eq!(json["budgets"][0]["taskId"], "A");
        assert_eq!(
            json["partition"]["clusters"][0]["ownedResources"][0],
            "src/lib.rs"
        );
        assert_eq!(json["partition"]["mergedOverflow"], 0);
    }
}
