//! Braid Planning - static scheduling analysis
//!
//! Turns a task list into an execution plan before anything runs:
//! resource extraction and conflict detection, conflict-free ownership
//! clusters, and per-task budgets. Everything here is pure and synchronous.

pub mod analyzer;
pub mod budget;
pub mod partitioner;
pub mod schedule;

pub use analyzer::{extract_resources, DependencyAnalysis, DependencyAnalyzer, UsageGraph};
pub use budget::{budget, BatchTier, BudgetCalculator};
pub use partitioner::{OwnershipPartitioner, PartitionPlan, PartitionViolation};
pub use schedule::{plan_tasks, SchedulePlan, ScheduleSummary, TaskBudget};
