//! # braid-orchestrator
//!
//! Runtime half of Braid: launches workers for a planned task list in
//! bounded batches, tracks budgets and worker records, then reconciles the
//! results into a single status document.
//!
//! ## Flow
//!
//! 1. [`Orchestrator::launch_many`] runs batches of at most `max_concurrent`
//!    workers, one barrier per batch
//! 2. [`IntegrationReconciler`] applies shared resources one at a time and
//!    records unplanned overlaps
//! 3. [`StatusStore`] atomically writes the run's status document
//!
//! [`Coordinator`] wires the three together with the planner.

pub mod budget_ledger;
pub mod coordinator;
pub mod executor;
pub mod merge;
pub mod reconciler;
pub mod registry;
pub mod service;
pub mod status;

pub use budget_ledger::{Budget, BudgetLedger, BudgetWarning, BudgetWarningKind};
pub use coordinator::{new_run_id, Coordinator, RunReport};
pub use executor::{
    batch_sizes, new_worker_id, Fallback, Orchestrator, ResultStatus, WorkerLaunch, WorkerResult,
};
pub use merge::{ConcatMerge, Contribution, MergeStrategy};
pub use reconciler::IntegrationReconciler;
pub use registry::{WorkerRecord, WorkerRegistry, WorkerStatus};
pub use service::{
    Artifact, CommandWorker, MockWorkerService, WorkerOutput, WorkerRequest, WorkerService,
};
pub use status::{
    CompletedTask, FailedTask, IntegrationConflict, IntegrationConflictKind, RunStatus,
    SharedResourceUpdate, StatusRecord, StatusStore, UpdateOutcome,
};
