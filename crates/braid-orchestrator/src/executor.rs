//! Execution orchestrator
//!
//! Launches workers in sequential batches of bounded size. Each batch is a
//! barrier: all of its workers are driven concurrently on the control task
//! and the next batch starts only once every one of them has reported.
//! Registry entries are updated on the control task as each worker reports;
//! ledger usage is recorded after the barrier in input order. Neither needs
//! locking.

use crate::budget_ledger::BudgetLedger;
use crate::registry::{WorkerRecord, WorkerRegistry};
use crate::service::{WorkerOutput, WorkerRequest, WorkerService};
use braid_core::{BraidError, Resource, Result, SchedulerSettings, Task, TaskId};
use braid_planning::SchedulePlan;
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What to do with a task whose worker failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
    RetrySequential,
    ManualReview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Error,
}

/// Outcome of one worker, written exactly once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerResult {
    pub task_id: TaskId,
    pub worker_id: String,
    pub cluster: usize,
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<WorkerOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Fallback>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl WorkerResult {
    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }
}

/// A task ready to launch
#[derive(Debug, Clone)]
pub struct WorkerLaunch {
    pub task: Task,
    /// Assigned by the orchestrator when absent
    pub worker_id: Option<String>,
    pub cluster: usize,
    pub owned_resources: Vec<Resource>,
    pub read_only_resources: Vec<Resource>,
    pub budget: u64,
}

impl WorkerLaunch {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            worker_id: None,
            cluster: 0,
            owned_resources: Vec::new(),
            read_only_resources: Vec::new(),
            budget: 0,
        }
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    pub fn with_budget(mut self, budget: u64) -> Self {
        self.budget = budget;
        self
    }

    /// Build launches for every task, carrying cluster ownership and budget
    /// from the plan
    pub fn from_plan(tasks: &[Task], plan: &SchedulePlan) -> Vec<Self> {
        tasks
            .iter()
            .map(|task| {
                let mut launch = Self::new(task.clone());
                if let Some(cluster) = plan.partition.cluster_of(&task.id) {
                    launch.cluster = cluster.id;
                    launch.owned_resources = cluster.owned_resources.clone();
                    launch.read_only_resources = cluster.read_only_resources.clone();
                }
                launch.budget = plan.allocation_for(&task.id).unwrap_or_default();
                launch
            })
            .collect()
    }
}

/// Sizes of the sequential batches for `total` launches
pub fn batch_sizes(total: usize, max_concurrent: usize) -> Vec<usize> {
    let size = max_concurrent.max(1);
    (0..total)
        .step_by(size)
        .map(|start| size.min(total - start))
        .collect()
}

pub fn new_worker_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("W-{}", &id[..8])
}

struct Outcome {
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    result: Result<WorkerOutput>,
}

pub struct Orchestrator {
    service: Arc<dyn WorkerService>,
    max_concurrent: usize,
    timeout: Option<Duration>,
    registry: WorkerRegistry,
    ledger: BudgetLedger,
}

impl Orchestrator {
    pub fn new(service: Arc<dyn WorkerService>, settings: &SchedulerSettings) -> Self {
        Self {
            service,
            max_concurrent: settings.max_concurrent.max(1),
            timeout: settings.worker_timeout(),
            registry: WorkerRegistry::new(),
            ledger: BudgetLedger::default(),
        }
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_ledger(mut self, ledger: BudgetLedger) -> Self {
        self.ledger = ledger;
        self
    }

    /// Mirror worker records under `dir`
    pub fn with_registry_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.registry = WorkerRegistry::new().with_persistence(dir);
        self
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &BudgetLedger {
        &self.ledger
    }

    /// Run every launch and return one result per launch, in input order.
    ///
    /// A failing worker never aborts its siblings; its failure is captured
    /// in its result.
    pub async fn launch_many(&mut self, launches: Vec<WorkerLaunch>) -> Vec<WorkerResult> {
        let sizes = batch_sizes(launches.len(), self.max_concurrent);
        let total_batches = sizes.len();
        let mut results = Vec::with_capacity(launches.len());
        let mut pending = launches.into_iter();

        for (index, size) in sizes.into_iter().enumerate() {
            let batch: Vec<WorkerLaunch> = pending.by_ref().take(size).collect();
            info!(
                batch = index + 1,
                total = total_batches,
                size,
                "Launching batch"
            );

            let requests: Vec<WorkerRequest> = batch.into_iter().map(prepare_request).collect();
            for request in &requests {
                self.ledger.allocate(&request.task.id, request.budget);
                self.registry
                    .register(WorkerRecord::running(request, Utc::now()))
                    .await;
            }

            let service = Arc::clone(&self.service);
            let worker_service = service.as_ref();
            let timeout = self.timeout;
            let mut in_flight: FuturesUnordered<_> = requests
                .iter()
                .enumerate()
                .map(|(slot, request)| async move {
                    (slot, run_worker(worker_service, timeout, request).await)
                })
                .collect();

            let mut outcomes: Vec<Option<Outcome>> = requests.iter().map(|_| None).collect();
            while let Some((slot, outcome)) = in_flight.next().await {
                self.record_completion(&requests[slot], &outcome).await;
                outcomes[slot] = Some(outcome);
            }

            for (request, outcome) in requests.iter().zip(outcomes) {
                let Some(outcome) = outcome else { continue };
                results.push(self.settle(request, outcome));
            }
            debug!(batch = index + 1, "Batch complete");
        }

        results
    }

    /// Move a worker's registry entry out of `running` as soon as it reports
    async fn record_completion(&mut self, request: &WorkerRequest, outcome: &Outcome) {
        match &outcome.result {
            Ok(output) => {
                self.registry
                    .complete(
                        &request.worker_id,
                        output.artifacts.clone(),
                        output.resource_usage,
                        outcome.ended_at,
                    )
                    .await;
            }
            Err(error) => {
                self.registry
                    .fail(&request.worker_id, error.to_string(), outcome.ended_at)
                    .await;
            }
        }
    }

    fn settle(&mut self, request: &WorkerRequest, outcome: Outcome) -> WorkerResult {
        let Outcome {
            started_at,
            ended_at,
            result,
        } = outcome;

        match result {
            Ok(output) => {
                self.ledger
                    .record_usage(&request.task.id, output.resource_usage);
                WorkerResult {
                    task_id: request.task.id.clone(),
                    worker_id: request.worker_id.clone(),
                    cluster: request.cluster,
                    status: ResultStatus::Success,
                    output: Some(output),
                    error: None,
                    fallback: None,
                    started_at,
                    ended_at,
                }
            }
            Err(error) => {
                let fallback = match error {
                    BraidError::Timeout(_) => Fallback::RetrySequential,
                    _ => Fallback::ManualReview,
                };
                warn!(
                    worker_id = %request.worker_id,
                    task_id = %request.task.id,
                    "Worker failed: {}",
                    error
                );
                WorkerResult {
                    task_id: request.task.id.clone(),
                    worker_id: request.worker_id.clone(),
                    cluster: request.cluster,
                    status: ResultStatus::Error,
                    output: None,
                    error: Some(error.to_string()),
                    fallback: Some(fallback),
                    started_at,
                    ended_at,
                }
            }
        }
    }
}

fn prepare_request(launch: WorkerLaunch) -> WorkerRequest {
    WorkerRequest {
        worker_id: launch.worker_id.unwrap_or_else(new_worker_id),
        task: launch.task,
        cluster: launch.cluster,
        owned_resources: launch.owned_resources,
        read_only_resources: launch.read_only_resources,
        budget: launch.budget,
        cancel: CancellationToken::new(),
    }
}

async fn run_worker(
    service: &dyn WorkerService,
    timeout: Option<Duration>,
    request: &WorkerRequest,
) -> Outcome {
    let started_at = Utc::now();
    let call = service.execute(request);
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => {
                request.cancel.cancel();
                Err(BraidError::Timeout(limit))
            }
        },
        None => call.await,
    };
    Outcome {
        started_at,
        ended_at: Utc::now(),
        result,
    }
}
