//! Worker execution service abstraction

use async_trait::async_trait;
use braid_core::{BraidError, Resource, Result, Task, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Content a worker produced for one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub resource: Resource,
    #[serde(default)]
    pub content: String,
}

impl Artifact {
    pub fn new(resource: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            content: content.into(),
        }
    }
}

/// What a worker hands back on success
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerOutput {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    /// Units consumed, compared against the task's budget
    #[serde(default)]
    pub resource_usage: u64,
}

impl WorkerOutput {
    pub fn summary_only(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Default::default()
        }
    }

    pub fn with_artifact(mut self, resource: impl Into<String>, content: impl Into<String>) -> Self {
        self.artifacts.push(Artifact::new(resource, content));
        self
    }

    pub fn with_usage(mut self, usage: u64) -> Self {
        self.resource_usage = usage;
        self
    }

    pub fn artifact_for(&self, resource: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.resource == resource)
    }
}

/// Everything a worker receives for one task
#[derive(Debug, Clone)]
pub struct WorkerRequest {
    pub worker_id: String,
    pub task: Task,
    pub cluster: usize,
    pub owned_resources: Vec<Resource>,
    pub read_only_resources: Vec<Resource>,
    pub budget: u64,
    /// Cancelled by the orchestrator when the worker times out
    pub cancel: CancellationToken,
}

/// Trait for running one task (allows mocking in tests)
#[async_trait]
pub trait WorkerService: Send + Sync {
    async fn execute(&self, request: &WorkerRequest) -> Result<WorkerOutput>;
}

/// Runs a shell command per task.
///
/// The task is written to stdin as JSON and described through `BRAID_*`
/// environment variables. Stdout is parsed as a [`WorkerOutput`]; anything
/// that is not JSON becomes the summary.
#[derive(Clone)]
pub struct CommandWorker {
    command: String,
    working_dir: PathBuf,
}

impl CommandWorker {
    pub fn new(command: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            working_dir: working_dir.into(),
        }
    }
}

#[async_trait]
impl WorkerService for CommandWorker {
    #[instrument(skip(self, request), fields(worker_id = %request.worker_id, task_id = %request.task.id))]
    async fn execute(&self, request: &WorkerRequest) -> Result<WorkerOutput> {
        debug!("Executing worker command: {}", self.command);

        let task_json = serde_json::to_vec(&request.task)?;
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.working_dir)
            .env("BRAID_TASK_ID", &request.task.id)
            .env("BRAID_WORKER_ID", &request.worker_id)
            .env("BRAID_CLUSTER", request.cluster.to_string())
            .env("BRAID_BUDGET", request.budget.to_string())
            .env("BRAID_OWNED_RESOURCES", request.owned_resources.join("\n"))
            .env("BRAID_READ_ONLY_RESOURCES", request.read_only_resources.join("\n"))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BraidError::Worker(format!("Failed to spawn worker command: {}", e)))?;

        // Stdin is fed while stdout and stderr drain, so a command that
        // writes before it reads cannot stall on a full pipe
        let stdin = child.stdin.take();
        let feed_stdin = async move {
            if let Some(mut stdin) = stdin {
                // A command that never reads stdin closes the pipe early
                if let Err(e) = stdin.write_all(&task_json).await {
                    debug!("Worker stdin closed early: {}", e);
                }
            }
        };
        let run = async {
            let ((), output) = tokio::join!(feed_stdin, child.wait_with_output());
            output
        };

        let output = tokio::select! {
            output = run => output
                .map_err(|e| BraidError::Worker(format!("Failed to wait for worker command: {}", e)))?,
            _ = request.cancel.cancelled() => {
                return Err(BraidError::Worker("worker command cancelled".to_string()));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BraidError::Worker(format!(
                "worker command exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(parse_output(&stdout))
    }
}

fn parse_output(stdout: &str) -> WorkerOutput {
    let trimmed = stdout.trim();
    serde_json::from_str(trimmed).unwrap_or_else(|_| WorkerOutput::summary_only(trimmed))
}

#[derive(Debug, Clone)]
enum MockBehavior {
    Succeed(WorkerOutput),
    Fail(String),
}

/// Mock worker service for testing
#[derive(Clone, Default)]
pub struct MockWorkerService {
    behaviors: HashMap<TaskId, MockBehavior>,
    delays: HashMap<TaskId, Duration>,
    default_delay: Option<Duration>,
    calls: Arc<Mutex<Vec<TaskId>>>,
    spans: Arc<Mutex<HashMap<TaskId, (Instant, Option<Instant>)>>>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl MockWorkerService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, task_id: &str, output: WorkerOutput) -> Self {
        self.behaviors
            .insert(task_id.to_string(), MockBehavior::Succeed(output));
        self
    }

    pub fn with_failure(mut self, task_id: &str, message: &str) -> Self {
        self.behaviors
            .insert(task_id.to_string(), MockBehavior::Fail(message.to_string()));
        self
    }

    pub fn with_delay(mut self, task_id: &str, delay: Duration) -> Self {
        self.delays.insert(task_id.to_string(), delay);
        self
    }

    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = Some(delay);
        self
    }

    /// Task ids in the order workers were invoked
    pub fn calls(&self) -> Vec<TaskId> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// When the worker for `task_id` was invoked
    pub fn started_at(&self, task_id: &str) -> Option<Instant> {
        let spans = self.spans.lock().ok()?;
        spans.get(task_id).map(|(start, _)| *start)
    }

    /// When the worker for `task_id` returned; `None` while running or if
    /// it was dropped
    pub fn finished_at(&self, task_id: &str) -> Option<Instant> {
        let spans = self.spans.lock().ok()?;
        spans.get(task_id).and_then(|(_, end)| *end)
    }

    /// Highest number of workers observed running at once
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerService for MockWorkerService {
    async fn execute(&self, request: &WorkerRequest) -> Result<WorkerOutput> {
        let task_id = &request.task.id;
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(task_id.clone());
        }
        if let Ok(mut spans) = self.spans.lock() {
            spans.insert(task_id.clone(), (Instant::now(), None));
        }

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        let delay = self.delays.get(task_id).copied().or(self.default_delay);
        let cancelled = match delay {
            Some(delay) => tokio::select! {
                _ = tokio::time::sleep(delay) => false,
                _ = request.cancel.cancelled() => true,
            },
            None => false,
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if let Ok(mut spans) = self.spans.lock() {
            if let Some(span) = spans.get_mut(task_id) {
                span.1 = Some(Instant::now());
            }
        }

        if cancelled {
            return Err(BraidError::Worker(format!("mock worker for {} cancelled", task_id)));
        }

        match self.behaviors.get(task_id) {
            Some(MockBehavior::Succeed(output)) => Ok(output.clone()),
            Some(MockBehavior::Fail(message)) => Err(BraidError::Worker(message.clone())),
            None => Ok(WorkerOutput::summary_only(format!("completed {}", task_id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request(task: Task) -> WorkerRequest {
        WorkerRequest {
            worker_id: "W-test0001".to_string(),
            task,
            cluster: 0,
            owned_resources: vec!["src/a.rs".to_string(), "src/b.rs".to_string()],
            read_only_resources: vec![],
            budget: 10_000,
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn test_parse_output_json_and_text() {
        let json = r#"{"summary":"done","artifacts":[{"resource":"src/a.rs","content":"fn a() {}"}],"resourceUsage":1200}"#;
        let parsed = parse_output(json);
        assert_eq!(parsed.summary, "done");
        assert_eq!(parsed.resource_usage, 1200);
        assert_eq!(parsed.artifact_for("src/a.rs").unwrap().content, "fn a() {}");

        let text = parse_output("  all good\n");
        assert_eq!(text, WorkerOutput::summary_only("all good"));
    }

    #[tokio::test]
    async fn test_mock_service_scripted() {
        let service = MockWorkerService::new()
            .with_output("A", WorkerOutput::summary_only("a").with_usage(5))
            .with_failure("B", "boom");

        let ok = service.execute(&request(Task::new("A", "a"))).await.unwrap();
        assert_eq!(ok.resource_usage, 5);

        let err = service.execute(&request(Task::new("B", "b"))).await.unwrap_err();
        assert!(matches!(err, BraidError::Worker(ref m) if m == "boom"));

        let default = service.execute(&request(Task::new("C", "c"))).await.unwrap();
        assert_eq!(default.summary, "completed C");
        assert_eq!(service.calls(), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_mock_service_honours_cancellation() {
        let service = MockWorkerService::new().with_delay("A", Duration::from_secs(30));
        let req = request(Task::new("A", "a"));
        req.cancel.cancel();

        let err = service.execute(&req).await.unwrap_err();
        assert!(matches!(err, BraidError::Worker(_)));
    }

    #[tokio::test]
    async fn test_command_worker_env_and_stdin() {
        let temp = TempDir::new().unwrap();
        let worker = CommandWorker::new(
            r#"cat > task.json; printf '{"summary":"%s","resourceUsage":7}' "$BRAID_TASK_ID""#,
            temp.path(),
        );

        let output = worker
            .execute(&request(Task::new("T-9", "Write things")))
            .await
            .unwrap();
        assert_eq!(output.summary, "T-9");
        assert_eq!(output.resource_usage, 7);

        let written = std::fs::read_to_string(temp.path().join("task.json")).unwrap();
        let task: Task = serde_json::from_str(&written).unwrap();
        assert_eq!(task.title, "Write things");
    }

    #[tokio::test]
    async fn test_command_worker_large_stdin_with_chatty_command() {
        let temp = TempDir::new().unwrap();
        // Fills stdout well past a pipe buffer before reading any stdin
        let worker = CommandWorker::new(
            "head -c 200000 /dev/zero | tr '\\0' a; cat >/dev/null",
            temp.path(),
        );
        let task = Task::new("T-big", "Large").with_description("x".repeat(200_000));

        let output = tokio::time::timeout(Duration::from_secs(10), worker.execute(&request(task)))
            .await
            .expect("worker should not stall")
            .unwrap();
        assert_eq!(output.summary.len(), 200_000);
        assert!(output.summary.chars().all(|c| c == 'a'));
    }

    #[tokio::test]
    async fn test_command_worker_failure() {
        let temp = TempDir::new().unwrap();
        let worker = CommandWorker::new("echo nope >&2; exit 3", temp.path());

        let err = worker
            .execute(&request(Task::new("T-1", "x")))
            .await
            .unwrap_err();
        match err {
            BraidError::Worker(message) => assert!(message.contains("nope")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
