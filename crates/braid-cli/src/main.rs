//! Braid CLI - conflict-aware parallel task scheduling
//!
//! Usage:
//!   braid init [path]                       Write a default .braid/config.toml
//!   braid plan <tasks.json>                 Print the schedule plan as JSON
//!   braid run <tasks.json> --command <sh>   Execute tasks with a shell worker
//!   braid status <run_id>                   Print a stored status document

use anyhow::{Context, Result};
use braid_core::{BraidConfig, Task};
use braid_orchestrator::{CommandWorker, Coordinator, StatusStore};
use braid_planning::plan_tasks;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "braid")]
#[command(author, version, about = "Conflict-aware parallel task scheduling")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Repository root holding .braid/
    #[arg(long, global = true, default_value = ".")]
    repo: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file
    Init {
        /// Repository path (defaults to --repo)
        path: Option<PathBuf>,
    },

    /// Analyze, partition and budget a task file
    Plan {
        /// JSON array of tasks
        tasks: PathBuf,

        /// Maximum number of clusters
        #[arg(long)]
        max_clusters: Option<usize>,
    },

    /// Plan, execute and reconcile a task file
    Run {
        /// JSON array of tasks
        tasks: PathBuf,

        /// Shell command run once per task (task JSON on stdin)
        #[arg(short, long)]
        command: String,

        /// Maximum workers per batch
        #[arg(long)]
        max_concurrent: Option<usize>,

        /// Per-worker timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Run identifier (generated when omitted)
        #[arg(long)]
        run_id: Option<String>,
    },

    /// Show the status document of a run
    Status {
        run_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; stdout is reserved for command output
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Init { path } => cmd_init(path.unwrap_or(cli.repo)),
        Commands::Plan {
            tasks,
            max_clusters,
        } => cmd_plan(&cli.repo, &tasks, max_clusters).await,
        Commands::Run {
            tasks,
            command,
            max_concurrent,
            timeout,
            run_id,
        } => cmd_run(&cli.repo, &tasks, command, max_concurrent, timeout, run_id).await,
        Commands::Status { run_id } => cmd_status(&cli.repo, &run_id).await,
    }
}

fn cmd_init(path: PathBuf) -> Result<()> {
    info!("Initializing Braid in {:?}", path);
    let config_path = BraidConfig::write_default(&path)
        .with_context(|| format!("Failed to write config under {:?}", path))?;
    println!("Created {}", config_path.display());
    Ok(())
}

async fn cmd_plan(repo: &Path, tasks_file: &Path, max_clusters: Option<usize>) -> Result<()> {
    let mut config = load_config(repo)?;
    if let Some(max) = max_clusters {
        config.scheduler.max_clusters = max;
    }
    let tasks = load_tasks(tasks_file).await?;

    let plan = plan_tasks(&tasks, &config);
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

async fn cmd_run(
    repo: &Path,
    tasks_file: &Path,
    command: String,
    max_concurrent: Option<usize>,
    timeout: Option<u64>,
    run_id: Option<String>,
) -> Result<()> {
    let mut config = load_config(repo)?;
    if let Some(max) = max_concurrent {
        config.scheduler.max_concurrent = max;
    }
    if timeout.is_some() {
        config.scheduler.worker_timeout_secs = timeout;
    }
    let tasks = load_tasks(tasks_file).await?;

    let state_dir = config.state_dir_in(repo);
    let worker = CommandWorker::new(command, repo);
    let coordinator = Coordinator::new(config, state_dir, Arc::new(worker));

    let report = coordinator
        .run(&tasks, run_id)
        .await
        .context("Scheduling run failed")?;

    let status = &report.status;
    println!("Run {}: {}", report.run_id, status.status);
    println!(
        "  {} completed, {} failed, {} shared resources applied, {} integration conflicts",
        status.completed_tasks.len(),
        status.failed_tasks.len(),
        status.shared_resource_updates.len(),
        status.integration_conflicts.len()
    );
    for failed in &status.failed_tasks {
        println!("  failed {}: {}", failed.task_id, failed.error);
    }
    println!("Status: {}", report.status_path.display());
    Ok(())
}

async fn cmd_status(repo: &Path, run_id: &str) -> Result<()> {
    let config = load_config(repo)?;
    let store = StatusStore::new(config.state_dir_in(repo));
    let record = store
        .read(run_id)
        .await
        .with_context(|| format!("Failed to load status for run {}", run_id))?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn load_config(repo: &Path) -> Result<BraidConfig> {
    BraidConfig::load_or_default(repo).context("Failed to load .braid/config.toml")
}

async fn load_tasks(path: &Path) -> Result<Vec<Task>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read task file {:?}", path))?;
    serde_json::from_str(&content).context("Failed to parse task JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "braid",
            "run",
            "tasks.json",
            "--command",
            "./worker.sh",
            "--max-concurrent",
            "2",
            "--timeout",
            "30",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                command,
                max_concurrent,
                timeout,
                run_id,
                ..
            } => {
                assert_eq!(command, "./worker.sh");
                assert_eq!(max_concurrent, Some(2));
                assert_eq!(timeout, Some(30));
                assert!(run_id.is_none());
            }
            _ => panic!("expected run"),
        }
    }

    #[tokio::test]
    async fn test_load_tasks() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tasks.json");
        std::fs::write(
            &path,
            r#"[{"id": "A", "title": "Edit src/lib.rs"}, {"id": "B", "title": "Docs", "resources": ["README.md"]}]"#,
        )
        .unwrap();

        let tasks = load_tasks(&path).await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].resources.as_deref(), Some(&["README.md".to_string()][..]));
    }
}
