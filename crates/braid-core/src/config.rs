//! Configuration management for Braid
//!
//! Repository-level scheduling settings: protected (critical) resources,
//! advisory read-only paths, cluster and concurrency limits, and budget
//! parameters.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{BraidError, Result};

/// Repository-level Braid configuration
///
/// Loaded from `.braid/config.toml` in the repo root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BraidConfig {
    /// Directory (relative to the repo root) for registry and status files
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Resources whose shared use is always critical severity
    #[serde(default = "default_protected_resources")]
    pub protected_resources: Vec<String>,

    /// Low-risk paths every cluster may read by convention
    #[serde(default = "default_advisory_read_only")]
    pub advisory_read_only: Vec<String>,

    /// Partitioning and execution limits
    #[serde(default)]
    pub scheduler: SchedulerSettings,

    /// Budget parameters
    #[serde(default)]
    pub budget: BudgetSettings,
}

/// Partitioning and execution limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Maximum clusters produced by the partitioner
    #[serde(default = "default_max_clusters")]
    pub max_clusters: usize,

    /// Maximum workers in flight per batch
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Per-worker timeout; unset means wait indefinitely
    #[serde(default)]
    pub worker_timeout_secs: Option<u64>,
}

/// Budget parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetSettings {
    /// Allocation before any multiplier is applied
    #[serde(default = "default_base_allocation")]
    pub base_allocation: u64,

    /// Fraction of the allocation that triggers the early warning
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,
}

// Default value providers
fn default_state_dir() -> PathBuf {
    PathBuf::from(".braid")
}

fn default_protected_resources() -> Vec<String> {
    vec![
        "Cargo.toml".to_string(),
        "Cargo.lock".to_string(),
        "package.json".to_string(),
        "package-lock.json".to_string(),
        "schema.sql".to_string(),
        "migrations/".to_string(),
    ]
}

fn default_advisory_read_only() -> Vec<String> {
    vec![
        "README.md".to_string(),
        "LICENSE".to_string(),
        ".gitignore".to_string(),
        "docs/".to_string(),
    ]
}

fn default_max_clusters() -> usize {
    3
}

fn default_max_concurrent() -> usize {
    5
}

fn default_base_allocation() -> u64 {
    10_000
}

fn default_warning_threshold() -> f64 {
    0.8
}

impl BraidConfig {
    /// Load configuration from `.braid/config.toml` or use defaults
    pub fn load_or_default(repo_root: &Path) -> Result<Self> {
        let config_path = Self::config_path(repo_root);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)
                .map_err(|e| BraidError::Config(format!("Failed to parse config file: {}", e)))
        } else {
            Ok(Self::default())
        }
    }

    /// Write default configuration to `.braid/config.toml`
    pub fn write_default(repo_root: &Path) -> Result<PathBuf> {
        let config_path = Self::config_path(repo_root);
        if let Some(dir) = config_path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| BraidError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&config_path, content)?;
        Ok(config_path)
    }

    pub fn config_path(repo_root: &Path) -> PathBuf {
        repo_root.join(".braid").join("config.toml")
    }

    /// Absolute state directory for a repository
    pub fn state_dir_in(&self, repo_root: &Path) -> PathBuf {
        if self.state_dir.is_absolute() {
            self.state_dir.clone()
        } else {
            repo_root.join(&self.state_dir)
        }
    }

    /// Check whether a resource matches the protected list.
    ///
    /// Entries ending in `/` match every resource under that directory;
    /// other entries match the exact key or the final path component.
    pub fn is_protected(&self, resource: &str) -> bool {
        self.protected_resources
            .iter()
            .any(|pattern| path_matches(pattern, resource))
    }

    /// Check whether a resource is advisory read-only
    pub fn is_advisory_read_only(&self, resource: &str) -> bool {
        self.advisory_read_only
            .iter()
            .any(|pattern| path_matches(pattern, resource))
    }
}

impl SchedulerSettings {
    pub fn worker_timeout(&self) -> Option<Duration> {
        self.worker_timeout_secs.map(Duration::from_secs)
    }
}

fn path_matches(pattern: &str, resource: &str) -> bool {
    if let Some(dir) = pattern.strip_suffix('/') {
        resource.starts_with(pattern)
            || resource == dir
            || resource.contains(&format!("/{}/", dir))
    } else {
        resource == pattern || resource.ends_with(&format!("/{}", pattern))
    }
}

impl Default for BraidConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            protected_resources: default_protected_resources(),
            advisory_read_only: default_advisory_read_only(),
            scheduler: SchedulerSettings::default(),
            budget: BudgetSettings::default(),
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_clusters: default_max_clusters(),
            max_concurrent: default_max_concurrent(),
            worker_timeout_secs: None,
        }
    }
}

impl Default for BudgetSettings {
    fn default() -> Self {
        Self {
            base_allocation: default_base_allocation(),
            warning_threshold: default_warning_threshold(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = BraidConfig::default();
        assert_eq!(config.scheduler.max_clusters, 3);
        assert_eq!(config.scheduler.max_concurrent, 5);
        assert_eq!(config.budget.base_allocation, 10_000);
        assert!(config.scheduler.worker_timeout().is_none());
    }

    #[test]
    fn test_protected_matching() {
        let config = BraidConfig::default();
        assert!(config.is_protected("Cargo.toml"));
        assert!(config.is_protected("crates/api/Cargo.toml"));
        assert!(config.is_protected("migrations/0001_init.sql"));
        assert!(config.is_protected("db/migrations/0002.sql"));
        assert!(!config.is_protected("src/cargo_toml.rs"));
        assert!(!config.is_protected("src/main.rs"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: BraidConfig = toml::from_str("[scheduler]\nmax_concurrent = 2\n").unwrap();
        assert_eq!(config.scheduler.max_concurrent, 2);
        assert_eq!(config.scheduler.max_clusters, 3);
        assert_eq!(config.protected_resources, default_protected_resources());
    }

    #[test]
    fn test_write_then_load() {
        let temp = TempDir::new().unwrap();
        let path = BraidConfig::write_default(temp.path()).unwrap();
        assert!(path.exists());

        let loaded = BraidConfig::load_or_default(temp.path()).unwrap();
        assert_eq!(loaded, BraidConfig::default());
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join(".braid")).unwrap();
        std::fs::write(BraidConfig::config_path(temp.path()), "scheduler = 7").unwrap();

        let err = BraidConfig::load_or_default(temp.path()).unwrap_err();
        assert!(matches!(err, BraidError::Config(_)));
    }
}
