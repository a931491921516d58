//! Dependency analysis: which resources each task touches, and which of
//! those resources are shared

use braid_core::{BraidConfig, Conflict, ExtractionAmbiguity, Resource, Severity, Task, TaskId};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Ordered keyword table used when a task carries no explicit hints.
/// Short keywords must match a whole word; longer ones match a word prefix.
const KEYWORD_RESOURCES: &[(&[&str], &[&str])] = &[
    (
        &["auth", "login", "session"],
        &["src/auth/mod.rs", "src/auth/session.rs"],
    ),
    (
        &["database", "schema", "migration"],
        &["src/db/mod.rs", "schema.sql"],
    ),
    (&["api", "endpoint", "route"], &["src/api/routes.rs"]),
    (&["config", "setting"], &["src/config.rs"]),
    (&["test"], &["tests/"]),
    (&["docs", "readme", "documentation"], &["README.md"]),
    (&["dependency", "dependencies", "package"], &["Cargo.toml"]),
    (&["ui", "component"], &["src/ui/mod.rs"]),
    (&["cli", "command"], &["src/cli.rs"]),
    (&["error"], &["src/error.rs"]),
    (&["logging", "logger"], &["src/logging.rs"]),
];

/// File extensions accepted for path tokens without a directory part
const KNOWN_EXTENSIONS: &[&str] = &[
    "rs", "toml", "json", "md", "ts", "tsx", "js", "py", "go", "sql", "yaml", "yml", "lock",
    "html", "css",
];

const WHOLE_WORD_MAX_LEN: usize = 3;

fn path_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\w./-]+").expect("path token pattern is valid"))
}

/// Bidirectional resource/task mapping, built once per run
#[derive(Debug, Clone, Default)]
pub struct UsageGraph {
    /// Resource sets in task input order
    task_resources: Vec<(TaskId, BTreeSet<Resource>)>,
    /// Tasks per resource, in task input order
    resource_tasks: BTreeMap<Resource, Vec<TaskId>>,
    /// Resources in first-discovery order
    discovery_order: Vec<Resource>,
}

impl UsageGraph {
    fn insert(&mut self, task_id: &str, resources: BTreeSet<Resource>) {
        for resource in &resources {
            let users = self.resource_tasks.entry(resource.clone()).or_insert_with(|| {
                self.discovery_order.push(resource.clone());
                Vec::new()
            });
            if !users.iter().any(|t| t == task_id) {
                users.push(task_id.to_string());
            }
        }
        self.task_resources.push((task_id.to_string(), resources));
    }

    /// Task ids with their resource sets, in task input order
    pub fn entries(&self) -> &[(TaskId, BTreeSet<Resource>)] {
        &self.task_resources
    }

    pub fn resources_of(&self, task_id: &str) -> Option<&BTreeSet<Resource>> {
        self.task_resources
            .iter()
            .find(|(id, _)| id == task_id)
            .map(|(_, resources)| resources)
    }

    pub fn tasks_using(&self, resource: &str) -> &[TaskId] {
        self.resource_tasks
            .get(resource)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All resources in first-discovery order
    pub fn resources(&self) -> &[Resource] {
        &self.discovery_order
    }

    pub fn task_count(&self) -> usize {
        self.task_resources.len()
    }
}

/// Output of a dependency analysis pass
#[derive(Debug, Clone, Default)]
pub struct DependencyAnalysis {
    pub graph: UsageGraph,
    /// Shared resources in first-discovery order
    pub conflicts: Vec<Conflict>,
    pub ambiguities: Vec<ExtractionAmbiguity>,
}

/// Infers task resources and detects shared use.
///
/// Never fails: tasks that yield nothing are flagged and scheduled with an
/// empty resource set.
pub struct DependencyAnalyzer {
    config: BraidConfig,
}

impl DependencyAnalyzer {
    pub fn new(config: &BraidConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Analyze tasks in input order
    pub fn analyze(&self, tasks: &[Task]) -> DependencyAnalysis {
        let mut graph = UsageGraph::default();
        let mut ambiguities = Vec::new();

        for task in tasks {
            let resources = extract_resources(task);
            if resources.is_empty() {
                warn!(task_id = %task.id, "No resources inferred for task");
                ambiguities.push(ExtractionAmbiguity {
                    task_id: task.id.clone(),
                    reason: "no explicit hints and no resource could be inferred from text"
                        .to_string(),
                });
            } else {
                debug!(task_id = %task.id, count = resources.len(), "Extracted resources");
            }
            graph.insert(&task.id, resources);
        }

        let conflicts: Vec<Conflict> = graph
            .resources()
            .iter()
            .filter_map(|resource| {
                let users = graph.tasks_using(resource);
                (users.len() >= 2).then(|| Conflict {
                    resource: resource.clone(),
                    tasks: users.to_vec(),
                    severity: self.severity_for(resource, users.len()),
                })
            })
            .collect();

        if !conflicts.is_empty() {
            info!(
                "Detected {} shared resources ({} critical)",
                conflicts.len(),
                conflicts.iter().filter(|c| c.is_critical()).count()
            );
        }

        DependencyAnalysis {
            graph,
            conflicts,
            ambiguities,
        }
    }

    fn severity_for(&self, resource: &str, user_count: usize) -> Severity {
        if self.config.is_protected(resource) {
            Severity::Critical
        } else if user_count > 2 {
            Severity::High
        } else {
            Severity::Medium
        }
    }
}

/// Extract the resource set for one task.
///
/// Explicit hints win outright; otherwise path tokens in the text plus the
/// keyword table are used.
pub fn extract_resources(task: &Task) -> BTreeSet<Resource> {
    if let Some(hints) = &task.resources {
        let explicit: BTreeSet<Resource> = hints
            .iter()
            .map(|h| h.trim())
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .collect();
        if !explicit.is_empty() {
            return explicit;
        }
    }

    let text = format!("{}\n{}", task.title, task.description);
    let mut resources = path_tokens(&text);
    resources.extend(keyword_resources(&text));
    resources
}

fn path_tokens(text: &str) -> BTreeSet<Resource> {
    path_token_regex()
        .find_iter(text)
        .filter_map(|m| normalize_path_token(m.as_str()))
        .collect()
}

fn normalize_path_token(raw: &str) -> Option<Resource> {
    let token = raw.trim_end_matches('.');
    let token = token.strip_prefix("./").unwrap_or(token);
    if token.is_empty() || token.starts_with('/') {
        return None;
    }

    if token.contains('/') {
        let last = token.rsplit('/').next().unwrap_or_default();
        if token.ends_with('/') || has_extension(last, false) {
            return Some(token.to_string());
        }
        return None;
    }

    has_extension(token, true).then(|| token.to_string())
}

fn has_extension(segment: &str, known_only: bool) -> bool {
    match segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            !known_only || KNOWN_EXTENSIONS.contains(&ext.to_lowercase().as_str())
        }
        _ => false,
    }
}

fn keyword_resources(text: &str) -> BTreeSet<Resource> {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();

    let mut resources = BTreeSet::new();
    for (keywords, mapped) in KEYWORD_RESOURCES {
        let hit = keywords.iter().any(|keyword| {
            words.iter().any(|word| {
                if keyword.len() <= WHOLE_WORD_MAX_LEN {
                    word == keyword
                } else {
                    word.starts_with(keyword)
                }
            })
        });
        if hit {
            resources.extend(mapped.iter().map(|r| r.to_string()));
        }
    }
    resources
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> DependencyAnalyzer {
        DependencyAnalyzer::new(&BraidConfig::default())
    }

    #[test]
    fn test_explicit_hints_win() {
        let task = Task::new("T-1", "Rework auth")
            .with_description("touches src/api/routes.rs too")
            .with_resources(["src/lib.rs", "  ", "src/main.rs"]);
        let resources = extract_resources(&task);
        assert_eq!(
            resources.into_iter().collect::<Vec<_>>(),
            vec!["src/lib.rs".to_string(), "src/main.rs".to_string()]
        );
    }

    #[test]
    fn test_blank_hints_fall_back_to_inference() {
        let task = Task::new("T-1", "Fix login redirect").with_resources(["", " "]);
        let resources = extract_resources(&task);
        assert!(resources.contains("src/auth/mod.rs"));
    }

    #[test]
    fn test_keyword_inference() {
        let task = Task::new("T-1", "Add authentication middleware");
        let resources = extract_resources(&task);
        assert!(resources.contains("src/auth/mod.rs"));
        assert!(resources.contains("src/auth/session.rs"));
    }

    #[test]
    fn test_short_keywords_need_whole_word() {
        let task = Task::new("T-1", "Support uint parsing in the capital module");
        let resources = extract_resources(&task);
        assert!(!resources.contains("src/ui/mod.rs"));
        assert!(!resources.contains("src/api/routes.rs"));
    }

    #[test]
    fn test_path_tokens() {
        let task = Task::new("T-1", "Refactor").with_description(
            "Split src/parser/lexer.rs. Update build.rs and migrations/, but and/or e.g. nothing else",
        );
        let resources = extract_resources(&task);
        assert!(resources.contains("src/parser/lexer.rs"));
        assert!(resources.contains("build.rs"));
        assert!(resources.contains("migrations/"));
        assert!(!resources.contains("and/or"));
        assert!(!resources.contains("e.g"));
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let task = Task::new("T-1", "Database migration for sessions")
            .with_description("also update src/db/pool.rs and the CLI command");
        let first = extract_resources(&task);
        for _ in 0..10 {
            assert_eq!(extract_resources(&task), first);
        }
    }

    #[test]
    fn test_empty_extraction_is_flagged_not_fatal() {
        let tasks = vec![
            Task::new("T-1", "Think about things"),
            Task::new("T-2", "Edit src/lib.rs"),
        ];
        let analysis = analyzer().analyze(&tasks);

        assert_eq!(analysis.ambiguities.len(), 1);
        assert_eq!(analysis.ambiguities[0].task_id, "T-1");
        assert_eq!(analysis.graph.task_count(), 2);
        assert!(analysis.graph.resources_of("T-1").unwrap().is_empty());
    }

    #[test]
    fn test_conflict_severities() {
        let tasks = vec![
            Task::new("A", "a").with_resources(["src/lib.rs", "Cargo.toml", "src/x.rs"]),
            Task::new("B", "b").with_resources(["src/lib.rs", "Cargo.toml", "src/x.rs"]),
            Task::new("C", "c").with_resources(["src/x.rs"]),
        ];
        let analysis = analyzer().analyze(&tasks);

        let severity = |resource: &str| {
            analysis
                .conflicts
                .iter()
                .find(|c| c.resource == resource)
                .map(|c| c.severity)
        };
        assert_eq!(severity("Cargo.toml"), Some(Severity::Critical));
        assert_eq!(severity("src/lib.rs"), Some(Severity::Medium));
        assert_eq!(severity("src/x.rs"), Some(Severity::High));
    }

    #[test]
    fn test_conflicts_in_first_discovery_order() {
        let tasks = vec![
            Task::new("A", "a").with_resources(["z.rs", "m.rs"]),
            Task::new("B", "b").with_resources(["a.rs", "m.rs"]),
            Task::new("C", "c").with_resources(["a.rs", "z.rs"]),
        ];
        let analysis = analyzer().analyze(&tasks);

        let order: Vec<&str> = analysis
            .conflicts
            .iter()
            .map(|c| c.resource.as_str())
            .collect();
        // A discovers m.rs then z.rs (sorted), B discovers a.rs
        assert_eq!(order, vec!["m.rs", "z.rs", "a.rs"]);
        assert_eq!(analysis.graph.tasks_using("z.rs"), ["A", "C"]);
    }
}
