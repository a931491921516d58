//! Core type definitions for Braid scheduling

use serde::{Deserialize, Serialize};

/// Task identifier (as assigned by the sprint planner)
pub type TaskId = String;

/// Logical resource key (a file or module path). Not a filesystem handle;
/// resources are only compared for equality.
pub type Resource = String;

/// Task complexity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    #[default]
    Standard,
    Complex,
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simple => write!(f, "simple"),
            Self::Standard => write!(f, "standard"),
            Self::Complex => write!(f, "complex"),
        }
    }
}

impl std::str::FromStr for Complexity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "simple" => Ok(Self::Simple),
            "standard" => Ok(Self::Standard),
            "complex" => Ok(Self::Complex),
            _ => Err(format!("Invalid complexity: {}", s)),
        }
    }
}

/// Task priority levels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

/// Kind of work a task performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Research,
    Coding,
    Analysis,
    Documentation,
    Testing,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Research => write!(f, "research"),
            Self::Coding => write!(f, "coding"),
            Self::Analysis => write!(f, "analysis"),
            Self::Documentation => write!(f, "documentation"),
            Self::Testing => write!(f, "testing"),
        }
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "research" => Ok(Self::Research),
            "coding" => Ok(Self::Coding),
            "analysis" => Ok(Self::Analysis),
            "documentation" | "docs" => Ok(Self::Documentation),
            "testing" => Ok(Self::Testing),
            _ => Err(format!("Invalid task type: {}", s)),
        }
    }
}

/// How much upfront research a task needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchLevel {
    Minimal,
    Medium,
    Thorough,
}

impl std::fmt::Display for ResearchLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Minimal => write!(f, "minimal"),
            Self::Medium => write!(f, "medium"),
            Self::Thorough => write!(f, "thorough"),
        }
    }
}

impl std::str::FromStr for ResearchLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "minimal" => Ok(Self::Minimal),
            "medium" => Ok(Self::Medium),
            "thorough" => Ok(Self::Thorough),
            _ => Err(format!("Invalid research level: {}", s)),
        }
    }
}

/// Attributes used to size a task's budget. Every field is optional; the
/// budget calculator supplies defaults for missing ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<Complexity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<TaskType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_level: Option<ResearchLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_count: Option<u32>,
}

impl TaskAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_complexity(mut self, complexity: Complexity) -> Self {
        self.complexity = Some(complexity);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }

    pub fn with_research_level(mut self, level: ResearchLevel) -> Self {
        self.research_level = Some(level);
        self
    }

    pub fn with_document_count(mut self, count: u32) -> Self {
        self.document_count = Some(count);
        self
    }

    /// True when the planner supplied no attributes at all
    pub fn is_unspecified(&self) -> bool {
        *self == Self::default()
    }
}

/// A unit of work to schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    /// Free text: description plus acceptance criteria
    #[serde(default)]
    pub description: String,
    /// Explicit resource hints; when present these win over inference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<Resource>>,
    #[serde(default)]
    pub attributes: TaskAttributes,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            resources: None,
            attributes: TaskAttributes::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_resources<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resources = Some(resources.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_attributes(mut self, attributes: TaskAttributes) -> Self {
        self.attributes = attributes;
        self
    }
}

/// How dangerous concurrent modification of a shared resource is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A resource used by two or more tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub resource: Resource,
    /// Contributing tasks, in task input order
    pub tasks: Vec<TaskId>,
    pub severity: Severity,
}

impl Conflict {
    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

/// A task that produced no resources during extraction.
/// Non-fatal; the task is scheduled with an empty resource set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionAmbiguity {
    pub task_id: TaskId,
    pub reason: String,
}

/// A group of tasks holding exclusive ownership of a resource set for the
/// parallel phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub id: usize,
    /// Member tasks, in task input order
    pub tasks: Vec<TaskId>,
    /// Resources owned for the parallel phase (critical ones excluded)
    pub owned_resources: Vec<Resource>,
    /// Read-only by convention; not enforced
    pub read_only_resources: Vec<Resource>,
}

impl Cluster {
    pub fn contains_task(&self, task_id: &str) -> bool {
        self.tasks.iter().any(|t| t == task_id)
    }

    pub fn owns(&self, resource: &str) -> bool {
        self.owned_resources.iter().any(|r| r == resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_parsing() {
        assert_eq!("critical".parse::<Priority>().unwrap(), Priority::Critical);
        assert_eq!("LOW".parse::<Priority>().unwrap(), Priority::Low);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_task_deserializes_camel_case() {
        let json = r#"{
            "id": "T-1",
            "title": "Add login",
            "description": "Implement auth flow",
            "attributes": {"taskType": "coding", "researchLevel": "thorough", "documentCount": 3}
        }"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.id, "T-1");
        assert!(task.resources.is_none());
        assert_eq!(task.attributes.task_type, Some(TaskType::Coding));
        assert_eq!(task.attributes.research_level, Some(ResearchLevel::Thorough));
        assert_eq!(task.attributes.document_count, Some(3));
        assert_eq!(task.attributes.complexity, None);
    }

    #[test]
    fn test_unspecified_attributes() {
        assert!(TaskAttributes::new().is_unspecified());
        assert!(!TaskAttributes::new()
            .with_priority(Priority::High)
            .is_unspecified());
    }
}
