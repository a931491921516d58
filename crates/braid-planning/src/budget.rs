//! Budget calculation
//!
//! Maps task attributes to an advisory resource allotment. Pure and
//! synchronous; usage tracking lives in the orchestrator's ledger.

use braid_core::{
    BudgetSettings, Complexity, Priority, ResearchLevel, Task, TaskAttributes, TaskType,
};
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_ALLOCATION: u64 = 10_000;

/// Static allocation tiers, used for tasks that carry no attributes at all
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchTier {
    Planning,
    #[default]
    Implementation,
    Integration,
    Review,
}

impl BatchTier {
    pub fn allocation(self) -> u64 {
        match self {
            Self::Planning => 8_000,
            Self::Implementation => 15_000,
            Self::Integration => 12_000,
            Self::Review => 6_000,
        }
    }
}

impl std::fmt::Display for BatchTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Planning => write!(f, "planning"),
            Self::Implementation => write!(f, "implementation"),
            Self::Integration => write!(f, "integration"),
            Self::Review => write!(f, "review"),
        }
    }
}

impl std::str::FromStr for BatchTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "planning" => Ok(Self::Planning),
            "implementation" => Ok(Self::Implementation),
            "integration" => Ok(Self::Integration),
            "review" => Ok(Self::Review),
            _ => Err(format!("Invalid batch tier: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetCalculator {
    base_allocation: u64,
}

impl Default for BudgetCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_ALLOCATION)
    }
}

impl BudgetCalculator {
    pub fn new(base_allocation: u64) -> Self {
        Self { base_allocation }
    }

    pub fn from_settings(settings: &BudgetSettings) -> Self {
        Self::new(settings.base_allocation)
    }

    /// Allocation for a set of attributes, rounded to the nearest thousand
    pub fn calculate(&self, attrs: &TaskAttributes) -> u64 {
        let mut b = self.base_allocation as f64;

        b *= attrs.research_level.map_or(1.0, research_multiplier);
        b *= complexity_multiplier(attrs.complexity.unwrap_or_default());
        if let Some(count) = attrs.document_count.filter(|&c| c >= 1) {
            b *= 1.0 + f64::from(count - 1) * 0.3;
        }
        b *= priority_multiplier(attrs.priority.unwrap_or_default());
        b *= attrs.task_type.map_or(1.0, task_type_multiplier);

        ((b / 1000.0).round() * 1000.0) as u64
    }

    /// Allocation for a task; attribute-less tasks get the tier's flat value
    pub fn for_task(&self, task: &Task, tier: BatchTier) -> u64 {
        if task.attributes.is_unspecified() {
            tier.allocation()
        } else {
            self.calculate(&task.attributes)
        }
    }
}

/// Budget with the default base allocation
pub fn budget(attrs: &TaskAttributes) -> u64 {
    BudgetCalculator::default().calculate(attrs)
}

fn research_multiplier(level: ResearchLevel) -> f64 {
    match level {
        ResearchLevel::Minimal => 0.5,
        ResearchLevel::Medium => 1.0,
        ResearchLevel::Thorough => 2.0,
    }
}

fn complexity_multiplier(complexity: Complexity) -> f64 {
    match complexity {
        Complexity::Simple => 0.8,
        Complexity::Standard => 1.0,
        Complexity::Complex => 1.5,
    }
}

fn priority_multiplier(priority: Priority) -> f64 {
    match priority {
        Priority::Low => 0.7,
        Priority::Medium => 1.0,
        Priority::High => 1.3,
        Priority::Critical => 1.5,
    }
}

fn task_type_multiplier(task_type: TaskType) -> f64 {
    match task_type {
        TaskType::Research => 1.2,
        TaskType::Coding => 1.0,
        TaskType::Analysis => 1.1,
        TaskType::Documentation => 0.8,
        TaskType::Testing => 0.9,
    }
}
