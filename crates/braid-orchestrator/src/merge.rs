//! Merge contract for shared resources

use braid_core::{BraidError, Result};

/// One successful worker's content for a shared resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contribution<'a> {
    pub task_id: &'a str,
    pub content: &'a str,
}

/// Folds several workers' content for one resource into a single value.
///
/// Implementations must be deterministic for the same contributor set and
/// must not drop any contributor's output.
pub trait MergeStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// `contributions` arrive in task input order and are never empty
    fn merge(&self, resource: &str, contributions: &[Contribution<'_>]) -> Result<String>;
}

/// Joins contributions in task order, each under a header naming its task
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcatMerge;

impl MergeStrategy for ConcatMerge {
    fn name(&self) -> &str {
        "concat"
    }

    fn merge(&self, resource: &str, contributions: &[Contribution<'_>]) -> Result<String> {
        if contributions.is_empty() {
            return Err(BraidError::Merge {
                resource: resource.to_string(),
                reason: "no contributions".to_string(),
            });
        }

        let sections: Vec<String> = contributions
            .iter()
            .map(|c| format!("=== {} ===\n{}", c.task_id, c.content.trim_end()))
            .collect();
        Ok(sections.join("\n\n"))
    }
}
