//! Budget usage tracking
//!
//! Allocations are fixed when a worker launches; usage only ever grows.
//! Warnings are advisory and never stop a worker. The ledger is written by
//! the control task alone.

use braid_core::TaskId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetWarningKind {
    /// Usage crossed the warning threshold
    Threshold,
    /// Usage reached or exceeded the allocation
    Overage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetWarning {
    pub task_id: TaskId,
    pub kind: BudgetWarningKind,
    pub allocated: u64,
    pub used: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub allocated: u64,
    pub used: u64,
    pub warnings: Vec<BudgetWarningKind>,
}

impl Budget {
    pub fn new(allocated: u64) -> Self {
        Self {
            allocated,
            used: 0,
            warnings: Vec::new(),
        }
    }

    pub fn remaining(&self) -> u64 {
        self.allocated.saturating_sub(self.used)
    }

    /// Add usage and return the warnings newly triggered by it
    fn consume(&mut self, amount: u64, threshold: f64) -> Vec<BudgetWarningKind> {
        self.used = self.used.saturating_add(amount);

        let mut fired = Vec::new();
        let threshold_mark = self.allocated as f64 * threshold;
        if self.used > 0 && self.used as f64 >= threshold_mark {
            fired.push(BudgetWarningKind::Threshold);
        }
        if self.used > 0 && self.used >= self.allocated {
            fired.push(BudgetWarningKind::Overage);
        }

        fired.retain(|kind| !self.warnings.contains(kind));
        self.warnings.extend(fired.iter().copied());
        fired
    }
}

/// Per-task budgets for one run
#[derive(Debug, Clone)]
pub struct BudgetLedger {
    threshold: f64,
    budgets: HashMap<TaskId, Budget>,
    warnings: Vec<BudgetWarning>,
}

impl Default for BudgetLedger {
    fn default() -> Self {
        Self::new(0.8)
    }
}

impl BudgetLedger {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            budgets: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    /// Fix a task's allocation. A second allocation for the same task is
    /// ignored.
    pub fn allocate(&mut self, task_id: &str, allocated: u64) {
        self.budgets
            .entry(task_id.to_string())
            .or_insert_with(|| Budget::new(allocated));
    }

    pub fn record_usage(&mut self, task_id: &str, amount: u64) -> Vec<BudgetWarning> {
        let threshold = self.threshold;
        let budget = self
            .budgets
            .entry(task_id.to_string())
            .or_insert_with(|| Budget::new(0));

        let fired: Vec<BudgetWarning> = budget
            .consume(amount, threshold)
            .into_iter()
            .map(|kind| BudgetWarning {
                task_id: task_id.to_string(),
                kind,
                allocated: budget.allocated,
                used: budget.used,
            })
            .collect();

        for warning in &fired {
            warn!(
                task_id = %warning.task_id,
                used = warning.used,
                allocated = warning.allocated,
                "Budget {:?} warning",
                warning.kind
            );
        }
        self.warnings.extend(fired.iter().cloned());
        fired
    }

    pub fn get(&self, task_id: &str) -> Option<&Budget> {
        self.budgets.get(task_id)
    }

    /// Every warning raised so far, in the order raised
    pub fn warnings(&self) -> &[BudgetWarning] {
        &self.warnings
    }
}
