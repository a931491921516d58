//! # braid-core
//!
//! Core types for the Braid conflict-aware task scheduler.
//!
//! Braid runs many independent tasks concurrently while keeping tasks that
//! touch the same resources from racing each other:
//!
//! - Tasks name (or imply) the resources they touch
//! - Tasks sharing resources are grouped into one cluster
//! - Clusters own disjoint resource sets during the parallel phase
//! - Critical resources are only ever updated sequentially, after it

mod config;
mod error;
pub mod fail_open;
mod types;

pub use config::{BraidConfig, BudgetSettings, SchedulerSettings};
pub use error::{BraidError, Result};
pub use types::*;
