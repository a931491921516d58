//! Fail-open utilities for graceful degradation
//!
//! Some writes exist for the benefit of external readers (per-worker registry
//! records, for instance). Losing one of those must never abort a scheduling
//! run, so they are wrapped in [`fail_open`].
//!
//! DO NOT use fail-open for:
//! - The coordination status document (its loss is fatal)
//! - Worker execution (failures are captured per task instead)

use std::future::Future;
use tracing::warn;

use crate::Result;

/// Execute an operation that should fail open
///
/// Logs the error via `tracing::warn!` on failure and returns `None`.
///
/// # Usage
///
/// ```no_run
/// use braid_core::fail_open::fail_open;
/// use braid_core::Result;
///
/// async fn persist_record() -> Result<()> {
///     Ok(())
/// }
///
/// async fn example() {
///     let result = fail_open("worker_registry", || persist_record()).await;
///     // result is None if persist_record() failed, otherwise Some(())
/// }
/// ```
pub async fn fail_open<F, Fut, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f().await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BraidError;

    #[tokio::test]
    async fn test_fail_open_success() {
        let result = fail_open("test_op", || async { Ok::<_, BraidError>(42) }).await;
        assert_eq!(result, Some(42));
    }

    #[tokio::test]
    async fn test_fail_open_failure() {
        let result = fail_open("test_op", || async {
            Err::<i32, _>(BraidError::Other("test error".to_string()))
        })
        .await;
        assert_eq!(result, None);
    }
}
