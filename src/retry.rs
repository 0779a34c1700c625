//! # Conflict Retry
//!
//! One combinator for optimistic-concurrency writes: the closure re-fetches,
//! re-merges and writes; it is re-run with exponential back-off while the
//! write keeps failing with a resourceVersion conflict. Any other error is
//! returned immediately.

use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

use crate::config::OperatorConfig;

/// Back-off settings for conflict retries
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first conflict
    pub initial_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
    /// Multiplier applied after every conflict
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        use crate::constants::{
            DEFAULT_UPDATE_RETRY_INITIAL_DELAY_MS, DEFAULT_UPDATE_RETRY_MAX_ATTEMPTS,
        };
        Self {
            max_attempts: DEFAULT_UPDATE_RETRY_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(DEFAULT_UPDATE_RETRY_INITIAL_DELAY_MS),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn from_operator_config(config: &OperatorConfig) -> Self {
        Self {
            max_attempts: config.update_retry_max_attempts.max(1),
            initial_delay: Duration::from_millis(config.update_retry_initial_delay_ms),
            ..Self::default()
        }
    }
}

/// Errors that can report an optimistic-concurrency conflict
pub trait ConflictError {
    fn is_conflict(&self) -> bool;
}

impl ConflictError for crate::store::StoreError {
    fn is_conflict(&self) -> bool {
        crate::store::StoreError::is_conflict(self)
    }
}

/// Run `operation` until it succeeds, fails with a non-conflict error, or
/// `max_attempts` is exhausted
///
/// # Errors
///
/// Returns the first non-conflict error, or the last conflict once the
/// attempts are used up.
pub async fn retry_on_conflict<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: ConflictError + std::fmt::Display,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_conflict() => return Err(e),
            Err(e) => {
                if attempt >= config.max_attempts {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Conflict persisted after max retries"
                    );
                    return Err(e);
                }

                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    delay_ms = delay.as_millis(),
                    "Write conflicted, retrying"
                );
                tokio::time::sleep(delay).await;

                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_multiplier)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn conflict() -> StoreError {
        StoreError::Conflict {
            kind: "TektonInstallerSet".to_string(),
            name: "pipeline-main-static-abcde".to_string(),
            message: "the object has been modified".to_string(),
        }
    }

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            backoff_multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn test_retries_conflicts_until_success() {
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);
        let result = retry_on_conflict(&fast_config(5), "update", || {
            let c = Arc::clone(&c);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(conflict())
                } else {
                    Ok("done")
                }
            }
        })
        .await;
        assert_eq!(result.ok(), Some("done"));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_conflict_error_is_not_retried() {
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);
        let result: Result<(), StoreError> = retry_on_conflict(&fast_config(5), "update", || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::NotFound {
                    kind: "TektonInstallerSet".to_string(),
                    name: "x".to_string(),
                })
            }
        })
        .await;
        assert!(result.is_err_and(|e| e.is_not_found()));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);
        let result: Result<(), StoreError> = retry_on_conflict(&fast_config(3), "update", || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(conflict())
            }
        })
        .await;
        assert!(result.is_err_and(|e| e.is_conflict()));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
