//! # Error Policy
//!
//! Reconcile failures back off per resource on a Fibonacci schedule; watch
//! stream failures are classified and either restart the stream or pass.

use kube::runtime::controller::Action;
use kube::ResourceExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Instrument};

use crate::controller::backoff::BackoffState;
use crate::controller::reconciler::{ManagedResource, Reconciler, ReconcilerError};
use crate::observability::metrics;

/// kube-runtime error policy: requeue after the resource's next back-off step
pub fn handle_reconciliation_error<K: ManagedResource>(
    obj: Arc<K>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler<K>>,
) -> Action {
    let kind = K::kind(&()).to_string();
    let name = obj.name_any();
    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.kind = %kind,
        resource.name = %name,
        error = %error
    );
    let _error_guard = error_span.enter();

    error!(error = ?error, "Reconciliation error");
    metrics::increment_reconciliation_errors(&kind);

    let (backoff_seconds, error_count) = match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states
                .entry(name)
                .or_insert_with(|| BackoffState::new(&ctx.config));
            state.increment_error();
            (state.backoff.next_backoff_seconds(), state.error_count)
        }
        Err(e) => {
            warn!(error = %e, "Failed to lock backoff states, using minimum backoff");
            (ctx.config.backoff_min_secs, 0)
        }
    };

    let next_trigger_time = chrono::Utc::now()
        + chrono::Duration::seconds(i64::try_from(backoff_seconds).unwrap_or(i64::MAX));
    info!(
        backoff_seconds,
        error_count,
        next_retry = %next_trigger_time.to_rfc3339(),
        "Retrying with Fibonacci backoff"
    );

    metrics::increment_requeues(&kind, "error_backoff");
    Action::requeue(Duration::from_secs(backoff_seconds))
}

/// Watch stream error classes, checked in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorClass {
    /// Missing object or CRD; the stream carries on
    NotFound,
    /// RBAC revoked or token expired
    Unauthorized,
    /// Resource version too old; normal after restarts
    Expired,
    /// API server throttling or storage reinitializing
    Throttled,
    Other,
}

/// Classify a watch error from its debug rendering
///
/// 404 is checked before 401 because a plain-text 404 surfaces as a
/// `WatchFailed` deserialization error.
#[must_use]
pub fn classify(error: &str) -> WatchErrorClass {
    if error.contains("ObjectNotFound") || error.contains("404") || error.contains("not found") {
        WatchErrorClass::NotFound
    } else if error.contains("401") || error.contains("Unauthorized") {
        WatchErrorClass::Unauthorized
    } else if error.contains("410")
        || error.contains("too old resource version")
        || error.contains("Expired")
        || error.contains("Gone")
    {
        WatchErrorClass::Expired
    } else if error.contains("429")
        || error.contains("storage is (re)initializing")
        || error.contains("TooManyRequests")
    {
        WatchErrorClass::Throttled
    } else {
        WatchErrorClass::Other
    }
}

/// Handle one watch stream error
///
/// Returns `None` to drop the event and let the stream restart, `Some(())`
/// to keep it.
pub async fn handle_watch_stream_error(
    error_string: &str,
    backoff_ms: &Arc<AtomicU64>,
    max_backoff_ms: u64,
    watch_restart_delay: Duration,
) -> Option<()> {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        error = %error_string
    );

    async {
        match classify(error_string) {
            WatchErrorClass::NotFound => {
                warn!("Watched resource or CRD not found (404), continuing");
                Some(())
            }
            WatchErrorClass::Unauthorized => {
                error!(
                    "Watch authentication failed (401): check the operator ServiceAccount, \
                     its ClusterRoleBinding and the cluster role for operator.tekton.dev"
                );
                tokio::time::sleep(watch_restart_delay).await;
                None
            }
            WatchErrorClass::Expired => {
                warn!(error_type = "410", "Watch resource version expired, restarting watch");
                None
            }
            WatchErrorClass::Throttled => {
                let current = backoff_ms.load(Ordering::Relaxed);
                warn!(backoff_ms = current, "API server throttling (429), backing off");
                tokio::time::sleep(Duration::from_millis(current)).await;
                backoff_ms.store(
                    std::cmp::min(current.saturating_mul(2), max_backoff_ms),
                    Ordering::Relaxed,
                );
                None
            }
            WatchErrorClass::Other => {
                error!(error = %error_string, "Controller stream error");
                tokio::time::sleep(watch_restart_delay).await;
                None
            }
        }
    }
    .instrument(error_span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_watch_errors() {
        assert_eq!(classify("ObjectNotFound"), WatchErrorClass::NotFound);
        assert_eq!(
            classify("WatchFailed(SerdeError(invalid type: integer `404`))"),
            WatchErrorClass::NotFound
        );
        assert_eq!(classify("Api(401 Unauthorized)"), WatchErrorClass::Unauthorized);
        assert_eq!(classify("too old resource version: 12 (34)"), WatchErrorClass::Expired);
        assert_eq!(classify("storage is (re)initializing"), WatchErrorClass::Throttled);
        assert_eq!(classify("connection reset"), WatchErrorClass::Other);
    }

    #[tokio::test]
    async fn test_throttled_doubles_backoff_up_to_max() {
        let backoff = Arc::new(AtomicU64::new(1));
        let outcome = handle_watch_stream_error("429", &backoff, 3, Duration::ZERO).await;
        assert!(outcome.is_none());
        assert_eq!(backoff.load(Ordering::Relaxed), 2);
        handle_watch_stream_error("TooManyRequests", &backoff, 3, Duration::ZERO).await;
        assert_eq!(backoff.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_not_found_keeps_stream() {
        let backoff = Arc::new(AtomicU64::new(1));
        let outcome = handle_watch_stream_error("not found", &backoff, 3, Duration::ZERO).await;
        assert_eq!(outcome, Some(()));
    }
}
