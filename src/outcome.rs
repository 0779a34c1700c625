//! # Reconcile Outcome
//!
//! Control-flow results of a reconcile step. Errors are reserved for real
//! failures; everything that only asks for another pass is one of these.

use std::time::Duration;

/// What the caller should do after a step succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Converged, nothing to do until the next event
    Done,
    /// Run again after the delay
    Requeue(Duration),
    /// Metadata was written; run again right away
    ReconcileAgain,
    /// A dependency is mid-upgrade; run again after the delay
    DependencyPending(Duration),
}

impl ReconcileOutcome {
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self, ReconcileOutcome::Done)
    }

    /// Delay before the next pass; `None` for [`ReconcileOutcome::Done`]
    #[must_use]
    pub fn requeue_after(&self) -> Option<Duration> {
        match self {
            ReconcileOutcome::Done => None,
            ReconcileOutcome::ReconcileAgain => Some(Duration::ZERO),
            ReconcileOutcome::Requeue(after) | ReconcileOutcome::DependencyPending(after) => {
                Some(*after)
            }
        }
    }

    /// Label value for requeue metrics
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcileOutcome::Done => "done",
            ReconcileOutcome::Requeue(_) => "requeue",
            ReconcileOutcome::ReconcileAgain => "reconcile_again",
            ReconcileOutcome::DependencyPending(_) => "dependency_pending",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requeue_after() {
        assert_eq!(ReconcileOutcome::Done.requeue_after(), None);
        assert_eq!(
            ReconcileOutcome::ReconcileAgain.requeue_after(),
            Some(Duration::ZERO)
        );
        assert_eq!(
            ReconcileOutcome::Requeue(Duration::from_secs(10)).requeue_after(),
            Some(Duration::from_secs(10))
        );
    }
}
