//! # Fibonacci Backoff
//!
//! Error back-off for failed reconciles. Starts at a second so transient API
//! failures are retried quickly, then grows towards the cap.
//!
//! Sequence with the defaults: 1s, 1s, 2s, 3s, 5s, 8s, ... 10m (max).
//!
//! ```rust
//! use tekton_installer_operator::controller::backoff::FibonacciBackoff;
//!
//! let mut backoff = FibonacciBackoff::new(1, 600);
//! assert_eq!(backoff.next_backoff_seconds(), 1);
//! assert_eq!(backoff.next_backoff_seconds(), 1);
//! assert_eq!(backoff.next_backoff_seconds(), 2);
//! ```

use std::time::Duration;

use crate::config::OperatorConfig;

/// Fibonacci backoff calculator in seconds
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_secs: u64,
    prev_secs: u64,
    current_secs: u64,
    max_secs: u64,
}

impl FibonacciBackoff {
    #[must_use]
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            min_secs,
            prev_secs: 0,
            current_secs: min_secs,
            max_secs,
        }
    }

    /// Bounds from `BACKOFF_MIN_SECS` / `BACKOFF_MAX_SECS`
    #[must_use]
    pub fn from_operator_config(config: &OperatorConfig) -> Self {
        Self::new(config.backoff_min_secs, config.backoff_max_secs)
    }

    /// Current delay in seconds; advances the sequence, capped at the maximum
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let result = self.current_secs;
        let next = self.prev_secs.saturating_add(self.current_secs);
        self.prev_secs = self.current_secs;
        self.current_secs = std::cmp::min(next, self.max_secs);
        result
    }

    #[must_use]
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_secs(self.next_backoff_seconds())
    }

    /// Back to the first step, after a successful reconcile
    pub fn reset(&mut self) {
        self.prev_secs = 0;
        self.current_secs = self.min_secs;
    }
}

/// Back-off and error count of one resource
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(config: &OperatorConfig) -> Self {
        Self {
            backoff: FibonacciBackoff::from_operator_config(config),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }
}
