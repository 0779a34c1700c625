//! # Constants
//!
//! Shared constants used throughout the operator.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Fixed delay for `Requeue` outcomes (seconds)
pub const DEFAULT_REQUEUE_AFTER_SECS: u64 = 10;

/// Fibonacci error backoff lower bound (seconds)
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 1;

/// Fibonacci error backoff upper bound (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 600;

/// Default delay before restarting watch stream after unknown errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default delay before restarting watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS: u64 = 1;

/// Attempts for optimistic-concurrency retries on installer set updates
pub const DEFAULT_UPDATE_RETRY_MAX_ATTEMPTS: u32 = 5;

/// Initial delay between conflict retries (milliseconds)
pub const DEFAULT_UPDATE_RETRY_INITIAL_DELAY_MS: u64 = 10;

/// How many times to look for a status on a freshly created static set
pub const DEFAULT_STATUS_POLL_ATTEMPTS: u32 = 3;

/// Delay between status polls on a freshly created static set (seconds)
pub const DEFAULT_STATUS_POLL_INTERVAL_SECS: u64 = 3;

/// Default location of packaged payload manifests
pub const DEFAULT_KO_DATA_PATH: &str = "/var/run/ko";

/// Default target namespace for component workloads
pub const DEFAULT_TARGET_NAMESPACE: &str = "tekton-pipelines";

/// Default target namespace on OpenShift
pub const DEFAULT_OPENSHIFT_TARGET_NAMESPACE: &str = "openshift-pipelines";

/// Default SCC applied to pipeline workloads on OpenShift
pub const DEFAULT_PIPELINES_SCC: &str = "pipelines-scc";

/// API group served by the operator
pub const OPERATOR_GROUP: &str = "operator.tekton.dev";

/// Field manager used for status patches
pub const FIELD_MANAGER: &str = "tekton-installer-operator";

/// Initial watch back-off after API server throttling (milliseconds)
pub const DEFAULT_WATCH_BACKOFF_START_MS: u64 = 1000;

/// Upper bound of the watch throttling back-off (milliseconds)
pub const DEFAULT_WATCH_BACKOFF_MAX_MS: u64 = 30_000;
