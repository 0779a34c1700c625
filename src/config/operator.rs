//! # Operator Configuration
//!
//! Operator-level settings loaded from environment variables.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Cluster flavour the operator runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Platform {
    #[default]
    Kubernetes,
    OpenShift,
}

impl Platform {
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "openshift" => Platform::OpenShift,
            _ => Platform::Kubernetes,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Kubernetes => "kubernetes",
            Platform::OpenShift => "openshift",
        }
    }

    /// Namespace used when a CR leaves `targetNamespace` empty
    #[must_use]
    pub fn default_target_namespace(&self) -> &'static str {
        use crate::constants::{DEFAULT_OPENSHIFT_TARGET_NAMESPACE, DEFAULT_TARGET_NAMESPACE};
        match self {
            Platform::Kubernetes => DEFAULT_TARGET_NAMESPACE,
            Platform::OpenShift => DEFAULT_OPENSHIFT_TARGET_NAMESPACE,
        }
    }
}

/// Proxy variables stamped onto every operand container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxySettings {
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub no_proxy: Option<String>,
}

impl ProxySettings {
    /// Env var name/value pairs; unset values are `None` so callers can remove them
    #[must_use]
    pub fn env_pairs(&self) -> [(&'static str, Option<&str>); 3] {
        [
            ("HTTPS_PROXY", self.https_proxy.as_deref()),
            ("HTTP_PROXY", self.http_proxy.as_deref()),
            ("NO_PROXY", self.no_proxy.as_deref()),
        ]
    }
}

/// Operator-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from the operator Deployment.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Operator release version stamped on every installer set
    pub version: String,
    /// Platform flavour (kubernetes, openshift)
    pub platform: Platform,
    /// Root directory holding payload manifests
    pub ko_data_path: PathBuf,
    /// Delay for `Requeue` outcomes (seconds)
    pub requeue_after_secs: u64,
    /// Fibonacci error backoff lower bound (seconds)
    pub backoff_min_secs: u64,
    /// Fibonacci error backoff upper bound (seconds)
    pub backoff_max_secs: u64,
    /// Watch stream restart delay after unknown errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// Watch stream restart delay after stream ends (seconds)
    pub watch_restart_delay_after_end_secs: u64,
    /// Attempts for conflict retries on installer set updates
    pub update_retry_max_attempts: u32,
    /// Initial delay between conflict retries (milliseconds)
    pub update_retry_initial_delay_ms: u64,
    /// Status polls after creating the static main set
    pub status_poll_attempts: u32,
    /// Delay between status polls (seconds)
    pub status_poll_interval_secs: u64,
    /// Port for metrics and probes
    pub metrics_port: u16,
    /// Proxy settings propagated to operand containers
    pub proxy: ProxySettings,
    /// Registry host replacing the one in every operand image
    pub registry_override: Option<String>,
    /// Snapshot of `IMAGE_*` variables, keyed by variable name
    pub images: BTreeMap<String, String>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            version: "devel".to_string(),
            platform: Platform::Kubernetes,
            ko_data_path: PathBuf::from(DEFAULT_KO_DATA_PATH),
            requeue_after_secs: DEFAULT_REQUEUE_AFTER_SECS,
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            watch_restart_delay_after_end_secs: DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            update_retry_max_attempts: DEFAULT_UPDATE_RETRY_MAX_ATTEMPTS,
            update_retry_initial_delay_ms: DEFAULT_UPDATE_RETRY_INITIAL_DELAY_MS,
            status_poll_attempts: DEFAULT_STATUS_POLL_ATTEMPTS,
            status_poll_interval_secs: DEFAULT_STATUS_POLL_INTERVAL_SECS,
            metrics_port: DEFAULT_METRICS_PORT,
            proxy: ProxySettings::default(),
            registry_override: None,
            images: BTreeMap::new(),
        }
    }
}

impl OperatorConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            version: env_var_or_default_str("VERSION", "devel"),
            platform: Platform::parse(&env_var_or_default_str("PLATFORM", "kubernetes")),
            ko_data_path: PathBuf::from(env_var_or_default_str(
                "KO_DATA_PATH",
                DEFAULT_KO_DATA_PATH,
            )),
            requeue_after_secs: env_var_or_default(
                "REQUEUE_AFTER_SECS",
                DEFAULT_REQUEUE_AFTER_SECS,
            ),
            backoff_min_secs: env_var_or_default(
                "BACKOFF_MIN_SECS",
                DEFAULT_BACKOFF_MIN_SECS,
            ),
            backoff_max_secs: env_var_or_default(
                "BACKOFF_MAX_SECS",
                DEFAULT_BACKOFF_MAX_SECS,
            ),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            watch_restart_delay_after_end_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_AFTER_END_SECS",
                DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            ),
            update_retry_max_attempts: env_var_or_default(
                "UPDATE_RETRY_MAX_ATTEMPTS",
                DEFAULT_UPDATE_RETRY_MAX_ATTEMPTS,
            ),
            update_retry_initial_delay_ms: env_var_or_default(
                "UPDATE_RETRY_INITIAL_DELAY_MS",
                DEFAULT_UPDATE_RETRY_INITIAL_DELAY_MS,
            ),
            status_poll_attempts: env_var_or_default(
                "STATUS_POLL_ATTEMPTS",
                DEFAULT_STATUS_POLL_ATTEMPTS,
            ),
            status_poll_interval_secs: env_var_or_default(
                "STATUS_POLL_INTERVAL_SECS",
                DEFAULT_STATUS_POLL_INTERVAL_SECS,
            ),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            proxy: ProxySettings {
                http_proxy: env_var_opt("HTTP_PROXY"),
                https_proxy: env_var_opt("HTTPS_PROXY"),
                no_proxy: env_var_opt("NO_PROXY"),
            },
            registry_override: env_var_opt("TEKTON_REGISTRY_OVERRIDE"),
            images: std::env::vars()
                .filter(|(key, _)| key.starts_with("IMAGE_"))
                .collect(),
        }
    }

    /// Get requeue duration for `Requeue` outcomes
    pub fn requeue_after(&self) -> Duration {
        Duration::from_secs(self.requeue_after_secs)
    }

    /// Get watch restart delay duration
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    /// Get watch restart delay after end duration
    pub fn watch_restart_delay_after_end_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_after_end_secs)
    }

    /// Get delay between status polls
    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_secs(self.status_poll_interval_secs)
    }

    /// `X.Y` part of the operator version, used by versioned installer sets
    #[must_use]
    pub fn minor_version(&self) -> String {
        crate::labels::minor_version(&self.version)
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read environment variable, treating empty values as unset
fn env_var_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
