//! # Metrics
//!
//! Prometheus metrics for monitoring the operator.
//!
//! ## Metrics Exposed
//!
//! - `tekton_operator_reconciliations_total` - Reconciliations by kind
//! - `tekton_operator_reconciliation_errors_total` - Failed reconciliations by kind
//! - `tekton_operator_reconciliation_duration_seconds` - Reconcile duration by kind
//! - `tekton_operator_requeues_total` - Requeue outcomes by kind and reason
//! - `tekton_operator_installer_sets_created_total` - Installer sets created by kind and type
//! - `tekton_operator_installer_sets_deleted_total` - Installer sets deleted by kind and type
//! - `tekton_operator_install_events_total` - Fresh installs and upgrades by kind

use anyhow::Result;
use prometheus::{HistogramVec, IntCounterVec, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "tekton_operator_reconciliations_total",
            "Total number of reconciliations",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "tekton_operator_reconciliation_errors_total",
            "Total number of reconciliation errors",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "tekton_operator_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "tekton_operator_requeues_total",
            "Total number of requeued reconciliations",
        ),
        &["kind", "reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static INSTALLER_SETS_CREATED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "tekton_operator_installer_sets_created_total",
            "Total number of installer sets created",
        ),
        &["kind", "type"],
    )
    .expect("Failed to create INSTALLER_SETS_CREATED_TOTAL metric - this should never happen")
});

static INSTALLER_SETS_DELETED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "tekton_operator_installer_sets_deleted_total",
            "Total number of installer sets deleted",
        ),
        &["kind", "type"],
    )
    .expect("Failed to create INSTALLER_SETS_DELETED_TOTAL metric - this should never happen")
});

static INSTALL_EVENTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "tekton_operator_install_events_total",
            "Total number of fresh installs and upgrades",
        ),
        &["kind", "event"],
    )
    .expect("Failed to create INSTALL_EVENTS_TOTAL metric - this should never happen")
});

/// Label values for [`record_install_event`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallEvent {
    NewInstall,
    Upgrade,
}

impl InstallEvent {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallEvent::NewInstall => "NewInstall",
            InstallEvent::Upgrade => "Upgrade",
        }
    }
}

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(INSTALLER_SETS_CREATED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(INSTALLER_SETS_DELETED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(INSTALL_EVENTS_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations(kind: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_reconciliation_errors(kind: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_reconciliation_duration(kind: &str, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[kind])
        .observe(duration);
}

pub fn increment_requeues(kind: &str, reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[kind, reason]).inc();
}

pub fn increment_installer_sets_created(kind: &str, set_type: &str) {
    INSTALLER_SETS_CREATED_TOTAL
        .with_label_values(&[kind, set_type])
        .inc();
}

pub fn increment_installer_sets_deleted(kind: &str, set_type: &str, count: usize) {
    INSTALLER_SETS_DELETED_TOTAL
        .with_label_values(&[kind, set_type])
        .inc_by(count as u64);
}

/// Count a fresh install or an upgrade of a component
pub fn record_install_event(kind: &str, event: InstallEvent) {
    INSTALL_EVENTS_TOTAL
        .with_label_values(&[kind, event.as_str()])
        .inc();
}
