//! # Status
//!
//! Condition types and the readiness lattice shared by every operator CR.
//!
//! A [`ConditionSet`] names a happy condition (`Ready`) and the dependent
//! conditions that must all be `True` for it to become `True`. Marking a
//! dependent `False` immediately drags the happy condition down with the same
//! reason and message, so `Ready` always reports the deepest failing stage.

use serde::{Deserialize, Serialize};

/// Happy condition of every set
pub const READY: &str = "Ready";
/// Dependency gate passed (satellites wait on the pipeline engine)
pub const DEPENDENCIES_INSTALLED: &str = "DependenciesInstalled";
/// Extension pre-reconcile hook finished
pub const PRE_RECONCILER: &str = "PreReconciler";
/// Installer sets exist and match the desired state
pub const INSTALLER_SET_AVAILABLE: &str = "InstallerSetAvailable";
/// Every installer set reports Ready
pub const INSTALLER_SET_READY: &str = "InstallerSetReady";
/// Extension post-reconcile hook finished
pub const POST_RECONCILER: &str = "PostReconciler";

/// Umbrella pre-install stage
pub const PRE_INSTALL: &str = "PreInstall";
/// Umbrella satellites are all ready
pub const COMPONENTS_READY: &str = "ComponentsReady";
/// Umbrella post-install stage
pub const POST_INSTALL: &str = "PostInstall";

/// Message marker for an installer set torn down for an operator upgrade
pub const UPGRADE_PENDING: &str = "UpgradePending";
/// Message marker for an installer set torn down after drift
pub const REINSTALLING: &str = "Reinstalling";

/// Reason used on every failure mark
pub const REASON_ERROR: &str = "Error";
/// Reason used when a CR is not the singleton for its kind
pub const REASON_RESOURCE_IGNORED: &str = "ResourceIgnored";

const STATUS_TRUE: &str = "True";
const STATUS_FALSE: &str = "False";
const STATUS_UNKNOWN: &str = "Unknown";

/// Condition for tracking resource state
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last transition time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    #[must_use]
    pub fn is_true(&self) -> bool {
        self.status == STATUS_TRUE
    }

    #[must_use]
    pub fn is_false(&self) -> bool {
        self.status == STATUS_FALSE
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.status == STATUS_UNKNOWN
    }

    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }
}

/// Find a condition by type
#[must_use]
pub fn find<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == type_)
}

/// `True`, or absent/`Unknown`/`False` as `false`
#[must_use]
pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    find(conditions, type_).is_some_and(Condition::is_true)
}

/// Absent conditions count as `Unknown`
#[must_use]
pub fn is_condition_unknown(conditions: &[Condition], type_: &str) -> bool {
    find(conditions, type_).is_none_or(Condition::is_unknown)
}

/// A living condition set: one happy condition plus its dependents
#[derive(Debug, Clone, Copy)]
pub struct ConditionSet {
    pub happy: &'static str,
    pub dependents: &'static [&'static str],
}

/// Lattice used by every component CR
pub const COMPONENT_CONDITIONS: ConditionSet = ConditionSet {
    happy: READY,
    dependents: &[
        DEPENDENCIES_INSTALLED,
        PRE_RECONCILER,
        INSTALLER_SET_AVAILABLE,
        INSTALLER_SET_READY,
        POST_RECONCILER,
    ],
};

/// Lattice used by the umbrella CR
pub const CONFIG_CONDITIONS: ConditionSet = ConditionSet {
    happy: READY,
    dependents: &[PRE_INSTALL, COMPONENTS_READY, POST_INSTALL],
};

impl ConditionSet {
    /// Add every missing condition as `Unknown`
    pub fn initialize(&self, conditions: &mut Vec<Condition>) {
        for type_ in std::iter::once(&self.happy).chain(self.dependents.iter()) {
            if find(conditions, type_).is_none() {
                set(conditions, type_, STATUS_UNKNOWN, None, None);
            }
        }
    }

    /// Mark a condition `True`; the happy condition follows once all dependents are `True`
    pub fn mark_true(&self, conditions: &mut Vec<Condition>, type_: &str) {
        set(conditions, type_, STATUS_TRUE, None, None);
        if type_ == self.happy {
            return;
        }
        if self
            .dependents
            .iter()
            .all(|dep| is_condition_true(conditions, dep))
        {
            set(conditions, self.happy, STATUS_TRUE, None, None);
        }
    }

    /// Mark a condition `False`; dependents drag the happy condition down with them
    pub fn mark_false(
        &self,
        conditions: &mut Vec<Condition>,
        type_: &str,
        reason: &str,
        message: &str,
    ) {
        set(conditions, type_, STATUS_FALSE, Some(reason), Some(message));
        if self.dependents.contains(&type_) {
            set(conditions, self.happy, STATUS_FALSE, Some(reason), Some(message));
        }
    }

    /// Mark a condition `Unknown`; the happy condition follows unless it is already `False`
    pub fn mark_unknown(
        &self,
        conditions: &mut Vec<Condition>,
        type_: &str,
        reason: &str,
        message: &str,
    ) {
        set(conditions, type_, STATUS_UNKNOWN, Some(reason), Some(message));
        if self.dependents.contains(&type_)
            && !find(conditions, self.happy).is_some_and(Condition::is_false)
        {
            set(conditions, self.happy, STATUS_UNKNOWN, Some(reason), Some(message));
        }
    }

    #[must_use]
    pub fn is_happy(&self, conditions: &[Condition]) -> bool {
        is_condition_true(conditions, self.happy)
    }
}

/// Upsert a condition; `lastTransitionTime` only moves when the status flips
fn set(
    conditions: &mut Vec<Condition>,
    type_: &str,
    status: &str,
    reason: Option<&str>,
    message: Option<&str>,
) {
    let now = chrono::Utc::now().to_rfc3339();
    match conditions.iter_mut().find(|c| c.r#type == type_) {
        Some(existing) => {
            if existing.status != status {
                existing.last_transition_time = Some(now);
            }
            existing.status = status.to_string();
            existing.reason = reason.map(str::to_string);
            existing.message = message.map(str::to_string);
        }
        None => conditions.push(Condition {
            r#type: type_.to_string(),
            status: status.to_string(),
            last_transition_time: Some(now),
            reason: reason.map(str::to_string),
            message: message.map(str::to_string),
        }),
    }
}

/// Status shared by every component CR
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// The version of the installed release
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Observed generation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl ComponentStatus {
    pub fn initialize_conditions(&mut self) {
        COMPONENT_CONDITIONS.initialize(&mut self.conditions);
    }

    #[must_use]
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        find(&self.conditions, type_)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        COMPONENT_CONDITIONS.is_happy(&self.conditions)
    }

    pub fn mark_not_ready(&mut self, msg: &str) {
        COMPONENT_CONDITIONS.mark_false(
            &mut self.conditions,
            READY,
            REASON_ERROR,
            &format!("Ready: {msg}"),
        );
    }

    /// Name guard failure: another CR of this kind is the singleton
    pub fn mark_ignored(&mut self, expected: &str, got: &str) {
        COMPONENT_CONDITIONS.mark_false(
            &mut self.conditions,
            READY,
            REASON_RESOURCE_IGNORED,
            &format!("Resource ignored, Expected Name: {expected}, Got Name: {got}"),
        );
    }

    pub fn mark_dependencies_installed(&mut self) {
        COMPONENT_CONDITIONS.mark_true(&mut self.conditions, DEPENDENCIES_INSTALLED);
    }

    pub fn mark_dependency_installing(&mut self, msg: &str) {
        self.mark_not_ready("Dependencies installing");
        COMPONENT_CONDITIONS.mark_false(
            &mut self.conditions,
            DEPENDENCIES_INSTALLED,
            REASON_ERROR,
            &format!("Dependencies are installing: {msg}"),
        );
    }

    pub fn mark_dependency_missing(&mut self, kind: &str, msg: &str) {
        self.mark_not_ready(&format!("Missing Dependencies for {kind}"));
        COMPONENT_CONDITIONS.mark_false(
            &mut self.conditions,
            DEPENDENCIES_INSTALLED,
            REASON_ERROR,
            &format!("Dependencies are missing: {msg}"),
        );
    }

    pub fn mark_pre_reconciler_complete(&mut self) {
        COMPONENT_CONDITIONS.mark_true(&mut self.conditions, PRE_RECONCILER);
    }

    pub fn mark_pre_reconciler_failed(&mut self, msg: &str) {
        self.mark_not_ready("PreReconciliation failed");
        COMPONENT_CONDITIONS.mark_false(
            &mut self.conditions,
            PRE_RECONCILER,
            REASON_ERROR,
            &format!("PreReconciliation failed with message: {msg}"),
        );
    }

    pub fn mark_installer_set_available(&mut self) {
        COMPONENT_CONDITIONS.mark_true(&mut self.conditions, INSTALLER_SET_AVAILABLE);
    }

    pub fn mark_installer_set_not_available(&mut self, msg: &str) {
        self.mark_not_ready("TektonInstallerSet not ready");
        COMPONENT_CONDITIONS.mark_false(
            &mut self.conditions,
            INSTALLER_SET_AVAILABLE,
            REASON_ERROR,
            &format!("Installer set not ready: {msg}"),
        );
    }

    pub fn mark_installer_set_ready(&mut self) {
        COMPONENT_CONDITIONS.mark_true(&mut self.conditions, INSTALLER_SET_READY);
    }

    pub fn mark_installer_set_not_ready(&mut self, msg: &str) {
        self.mark_not_ready("TektonInstallerSet not ready");
        COMPONENT_CONDITIONS.mark_false(
            &mut self.conditions,
            INSTALLER_SET_READY,
            REASON_ERROR,
            &format!("Installer set not ready: {msg}"),
        );
    }

    pub fn mark_post_reconciler_complete(&mut self) {
        COMPONENT_CONDITIONS.mark_true(&mut self.conditions, POST_RECONCILER);
    }

    pub fn mark_post_reconciler_failed(&mut self, msg: &str) {
        self.mark_not_ready("PostReconciliation failed");
        COMPONENT_CONDITIONS.mark_false(
            &mut self.conditions,
            POST_RECONCILER,
            REASON_ERROR,
            &format!("PostReconciliation failed with message: {msg}"),
        );
    }

    /// Tear-down marker used when installer sets are being replaced
    ///
    /// Every stage the replacement invalidates is flipped, so `Ready` carries
    /// the marker until the new sets converge.
    pub fn mark_reinstall(&mut self, marker: &str) {
        self.mark_installer_set_not_ready(marker);
        self.mark_pre_reconciler_failed(marker);
        self.mark_post_reconciler_failed(marker);
        self.mark_not_ready(marker);
    }
}

/// Status of the umbrella CR
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigStatus {
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// The version of the installed release
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Profile last materialised
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

impl ConfigStatus {
    pub fn initialize_conditions(&mut self) {
        CONFIG_CONDITIONS.initialize(&mut self.conditions);
    }

    #[must_use]
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        find(&self.conditions, type_)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        CONFIG_CONDITIONS.is_happy(&self.conditions)
    }

    pub fn mark_not_ready(&mut self, msg: &str) {
        CONFIG_CONDITIONS.mark_false(
            &mut self.conditions,
            READY,
            REASON_ERROR,
            &format!("Ready: {msg}"),
        );
    }

    pub fn mark_ignored(&mut self, expected: &str, got: &str) {
        CONFIG_CONDITIONS.mark_false(
            &mut self.conditions,
            READY,
            REASON_RESOURCE_IGNORED,
            &format!("Resource ignored, Expected Name: {expected}, Got Name: {got}"),
        );
    }

    pub fn mark_pre_install_complete(&mut self) {
        CONFIG_CONDITIONS.mark_true(&mut self.conditions, PRE_INSTALL);
    }

    pub fn mark_pre_install_failed(&mut self, msg: &str) {
        self.mark_not_ready("PreReconciliation failed");
        CONFIG_CONDITIONS.mark_false(
            &mut self.conditions,
            PRE_INSTALL,
            REASON_ERROR,
            &format!("PreReconciliation failed with message: {msg}"),
        );
    }

    pub fn mark_components_ready(&mut self) {
        CONFIG_CONDITIONS.mark_true(&mut self.conditions, COMPONENTS_READY);
    }

    pub fn mark_component_not_ready(&mut self, msg: &str) {
        self.mark_not_ready("Components not in ready state");
        CONFIG_CONDITIONS.mark_false(
            &mut self.conditions,
            COMPONENTS_READY,
            REASON_ERROR,
            &format!("Components not in ready state: {msg}"),
        );
    }

    pub fn mark_post_install_complete(&mut self) {
        CONFIG_CONDITIONS.mark_true(&mut self.conditions, POST_INSTALL);
    }

    pub fn mark_post_install_failed(&mut self, msg: &str) {
        self.mark_not_ready("PostReconciliation failed");
        CONFIG_CONDITIONS.mark_false(
            &mut self.conditions,
            POST_INSTALL,
            REASON_ERROR,
            &format!("PostReconciliation failed with message: {msg}"),
        );
    }
}

/// Status of an installer set, written by the installer-set controller
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstallerSetStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl InstallerSetStatus {
    #[must_use]
    pub fn ready(&self) -> Option<&Condition> {
        find(&self.conditions, READY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod lattice_tests {
        use super::*;

        #[test]
        fn test_initialize_adds_unknown_conditions() {
            let mut status = ComponentStatus::default();
            status.initialize_conditions();
            assert_eq!(status.conditions.len(), 6);
            assert!(status.conditions.iter().all(Condition::is_unknown));
        }

        #[test]
        fn test_initialize_keeps_existing_values() {
            let mut status = ComponentStatus::default();
            status.initialize_conditions();
            status.mark_dependencies_installed();
            status.initialize_conditions();
            assert!(status.condition(DEPENDENCIES_INSTALLED).is_some_and(Condition::is_true));
        }

        #[test]
        fn test_ready_follows_all_dependents() {
            let mut status = ComponentStatus::default();
            status.initialize_conditions();
            status.mark_dependencies_installed();
            status.mark_pre_reconciler_complete();
            status.mark_installer_set_available();
            status.mark_installer_set_ready();
            assert!(!status.is_ready());
            status.mark_post_reconciler_complete();
            assert!(status.is_ready());
        }

        #[test]
        fn test_failed_dependent_drags_ready_down() {
            let mut status = ComponentStatus::default();
            status.initialize_conditions();
            status.mark_pre_reconciler_failed("boom");
            let ready = status.condition(READY).cloned().unwrap();
            assert!(ready.is_false());
            assert_eq!(ready.message(), "PreReconciliation failed with message: boom");
            assert_eq!(ready.reason.as_deref(), Some(REASON_ERROR));
        }

        #[test]
        fn test_not_ready_message_prefix() {
            let mut status = ComponentStatus::default();
            status.mark_not_ready("something");
            assert_eq!(status.condition(READY).unwrap().message(), "Ready: something");
        }

        #[test]
        fn test_mark_ignored_reason() {
            let mut status = ComponentStatus::default();
            status.initialize_conditions();
            status.mark_ignored("pipeline", "other");
            let ready = status.condition(READY).unwrap();
            assert_eq!(ready.reason.as_deref(), Some(REASON_RESOURCE_IGNORED));
            assert_eq!(
                ready.message(),
                "Resource ignored, Expected Name: pipeline, Got Name: other"
            );
        }

        #[test]
        fn test_reinstall_marks_every_stage() {
            let mut status = ComponentStatus::default();
            status.initialize_conditions();
            status.mark_reinstall(UPGRADE_PENDING);
            for type_ in [INSTALLER_SET_READY, PRE_RECONCILER, POST_RECONCILER, READY] {
                let cond = status.condition(type_).unwrap();
                assert!(cond.is_false(), "{type_} should be False");
                assert!(cond.message().contains(UPGRADE_PENDING));
            }
        }
    }

    mod transition_tests {
        use super::*;

        #[test]
        fn test_transition_time_only_moves_on_flip() {
            let mut conditions = vec![Condition {
                r#type: READY.to_string(),
                status: STATUS_FALSE.to_string(),
                last_transition_time: Some("2020-01-01T00:00:00+00:00".to_string()),
                reason: None,
                message: None,
            }];
            COMPONENT_CONDITIONS.mark_false(&mut conditions, READY, REASON_ERROR, "again");
            assert_eq!(
                conditions[0].last_transition_time.as_deref(),
                Some("2020-01-01T00:00:00+00:00")
            );
            COMPONENT_CONDITIONS.mark_true(&mut conditions, READY);
            assert_ne!(
                conditions[0].last_transition_time.as_deref(),
                Some("2020-01-01T00:00:00+00:00")
            );
        }

        #[test]
        fn test_unknown_does_not_override_false_ready() {
            let mut status = ComponentStatus::default();
            status.initialize_conditions();
            status.mark_not_ready("down");
            COMPONENT_CONDITIONS.mark_unknown(
                &mut status.conditions,
                INSTALLER_SET_READY,
                "Waiting",
                "waiting",
            );
            assert!(status.condition(READY).unwrap().is_false());
        }

        #[test]
        fn test_absent_condition_counts_as_unknown() {
            assert!(is_condition_unknown(&[], INSTALLER_SET_AVAILABLE));
        }
    }

    mod config_status_tests {
        use super::*;

        #[test]
        fn test_component_not_ready_message() {
            let mut status = ConfigStatus::default();
            status.initialize_conditions();
            status.mark_component_not_ready("TektonTrigger: waiting");
            let ready = status.condition(READY).unwrap();
            assert!(ready.is_false());
            assert_eq!(
                ready.message(),
                "Components not in ready state: TektonTrigger: waiting"
            );
        }

        #[test]
        fn test_config_ready_after_all_stages() {
            let mut status = ConfigStatus::default();
            status.initialize_conditions();
            status.mark_pre_install_complete();
            status.mark_components_ready();
            status.mark_post_install_complete();
            assert!(status.is_ready());
        }
    }
}
