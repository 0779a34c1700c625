//! # Set Classification
//!
//! Pure checks over the live installer sets of one type. The first matching
//! rule wins: missing, terminating, malformed, stale version, moved
//! namespace, changed spec, otherwise up to date.

use kube::ResourceExt;

use crate::crd::TektonInstallerSet;
use crate::labels::{MetadataContract, SUBTYPE_DEPLOYMENT, SUBTYPE_STATIC, TYPE_MAIN};

/// What the owner expects the sets of one type to look like
#[derive(Debug, Clone, Copy)]
pub struct Expected<'a> {
    pub set_type: &'a str,
    /// `None` skips the release version check (versioned sets)
    pub version: Option<&'a str>,
    pub target_namespace: &'a str,
    pub spec_hash: &'a str,
}

/// Classification of the live sets against [`Expected`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetState {
    NotFound,
    InDeletion,
    Invalid,
    VersionDiffer,
    NamespaceDiffer,
    UpdateRequired,
    Ok,
}

#[must_use]
pub fn classify(sets: &[TektonInstallerSet], expected: &Expected<'_>) -> SetState {
    if sets.is_empty() {
        return SetState::NotFound;
    }
    if sets.iter().any(MetadataContract::is_terminating) {
        return SetState::InDeletion;
    }
    if !has_valid_shape(sets, expected) {
        return SetState::Invalid;
    }
    if let Some(version) = expected.version {
        if sets.iter().any(|s| s.release_version() != Some(version)) {
            return SetState::VersionDiffer;
        }
    }
    if sets
        .iter()
        .any(|s| s.target_namespace_annotation() != Some(expected.target_namespace))
    {
        return SetState::NamespaceDiffer;
    }
    if sets
        .iter()
        .any(|s| s.last_applied_hash() != Some(expected.spec_hash))
    {
        return SetState::UpdateRequired;
    }
    SetState::Ok
}

/// Main needs exactly one static and one deployment set; every other type exactly one
fn has_valid_shape(sets: &[TektonInstallerSet], expected: &Expected<'_>) -> bool {
    let count_ok = if expected.set_type == TYPE_MAIN {
        let names: Vec<String> = sets.iter().map(ResourceExt::name_any).collect();
        sets.len() == 2
            && names.iter().filter(|n| n.contains(SUBTYPE_STATIC)).count() == 1
            && names.iter().filter(|n| n.contains(SUBTYPE_DEPLOYMENT)).count() == 1
    } else {
        sets.len() == 1
    };
    count_ok
        && sets.iter().all(|s| {
            s.created_by().is_some()
                && s.installer_set_type() == Some(expected.set_type)
                && s.target_namespace_annotation().is_some()
                && s.last_applied_hash().is_some()
                && (expected.version.is_none() || s.release_version().is_some())
        })
}

/// Aggregated readiness of a group of sets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusCheck {
    Ready,
    /// No verdict yet from the installer-set controller
    Pending(String),
    /// Some set reported `Ready=False`
    Failed(String),
}

/// Readiness of every set; the first failing set decides
#[must_use]
pub fn status_check(sets: &[TektonInstallerSet]) -> StatusCheck {
    for set in sets {
        match set.ready_condition() {
            None => {
                return StatusCheck::Pending(format!("{}: waiting for status", set.name_any()));
            }
            Some(c) if c.is_true() => {}
            Some(c) if c.is_false() => return StatusCheck::Failed(c.message().to_string()),
            Some(c) => return StatusCheck::Pending(c.message().to_string()),
        }
    }
    StatusCheck::Ready
}
