//! # Security Context Constraints
//!
//! OpenShift SCC policy on the umbrella: a default SCC for pipeline workloads
//! and an optional `maxAllowed` ceiling that namespaces may request up to via
//! the `operator.tekton.dev/scc` annotation.
//!
//! SCCs are ranked the way the OpenShift admission plugin ranks them: higher
//! `priority` first, then the more restrictive one, then by name. A
//! `maxAllowed` SCC must rank at or before the default.

use k8s_openapi::api::core::v1::Namespace;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, info, warn};

use crate::constants::DEFAULT_PIPELINES_SCC;
use crate::crd::Scc;
use crate::labels::{MetadataContract, NAMESPACE_SCC_KEY};
use crate::store::{ClusterApi, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum SccError {
    #[error("SCC {0} does not exist on the cluster")]
    NotFound(String),

    #[error("maxAllowed SCC: {max_allowed} must have a higher priority over default SCC: {default}")]
    BelowDefault { max_allowed: String, default: String },

    #[error("namespace {namespace} requests SCC {requested}, beyond maxAllowed {max_allowed}")]
    NamespaceBeyondMax {
        namespace: String,
        requested: String,
        max_allowed: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The subset of `security.openshift.io/v1` SecurityContextConstraints used
/// for ranking
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityContextConstraints {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub allow_privileged_container: bool,
    #[serde(default)]
    pub allow_host_dir_volume_plugin: bool,
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub run_as_user: Option<StrategyOptions>,
    #[serde(default)]
    pub se_linux_context: Option<StrategyOptions>,
    #[serde(default)]
    pub allowed_capabilities: Vec<String>,
    #[serde(default)]
    pub required_drop_capabilities: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct StrategyOptions {
    #[serde(rename = "type", default)]
    pub type_: String,
}

const TRIVIAL_VOLUMES: &[&str] = &[
    "configMap",
    "downwardAPI",
    "emptyDir",
    "persistentVolumeClaim",
    "projected",
    "secret",
    "ephemeral",
];

impl SecurityContextConstraints {
    #[must_use]
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// Laxity score; higher means less restrictive
    #[must_use]
    pub fn points(&self) -> u32 {
        let mut points = 0;
        if self.allow_privileged_container {
            points += 1_000_000;
        }
        let all_volumes = self.volumes.iter().any(|v| v == "*");
        if self.allow_host_dir_volume_plugin
            && (all_volumes || self.volumes.iter().any(|v| v == "hostPath"))
        {
            points += 200_000;
        }
        if all_volumes
            || self
                .volumes
                .iter()
                .any(|v| v != "hostPath" && !TRIVIAL_VOLUMES.contains(&v.as_str()))
        {
            points += 100_000;
        }
        points += match self.run_as_user.as_ref().map(|s| s.type_.as_str()) {
            Some("RunAsAny") => 40_000,
            Some("MustRunAsNonRoot") => 30_000,
            Some("MustRunAsRange") => 20_000,
            Some("MustRunAs") => 10_000,
            _ => 0,
        };
        if self.se_linux_context.as_ref().is_some_and(|s| s.type_ == "RunAsAny") {
            points += 4_000;
        }
        if self.allowed_capabilities.iter().any(|c| c == "*") {
            points += 4_000;
        } else {
            points += 300 * u32::try_from(self.allowed_capabilities.len()).unwrap_or(u32::MAX / 300);
        }
        if self.required_drop_capabilities.is_empty() {
            points += 100;
        }
        points
    }
}

fn rank(a: &SecurityContextConstraints, b: &SecurityContextConstraints) -> Ordering {
    b.priority
        .unwrap_or(0)
        .cmp(&a.priority.unwrap_or(0))
        .then_with(|| a.points().cmp(&b.points()))
        .then_with(|| a.name().cmp(b.name()))
}

/// SCC names in admission order
#[must_use]
pub fn prioritize(mut sccs: Vec<SecurityContextConstraints>) -> Vec<String> {
    sccs.sort_by(rank);
    sccs.into_iter().map(|s| s.name().to_string()).collect()
}

fn position(ordered: &[String], name: &str) -> Result<usize, SccError> {
    ordered
        .iter()
        .position(|n| n == name)
        .ok_or_else(|| SccError::NotFound(name.to_string()))
}

/// Effective default SCC; an empty value resets to the platform default
#[must_use]
pub fn default_scc(scc: Option<&Scc>) -> String {
    scc.and_then(|s| s.default.as_deref())
        .filter(|d| !d.is_empty())
        .unwrap_or(DEFAULT_PIPELINES_SCC)
        .to_string()
}

/// Check a default / maxAllowed pair against the SCCs of the cluster
///
/// # Errors
///
/// Returns [`SccError::NotFound`] for unknown names and
/// [`SccError::BelowDefault`] when `maxAllowed` ranks after the default.
pub fn validate_policy(
    ordered: &[String],
    default: &str,
    max_allowed: Option<&str>,
) -> Result<(), SccError> {
    let default_pos = position(ordered, default)?;
    let Some(max_allowed) = max_allowed.filter(|m| !m.is_empty()) else {
        debug!(default = %default, "No maxAllowed SCC set");
        return Ok(());
    };
    let max_pos = position(ordered, max_allowed)?;
    if max_pos > default_pos {
        return Err(SccError::BelowDefault {
            max_allowed: max_allowed.to_string(),
            default: default.to_string(),
        });
    }
    Ok(())
}

/// Check a namespace's SCC request against `maxAllowed`
///
/// # Errors
///
/// Returns [`SccError::NamespaceBeyondMax`] when the request ranks before the
/// ceiling, or [`SccError::NotFound`] for unknown names.
pub fn validate_request(
    ordered: &[String],
    namespace: &str,
    requested: &str,
    max_allowed: &str,
) -> Result<(), SccError> {
    let requested_pos = position(ordered, requested)?;
    if requested_pos < position(ordered, max_allowed)? {
        return Err(SccError::NamespaceBeyondMax {
            namespace: namespace.to_string(),
            requested: requested.to_string(),
            max_allowed: max_allowed.to_string(),
        });
    }
    Ok(())
}

/// Validate the umbrella SCC policy and every namespace request
///
/// Namespace requests beyond the ceiling are returned, not failed on; the
/// namespace keeps the default SCC.
///
/// # Errors
///
/// Returns policy violations and store failures.
pub async fn check(
    cluster: &dyn ClusterApi,
    scc: Option<&Scc>,
    namespaces: &[Namespace],
) -> Result<Vec<SccError>, SccError> {
    let ordered = prioritize(cluster.list_sccs().await?);
    debug!(order = ?ordered, "SCCs in admission order");

    let default = default_scc(scc);
    let max_allowed = scc.and_then(|s| s.max_allowed.as_deref());
    validate_policy(&ordered, &default, max_allowed)?;
    info!(default = %default, max_allowed = ?max_allowed, "SCC policy valid");

    let Some(max_allowed) = max_allowed.filter(|m| !m.is_empty()) else {
        return Ok(Vec::new());
    };
    let mut rejected = Vec::new();
    for ns in namespaces {
        let Some(requested) = ns.annotation(NAMESPACE_SCC_KEY) else {
            continue;
        };
        if let Err(e) = validate_request(&ordered, &ns.name_any(), requested, max_allowed) {
            warn!(namespace = %ns.name_any(), error = %e, "Namespace SCC request rejected");
            rejected.push(e);
        }
    }
    Ok(rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scc(value: serde_json::Value) -> SecurityContextConstraints {
        serde_json::from_value(value).unwrap()
    }

    fn openshift_sccs() -> Vec<SecurityContextConstraints> {
        vec![
            scc(json!({
                "metadata": {"name": "restricted-v2"},
                "runAsUser": {"type": "MustRunAsRange"},
                "seLinuxContext": {"type": "MustRunAs"},
                "volumes": ["configMap", "emptyDir", "secret"],
                "requiredDropCapabilities": ["ALL"]
            })),
            scc(json!({
                "metadata": {"name": "nonroot"},
                "runAsUser": {"type": "MustRunAsNonRoot"},
                "seLinuxContext": {"type": "MustRunAs"},
                "volumes": ["configMap", "emptyDir", "secret"],
                "requiredDropCapabilities": ["KILL"]
            })),
            scc(json!({
                "metadata": {"name": "anyuid"},
                "priority": 10,
                "runAsUser": {"type": "RunAsAny"},
                "seLinuxContext": {"type": "MustRunAs"},
                "volumes": ["configMap", "emptyDir", "secret"],
                "requiredDropCapabilities": ["MKNOD"]
            })),
            scc(json!({
                "metadata": {"name": "pipelines-scc"},
                "runAsUser": {"type": "MustRunAsRange"},
                "seLinuxContext": {"type": "MustRunAs"},
                "volumes": ["configMap", "emptyDir", "secret", "csi"],
                "requiredDropCapabilities": ["ALL"]
            })),
        ]
    }

    #[test]
    fn test_prioritize_orders_by_priority_then_restriction() {
        let ordered = prioritize(openshift_sccs());
        assert_eq!(ordered, vec!["anyuid", "restricted-v2", "nonroot", "pipelines-scc"]);
    }

    #[test]
    fn test_max_allowed_more_restrictive_than_default_is_rejected() {
        let ordered = prioritize(openshift_sccs());
        let err = validate_policy(&ordered, "anyuid", Some("nonroot")).unwrap_err();
        assert!(matches!(err, SccError::BelowDefault { .. }));
        assert!(validate_policy(&ordered, "pipelines-scc", Some("anyuid")).is_ok());
    }

    #[test]
    fn test_unknown_scc_is_rejected() {
        let ordered = prioritize(openshift_sccs());
        let err = validate_policy(&ordered, "does-not-exist", None).unwrap_err();
        assert_eq!(err.to_string(), "SCC does-not-exist does not exist on the cluster");
    }

    #[test]
    fn test_empty_default_resets_to_platform_default() {
        let empty = Scc {
            default: Some(String::new()),
            max_allowed: None,
        };
        assert_eq!(default_scc(Some(&empty)), DEFAULT_PIPELINES_SCC);
        assert_eq!(default_scc(None), DEFAULT_PIPELINES_SCC);
    }

    #[test]
    fn test_namespace_request_within_range() {
        let ordered = prioritize(openshift_sccs());
        assert!(validate_request(&ordered, "team-a", "nonroot", "restricted-v2").is_ok());
        assert!(matches!(
            validate_request(&ordered, "team-b", "anyuid", "restricted-v2"),
            Err(SccError::NamespaceBeyondMax { .. })
        ));
    }
}
