//! # Labels and Annotations
//!
//! Every label and annotation key the operator reads or writes, plus typed
//! accessors over object metadata. Installer-set ownership is keyed purely on
//! these values, so nothing else in the crate spells the keys out.

use kube::api::ObjectMeta;
use std::collections::BTreeMap;

/// Component kind that created an installer set
pub const CREATED_BY_KEY: &str = "operator.tekton.dev/created-by";
/// Installer set type (`main`, `pre`, `post`, `custom-<suffix>`)
pub const INSTALLER_SET_TYPE_KEY: &str = "operator.tekton.dev/installer-set-type";
/// Full operator version
pub const RELEASE_VERSION_KEY: &str = "operator.tekton.dev/release-version";
/// `X.Y` operator version, on versioned installer sets only
pub const RELEASE_MINOR_VERSION_KEY: &str = "operator.tekton.dev/release-minor-version";
/// Operand the rendered object belongs to
pub const OPERAND_NAME_KEY: &str = "operator.tekton.dev/operand-name";
/// Hash of the deployment spec after all transformers ran
pub const DEPLOYMENT_SPEC_HASH_KEY: &str = "operator.tekton.dev/deployment-spec-applied-hash";
/// Marks the umbrella-owned target namespace
pub const TARGET_NAMESPACE_LABEL: &str = "operator.tekton.dev/targetNamespace";
/// Marks a previous target namespace for removal
pub const MARK_FOR_DELETION_LABEL: &str = "operator.tekton.dev/mark-for-deletion";

/// Target namespace the installer set renders into
pub const TARGET_NAMESPACE_KEY: &str = "operator.tekton.dev/target-namespace";
/// Spec hash of the owning component at the last write
pub const LAST_APPLIED_HASH_KEY: &str = "operator.tekton.dev/last-applied-hash";
/// Objects carrying this annotation keep their own namespace
pub const PRESERVE_NAMESPACE_KEY: &str = "operator.tekton.dev/preserve-namespace";
/// Per-namespace SCC request on OpenShift
pub const NAMESPACE_SCC_KEY: &str = "operator.tekton.dev/scc";

/// Installer set type values
pub const TYPE_MAIN: &str = "main";
pub const TYPE_PRE: &str = "pre";
pub const TYPE_POST: &str = "post";
pub const TYPE_CUSTOM: &str = "custom";

/// Subtypes of the main installer set, carried in the generated name
pub const SUBTYPE_STATIC: &str = "static";
pub const SUBTYPE_DEPLOYMENT: &str = "deployment";

/// `custom-<suffix>` type string for a custom installer set
#[must_use]
pub fn custom_type(suffix: &str) -> String {
    format!("{TYPE_CUSTOM}-{}", suffix.to_lowercase())
}

/// `X.Y` prefix of a version string, trimming everything after the last dot
#[must_use]
pub fn minor_version(version: &str) -> String {
    match version.rfind('.') {
        Some(idx) => version[..idx].to_string(),
        None => version.to_string(),
    }
}

/// Kind name used in generated installer set names: `TektonTrigger` -> `trigger`
#[must_use]
pub fn kind_prefix(kind: &str) -> String {
    kind.strip_prefix("Tekton").unwrap_or(kind).to_lowercase()
}

/// Label selector string from key/value pairs
#[must_use]
pub fn selector(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Whether the labels match every pair of a `k=v,k2=v2` selector
#[must_use]
pub fn matches_selector(labels: &BTreeMap<String, String>, selector: &str) -> bool {
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k).is_some_and(|actual| actual == v),
            None => labels.contains_key(term),
        })
}

/// Read-only accessors over the metadata contract of installer sets
pub trait MetadataContract {
    fn meta_ref(&self) -> &ObjectMeta;

    fn label(&self, key: &str) -> Option<&str> {
        self.meta_ref()
            .labels
            .as_ref()
            .and_then(|l| l.get(key))
            .map(String::as_str)
    }

    fn annotation(&self, key: &str) -> Option<&str> {
        self.meta_ref()
            .annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(String::as_str)
    }

    fn created_by(&self) -> Option<&str> {
        self.label(CREATED_BY_KEY)
    }

    fn installer_set_type(&self) -> Option<&str> {
        self.label(INSTALLER_SET_TYPE_KEY)
    }

    fn release_version(&self) -> Option<&str> {
        self.label(RELEASE_VERSION_KEY)
    }

    fn target_namespace_annotation(&self) -> Option<&str> {
        self.annotation(TARGET_NAMESPACE_KEY)
    }

    fn last_applied_hash(&self) -> Option<&str> {
        self.annotation(LAST_APPLIED_HASH_KEY)
    }

    fn is_terminating(&self) -> bool {
        self.meta_ref().deletion_timestamp.is_some()
    }
}

impl<K: kube::Resource> MetadataContract for K {
    fn meta_ref(&self) -> &ObjectMeta {
        self.meta()
    }
}

/// Insert a label, creating the map when absent
pub fn set_label(meta: &mut ObjectMeta, key: &str, value: &str) {
    meta.labels
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), value.to_string());
}

/// Insert an annotation, keeping every other existing annotation
pub fn set_annotation(meta: &mut ObjectMeta, key: &str, value: &str) {
    meta.annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), value.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    mod version_tests {
        use super::*;

        #[test]
        fn test_minor_version_trims_patch() {
            assert_eq!(minor_version("v0.74.1"), "v0.74");
            assert_eq!(minor_version("1.15.0"), "1.15");
        }

        #[test]
        fn test_minor_version_without_dot() {
            assert_eq!(minor_version("devel"), "devel");
        }
    }

    mod naming_tests {
        use super::*;

        #[test]
        fn test_kind_prefix_strips_tekton() {
            assert_eq!(kind_prefix("TektonTrigger"), "trigger");
            assert_eq!(kind_prefix("TektonPipeline"), "pipeline");
            assert_eq!(kind_prefix("ManualApprovalGate"), "manualapprovalgate");
        }

        #[test]
        fn test_custom_type_lowercases_suffix() {
            assert_eq!(
                custom_type("VersionedClusterTask"),
                "custom-versionedclustertask"
            );
        }
    }

    mod selector_tests {
        use super::*;

        #[test]
        fn test_selector_roundtrip_matches() {
            let sel = selector(&[(CREATED_BY_KEY, "TektonTrigger"), (INSTALLER_SET_TYPE_KEY, "main")]);
            let mut labels = BTreeMap::new();
            labels.insert(CREATED_BY_KEY.to_string(), "TektonTrigger".to_string());
            labels.insert(INSTALLER_SET_TYPE_KEY.to_string(), "main".to_string());
            labels.insert(RELEASE_VERSION_KEY.to_string(), "v1".to_string());
            assert!(matches_selector(&labels, &sel));

            labels.insert(INSTALLER_SET_TYPE_KEY.to_string(), "pre".to_string());
            assert!(!matches_selector(&labels, &sel));
        }

        #[test]
        fn test_metadata_setters_keep_existing_entries() {
            let mut meta = ObjectMeta::default();
            set_annotation(&mut meta, "keep", "me");
            set_annotation(&mut meta, LAST_APPLIED_HASH_KEY, "abc");
            let annotations = meta.annotations.unwrap_or_default();
            assert_eq!(annotations.get("keep").map(String::as_str), Some("me"));
            assert_eq!(
                annotations.get(LAST_APPLIED_HASH_KEY).map(String::as_str),
                Some("abc")
            );
        }
    }
}
