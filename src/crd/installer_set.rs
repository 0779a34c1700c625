//! # TektonInstallerSet
//!
//! Cluster-scoped bundle of rendered manifests owned by a component CR. The
//! objects inside `spec.manifests` are applied by a separate installer-set
//! controller which also writes `status.conditions`.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::options::preserve_unknown_list;
use super::status::InstallerSetStatus;

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[kube(
    group = "operator.tekton.dev",
    version = "v1alpha1",
    kind = "TektonInstallerSet",
    plural = "tektoninstallersets",
    status = "InstallerSetStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Reason", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].reason"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TektonInstallerSetSpec {
    /// Rendered objects, in apply order
    #[serde(default)]
    #[schemars(schema_with = "preserve_unknown_list")]
    pub manifests: Vec<Value>,
}

impl TektonInstallerSet {
    /// Ready condition written by the installer-set controller
    #[must_use]
    pub fn ready_condition(&self) -> Option<&super::Condition> {
        self.status.as_ref().and_then(InstallerSetStatus::ready)
    }
}
