//! # TektonConfig
//!
//! The umbrella resource. A single `config` instance selects a profile and
//! fans its per-component blocks down to the satellite CRs it creates.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::components::{
    Addon, Chain, Dashboard, Hub, ManualApproval, Pipeline, Pruner, Results, Scheduler, Trigger,
};
use super::options::{AdditionalOptions, Config, Param};
use super::status::ConfigStatus;
use crate::config::Platform;

/// Profile values
pub const PROFILE_LITE: &str = "lite";
pub const PROFILE_BASIC: &str = "basic";
pub const PROFILE_ALL: &str = "all";

/// OpenShift security context constraint policy
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Scc {
    /// SCC applied to pipeline workloads; empty resets to the platform default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Least restrictive SCC a namespace may request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_allowed: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelinesAsCode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable: Option<bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub settings: BTreeMap<String, String>,
    #[serde(default)]
    pub options: AdditionalOptions,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpenShift {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipelines_as_code: Option<PipelinesAsCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scc: Option<Scc>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Platforms {
    #[serde(default)]
    pub openshift: OpenShift,
}

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[kube(
    group = "operator.tekton.dev",
    version = "v1alpha1",
    kind = "TektonConfig",
    plural = "tektonconfigs",
    status = "ConfigStatus",
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".status.version"}"#,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Reason", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].reason"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TektonConfigSpec {
    /// `lite`, `basic` or `all`
    #[serde(default)]
    pub profile: String,
    #[serde(default)]
    pub target_namespace: String,
    #[serde(default)]
    pub config: Config,
    #[serde(default)]
    pub pipeline: Pipeline,
    #[serde(default)]
    pub trigger: Trigger,
    #[serde(default)]
    pub chain: Chain,
    #[serde(default)]
    pub result: Results,
    #[serde(default)]
    pub dashboard: Dashboard,
    #[serde(default)]
    pub hub: Hub,
    #[serde(default)]
    pub pruner: Pruner,
    #[serde(default)]
    pub scheduler: Scheduler,
    #[serde(default)]
    pub manual_approval_gate: ManualApproval,
    #[serde(default)]
    pub addon: Addon,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Param>,
    #[serde(default)]
    pub platforms: Platforms,
}

impl TektonConfigSpec {
    /// Fill profile, namespace and the per-component defaults
    pub fn set_defaults(&mut self, platform: Platform) {
        if self.profile.is_empty() {
            self.profile = PROFILE_BASIC.to_string();
        }
        if self.target_namespace.is_empty() {
            self.target_namespace = platform.default_target_namespace().to_string();
        }
        self.pipeline.set_defaults(platform);
        self.trigger.set_defaults(platform);
        self.pruner.set_defaults();
        if platform == Platform::OpenShift {
            let pac = self
                .platforms
                .openshift
                .pipelines_as_code
                .get_or_insert_with(PipelinesAsCode::default);
            pac.enable.get_or_insert(true);
        }
    }

    #[must_use]
    pub fn is_lite(&self) -> bool {
        self.profile == PROFILE_LITE
    }

    #[must_use]
    pub fn is_all(&self) -> bool {
        self.profile == PROFILE_ALL
    }

    /// `basic` and `all` share every satellite except the extras of `all`
    #[must_use]
    pub fn is_basic_or_all(&self) -> bool {
        self.profile == PROFILE_BASIC || self.profile == PROFILE_ALL
    }

    #[must_use]
    pub fn pac_enabled(&self) -> bool {
        self.platforms
            .openshift
            .pipelines_as_code
            .as_ref()
            .and_then(|pac| pac.enable)
            .unwrap_or(false)
    }
}
