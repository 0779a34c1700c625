//! # Component Resources
//!
//! One cluster-scoped custom resource per installable component. Every spec
//! carries the target namespace; the rest is kind-specific and mostly ends up
//! as ConfigMap data inside the rendered payload.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::options::{AdditionalOptions, Config, Param};
use super::status::ComponentStatus;
use crate::config::Platform;

/// Fields shared by every component spec
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommonSpec {
    /// Namespace the component workloads are installed into
    #[serde(default)]
    pub target_namespace: String,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// `feature-flags` ConfigMap keys
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
pub struct PipelineFeatureFlags {
    #[serde(rename = "disable-affinity-assistant", default, skip_serializing_if = "Option::is_none")]
    pub disable_affinity_assistant: Option<bool>,
    #[serde(rename = "disable-creds-init", default, skip_serializing_if = "Option::is_none")]
    pub disable_creds_init: Option<bool>,
    #[serde(rename = "await-sidecar-readiness", default, skip_serializing_if = "Option::is_none")]
    pub await_sidecar_readiness: Option<bool>,
    #[serde(
        rename = "running-in-environment-with-injected-sidecars",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub running_in_environment_with_injected_sidecars: Option<bool>,
    #[serde(
        rename = "require-git-ssh-secret-known-hosts",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub require_git_ssh_secret_known_hosts: Option<bool>,
    #[serde(rename = "enable-custom-tasks", default, skip_serializing_if = "Option::is_none")]
    pub enable_custom_tasks: Option<bool>,
    #[serde(rename = "enable-api-fields", default, skip_serializing_if = "Option::is_none")]
    pub enable_api_fields: Option<String>,
    #[serde(rename = "send-cloudevents-for-runs", default, skip_serializing_if = "Option::is_none")]
    pub send_cloudevents_for_runs: Option<bool>,
    #[serde(
        rename = "trusted-resources-verification-no-match-policy",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub verification_no_match_policy: Option<String>,
    #[serde(rename = "enable-provenance-in-status", default, skip_serializing_if = "Option::is_none")]
    pub enable_provenance_in_status: Option<bool>,
    #[serde(rename = "enforce-nonfalsifiability", default, skip_serializing_if = "Option::is_none")]
    pub enforce_nonfalsifiability: Option<String>,
    #[serde(rename = "keep-pod-on-cancel", default, skip_serializing_if = "Option::is_none")]
    pub keep_pod_on_cancel: Option<bool>,
    #[serde(rename = "results-from", default, skip_serializing_if = "Option::is_none")]
    pub results_from: Option<String>,
    #[serde(rename = "max-result-size", default, skip_serializing_if = "Option::is_none")]
    pub max_result_size: Option<i32>,
    #[serde(rename = "set-security-context", default, skip_serializing_if = "Option::is_none")]
    pub set_security_context: Option<bool>,
    #[serde(rename = "coschedule", default, skip_serializing_if = "Option::is_none")]
    pub coschedule: Option<String>,
    #[serde(rename = "enable-cel-in-whenexpression", default, skip_serializing_if = "Option::is_none")]
    pub enable_cel_in_whenexpression: Option<bool>,
    #[serde(rename = "enable-step-actions", default, skip_serializing_if = "Option::is_none")]
    pub enable_step_actions: Option<bool>,
    #[serde(rename = "enable-param-enum", default, skip_serializing_if = "Option::is_none")]
    pub enable_param_enum: Option<bool>,
    #[serde(rename = "disable-inline-spec", default, skip_serializing_if = "Option::is_none")]
    pub disable_inline_spec: Option<String>,
}

/// `config-observability` ConfigMap keys
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
pub struct PipelineMetricsProperties {
    #[serde(rename = "metrics.taskrun.level", default, skip_serializing_if = "Option::is_none")]
    pub taskrun_level: Option<String>,
    #[serde(rename = "metrics.taskrun.duration-type", default, skip_serializing_if = "Option::is_none")]
    pub taskrun_duration_type: Option<String>,
    #[serde(rename = "metrics.pipelinerun.level", default, skip_serializing_if = "Option::is_none")]
    pub pipelinerun_level: Option<String>,
    #[serde(
        rename = "metrics.pipelinerun.duration-type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub pipelinerun_duration_type: Option<String>,
    #[serde(rename = "metrics.count.enable-reason", default, skip_serializing_if = "Option::is_none")]
    pub count_with_reason: Option<bool>,
}

/// `config-defaults` ConfigMap keys, only written when set
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
pub struct OptionalPipelineProperties {
    #[serde(rename = "default-timeout-minutes", default, skip_serializing_if = "Option::is_none")]
    pub default_timeout_minutes: Option<u32>,
    #[serde(rename = "default-service-account", default, skip_serializing_if = "Option::is_none")]
    pub default_service_account: Option<String>,
    #[serde(
        rename = "default-managed-by-label-value",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub default_managed_by_label_value: Option<String>,
    #[serde(rename = "default-pod-template", default, skip_serializing_if = "Option::is_none")]
    pub default_pod_template: Option<String>,
    #[serde(rename = "default-cloud-events-sink", default, skip_serializing_if = "Option::is_none")]
    pub default_cloud_events_sink: Option<String>,
    #[serde(rename = "default-resolver-type", default, skip_serializing_if = "Option::is_none")]
    pub default_resolver_type: Option<String>,
}

/// `resolvers-feature-flags` keys plus the per-resolver ConfigMaps
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
pub struct Resolvers {
    #[serde(rename = "enable-bundles-resolver", default, skip_serializing_if = "Option::is_none")]
    pub enable_bundles_resolver: Option<bool>,
    #[serde(rename = "enable-hub-resolver", default, skip_serializing_if = "Option::is_none")]
    pub enable_hub_resolver: Option<bool>,
    #[serde(rename = "enable-git-resolver", default, skip_serializing_if = "Option::is_none")]
    pub enable_git_resolver: Option<bool>,
    #[serde(rename = "enable-cluster-resolver", default, skip_serializing_if = "Option::is_none")]
    pub enable_cluster_resolver: Option<bool>,
    #[serde(rename = "bundles-resolver-config", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bundles_resolver_config: BTreeMap<String, String>,
    #[serde(rename = "hub-resolver-config", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hub_resolver_config: BTreeMap<String, String>,
    #[serde(rename = "git-resolver-config", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub git_resolver_config: BTreeMap<String, String>,
    #[serde(rename = "cluster-resolver-config", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cluster_resolver_config: BTreeMap<String, String>,
}

impl Resolvers {
    /// Only the `enable-*` switches, which go to `resolvers-feature-flags`
    #[must_use]
    pub fn feature_flags(&self) -> Resolvers {
        Resolvers {
            enable_bundles_resolver: self.enable_bundles_resolver,
            enable_hub_resolver: self.enable_hub_resolver,
            enable_git_resolver: self.enable_git_resolver,
            enable_cluster_resolver: self.enable_cluster_resolver,
            ..Resolvers::default()
        }
    }
}

/// Customisable pipeline engine settings, shared with the umbrella spec
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    #[serde(flatten)]
    pub feature_flags: PipelineFeatureFlags,
    #[serde(flatten)]
    pub metrics: PipelineMetricsProperties,
    #[serde(flatten)]
    pub defaults: OptionalPipelineProperties,
    #[serde(flatten)]
    pub resolvers: Resolvers,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Param>,
    #[serde(default)]
    pub options: AdditionalOptions,
}

const ENABLE_METRICS_PARAM: &str = "enableMetrics";

impl Pipeline {
    /// Fill unset flags with the upstream defaults
    pub fn set_defaults(&mut self, platform: Platform) {
        let flags = &mut self.feature_flags;
        flags.disable_creds_init.get_or_insert(false);
        flags.await_sidecar_readiness.get_or_insert(true);
        flags
            .running_in_environment_with_injected_sidecars
            .get_or_insert(true);
        flags.require_git_ssh_secret_known_hosts.get_or_insert(false);
        flags.enable_custom_tasks.get_or_insert(true);
        flags.send_cloudevents_for_runs.get_or_insert(false);
        flags
            .enable_api_fields
            .get_or_insert_with(|| "beta".to_string());
        flags
            .verification_no_match_policy
            .get_or_insert_with(|| "ignore".to_string());
        flags.enable_provenance_in_status.get_or_insert(true);

        let metrics = &mut self.metrics;
        metrics
            .pipelinerun_duration_type
            .get_or_insert_with(|| "histogram".to_string());
        metrics
            .pipelinerun_level
            .get_or_insert_with(|| "pipeline".to_string());
        metrics
            .taskrun_duration_type
            .get_or_insert_with(|| "histogram".to_string());
        metrics
            .taskrun_level
            .get_or_insert_with(|| "task".to_string());

        let resolvers = &mut self.resolvers;
        resolvers.enable_bundles_resolver.get_or_insert(true);
        resolvers.enable_cluster_resolver.get_or_insert(true);
        resolvers.enable_hub_resolver.get_or_insert(true);
        resolvers.enable_git_resolver.get_or_insert(true);

        if platform == Platform::OpenShift {
            self.defaults
                .default_service_account
                .get_or_insert_with(|| "pipeline".to_string());
            self.feature_flags
                .disable_affinity_assistant
                .get_or_insert(true);
            match self.params.iter_mut().find(|p| p.name == ENABLE_METRICS_PARAM) {
                Some(param) if param.value != "true" && param.value != "false" => {
                    param.value = "true".to_string();
                }
                Some(_) => {}
                None => self.params.push(Param {
                    name: ENABLE_METRICS_PARAM.to_string(),
                    value: "true".to_string(),
                }),
            }
        }
    }
}

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[kube(
    group = "operator.tekton.dev",
    version = "v1alpha1",
    kind = "TektonPipeline",
    plural = "tektonpipelines",
    status = "ComponentStatus",
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".status.version"}"#,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Reason", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].reason"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TektonPipelineSpec {
    #[serde(flatten)]
    pub common: CommonSpec,
    #[serde(flatten)]
    pub pipeline: Pipeline,
    #[serde(default)]
    pub config: Config,
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// `feature-flags-triggers` and `config-defaults-triggers` keys
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
pub struct TriggersProperties {
    #[serde(rename = "enable-api-fields", default, skip_serializing_if = "Option::is_none")]
    pub enable_api_fields: Option<String>,
    #[serde(rename = "default-service-account", default, skip_serializing_if = "Option::is_none")]
    pub default_service_account: Option<String>,
}

/// Customisable trigger engine settings
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    #[serde(flatten)]
    pub properties: TriggersProperties,
    #[serde(default)]
    pub options: AdditionalOptions,
}

impl Trigger {
    pub fn set_defaults(&mut self, platform: Platform) {
        self.properties
            .enable_api_fields
            .get_or_insert_with(|| "stable".to_string());
        if platform == Platform::OpenShift {
            self.properties
                .default_service_account
                .get_or_insert_with(|| "pipeline".to_string());
        }
    }
}

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[kube(
    group = "operator.tekton.dev",
    version = "v1alpha1",
    kind = "TektonTrigger",
    plural = "tektontriggers",
    status = "ComponentStatus",
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".status.version"}"#,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TektonTriggerSpec {
    #[serde(flatten)]
    pub common: CommonSpec,
    #[serde(flatten)]
    pub trigger: Trigger,
    #[serde(default)]
    pub config: Config,
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// `chains-config` ConfigMap keys
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
pub struct ChainProperties {
    #[serde(rename = "artifacts.taskrun.format", default, skip_serializing_if = "Option::is_none")]
    pub artifacts_taskrun_format: Option<String>,
    #[serde(rename = "artifacts.taskrun.storage", default, skip_serializing_if = "Option::is_none")]
    pub artifacts_taskrun_storage: Option<String>,
    #[serde(rename = "artifacts.taskrun.signer", default, skip_serializing_if = "Option::is_none")]
    pub artifacts_taskrun_signer: Option<String>,
    #[serde(rename = "artifacts.pipelinerun.format", default, skip_serializing_if = "Option::is_none")]
    pub artifacts_pipelinerun_format: Option<String>,
    #[serde(rename = "artifacts.pipelinerun.storage", default, skip_serializing_if = "Option::is_none")]
    pub artifacts_pipelinerun_storage: Option<String>,
    #[serde(rename = "artifacts.pipelinerun.signer", default, skip_serializing_if = "Option::is_none")]
    pub artifacts_pipelinerun_signer: Option<String>,
    #[serde(rename = "artifacts.oci.format", default, skip_serializing_if = "Option::is_none")]
    pub artifacts_oci_format: Option<String>,
    #[serde(rename = "artifacts.oci.storage", default, skip_serializing_if = "Option::is_none")]
    pub artifacts_oci_storage: Option<String>,
    #[serde(rename = "artifacts.oci.signer", default, skip_serializing_if = "Option::is_none")]
    pub artifacts_oci_signer: Option<String>,
    #[serde(rename = "storage.oci.repository", default, skip_serializing_if = "Option::is_none")]
    pub storage_oci_repository: Option<String>,
    #[serde(rename = "builder.id", default, skip_serializing_if = "Option::is_none")]
    pub builder_id: Option<String>,
    #[serde(rename = "transparency.enabled", default, skip_serializing_if = "Option::is_none")]
    pub transparency_enabled: Option<String>,
    #[serde(rename = "transparency.url", default, skip_serializing_if = "Option::is_none")]
    pub transparency_url: Option<String>,
}

/// Customisable chains settings
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Chain {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(flatten)]
    pub properties: ChainProperties,
    #[serde(default)]
    pub options: AdditionalOptions,
}

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[kube(
    group = "operator.tekton.dev",
    version = "v1alpha1",
    kind = "TektonChain",
    plural = "tektonchains",
    status = "ComponentStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TektonChainSpec {
    #[serde(flatten)]
    pub common: CommonSpec,
    #[serde(flatten)]
    pub chain: Chain,
    #[serde(default)]
    pub config: Config,
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// `tekton-results-api-config` keys
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
pub struct ResultsApiProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_port: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_sslmode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_enable_auto_migration: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_port: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_api: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_disable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
}

/// Customisable results settings
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Results {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(default)]
    pub is_external_db: bool,
    #[serde(flatten)]
    pub properties: ResultsApiProperties,
    #[serde(default)]
    pub options: AdditionalOptions,
}

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[kube(
    group = "operator.tekton.dev",
    version = "v1alpha1",
    kind = "TektonResult",
    plural = "tektonresults",
    status = "ComponentStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TektonResultSpec {
    #[serde(flatten)]
    pub common: CommonSpec,
    #[serde(flatten)]
    pub result: Results,
    #[serde(default)]
    pub config: Config,
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    /// Install the read-only payload variant
    #[serde(default)]
    pub readonly: bool,
    #[serde(default)]
    pub options: AdditionalOptions,
}

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[kube(
    group = "operator.tekton.dev",
    version = "v1alpha1",
    kind = "TektonDashboard",
    plural = "tektondashboards",
    status = "ComponentStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TektonDashboardSpec {
    #[serde(flatten)]
    pub common: CommonSpec,
    #[serde(flatten)]
    pub dashboard: Dashboard,
    #[serde(default)]
    pub config: Config,
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HubDb {
    #[serde(rename = "secret", default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HubApi {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hub_config_url: Option<String>,
    #[serde(rename = "secret", default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_host_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_refresh_interval: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Hub {
    /// Hub is opt-in on the umbrella
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Param>,
    #[serde(default)]
    pub db: HubDb,
    #[serde(default)]
    pub api: HubApi,
    #[serde(default)]
    pub options: AdditionalOptions,
}

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[kube(
    group = "operator.tekton.dev",
    version = "v1alpha1",
    kind = "TektonHub",
    plural = "tektonhubs",
    status = "ComponentStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TektonHubSpec {
    #[serde(flatten)]
    pub common: CommonSpec,
    #[serde(flatten)]
    pub hub: Hub,
    #[serde(default)]
    pub config: Config,
}

// ---------------------------------------------------------------------------
// Pruner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pruner {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    /// Resources to prune (pipelinerun, taskrun)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep: Option<u32>,
    #[serde(rename = "keep-since", default, skip_serializing_if = "Option::is_none")]
    pub keep_since: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default)]
    pub options: AdditionalOptions,
}

impl Pruner {
    pub fn set_defaults(&mut self) {
        if self.resources.is_empty() {
            self.resources = vec!["pipelinerun".to_string()];
        }
        if self.keep.is_none() && self.keep_since.is_none() {
            self.keep = Some(100);
        }
        self.schedule.get_or_insert_with(|| "0 8 * * *".to_string());
    }
}

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[kube(
    group = "operator.tekton.dev",
    version = "v1alpha1",
    kind = "TektonPruner",
    plural = "tektonpruners",
    status = "ComponentStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TektonPrunerSpec {
    #[serde(flatten)]
    pub common: CommonSpec,
    #[serde(flatten)]
    pub pruner: Pruner,
    #[serde(default)]
    pub config: Config,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Role of this cluster in a multi-cluster setup
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq, JsonSchema)]
pub enum MultiClusterRole {
    Hub,
    #[default]
    Spoke,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Scheduler {
    /// Scheduler is opt-in on the umbrella
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(rename = "multi-cluster-disabled", default = "default_true")]
    pub multi_cluster_disabled: bool,
    #[serde(rename = "multi-cluster-role", default)]
    pub multi_cluster_role: MultiClusterRole,
    #[serde(default)]
    pub options: AdditionalOptions,
}

fn default_true() -> bool {
    true
}

impl Scheduler {
    /// Multi-cluster enabled with this cluster acting as the hub
    #[must_use]
    pub fn is_multi_cluster_hub(&self) -> bool {
        !self.multi_cluster_disabled && self.multi_cluster_role == MultiClusterRole::Hub
    }
}

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[kube(
    group = "operator.tekton.dev",
    version = "v1alpha1",
    kind = "TektonScheduler",
    plural = "tektonschedulers",
    status = "ComponentStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TektonSchedulerSpec {
    #[serde(flatten)]
    pub common: CommonSpec,
    #[serde(flatten)]
    pub scheduler: Scheduler,
    #[serde(default)]
    pub config: Config,
}

// ---------------------------------------------------------------------------
// Manual approval gate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManualApproval {
    /// Approval gate is opt-in on the umbrella
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(default)]
    pub options: AdditionalOptions,
}

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[kube(
    group = "operator.tekton.dev",
    version = "v1alpha1",
    kind = "ManualApprovalGate",
    plural = "manualapprovalgates",
    status = "ComponentStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ManualApprovalGateSpec {
    #[serde(flatten)]
    pub common: CommonSpec,
    #[serde(flatten)]
    pub approval: ManualApproval,
    #[serde(default)]
    pub config: Config,
}

// ---------------------------------------------------------------------------
// Pipelines as code
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PacSettings {
    /// `pipelines-as-code` ConfigMap data
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub settings: BTreeMap<String, String>,
    #[serde(default)]
    pub options: AdditionalOptions,
}

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[kube(
    group = "operator.tekton.dev",
    version = "v1alpha1",
    kind = "OpenShiftPipelinesAsCode",
    plural = "openshiftpipelinesascodes",
    status = "ComponentStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct OpenShiftPipelinesAsCodeSpec {
    #[serde(flatten)]
    pub common: CommonSpec,
    #[serde(flatten)]
    pub pac: PacSettings,
    #[serde(default)]
    pub config: Config,
}

// ---------------------------------------------------------------------------
// Addon
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Addon {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Param>,
    #[serde(
        rename = "enablePipelinesAsCode",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub enable_pac: Option<bool>,
    #[serde(default)]
    pub options: AdditionalOptions,
}

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[kube(
    group = "operator.tekton.dev",
    version = "v1alpha1",
    kind = "TektonAddon",
    plural = "tektonaddons",
    status = "ComponentStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TektonAddonSpec {
    #[serde(flatten)]
    pub common: CommonSpec,
    #[serde(flatten)]
    pub addon: Addon,
    #[serde(default)]
    pub config: Config,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pipeline_spec_flattens_flags() {
        let spec: TektonPipelineSpec = serde_json::from_value(json!({
            "targetNamespace": "tekton-pipelines",
            "enable-api-fields": "alpha",
            "metrics.taskrun.level": "namespace",
            "enable-git-resolver": false,
            "git-resolver-config": {"fetch-timeout": "1m"}
        }))
        .unwrap();
        assert_eq!(spec.common.target_namespace, "tekton-pipelines");
        assert_eq!(
            spec.pipeline.feature_flags.enable_api_fields.as_deref(),
            Some("alpha")
        );
        assert_eq!(
            spec.pipeline.metrics.taskrun_level.as_deref(),
            Some("namespace")
        );
        assert_eq!(spec.pipeline.resolvers.enable_git_resolver, Some(false));
        assert_eq!(
            spec.pipeline.resolvers.git_resolver_config.get("fetch-timeout"),
            Some(&"1m".to_string())
        );
    }

    #[test]
    fn test_pipeline_defaults_keep_user_values() {
        let mut pipeline = Pipeline::default();
        pipeline.feature_flags.enable_api_fields = Some("alpha".to_string());
        pipeline.set_defaults(Platform::Kubernetes);
        assert_eq!(pipeline.feature_flags.enable_api_fields.as_deref(), Some("alpha"));
        assert_eq!(pipeline.feature_flags.await_sidecar_readiness, Some(true));
        assert_eq!(pipeline.resolvers.enable_hub_resolver, Some(true));
        assert_eq!(pipeline.metrics.taskrun_level.as_deref(), Some("task"));
        assert!(pipeline.defaults.default_service_account.is_none());
    }

    #[test]
    fn test_pipeline_openshift_defaults() {
        let mut pipeline = Pipeline::default();
        pipeline.params.push(Param {
            name: "enableMetrics".to_string(),
            value: "maybe".to_string(),
        });
        pipeline.set_defaults(Platform::OpenShift);
        assert_eq!(
            pipeline.defaults.default_service_account.as_deref(),
            Some("pipeline")
        );
        assert_eq!(pipeline.feature_flags.disable_affinity_assistant, Some(true));
        assert_eq!(pipeline.params[0].value, "true");
    }

    #[test]
    fn test_trigger_defaults() {
        let mut trigger = Trigger::default();
        trigger.set_defaults(Platform::Kubernetes);
        assert_eq!(trigger.properties.enable_api_fields.as_deref(), Some("stable"));
    }

    #[test]
    fn test_resolver_feature_flags_drop_configs() {
        let mut resolvers = Resolvers {
            enable_git_resolver: Some(true),
            ..Resolvers::default()
        };
        resolvers
            .git_resolver_config
            .insert("a".to_string(), "b".to_string());
        let flags = resolvers.feature_flags();
        assert!(flags.git_resolver_config.is_empty());
        assert_eq!(flags.enable_git_resolver, Some(true));
    }

    #[test]
    fn test_scheduler_hub_detection() {
        let mut scheduler: Scheduler = serde_json::from_value(json!({})).unwrap();
        assert!(scheduler.multi_cluster_disabled);
        assert!(!scheduler.is_multi_cluster_hub());
        scheduler.multi_cluster_disabled = false;
        scheduler.multi_cluster_role = MultiClusterRole::Hub;
        assert!(scheduler.is_multi_cluster_hub());
    }

    #[test]
    fn test_pruner_defaults() {
        let mut pruner = Pruner::default();
        pruner.set_defaults();
        assert_eq!(pruner.resources, vec!["pipelinerun".to_string()]);
        assert_eq!(pruner.keep, Some(100));
    }
}
