//! # Custom Resource Definitions
//!
//! CRD types served by the operator under `operator.tekton.dev/v1alpha1`.
//!
//! ## Module Structure
//!
//! - `components.rs` - One resource per installable component
//! - `tekton_config.rs` - The umbrella resource selecting a profile
//! - `installer_set.rs` - Bundles of rendered manifests
//! - `options.rs` - Spec blocks shared by every component
//! - `status.rs` - Conditions and the readiness lattice

mod components;
mod installer_set;
mod options;
pub mod status;
mod tekton_config;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;

pub use components::{
    Addon, Chain, ChainProperties, CommonSpec, Dashboard, Hub, HubApi, HubDb, ManualApproval,
    ManualApprovalGate, ManualApprovalGateSpec, MultiClusterRole, OpenShiftPipelinesAsCode,
    OpenShiftPipelinesAsCodeSpec, OptionalPipelineProperties, PacSettings, Pipeline,
    PipelineFeatureFlags, PipelineMetricsProperties, Pruner, Results, ResultsApiProperties,
    Resolvers, Scheduler, TektonAddon, TektonAddonSpec, TektonChain, TektonChainSpec,
    TektonDashboard, TektonDashboardSpec, TektonHub, TektonHubSpec, TektonPipeline,
    TektonPipelineSpec, TektonPruner, TektonPrunerSpec, TektonResult, TektonResultSpec,
    TektonScheduler, TektonSchedulerSpec, TektonTrigger, TektonTriggerSpec, Trigger,
    TriggersProperties,
};
pub use installer_set::{TektonInstallerSet, TektonInstallerSetSpec};
pub use options::{
    param_value, preserve_unknown_fields, preserve_unknown_list, AdditionalOptions,
    ContainerOverride, Config, DeploymentOverride, HighAvailability, Param,
};
pub use status::{ComponentStatus, Condition, ConfigStatus, InstallerSetStatus};
pub use tekton_config::{
    OpenShift, PipelinesAsCode, Platforms, Scc, TektonConfig, TektonConfigSpec, PROFILE_ALL,
    PROFILE_BASIC, PROFILE_LITE,
};

/// Every CRD the operator serves, umbrella first
#[must_use]
pub fn all() -> Vec<CustomResourceDefinition> {
    vec![
        TektonConfig::crd(),
        TektonPipeline::crd(),
        TektonTrigger::crd(),
        TektonChain::crd(),
        TektonResult::crd(),
        TektonDashboard::crd(),
        TektonHub::crd(),
        TektonPruner::crd(),
        TektonScheduler::crd(),
        ManualApprovalGate::crd(),
        OpenShiftPipelinesAsCode::crd(),
        TektonAddon::crd(),
        TektonInstallerSet::crd(),
    ]
}
