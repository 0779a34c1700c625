//! Satellite CRs owned by the umbrella
//!
//! The umbrella renders one desired CR per satellite from its own spec and
//! converges it: created when missing, spec and owner refreshed otherwise.
//! The release-version label is only stamped at creation so the satellite's
//! own reconciler still sees an upgrade when the operator version moves.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::component::{TektonComponent, ADDON_CLUSTER_TASKS_PARAM, ADDON_PIPELINE_TEMPLATES_PARAM};
use crate::crd::{
    CommonSpec, ManualApprovalGate, ManualApprovalGateSpec, OpenShiftPipelinesAsCode,
    OpenShiftPipelinesAsCodeSpec, PacSettings, Param, TektonAddon, TektonAddonSpec, TektonChain,
    TektonChainSpec, TektonConfigSpec, TektonDashboard, TektonDashboardSpec, TektonHub,
    TektonHubSpec, TektonPipeline, TektonPipelineSpec, TektonPruner, TektonPrunerSpec,
    TektonResult, TektonResultSpec, TektonScheduler, TektonSchedulerSpec, TektonTrigger,
    TektonTriggerSpec,
};
use crate::labels::{self, RELEASE_VERSION_KEY};
use crate::store::{ObjectStore, StoreError};

use super::profile::Satellite;

/// Results deployments a multi-cluster hub does not run
pub const RESULTS_WATCHER: &str = "tekton-results-watcher";
pub const RESULTS_RETENTION_AGENT: &str = "tekton-results-retention-policy-agent";

/// Addon params the umbrella forwards to the addon CR
pub const ADDON_PARAMS: &[&str] = &[
    ADDON_CLUSTER_TASKS_PARAM,
    ADDON_PIPELINE_TEMPLATES_PARAM,
    "resolverTasks",
    "resolverStepActions",
    "communityResolverTasks",
];

/// Stores for every satellite kind
#[derive(Clone)]
pub struct SatelliteStores {
    pub pipeline: Arc<dyn ObjectStore<TektonPipeline>>,
    pub trigger: Arc<dyn ObjectStore<TektonTrigger>>,
    pub chain: Arc<dyn ObjectStore<TektonChain>>,
    pub result: Arc<dyn ObjectStore<TektonResult>>,
    pub dashboard: Arc<dyn ObjectStore<TektonDashboard>>,
    pub hub: Arc<dyn ObjectStore<TektonHub>>,
    pub pruner: Arc<dyn ObjectStore<TektonPruner>>,
    pub scheduler: Arc<dyn ObjectStore<TektonScheduler>>,
    pub approval: Arc<dyn ObjectStore<ManualApprovalGate>>,
    pub pac: Arc<dyn ObjectStore<OpenShiftPipelinesAsCode>>,
    pub addon: Arc<dyn ObjectStore<TektonAddon>>,
}

impl std::fmt::Debug for SatelliteStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SatelliteStores").finish_non_exhaustive()
    }
}

/// Readiness of a converged satellite
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SatelliteState {
    Ready,
    /// Not ready yet, with the reason reported on the umbrella
    Pending(String),
}

fn common(spec: &TektonConfigSpec) -> CommonSpec {
    CommonSpec {
        target_namespace: spec.target_namespace.clone(),
    }
}

#[must_use]
pub fn pipeline(spec: &TektonConfigSpec) -> TektonPipeline {
    TektonPipeline::new(
        TektonPipeline::DESCRIPTOR.resource_name,
        TektonPipelineSpec {
            common: common(spec),
            pipeline: spec.pipeline.clone(),
            config: spec.config.clone(),
        },
    )
}

#[must_use]
pub fn trigger(spec: &TektonConfigSpec) -> TektonTrigger {
    TektonTrigger::new(
        TektonTrigger::DESCRIPTOR.resource_name,
        TektonTriggerSpec {
            common: common(spec),
            trigger: spec.trigger.clone(),
            config: spec.config.clone(),
        },
    )
}

#[must_use]
pub fn chain(spec: &TektonConfigSpec) -> TektonChain {
    TektonChain::new(
        TektonChain::DESCRIPTOR.resource_name,
        TektonChainSpec {
            common: common(spec),
            chain: spec.chain.clone(),
            config: spec.config.clone(),
        },
    )
}

/// Results CR; a multi-cluster hub gets its watcher and retention agent
/// scaled to zero, any other role keeps the user's replicas
#[must_use]
pub fn result(spec: &TektonConfigSpec) -> TektonResult {
    let mut result = spec.result.clone();
    if spec.scheduler.is_multi_cluster_hub() {
        debug!("Multi-cluster hub, scaling down results watcher and retention agent");
        result.options.set_deployment_replicas(RESULTS_WATCHER, 0);
        result
            .options
            .set_deployment_replicas(RESULTS_RETENTION_AGENT, 0);
    }
    TektonResult::new(
        TektonResult::DESCRIPTOR.resource_name,
        TektonResultSpec {
            common: common(spec),
            result,
            config: spec.config.clone(),
        },
    )
}

#[must_use]
pub fn dashboard(spec: &TektonConfigSpec) -> TektonDashboard {
    TektonDashboard::new(
        TektonDashboard::DESCRIPTOR.resource_name,
        TektonDashboardSpec {
            common: common(spec),
            dashboard: spec.dashboard.clone(),
            config: spec.config.clone(),
        },
    )
}

#[must_use]
pub fn hub(spec: &TektonConfigSpec) -> TektonHub {
    TektonHub::new(
        TektonHub::DESCRIPTOR.resource_name,
        TektonHubSpec {
            common: common(spec),
            hub: spec.hub.clone(),
            config: spec.config.clone(),
        },
    )
}

#[must_use]
pub fn pruner(spec: &TektonConfigSpec) -> TektonPruner {
    TektonPruner::new(
        TektonPruner::DESCRIPTOR.resource_name,
        TektonPrunerSpec {
            common: common(spec),
            pruner: spec.pruner.clone(),
            config: spec.config.clone(),
        },
    )
}

#[must_use]
pub fn scheduler(spec: &TektonConfigSpec) -> TektonScheduler {
    TektonScheduler::new(
        TektonScheduler::DESCRIPTOR.resource_name,
        TektonSchedulerSpec {
            common: common(spec),
            scheduler: spec.scheduler.clone(),
            config: spec.config.clone(),
        },
    )
}

#[must_use]
pub fn approval_gate(spec: &TektonConfigSpec) -> ManualApprovalGate {
    ManualApprovalGate::new(
        ManualApprovalGate::DESCRIPTOR.resource_name,
        ManualApprovalGateSpec {
            common: common(spec),
            approval: spec.manual_approval_gate.clone(),
            config: spec.config.clone(),
        },
    )
}

#[must_use]
pub fn pipelines_as_code(spec: &TektonConfigSpec) -> OpenShiftPipelinesAsCode {
    let pac = spec
        .platforms
        .openshift
        .pipelines_as_code
        .clone()
        .unwrap_or_default();
    OpenShiftPipelinesAsCode::new(
        OpenShiftPipelinesAsCode::DESCRIPTOR.resource_name,
        OpenShiftPipelinesAsCodeSpec {
            common: common(spec),
            pac: PacSettings {
                settings: pac.settings,
                options: pac.options,
            },
            config: spec.config.clone(),
        },
    )
}

/// Addon CR carrying only the params the addon reconciler understands
#[must_use]
pub fn addon(spec: &TektonConfigSpec) -> TektonAddon {
    let mut addon = spec.addon.clone();
    addon.params = forward_addon_params(&spec.addon.params);
    addon.enable_pac = Some(spec.pac_enabled());
    TektonAddon::new(
        TektonAddon::DESCRIPTOR.resource_name,
        TektonAddonSpec {
            common: common(spec),
            addon,
            config: spec.config.clone(),
        },
    )
}

fn forward_addon_params(params: &[Param]) -> Vec<Param> {
    params
        .iter()
        .filter(|p| ADDON_PARAMS.contains(&p.name.as_str()))
        .cloned()
        .collect()
}

fn spec_of<K: TektonComponent>(cr: &K) -> Result<Value, StoreError> {
    Ok(serde_json::to_value(cr)?
        .get("spec")
        .cloned()
        .unwrap_or(Value::Null))
}

/// Create or refresh a satellite CR
///
/// # Errors
///
/// Returns any store failure.
pub async fn ensure<K: TektonComponent>(
    store: &dyn ObjectStore<K>,
    mut desired: K,
    owner: &OwnerReference,
    version: &str,
) -> Result<K, StoreError> {
    let name = K::DESCRIPTOR.resource_name;
    let Some(existing) = store.get(name).await? else {
        let meta = desired.meta_mut();
        meta.owner_references = Some(vec![owner.clone()]);
        labels::set_label(meta, RELEASE_VERSION_KEY, version);
        let created = store.create(&desired).await?;
        info!(kind = %K::kind(&()), name = %name, "Created satellite");
        return Ok(created);
    };

    let owned = existing
        .owner_references()
        .iter()
        .any(|r| r.uid == owner.uid);
    if owned && spec_of(&existing)? == spec_of(&desired)? {
        return Ok(existing);
    }

    let mut meta: ObjectMeta = existing.meta().clone();
    if !owned {
        meta.owner_references
            .get_or_insert_with(Vec::new)
            .push(owner.clone());
    }
    *desired.meta_mut() = meta;
    if let Some(status) = existing.component_status() {
        *desired.component_status_mut() = status.clone();
    }
    let updated = store.replace(&desired).await?;
    debug!(kind = %K::kind(&()), name = %name, "Updated satellite");
    Ok(updated)
}

/// Delete a satellite CR; absent ones are fine
///
/// # Errors
///
/// Returns any store failure other than not-found.
pub async fn delete<K: TektonComponent>(store: &dyn ObjectStore<K>) -> Result<bool, StoreError> {
    let name = K::DESCRIPTOR.resource_name;
    let deleted = store.delete(name).await?;
    if deleted {
        info!(kind = %K::kind(&()), name = %name, "Deleted satellite");
    }
    Ok(deleted)
}

/// Ready once the satellite reports `Ready=True` for the running version
#[must_use]
pub fn state_of<K: TektonComponent>(cr: &K, version: &str) -> SatelliteState {
    let kind = K::kind(&());
    match cr.component_status() {
        Some(status) if status.is_ready() && status.version.as_deref() == Some(version) => {
            SatelliteState::Ready
        }
        Some(status) if status.is_ready() => {
            SatelliteState::Pending(format!("{kind}: upgrade pending"))
        }
        _ => SatelliteState::Pending(format!("{kind}: reconcile again and proceed")),
    }
}

async fn converge<K: TektonComponent>(
    store: &dyn ObjectStore<K>,
    desired: K,
    owner: &OwnerReference,
    version: &str,
) -> Result<SatelliteState, StoreError> {
    let cr = ensure(store, desired, owner, version).await?;
    Ok(state_of(&cr, version))
}

impl SatelliteStores {
    /// Converge one satellite from the umbrella spec
    ///
    /// # Errors
    ///
    /// Returns any store failure.
    pub async fn ensure(
        &self,
        satellite: Satellite,
        spec: &TektonConfigSpec,
        owner: &OwnerReference,
        version: &str,
    ) -> Result<SatelliteState, StoreError> {
        match satellite {
            Satellite::Pipeline => converge(self.pipeline.as_ref(), pipeline(spec), owner, version).await,
            Satellite::Trigger => converge(self.trigger.as_ref(), trigger(spec), owner, version).await,
            Satellite::Chain => converge(self.chain.as_ref(), chain(spec), owner, version).await,
            Satellite::Result => converge(self.result.as_ref(), result(spec), owner, version).await,
            Satellite::Dashboard => converge(self.dashboard.as_ref(), dashboard(spec), owner, version).await,
            Satellite::Hub => converge(self.hub.as_ref(), hub(spec), owner, version).await,
            Satellite::Pruner => converge(self.pruner.as_ref(), pruner(spec), owner, version).await,
            Satellite::Scheduler => converge(self.scheduler.as_ref(), scheduler(spec), owner, version).await,
            Satellite::ManualApprovalGate => {
                converge(self.approval.as_ref(), approval_gate(spec), owner, version).await
            }
            Satellite::PipelinesAsCode => {
                converge(self.pac.as_ref(), pipelines_as_code(spec), owner, version).await
            }
            Satellite::Addon => converge(self.addon.as_ref(), addon(spec), owner, version).await,
        }
    }

    /// Delete one satellite
    ///
    /// # Errors
    ///
    /// Returns any store failure other than not-found.
    pub async fn delete(&self, satellite: Satellite) -> Result<bool, StoreError> {
        match satellite {
            Satellite::Pipeline => delete(self.pipeline.as_ref()).await,
            Satellite::Trigger => delete(self.trigger.as_ref()).await,
            Satellite::Chain => delete(self.chain.as_ref()).await,
            Satellite::Result => delete(self.result.as_ref()).await,
            Satellite::Dashboard => delete(self.dashboard.as_ref()).await,
            Satellite::Hub => delete(self.hub.as_ref()).await,
            Satellite::Pruner => delete(self.pruner.as_ref()).await,
            Satellite::Scheduler => delete(self.scheduler.as_ref()).await,
            Satellite::ManualApprovalGate => delete(self.approval.as_ref()).await,
            Satellite::PipelinesAsCode => delete(self.pac.as_ref()).await,
            Satellite::Addon => delete(self.addon.as_ref()).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::MultiClusterRole;

    #[test]
    fn test_multi_cluster_hub_scales_down_results_agents() {
        let mut spec = TektonConfigSpec::default();
        spec.scheduler.multi_cluster_disabled = false;
        spec.scheduler.multi_cluster_role = MultiClusterRole::Hub;
        let options = result(&spec).spec.result.options;
        assert_eq!(options.deployment_replicas(RESULTS_WATCHER), Some(0));
        assert_eq!(options.deployment_replicas(RESULTS_RETENTION_AGENT), Some(0));
    }

    #[test]
    fn test_spoke_keeps_user_replicas() {
        let mut spec = TektonConfigSpec::default();
        spec.scheduler.multi_cluster_disabled = false;
        spec.scheduler.multi_cluster_role = MultiClusterRole::Spoke;
        spec.result
            .options
            .set_deployment_replicas(RESULTS_WATCHER, 2);
        let options = result(&spec).spec.result.options;
        assert_eq!(options.deployment_replicas(RESULTS_WATCHER), Some(2));
        assert_eq!(options.deployment_replicas(RESULTS_RETENTION_AGENT), None);
    }

    #[test]
    fn test_disabled_multi_cluster_is_not_forced() {
        let mut spec = TektonConfigSpec::default();
        spec.scheduler.multi_cluster_role = MultiClusterRole::Hub;
        assert!(spec.scheduler.multi_cluster_disabled);
        let options = result(&spec).spec.result.options;
        assert_eq!(options.deployment_replicas(RESULTS_WATCHER), None);
    }

    #[test]
    fn test_addon_params_are_filtered() {
        let mut spec = TektonConfigSpec::default();
        spec.addon.params = vec![
            Param {
                name: ADDON_CLUSTER_TASKS_PARAM.to_string(),
                value: "false".to_string(),
            },
            Param {
                name: "unknownParam".to_string(),
                value: "x".to_string(),
            },
        ];
        let addon = addon(&spec);
        assert_eq!(addon.spec.addon.params.len(), 1);
        assert_eq!(addon.spec.addon.params[0].name, ADDON_CLUSTER_TASKS_PARAM);
        assert_eq!(addon.spec.addon.enable_pac, Some(false));
        assert_eq!(addon.name_any(), "addon");
    }

    #[test]
    fn test_satellites_inherit_target_namespace() {
        let spec = TektonConfigSpec {
            target_namespace: "ci".to_string(),
            ..TektonConfigSpec::default()
        };
        assert_eq!(trigger(&spec).spec.common.target_namespace, "ci");
        assert_eq!(pipeline(&spec).name_any(), "pipeline");
    }
}
