//! # Component Reconciler
//!
//! One driver shared by every component kind. A kind plugs in through
//! [`TektonComponent`]: its payload directory, the transformers it adds and
//! any installer sets beyond the main pair. Everything else is identical
//! across kinds.
//!
//! ## Reconcile Flow
//!
//! 1. Initialise conditions, version and observed generation
//! 2. Ignore CRs not carrying the singleton name of the kind
//! 3. Ensure the target namespace exists
//! 4. Apply spec defaults
//! 5. Stamp the release version label, flagging an upgrade when it changed
//! 6. Delete installer sets of obsolete types
//! 7. Wait for the pipeline engine and required APIs
//! 8. Extension pre-reconcile, then `pre` sets
//! 9. Main installer sets, then `post`, custom and versioned sets
//! 10. Extension post-reconcile
//!
//! Hook failures end up as conditions on the CR and the pass returns
//! [`ReconcileOutcome::Done`]; only store and rendering failures are errors.

mod finalize;
mod kinds;

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::core::ClusterResourceScope;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

use crate::config::{OperatorConfig, Platform};
use crate::crd::status::UPGRADE_PENDING;
use crate::crd::{AdditionalOptions, ComponentStatus, Config, TektonPipeline};
use crate::dependency::{self, DependencyError};
use crate::extension::Extension;
use crate::installerset::{InstallerSetClient, InstallerSetError, SetOwner};
use crate::labels::{self, custom_type, MetadataContract, RELEASE_VERSION_KEY, TYPE_POST, TYPE_PRE};
use crate::manifest::options::apply_additional_options;
use crate::manifest::payload::PayloadCache;
use crate::manifest::{filter, transform, Manifest, ManifestError, Predicate, Transformer};
use crate::namespace::{self, NamespaceState};
use crate::outcome::ReconcileOutcome;
use crate::store::{ClusterApi, ObjectStore, StoreError};

pub use finalize::finalize;
pub use kinds::{
    ADDON_CLUSTER_TASKS_PARAM, ADDON_PIPELINE_TEMPLATES_PARAM, RESULTS_API_CONFIG,
    RESULTS_POSTGRES_SERVICE, RESULTS_POSTGRES_STATEFULSET,
};

/// Static facts about a component kind
#[derive(Debug, Clone, Copy)]
pub struct ComponentDescriptor {
    /// The only CR name the kind reconciles
    pub resource_name: &'static str,
    /// Payload directory under `KO_DATA_PATH`; `None` when the kind has no main sets
    pub payload_dir: Option<&'static str>,
    /// Value of the operand name label
    pub operand: &'static str,
    /// `IMAGE_*` prefix of the image overrides
    pub image_prefix: &'static str,
    /// Installer set types written by earlier operator versions
    pub obsolete_types: &'static [&'static str],
    /// Waits for the pipeline engine CR to be ready
    pub needs_pipeline: bool,
    /// `group/version` that discovery must serve
    pub required_api: Option<&'static str>,
}

/// Where an extra installer set goes in the reconcile flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// `pre` set, before the main sets
    Pre,
    /// `post` set, after the main sets
    Post,
    /// `custom-<suffix>` set, after the main sets
    Custom(&'static str),
    /// `custom-<suffix>` set retained per `X.Y` version
    Versioned {
        suffix: &'static str,
        name_prefix: &'static str,
    },
}

impl Placement {
    fn set_type(&self) -> String {
        match self {
            Placement::Pre => TYPE_PRE.to_string(),
            Placement::Post => TYPE_POST.to_string(),
            Placement::Custom(suffix) | Placement::Versioned { suffix, .. } => custom_type(suffix),
        }
    }
}

/// An installer set beyond the main pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraSet {
    pub placement: Placement,
    pub payload_dir: &'static str,
    /// Disabled sets are deleted instead of applied
    pub enabled: bool,
}

/// A component CR the generic driver can reconcile
pub trait TektonComponent:
    Resource<DynamicType = (), Scope = ClusterResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    const DESCRIPTOR: ComponentDescriptor;

    fn target_namespace(&self) -> &str;

    fn set_target_namespace(&mut self, namespace: &str);

    fn component_status(&self) -> Option<&ComponentStatus>;

    /// Status, created empty when absent
    fn component_status_mut(&mut self) -> &mut ComponentStatus;

    fn options(&self) -> &AdditionalOptions;

    fn config(&self) -> &Config;

    /// Fill unset spec fields with the kind defaults
    fn set_defaults(&mut self, _platform: Platform) {}

    /// Payload of the main sets; kinds with spec-dependent payloads override it
    fn payload_dir(&self) -> Option<&'static str> {
        Self::DESCRIPTOR.payload_dir
    }

    /// Kind-specific transformers, run after the extension ones
    fn transformers(&self, _config: &OperatorConfig) -> Vec<Transformer> {
        Vec::new()
    }

    /// Objects dropped from the main payload before rendering
    fn prune(&self) -> Option<Predicate> {
        None
    }

    fn extra_sets(&self) -> Vec<ExtraSet> {
        Vec::new()
    }
}

/// Kind name of a component type
#[must_use]
pub fn kind_of<K: TektonComponent>() -> String {
    K::kind(&()).to_string()
}

/// Errors that end a component reconcile pass
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    #[error(transparent)]
    InstallerSet(#[from] InstallerSetError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Dependency(#[from] DependencyError),
}

/// Everything a component reconciler reads or writes
pub struct ComponentContext<K: TektonComponent> {
    pub store: Arc<dyn ObjectStore<K>>,
    pub installer_sets: InstallerSetClient,
    pub pipelines: Arc<dyn ObjectStore<TektonPipeline>>,
    pub namespaces: Arc<dyn ObjectStore<Namespace>>,
    pub crds: Arc<dyn ObjectStore<CustomResourceDefinition>>,
    pub cluster: Arc<dyn ClusterApi>,
    pub payloads: Arc<PayloadCache>,
    pub extension: Arc<dyn Extension<K>>,
    pub config: Arc<OperatorConfig>,
}

impl<K: TektonComponent> Debug for ComponentContext<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentContext")
            .field("kind", &kind_of::<K>())
            .field("installer_sets", &self.installer_sets)
            .finish_non_exhaustive()
    }
}

/// Run one reconcile pass, updating `cr.status` in place
///
/// The caller persists the status whatever the result.
///
/// # Errors
///
/// Returns store, rendering and fatal dependency failures. Hook failures and
/// installer sets reporting `Ready=False` are recorded as conditions instead.
pub async fn reconcile<K: TektonComponent>(
    cr: &mut K,
    ctx: &ComponentContext<K>,
) -> Result<ReconcileOutcome, ComponentError> {
    let span = tracing::info_span!(
        "controller.component.reconcile",
        resource.kind = %kind_of::<K>(),
        resource.name = %cr.name_any()
    );
    run(cr, ctx).instrument(span).await
}

async fn run<K: TektonComponent>(
    cr: &mut K,
    ctx: &ComponentContext<K>,
) -> Result<ReconcileOutcome, ComponentError> {
    let descriptor = K::DESCRIPTOR;
    let kind = kind_of::<K>();
    let requeue = ctx.config.requeue_after();

    let generation = cr.meta().generation;
    let status = cr.component_status_mut();
    status.initialize_conditions();
    status.observed_generation = generation;
    status.version = Some(ctx.config.version.clone());

    let name = cr.name_any();
    if name != descriptor.resource_name {
        warn!(expected = %descriptor.resource_name, actual = %name, "Invalid resource name, ignoring");
        cr.component_status_mut()
            .mark_ignored(descriptor.resource_name, &name);
        return Ok(ReconcileOutcome::Done);
    }

    if cr.target_namespace().is_empty() {
        cr.set_target_namespace(ctx.config.platform.default_target_namespace());
    }
    let target = cr.target_namespace().to_string();
    if namespace::ensure(ctx.namespaces.as_ref(), &target, None).await? == NamespaceState::Terminating {
        info!(namespace = %target, "Target namespace is terminating, waiting");
        return Ok(ReconcileOutcome::Requeue(requeue));
    }

    cr.set_defaults(ctx.config.platform);

    if let Some(outcome) = stamp_release_version(cr, ctx).await? {
        return Ok(outcome);
    }

    debug!("Removing obsolete installer sets");
    ctx.installer_sets
        .remove_obsolete(descriptor.obsolete_types)
        .await?;

    if let Some(outcome) = check_dependencies(cr, ctx, &kind).await? {
        return Ok(outcome);
    }
    cr.component_status_mut().mark_dependencies_installed();

    match ctx.extension.pre_reconcile(cr).await {
        Ok(ReconcileOutcome::Done) => {}
        Ok(outcome) => return Ok(outcome),
        Err(e) => {
            warn!(error = %e, "Pre-reconciliation failed");
            cr.component_status_mut()
                .mark_pre_reconciler_failed(&e.to_string());
            return Ok(ReconcileOutcome::Done);
        }
    }

    let owner = SetOwner::from_resource(&*cr, &target)?;
    let extras = cr.extra_sets();

    for extra in extras.iter().filter(|e| e.placement == Placement::Pre) {
        match apply_extra(cr, ctx, &owner, extra).await {
            Ok(ReconcileOutcome::Done) => {}
            Ok(outcome) => return Ok(outcome),
            Err(InstallerSetError::NotReady(msg)) => {
                cr.component_status_mut().mark_pre_reconciler_failed(&msg);
                return Ok(ReconcileOutcome::Done);
            }
            Err(e) => return Err(e.into()),
        }
    }
    cr.component_status_mut().mark_pre_reconciler_complete();

    let main = match main_manifest(cr, ctx) {
        Ok(main) => main,
        Err(e) => {
            cr.component_status_mut().mark_not_ready(&e.to_string());
            return Err(e.into());
        }
    };
    if let Some(payload) = main {
        let rendered = render(cr, ctx, &owner, &payload)?;
        debug!(objects = rendered.len(), "Applying main installer sets");
        let result = ctx
            .installer_sets
            .main_set(&owner, &rendered, cr.component_status_mut())
            .await;
        match result {
            Ok(ReconcileOutcome::Done) => {}
            Ok(outcome) => return Ok(outcome),
            Err(InstallerSetError::NotReady(msg)) => {
                cr.component_status_mut()
                    .mark_installer_set_not_ready(&format!("Main Reconcilation failed: {msg}"));
                return Ok(ReconcileOutcome::Done);
            }
            Err(e) => return Err(e.into()),
        }
    }

    for extra in extras.iter().filter(|e| e.placement != Placement::Pre) {
        match apply_extra(cr, ctx, &owner, extra).await {
            Ok(ReconcileOutcome::Done) => {}
            Ok(outcome) => {
                cr.component_status_mut()
                    .mark_installer_set_not_ready(&format!("{} installer set pending", extra.placement.set_type()));
                return Ok(outcome);
            }
            Err(InstallerSetError::NotReady(msg)) => {
                cr.component_status_mut().mark_installer_set_not_ready(&msg);
                return Ok(ReconcileOutcome::Done);
            }
            Err(e) => return Err(e.into()),
        }
    }
    if cr.payload_dir().is_none() {
        let status = cr.component_status_mut();
        status.mark_installer_set_available();
        status.mark_installer_set_ready();
    }

    match ctx.extension.post_reconcile(cr).await {
        Ok(ReconcileOutcome::Done) => {}
        Ok(outcome) => return Ok(outcome),
        Err(e) => {
            warn!(error = %e, "Post-reconciliation failed");
            cr.component_status_mut()
                .mark_post_reconciler_failed(&e.to_string());
            return Ok(ReconcileOutcome::Done);
        }
    }
    cr.component_status_mut().mark_post_reconciler_complete();

    info!(version = %ctx.config.version, "Component reconciled");
    Ok(ReconcileOutcome::Done)
}

/// Stamp the operator version on the CR; a changed version marks an upgrade
async fn stamp_release_version<K: TektonComponent>(
    cr: &mut K,
    ctx: &ComponentContext<K>,
) -> Result<Option<ReconcileOutcome>, StoreError> {
    let version = ctx.config.version.as_str();
    let current = cr.label(RELEASE_VERSION_KEY).map(str::to_string);
    match current.as_deref() {
        Some(v) if v == version => return Ok(None),
        Some(previous) => {
            info!(from = %previous, to = %version, "Operator version changed, marking upgrade");
            cr.component_status_mut().mark_reinstall(UPGRADE_PENDING);
        }
        None => debug!(version = %version, "Stamping release version"),
    }

    let status = cr.component_status().cloned();
    labels::set_label(cr.meta_mut(), RELEASE_VERSION_KEY, version);
    let mut updated = ctx.store.replace(cr).await?;
    // the main endpoint drops status writes; keep ours for the status patch
    if let Some(status) = status {
        *updated.component_status_mut() = status;
    }
    *cr = updated;
    Ok(Some(ReconcileOutcome::ReconcileAgain))
}

/// `Some(outcome)` when the pass must stop and wait for a dependency
async fn check_dependencies<K: TektonComponent>(
    cr: &mut K,
    ctx: &ComponentContext<K>,
    kind: &str,
) -> Result<Option<ReconcileOutcome>, ComponentError> {
    let descriptor = K::DESCRIPTOR;
    let requeue = ctx.config.requeue_after();

    if descriptor.needs_pipeline {
        match dependency::pipeline_ready(ctx.pipelines.as_ref(), &ctx.config.version).await {
            Ok(_) => {}
            Err(DependencyError::Store(e)) => return Err(e.into()),
            Err(e) if e.is_transient() => {
                info!(reason = %e, "Pipeline dependency not ready yet");
                cr.component_status_mut()
                    .mark_dependency_installing("tekton-pipelines is still installing");
                let outcome = match e {
                    DependencyError::UpgradePending => ReconcileOutcome::DependencyPending(requeue),
                    _ => ReconcileOutcome::Requeue(requeue),
                };
                return Ok(Some(outcome));
            }
            Err(e) => {
                warn!(error = %e, "Pipeline dependency missing");
                cr.component_status_mut()
                    .mark_dependency_missing(kind, &e.to_string());
                return Err(e.into());
            }
        }
    }

    if let Some(api) = descriptor.required_api {
        if let Err(e) = dependency::require_api(ctx.cluster.as_ref(), api).await {
            if matches!(e, DependencyError::MissingApi(_)) {
                warn!(api = %api, "Required API missing");
                cr.component_status_mut()
                    .mark_dependency_missing(kind, &e.to_string());
            }
            return Err(e.into());
        }
    }
    Ok(None)
}

/// Main payload with pruned objects removed; `None` for kinds without one
fn main_manifest<K: TektonComponent>(
    cr: &K,
    ctx: &ComponentContext<K>,
) -> Result<Option<Manifest>, ManifestError> {
    let Some(dir) = cr.payload_dir() else {
        return Ok(None);
    };
    let manifest = ctx.payloads.get(dir)?;
    Ok(Some(match cr.prune() {
        Some(prune) => manifest.filter(&filter::not(prune)),
        None => manifest,
    }))
}

/// Run the full transformer chain over a payload
///
/// Extension transformers go first, then the kind ones, then the built-ins;
/// additional options are applied last so user overrides win.
fn render<K: TektonComponent>(
    cr: &K,
    ctx: &ComponentContext<K>,
    owner: &SetOwner,
    payload: &Manifest,
) -> Result<Manifest, ManifestError> {
    let mut transformers = ctx.extension.transformers(cr);
    transformers.extend(cr.transformers(&ctx.config));
    transformers.extend(common_transformers(cr, &ctx.config, owner));
    let shaped = payload.transform(&transformers)?;
    apply_additional_options(&shaped, cr.target_namespace(), cr.options())
}

fn common_transformers<K: TektonComponent>(
    cr: &K,
    config: &OperatorConfig,
    owner: &SetOwner,
) -> Vec<Transformer> {
    let descriptor = K::DESCRIPTOR;
    // the installer set controller holds the controller reference
    let mut reference = owner.owner_ref.clone();
    reference.controller = None;
    reference.block_owner_deletion = None;

    vec![
        transform::inject_operand_name(descriptor.operand),
        transform::deployment_images(transform::images_from_env(descriptor.image_prefix, config)),
        transform::add_configuration(cr.config()),
        transform::high_availability(cr.config().high_availability.clone()),
        transform::deployment_override(cr.config().deployment_override.clone()),
        transform::inject_namespace(cr.target_namespace()),
        transform::inject_owner(reference),
        transform::add_deployment_restricted_psa(),
        transform::apply_proxy_settings(config.proxy.clone()),
    ]
}

async fn apply_extra<K: TektonComponent>(
    cr: &K,
    ctx: &ComponentContext<K>,
    owner: &SetOwner,
    extra: &ExtraSet,
) -> Result<ReconcileOutcome, InstallerSetError> {
    let client = &ctx.installer_sets;
    if !extra.enabled {
        client.cleanup(&extra.placement.set_type()).await?;
        return Ok(ReconcileOutcome::Done);
    }

    let manifest = render(cr, ctx, owner, &ctx.payloads.get(extra.payload_dir)?)?;
    match extra.placement {
        Placement::Pre => client.pre_set(owner, &manifest).await,
        Placement::Post => client.post_set(owner, &manifest).await,
        Placement::Custom(suffix) => client.custom_set(owner, suffix, &manifest).await,
        Placement::Versioned {
            suffix,
            name_prefix,
        } => client
            .versioned_set(owner, suffix, name_prefix, &manifest)
            .await,
    }
}
