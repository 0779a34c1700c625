//! # TektonConfig Reconciler
//!
//! The umbrella CR `config` materialises a profile into satellite component
//! CRs, owns the target namespace and, on OpenShift, validates the SCC
//! policy.
//!
//! ## Reconcile Flow
//!
//! 1. Name guard, defaults, release version stamp
//! 2. Ensure the target namespace, mark any previous one for deletion
//! 3. Pre-install: SCC policy and the extension pre hook
//! 4. Converge satellites wanted by the profile, delete the rest
//! 5. Wait until every satellite is ready
//! 6. Post-install extension hook, then delete namespaces marked in step 2

pub mod profile;
pub mod satellite;
pub mod scc;

use k8s_openapi::api::core::v1::Namespace;
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

use crate::config::{OperatorConfig, Platform};
use crate::crd::{ConfigStatus, TektonConfig};
use crate::extension::Extension;
use crate::labels::{self, MetadataContract, RELEASE_VERSION_KEY};
use crate::namespace::{self, NamespaceState};
use crate::outcome::ReconcileOutcome;
use crate::store::{ClusterApi, ObjectStore, StoreError};

pub use profile::{desired, Satellite};
pub use satellite::{SatelliteState, SatelliteStores};
pub use scc::SccError;

/// Fixed name of the umbrella CR
pub const CONFIG_RESOURCE_NAME: &str = "config";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0} has no uid and cannot own satellites")]
    MissingOwner(String),

    #[error(transparent)]
    Scc(#[from] SccError),

    #[error("{0}")]
    Hook(anyhow::Error),
}

/// Everything the umbrella reconciler reads or writes
pub struct ConfigContext {
    pub store: Arc<dyn ObjectStore<TektonConfig>>,
    pub namespaces: Arc<dyn ObjectStore<Namespace>>,
    pub cluster: Arc<dyn ClusterApi>,
    pub satellites: SatelliteStores,
    pub extension: Arc<dyn Extension<TektonConfig>>,
    pub config: Arc<OperatorConfig>,
}

impl std::fmt::Debug for ConfigContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigContext")
            .field("platform", &self.config.platform)
            .finish_non_exhaustive()
    }
}

fn status_mut(cr: &mut TektonConfig) -> &mut ConfigStatus {
    cr.status.get_or_insert_with(ConfigStatus::default)
}

/// Run one umbrella reconcile pass, updating `cr.status` in place
///
/// # Errors
///
/// Returns store failures; pre and post hook failures are recorded as
/// conditions instead.
pub async fn reconcile(
    cr: &mut TektonConfig,
    ctx: &ConfigContext,
) -> Result<ReconcileOutcome, ConfigError> {
    let span = tracing::info_span!(
        "controller.tektonconfig.reconcile",
        resource.kind = "TektonConfig",
        resource.name = %cr.name_any()
    );
    run(cr, ctx).instrument(span).await
}

async fn run(cr: &mut TektonConfig, ctx: &ConfigContext) -> Result<ReconcileOutcome, ConfigError> {
    let platform = ctx.config.platform;
    let version = ctx.config.version.clone();
    let requeue = ctx.config.requeue_after();

    let status = status_mut(cr);
    status.initialize_conditions();
    status.version = Some(version.clone());

    let name = cr.name_any();
    if name != CONFIG_RESOURCE_NAME {
        warn!(expected = %CONFIG_RESOURCE_NAME, actual = %name, "Invalid resource name, ignoring");
        status_mut(cr).mark_ignored(CONFIG_RESOURCE_NAME, &name);
        return Ok(ReconcileOutcome::Done);
    }

    cr.spec.set_defaults(platform);
    status_mut(cr).profile = Some(cr.spec.profile.clone());

    if cr.release_version() != Some(version.as_str()) {
        info!(version = %version, "Stamping release version");
        let status = cr.status.clone();
        labels::set_label(cr.meta_mut(), RELEASE_VERSION_KEY, &version);
        let mut updated = ctx.store.replace(cr).await?;
        updated.status = status;
        *cr = updated;
        return Ok(ReconcileOutcome::ReconcileAgain);
    }

    let owner = cr
        .controller_owner_ref(&())
        .ok_or_else(|| ConfigError::MissingOwner(name.clone()))?;
    let target = cr.spec.target_namespace.clone();
    if namespace::ensure(ctx.namespaces.as_ref(), &target, Some(&owner)).await?
        == NamespaceState::Terminating
    {
        info!(namespace = %target, "Target namespace is terminating, waiting");
        return Ok(ReconcileOutcome::Requeue(requeue));
    }
    let stale = namespace::mark_stale(ctx.namespaces.as_ref(), &target).await?;
    if !stale.is_empty() {
        info!(namespaces = ?stale, "Previous target namespaces marked for deletion");
    }

    if let Err(e) = pre_install(cr, ctx).await {
        warn!(error = %e, "Pre-install failed");
        status_mut(cr).mark_pre_install_failed(&e.to_string());
        return Ok(ReconcileOutcome::Done);
    }
    status_mut(cr).mark_pre_install_complete();

    let wanted = desired(&cr.spec, platform);
    debug!(profile = %cr.spec.profile, satellites = ?wanted, "Materialising profile");
    for satellite in Satellite::ALL.iter().rev() {
        if !wanted.contains(satellite) {
            ctx.satellites.delete(*satellite).await?;
        }
    }

    let mut pending = Vec::new();
    for satellite in &wanted {
        match ctx
            .satellites
            .ensure(*satellite, &cr.spec, &owner, &version)
            .await?
        {
            SatelliteState::Ready => {}
            SatelliteState::Pending(reason) => pending.push(reason),
        }
    }
    if !pending.is_empty() {
        debug!(pending = ?pending, "Waiting for satellites");
        status_mut(cr).mark_component_not_ready(&pending.join(", "));
        return Ok(ReconcileOutcome::Requeue(requeue));
    }
    status_mut(cr).mark_components_ready();

    match ctx.extension.post_reconcile(cr).await {
        Ok(ReconcileOutcome::Done) => {}
        Ok(outcome) => return Ok(outcome),
        Err(e) => {
            warn!(error = %e, "Post-install failed");
            status_mut(cr).mark_post_install_failed(&e.to_string());
            return Ok(ReconcileOutcome::Done);
        }
    }
    status_mut(cr).mark_post_install_complete();

    let deleted = namespace::delete_marked(ctx.namespaces.as_ref()).await?;
    if deleted > 0 {
        info!(count = deleted, "Deleted previous target namespaces");
    }

    info!(profile = %cr.spec.profile, "TektonConfig reconciled");
    Ok(ReconcileOutcome::Done)
}

/// SCC policy on OpenShift, then the extension pre hook
async fn pre_install(cr: &TektonConfig, ctx: &ConfigContext) -> Result<(), ConfigError> {
    if ctx.config.platform == Platform::OpenShift {
        let namespaces = ctx.namespaces.list("").await?;
        let policy = cr.spec.platforms.openshift.scc.as_ref();
        let rejected = scc::check(ctx.cluster.as_ref(), policy, &namespaces).await?;
        if !rejected.is_empty() {
            warn!(count = rejected.len(), "Namespaces request SCCs beyond maxAllowed");
        }
    }
    ctx.extension
        .pre_reconcile(cr)
        .await
        .map(|_| ())
        .map_err(ConfigError::Hook)
}

/// Remove the satellites and namespaces the umbrella created
///
/// `lite` only ever created the pipeline CR; other profiles delete in
/// reverse creation order so nothing outlives the pipeline engine.
///
/// # Errors
///
/// Returns store failures.
pub async fn finalize(cr: &TektonConfig, ctx: &ConfigContext) -> Result<(), ConfigError> {
    let span = tracing::info_span!(
        "controller.tektonconfig.finalize",
        resource.kind = "TektonConfig",
        resource.name = %cr.name_any()
    );
    async {
        if cr.spec.is_lite() {
            ctx.satellites.delete(Satellite::Pipeline).await?;
        } else {
            for satellite in Satellite::ALL.iter().rev() {
                ctx.satellites.delete(*satellite).await?;
            }
        }
        let deleted = namespace::delete_marked(ctx.namespaces.as_ref()).await?;
        if deleted > 0 {
            info!(count = deleted, "Deleted marked namespaces");
        }
        if let Err(e) = ctx.extension.finalize(cr).await {
            warn!(error = %e, "Extension finalize failed");
        }
        Ok(())
    }
    .instrument(span)
    .await
}
