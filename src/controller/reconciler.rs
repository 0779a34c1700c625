//! # Reconciler
//!
//! Glue between kube-runtime and the reconcilers in [`crate::component`] and
//! [`crate::tektonconfig`]: finalizer handling, status persistence, metrics
//! and the mapping from [`ReconcileOutcome`] to a controller [`Action`].
//!
//! The status is written after every pass, including failed ones, so
//! conditions explain why a resource is stuck.

use async_trait::async_trait;
use kube::api::Api;
use kube::core::ClusterResourceScope;
use kube::runtime::controller::Action;
use kube::runtime::finalizer::{self, finalizer, Event};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::backoff::BackoffState;
use crate::component::{self, ComponentContext, ComponentError, TektonComponent};
use crate::config::OperatorConfig;
use crate::crd::TektonConfig;
use crate::observability::metrics;
use crate::outcome::ReconcileOutcome;
use crate::store::{ObjectStore, StoreError};
use crate::tektonconfig::{self, ConfigContext, ConfigError};

#[derive(Debug, thiserror::Error)]
pub enum ReconcilerError {
    #[error("Reconciliation failed: {0}")]
    ReconciliationFailed(#[from] anyhow::Error),

    #[error(transparent)]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Component(#[from] ComponentError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("finalizer: {0}")]
    Finalizer(#[source] Box<finalizer::Error<ReconcilerError>>),
}

/// Kinds the runtime can drive
pub trait ManagedResource:
    Resource<DynamicType = (), Scope = ClusterResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> ManagedResource for K where
    K: Resource<DynamicType = (), Scope = ClusterResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// One reconcile pass and teardown for a kind
#[async_trait]
pub trait Driver<K>: Send + Sync
where
    K: Clone + Send + Sync + 'static,
{
    fn store(&self) -> &dyn ObjectStore<K>;

    /// Serialized `status`, `None` when there is nothing to persist
    fn status_of(&self, cr: &K) -> Result<Option<Value>, StoreError>;

    async fn apply(&self, cr: &mut K) -> Result<ReconcileOutcome, ReconcilerError>;

    async fn cleanup(&self, cr: &K) -> Result<(), ReconcilerError>;
}

#[async_trait]
impl<K: TektonComponent> Driver<K> for ComponentContext<K> {
    fn store(&self) -> &dyn ObjectStore<K> {
        self.store.as_ref()
    }

    fn status_of(&self, cr: &K) -> Result<Option<Value>, StoreError> {
        cr.component_status()
            .map(serde_json::to_value)
            .transpose()
            .map_err(StoreError::from)
    }

    async fn apply(&self, cr: &mut K) -> Result<ReconcileOutcome, ReconcilerError> {
        Ok(component::reconcile(cr, self).await?)
    }

    async fn cleanup(&self, cr: &K) -> Result<(), ReconcilerError> {
        Ok(component::finalize(cr, self).await?)
    }
}

#[async_trait]
impl Driver<TektonConfig> for ConfigContext {
    fn store(&self) -> &dyn ObjectStore<TektonConfig> {
        self.store.as_ref()
    }

    fn status_of(&self, cr: &TektonConfig) -> Result<Option<Value>, StoreError> {
        cr.status
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(StoreError::from)
    }

    async fn apply(&self, cr: &mut TektonConfig) -> Result<ReconcileOutcome, ReconcilerError> {
        Ok(tektonconfig::reconcile(cr, self).await?)
    }

    async fn cleanup(&self, cr: &TektonConfig) -> Result<(), ReconcilerError> {
        Ok(tektonconfig::finalize(cr, self).await?)
    }
}

/// Controller context for one kind
pub struct Reconciler<K: ManagedResource> {
    pub client: Client,
    pub driver: Arc<dyn Driver<K>>,
    pub config: Arc<OperatorConfig>,
    /// Error back-off per resource name
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl<K: ManagedResource> Reconciler<K> {
    #[must_use]
    pub fn new(client: Client, driver: Arc<dyn Driver<K>>, config: Arc<OperatorConfig>) -> Self {
        Self {
            client,
            driver,
            config,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K: ManagedResource> Debug for Reconciler<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("version", &self.config.version)
            .finish_non_exhaustive()
    }
}

/// `<plural>.operator.tekton.dev`
#[must_use]
pub fn finalizer_name<K: ManagedResource>() -> String {
    format!("{}.{}", K::plural(&()), K::group(&()))
}

/// Controller [`Action`] for an outcome
#[must_use]
pub fn action_for(outcome: ReconcileOutcome) -> Action {
    match outcome.requeue_after() {
        Some(after) => Action::requeue(after),
        None => Action::await_change(),
    }
}

/// kube-runtime entry point
///
/// # Errors
///
/// Returns failures from the reconciler, the finalizer patch, or the status
/// write.
pub async fn reconcile<K: ManagedResource>(
    obj: Arc<K>,
    ctx: Arc<Reconciler<K>>,
) -> Result<Action, ReconcilerError> {
    let kind = K::kind(&()).to_string();
    let start = Instant::now();
    metrics::increment_reconciliations(&kind);

    let api: Api<K> = Api::all(ctx.client.clone());
    let result = finalizer(&api, &finalizer_name::<K>(), obj, |event| async {
        match event {
            Event::Apply(cr) => apply(cr, &ctx, &kind).await,
            Event::Cleanup(cr) => cleanup(cr, &ctx).await,
        }
    })
    .await
    .map_err(|e| ReconcilerError::Finalizer(Box::new(e)));

    metrics::observe_reconciliation_duration(&kind, start.elapsed().as_secs_f64());
    result
}

async fn apply<K: ManagedResource>(
    obj: Arc<K>,
    ctx: &Reconciler<K>,
    kind: &str,
) -> Result<Action, ReconcilerError> {
    let name = obj.name_any();
    let mut cr = (*obj).clone();
    let outcome = ctx.driver.apply(&mut cr).await;

    match ctx.driver.status_of(&cr) {
        Ok(Some(status)) => {
            if let Err(e) = ctx.driver.store().patch_status(&name, status).await {
                warn!(resource.name = %name, error = %e, "Failed to write status");
                if outcome.is_ok() {
                    return Err(e.into());
                }
            }
        }
        Ok(None) => {}
        Err(e) => warn!(resource.name = %name, error = %e, "Failed to serialize status"),
    }

    let outcome = outcome?;
    if let Ok(mut states) = ctx.backoff_states.lock() {
        states.remove(&name);
    }
    if outcome.is_done() {
        debug!(resource.kind = %kind, resource.name = %name, "Reconciled");
    } else {
        metrics::increment_requeues(kind, outcome.reason());
        debug!(
            resource.kind = %kind,
            resource.name = %name,
            outcome = outcome.reason(),
            "Requeueing"
        );
    }
    Ok(action_for(outcome))
}

async fn cleanup<K: ManagedResource>(
    obj: Arc<K>,
    ctx: &Reconciler<K>,
) -> Result<Action, ReconcilerError> {
    info!(resource.kind = %K::kind(&()), resource.name = %obj.name_any(), "Finalizing");
    ctx.driver.cleanup(&obj).await?;
    Ok(Action::await_change())
}
