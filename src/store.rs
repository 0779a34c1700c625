//! # Cluster Store
//!
//! Thin traits over the cluster API used by the reconcilers, with kube-backed
//! implementations. Every resource the operator touches is cluster-scoped, so
//! one generic store covers CRs, installer sets, namespaces and CRDs.

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::core::{ApiResource, ClusterResourceScope, DynamicObject, GroupVersionKind};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::marker::PhantomData;
use tracing::debug;

use crate::constants::FIELD_MANAGER;
use crate::tektonconfig::scc::SecurityContextConstraints;

/// Errors from store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {name:?} not found")]
    NotFound { kind: String, name: String },

    #[error("conflict writing {kind} {name:?}: {message}")]
    Conflict {
        kind: String,
        name: String,
        message: String,
    },

    #[error("{kind} {name:?} already exists")]
    AlreadyExists { kind: String, name: String },

    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }

    /// Classify a kube error for the given object
    #[must_use]
    pub fn from_kube(err: kube::Error, kind: &str, name: &str) -> Self {
        match err {
            kube::Error::Api(ref e) if e.code == 404 => StoreError::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            kube::Error::Api(ref e) if e.code == 409 && e.reason == "AlreadyExists" => {
                StoreError::AlreadyExists {
                    kind: kind.to_string(),
                    name: name.to_string(),
                }
            }
            kube::Error::Api(ref e) if e.code == 409 => StoreError::Conflict {
                kind: kind.to_string(),
                name: name.to_string(),
                message: e.message.clone(),
            },
            other => StoreError::Kube(other),
        }
    }
}

/// CRUD over one cluster-scoped resource type
#[async_trait]
pub trait ObjectStore<K>: Send + Sync
where
    K: Clone + Send + Sync + 'static,
{
    /// `None` when the object does not exist
    async fn get(&self, name: &str) -> Result<Option<K>, StoreError>;

    /// Objects matching a `k=v,k2=v2` label selector
    async fn list(&self, selector: &str) -> Result<Vec<K>, StoreError>;

    /// Create; `metadata.generateName` is honoured when `name` is empty
    async fn create(&self, obj: &K) -> Result<K, StoreError>;

    /// Replace using the object's resourceVersion for optimistic concurrency
    async fn replace(&self, obj: &K) -> Result<K, StoreError>;

    /// Merge-patch the status subresource
    async fn patch_status(&self, name: &str, status: serde_json::Value) -> Result<(), StoreError>;

    /// Delete with foreground propagation; `false` when already gone
    async fn delete(&self, name: &str) -> Result<bool, StoreError>;
}

/// [`ObjectStore`] backed by the kube API
pub struct KubeStore<K> {
    api: Api<K>,
    _kind: PhantomData<K>,
}

impl<K> Debug for KubeStore<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl<K> KubeStore<K>
where
    K: Resource<Scope = ClusterResourceScope, DynamicType = ()>,
{
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
            _kind: PhantomData,
        }
    }
}

fn kind_of<K: Resource<DynamicType = ()>>() -> String {
    K::kind(&()).to_string()
}

#[async_trait]
impl<K> ObjectStore<K> for KubeStore<K>
where
    K: Resource<Scope = ClusterResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, name: &str) -> Result<Option<K>, StoreError> {
        self.api
            .get_opt(name)
            .await
            .map_err(|e| StoreError::from_kube(e, &kind_of::<K>(), name))
    }

    async fn list(&self, selector: &str) -> Result<Vec<K>, StoreError> {
        let mut params = ListParams::default();
        if !selector.is_empty() {
            params = params.labels(selector);
        }
        let list = self
            .api
            .list(&params)
            .await
            .map_err(|e| StoreError::from_kube(e, &kind_of::<K>(), selector))?;
        Ok(list.items)
    }

    async fn create(&self, obj: &K) -> Result<K, StoreError> {
        let name = obj
            .meta()
            .name
            .clone()
            .or_else(|| obj.meta().generate_name.clone())
            .unwrap_or_default();
        debug!(kind = %kind_of::<K>(), name = %name, "Creating object");
        self.api
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| StoreError::from_kube(e, &kind_of::<K>(), &name))
    }

    async fn replace(&self, obj: &K) -> Result<K, StoreError> {
        let name = obj.name_any();
        debug!(kind = %kind_of::<K>(), name = %name, "Replacing object");
        self.api
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(|e| StoreError::from_kube(e, &kind_of::<K>(), &name))
    }

    async fn patch_status(&self, name: &str, status: serde_json::Value) -> Result<(), StoreError> {
        let patch = serde_json::json!({ "status": status });
        self.api
            .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
            .map_err(|e| StoreError::from_kube(e, &kind_of::<K>(), name))?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        debug!(kind = %kind_of::<K>(), name = %name, "Deleting object");
        match self.api.delete(name, &DeleteParams::foreground()).await {
            Ok(_) => Ok(true),
            Err(e) => match StoreError::from_kube(e, &kind_of::<K>(), name) {
                StoreError::NotFound { .. } => Ok(false),
                other => Err(other),
            },
        }
    }
}

/// Cluster-wide lookups that are not tied to one resource type
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Whether discovery serves the `group/version`
    async fn has_group_version(&self, group_version: &str) -> Result<bool, StoreError>;

    /// Every SecurityContextConstraints object on the cluster
    async fn list_sccs(&self) -> Result<Vec<SecurityContextConstraints>, StoreError>;
}

/// [`ClusterApi`] backed by the kube client
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl Debug for KubeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCluster").finish_non_exhaustive()
    }
}

impl KubeCluster {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn has_group_version(&self, group_version: &str) -> Result<bool, StoreError> {
        match self.client.list_api_group_resources(group_version).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(false),
            Err(e) => Err(StoreError::Kube(e)),
        }
    }

    async fn list_sccs(&self) -> Result<Vec<SecurityContextConstraints>, StoreError> {
        let gvk = GroupVersionKind::gvk("security.openshift.io", "v1", "SecurityContextConstraints");
        let resource = ApiResource::from_gvk_with_plural(&gvk, "securitycontextconstraints");
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &resource);
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| StoreError::from_kube(e, "SecurityContextConstraints", ""))?;
        list.items
            .into_iter()
            .map(|obj| -> Result<SecurityContextConstraints, StoreError> {
                let value = serde_json::to_value(obj)?;
                Ok(serde_json::from_value(value)?)
            })
            .collect()
    }
}
