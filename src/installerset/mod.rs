//! # Installer Set Client
//!
//! CRUD and state checks over the installer sets of one component kind.
//!
//! Ownership is purely label based: every set carries
//! `operator.tekton.dev/created-by=<Kind>` and
//! `operator.tekton.dev/installer-set-type=<type>`, and the client only ever
//! lists, updates or deletes sets matching its own kind. That keeps the
//! writers of different component reconcilers disjoint.
//!
//! - [`check`]: pure classification of the live sets
//! - `create`, `update`, `cleanup`: the write primitives
//! - `main_set`: the static/deployment pair that carries a component payload
//! - `custom_set`: pre, post and `custom-<suffix>` sets
//! - `versioned`: sets retained per `X.Y` operator version

pub mod check;
mod cleanup;
mod create;
mod custom_set;
mod main_set;
mod update;
mod versioned;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::config::OperatorConfig;
use crate::crd::{TektonInstallerSet, TektonInstallerSetSpec};
use crate::labels::{
    self, CREATED_BY_KEY, INSTALLER_SET_TYPE_KEY, LAST_APPLIED_HASH_KEY, RELEASE_VERSION_KEY,
    TARGET_NAMESPACE_KEY,
};
use crate::manifest::ManifestError;
use crate::retry::{ConflictError, RetryConfig};
use crate::store::{ObjectStore, StoreError};

pub use check::{classify, status_check, Expected, SetState, StatusCheck};

/// Errors from installer set operations
#[derive(Debug, thiserror::Error)]
pub enum InstallerSetError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("failed to serialize spec: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0} has no uid and cannot own installer sets")]
    MissingOwner(String),

    #[error("installer set not ready, will retry: {0}")]
    NotReady(String),
}

impl ConflictError for InstallerSetError {
    fn is_conflict(&self) -> bool {
        matches!(self, InstallerSetError::Store(e) if e.is_conflict())
    }
}

/// Identity of the CR that owns a group of installer sets
#[derive(Debug, Clone, PartialEq)]
pub struct SetOwner {
    /// Controller reference stamped on every set
    pub owner_ref: OwnerReference,
    /// `spec.targetNamespace` of the owner
    pub target_namespace: String,
    /// Hash of the owner's spec
    pub spec_hash: String,
}

impl SetOwner {
    /// Build from a component CR, hashing its `spec`
    ///
    /// # Errors
    ///
    /// Returns an error if the CR has no uid yet or cannot be serialized.
    pub fn from_resource<K>(cr: &K, target_namespace: &str) -> Result<Self, InstallerSetError>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let owner_ref = cr
            .controller_owner_ref(&())
            .ok_or_else(|| InstallerSetError::MissingOwner(cr.name_any()))?;
        let value = serde_json::to_value(cr)?;
        let spec = value.get("spec").cloned().unwrap_or(Value::Null);
        Ok(Self {
            owner_ref,
            target_namespace: target_namespace.to_string(),
            spec_hash: crate::hash::compute_value(&spec),
        })
    }
}

/// Installer set operations for one component kind
#[derive(Clone)]
pub struct InstallerSetClient {
    store: Arc<dyn ObjectStore<TektonInstallerSet>>,
    kind: String,
    version: String,
    retry: RetryConfig,
    requeue_after: Duration,
    status_poll_attempts: u32,
    status_poll_interval: Duration,
}

impl Debug for InstallerSetClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallerSetClient")
            .field("kind", &self.kind)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl InstallerSetClient {
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore<TektonInstallerSet>>,
        kind: &str,
        config: &OperatorConfig,
    ) -> Self {
        Self {
            store,
            kind: kind.to_string(),
            version: config.version.clone(),
            retry: RetryConfig::from_operator_config(config),
            requeue_after: config.requeue_after(),
            status_poll_attempts: config.status_poll_attempts,
            status_poll_interval: config.status_poll_interval(),
        }
    }

    /// Component kind this client manages sets for
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Operator version stamped on created sets
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn requeue_after(&self) -> Duration {
        self.requeue_after
    }

    fn selector(&self, set_type: &str) -> String {
        labels::selector(&[
            (CREATED_BY_KEY, self.kind.as_str()),
            (INSTALLER_SET_TYPE_KEY, set_type),
        ])
    }

    /// Every set of this kind with the given type
    ///
    /// # Errors
    ///
    /// Returns an error if the list call fails.
    pub async fn list(&self, set_type: &str) -> Result<Vec<TektonInstallerSet>, InstallerSetError> {
        Ok(self.store.list(&self.selector(set_type)).await?)
    }

    /// Every set created by this kind, whatever its type
    ///
    /// # Errors
    ///
    /// Returns an error if the list call fails.
    pub async fn list_all(&self) -> Result<Vec<TektonInstallerSet>, InstallerSetError> {
        let selector = labels::selector(&[(CREATED_BY_KEY, self.kind.as_str())]);
        Ok(self.store.list(&selector).await?)
    }

    /// Live sets of a type and their classification against the owner
    ///
    /// # Errors
    ///
    /// Returns an error if the list call fails.
    pub async fn check_set(
        &self,
        set_type: &str,
        owner: &SetOwner,
    ) -> Result<(Vec<TektonInstallerSet>, SetState), InstallerSetError> {
        let sets = self.list(set_type).await?;
        let state = classify(
            &sets,
            &Expected {
                set_type,
                version: Some(&self.version),
                target_namespace: &owner.target_namespace,
                spec_hash: &owner.spec_hash,
            },
        );
        Ok((sets, state))
    }

    /// A new, unsaved installer set carrying the ownership contract
    fn make_set(
        &self,
        owner: &SetOwner,
        set_type: &str,
        generate_name: &str,
        manifests: Vec<Value>,
        extra_labels: &[(&str, &str)],
    ) -> TektonInstallerSet {
        let mut set_labels = BTreeMap::from([
            (CREATED_BY_KEY.to_string(), self.kind.clone()),
            (INSTALLER_SET_TYPE_KEY.to_string(), set_type.to_string()),
            (RELEASE_VERSION_KEY.to_string(), self.version.clone()),
        ]);
        for (k, v) in extra_labels {
            set_labels.insert((*k).to_string(), (*v).to_string());
        }
        let annotations = BTreeMap::from([
            (
                TARGET_NAMESPACE_KEY.to_string(),
                owner.target_namespace.clone(),
            ),
            (LAST_APPLIED_HASH_KEY.to_string(), owner.spec_hash.clone()),
        ]);
        TektonInstallerSet {
            metadata: ObjectMeta {
                generate_name: Some(generate_name.to_string()),
                labels: Some(set_labels),
                annotations: Some(annotations),
                owner_references: Some(vec![owner.owner_ref.clone()]),
                ..ObjectMeta::default()
            },
            spec: TektonInstallerSetSpec { manifests },
            status: None,
        }
    }

    /// `<kind>-<type>-` prefix for generated names
    fn generate_name(&self, set_type: &str, subtype: Option<&str>) -> String {
        let prefix = labels::kind_prefix(&self.kind);
        match subtype {
            Some(sub) => format!("{prefix}-{set_type}-{sub}-"),
            None => format!("{prefix}-{set_type}-"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{TektonChain, TektonChainSpec};
    use crate::labels::MetadataContract;

    fn client() -> InstallerSetClient {
        struct Unused;
        #[async_trait::async_trait]
        impl ObjectStore<TektonInstallerSet> for Unused {
            async fn get(&self, _: &str) -> Result<Option<TektonInstallerSet>, StoreError> {
                Ok(None)
            }
            async fn list(&self, _: &str) -> Result<Vec<TektonInstallerSet>, StoreError> {
                Ok(vec![])
            }
            async fn create(&self, o: &TektonInstallerSet) -> Result<TektonInstallerSet, StoreError> {
                Ok(o.clone())
            }
            async fn replace(&self, o: &TektonInstallerSet) -> Result<TektonInstallerSet, StoreError> {
                Ok(o.clone())
            }
            async fn patch_status(&self, _: &str, _: Value) -> Result<(), StoreError> {
                Ok(())
            }
            async fn delete(&self, _: &str) -> Result<bool, StoreError> {
                Ok(false)
            }
        }
        let config = OperatorConfig {
            version: "v0.74.1".to_string(),
            ..OperatorConfig::default()
        };
        InstallerSetClient::new(Arc::new(Unused), "TektonChain", &config)
    }

    fn chain() -> TektonChain {
        let mut cr = TektonChain::new("chain", TektonChainSpec::default());
        cr.metadata.uid = Some("uid-1".to_string());
        cr
    }

    #[test]
    fn test_generate_names() {
        let c = client();
        assert_eq!(c.generate_name("main", Some("static")), "chain-main-static-");
        assert_eq!(c.generate_name("pre", None), "chain-pre-");
        assert_eq!(c.generate_name("custom-foo", None), "chain-custom-foo-");
    }

    #[test]
    fn test_make_set_carries_contract() {
        let c = client();
        let owner = SetOwner::from_resource(&chain(), "ns1").unwrap();
        let set = c.make_set(&owner, "pre", "chain-pre-", vec![], &[]);
        assert_eq!(set.created_by(), Some("TektonChain"));
        assert_eq!(set.installer_set_type(), Some("pre"));
        assert_eq!(set.release_version(), Some("v0.74.1"));
        assert_eq!(set.target_namespace_annotation(), Some("ns1"));
        assert_eq!(set.last_applied_hash(), Some(owner.spec_hash.as_str()));
        let refs = set.metadata.owner_references.unwrap_or_default();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].controller, Some(true));
        assert_eq!(refs[0].name, "chain");
    }

    #[test]
    fn test_owner_requires_uid() {
        let cr = TektonChain::new("chain", TektonChainSpec::default());
        assert!(matches!(
            SetOwner::from_resource(&cr, "ns1"),
            Err(InstallerSetError::MissingOwner(_))
        ));
    }

    #[test]
    fn test_owner_hash_follows_spec_only() {
        let a = chain();
        let mut b = chain();
        b.metadata.labels = Some(BTreeMap::from([("x".to_string(), "y".to_string())]));
        let ha = SetOwner::from_resource(&a, "ns1").unwrap().spec_hash;
        let hb = SetOwner::from_resource(&b, "ns1").unwrap().spec_hash;
        assert_eq!(ha, hb);

        let mut c = chain();
        c.spec.common.target_namespace = "other".to_string();
        let hc = SetOwner::from_resource(&c, "ns1").unwrap().spec_hash;
        assert_ne!(ha, hc);
    }
}
