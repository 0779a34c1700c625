//! # Target Namespace
//!
//! The namespace component workloads land in. Component reconcilers only make
//! sure it exists; the umbrella reconciler owns it, marks namespaces left over
//! from a previous `targetNamespace` and deletes them on finalization.

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::labels::{self, MetadataContract, MARK_FOR_DELETION_LABEL, TARGET_NAMESPACE_LABEL};
use crate::store::{ObjectStore, StoreError};

/// Result of [`ensure`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceState {
    Ready,
    /// Namespace is being deleted; retry once it is gone
    Terminating,
}

/// Create the namespace if missing and stamp the target-namespace label
///
/// An existing namespace gets the owner only when it has none.
///
/// # Errors
///
/// Returns any store failure.
pub async fn ensure(
    namespaces: &dyn ObjectStore<Namespace>,
    name: &str,
    owner: Option<&OwnerReference>,
) -> Result<NamespaceState, StoreError> {
    match namespaces.get(name).await? {
        Some(ns) if ns.is_terminating() => {
            debug!(namespace = %name, "Target namespace is terminating");
            Ok(NamespaceState::Terminating)
        }
        Some(mut ns) => {
            let labelled = ns.label(TARGET_NAMESPACE_LABEL) == Some("true");
            let marked = ns.label(MARK_FOR_DELETION_LABEL).is_some();
            let adopt = owner.is_some() && ns.owner_references().is_empty();
            if !labelled || marked || adopt {
                labels::set_label(&mut ns.metadata, TARGET_NAMESPACE_LABEL, "true");
                if let Some(l) = ns.metadata.labels.as_mut() {
                    l.remove(MARK_FOR_DELETION_LABEL);
                }
                if let (true, Some(owner)) = (adopt, owner) {
                    ns.metadata.owner_references = Some(vec![owner.clone()]);
                }
                namespaces.replace(&ns).await?;
                debug!(namespace = %name, "Labelled existing target namespace");
            }
            Ok(NamespaceState::Ready)
        }
        None => {
            let ns = Namespace {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    labels: Some(BTreeMap::from([(
                        TARGET_NAMESPACE_LABEL.to_string(),
                        "true".to_string(),
                    )])),
                    owner_references: owner.map(|o| vec![o.clone()]),
                    ..ObjectMeta::default()
                },
                ..Namespace::default()
            };
            match namespaces.create(&ns).await {
                Ok(_) => info!(namespace = %name, "Created target namespace"),
                Err(e) if e.is_already_exists() => {}
                Err(e) => return Err(e),
            }
            Ok(NamespaceState::Ready)
        }
    }
}

/// Label every other target namespace for deletion
///
/// Returns the names that were marked.
///
/// # Errors
///
/// Returns any store failure.
pub async fn mark_stale(
    namespaces: &dyn ObjectStore<Namespace>,
    current: &str,
) -> Result<Vec<String>, StoreError> {
    let selector = labels::selector(&[(TARGET_NAMESPACE_LABEL, "true")]);
    let mut marked = Vec::new();
    for mut ns in namespaces.list(&selector).await? {
        let name = ns.name_any();
        if name == current || ns.label(MARK_FOR_DELETION_LABEL).is_some() {
            continue;
        }
        labels::set_label(&mut ns.metadata, MARK_FOR_DELETION_LABEL, "true");
        namespaces.replace(&ns).await?;
        info!(namespace = %name, "Marked previous target namespace for deletion");
        marked.push(name);
    }
    Ok(marked)
}

/// Delete every namespace marked by [`mark_stale`]
///
/// # Errors
///
/// Returns any store failure.
pub async fn delete_marked(namespaces: &dyn ObjectStore<Namespace>) -> Result<usize, StoreError> {
    let selector = labels::selector(&[(MARK_FOR_DELETION_LABEL, "true")]);
    let mut deleted = 0;
    for ns in namespaces.list(&selector).await? {
        if namespaces.delete(&ns.name_any()).await? {
            info!(namespace = %ns.name_any(), "Deleted marked namespace");
            deleted += 1;
        }
    }
    Ok(deleted)
}
