use kube::ResourceExt;
use tracing::info;

use super::create::split_main;
use super::{InstallerSetClient, InstallerSetError, SetOwner};
use crate::crd::TektonInstallerSet;
use crate::labels::{self, LAST_APPLIED_HASH_KEY, SUBTYPE_STATIC, TYPE_MAIN};
use crate::manifest::Manifest;
use crate::retry::retry_on_conflict;
use crate::store::StoreError;

impl InstallerSetClient {
    /// Rewrite the manifests and spec hash of existing sets in place
    ///
    /// Main sets pick their half of the payload by subtype name.
    ///
    /// # Errors
    ///
    /// Returns an error if a set vanished or conflicts outlast the retries.
    pub async fn update(
        &self,
        owner: &SetOwner,
        sets: &[TektonInstallerSet],
        manifest: &Manifest,
        set_type: &str,
    ) -> Result<Vec<TektonInstallerSet>, InstallerSetError> {
        let mut updated = Vec::with_capacity(sets.len());
        if set_type == TYPE_MAIN {
            let (static_manifest, deployment_manifest) = split_main(manifest);
            for set in sets {
                let name = set.name_any();
                let part = if name.contains(SUBTYPE_STATIC) {
                    &static_manifest
                } else {
                    &deployment_manifest
                };
                updated.push(self.update_one(owner, &name, part).await?);
            }
        } else {
            for set in sets {
                updated.push(self.update_one(owner, &set.name_any(), manifest).await?);
            }
        }
        Ok(updated)
    }

    pub(super) async fn update_one(
        &self,
        owner: &SetOwner,
        name: &str,
        manifest: &Manifest,
    ) -> Result<TektonInstallerSet, InstallerSetError> {
        let store = &self.store;
        let kind = self.kind.as_str();
        let result = retry_on_conflict(&self.retry, "update_installer_set", || async move {
            let mut on_cluster = store.get(name).await?.ok_or_else(|| StoreError::NotFound {
                kind: "TektonInstallerSet".to_string(),
                name: name.to_string(),
            })?;
            labels::set_annotation(
                &mut on_cluster.metadata,
                LAST_APPLIED_HASH_KEY,
                &owner.spec_hash,
            );
            on_cluster.spec.manifests = manifest.resources().to_vec();
            store.replace(&on_cluster).await
        })
        .await?;
        info!(kind = %kind, name = %name, "Updated installer set");
        Ok(result)
    }
}
