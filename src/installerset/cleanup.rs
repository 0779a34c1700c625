use kube::ResourceExt;
use tracing::info;

use super::{InstallerSetClient, InstallerSetError};
use crate::crd::TektonInstallerSet;
use crate::labels::{MetadataContract, SUBTYPE_STATIC, TYPE_CUSTOM, TYPE_MAIN};
use crate::observability::metrics;

impl InstallerSetClient {
    /// Delete every set of a type with foreground propagation
    ///
    /// # Errors
    ///
    /// Returns the first list or delete failure.
    pub async fn cleanup(&self, set_type: &str) -> Result<(), InstallerSetError> {
        if set_type == TYPE_MAIN {
            return self.cleanup_main().await;
        }
        let sets = self.list(set_type).await?;
        self.delete_sets(set_type, &sets).await
    }

    /// Delete the main sets, every static set before any deployment set
    ///
    /// # Errors
    ///
    /// Returns the first list or delete failure.
    pub async fn cleanup_main(&self) -> Result<(), InstallerSetError> {
        let sets = self.list(TYPE_MAIN).await?;
        let (statics, deployments): (Vec<_>, Vec<_>) = sets
            .into_iter()
            .partition(|s| s.name_any().contains(SUBTYPE_STATIC));
        self.delete_sets(TYPE_MAIN, &statics).await?;
        self.delete_sets(TYPE_MAIN, &deployments).await
    }

    /// Delete every `custom-*` set of this kind
    ///
    /// # Errors
    ///
    /// Returns the first list or delete failure.
    pub async fn cleanup_custom_sets(&self) -> Result<(), InstallerSetError> {
        let prefix = format!("{TYPE_CUSTOM}-");
        let sets: Vec<_> = self
            .list_all()
            .await?
            .into_iter()
            .filter(|s| s.installer_set_type().is_some_and(|t| t.starts_with(&prefix)))
            .collect();
        self.delete_sets(TYPE_CUSTOM, &sets).await
    }

    /// Delete sets of types this kind no longer produces
    ///
    /// # Errors
    ///
    /// Returns the first list or delete failure.
    pub async fn remove_obsolete(&self, obsolete_types: &[&str]) -> Result<(), InstallerSetError> {
        for set_type in obsolete_types {
            self.cleanup(set_type).await?;
        }
        Ok(())
    }

    pub(super) async fn delete_sets(
        &self,
        set_type: &str,
        sets: &[TektonInstallerSet],
    ) -> Result<(), InstallerSetError> {
        let mut deleted = 0;
        for set in sets {
            let name = set.name_any();
            if self.store.delete(&name).await? {
                deleted += 1;
                info!(kind = %self.kind, set_type = %set_type, name = %name, "Deleted installer set");
            }
        }
        metrics::increment_installer_sets_deleted(&self.kind, set_type, deleted);
        Ok(())
    }
}
