use kube::ResourceExt;
use tracing::{debug, info, warn};

use super::{InstallerSetClient, InstallerSetError, SetOwner};
use crate::crd::TektonInstallerSet;
use crate::labels::{SUBTYPE_DEPLOYMENT, SUBTYPE_STATIC, TYPE_MAIN};
use crate::manifest::{filter, Manifest};
use crate::observability::metrics;

/// Static half (everything but Deployments) and deployment half of a main payload
pub(super) fn split_main(manifest: &Manifest) -> (Manifest, Manifest) {
    let deployments = filter::by_kind("Deployment");
    let rest = filter::not(filter::by_kind("Deployment"));
    (manifest.filter(&rest), manifest.filter(&deployments))
}

impl InstallerSetClient {
    /// Create the sets of one type from an already rendered manifest
    ///
    /// # Errors
    ///
    /// Returns the first failed create; sets created before it are left for
    /// the next pass to classify.
    pub async fn create(
        &self,
        owner: &SetOwner,
        manifest: &Manifest,
        set_type: &str,
    ) -> Result<Vec<TektonInstallerSet>, InstallerSetError> {
        if set_type == TYPE_MAIN {
            return self.create_main(owner, manifest).await;
        }
        let set = self
            .create_one(
                owner,
                set_type,
                &self.generate_name(set_type, None),
                manifest,
                &[],
            )
            .await?;
        Ok(vec![set])
    }

    async fn create_main(
        &self,
        owner: &SetOwner,
        manifest: &Manifest,
    ) -> Result<Vec<TektonInstallerSet>, InstallerSetError> {
        let (static_manifest, deployment_manifest) = split_main(manifest);

        let static_set = self
            .create_one(
                owner,
                TYPE_MAIN,
                &self.generate_name(TYPE_MAIN, Some(SUBTYPE_STATIC)),
                &static_manifest,
                &[],
            )
            .await?;
        self.wait_for_status(&static_set.name_any()).await?;

        let deployment_set = self
            .create_one(
                owner,
                TYPE_MAIN,
                &self.generate_name(TYPE_MAIN, Some(SUBTYPE_DEPLOYMENT)),
                &deployment_manifest,
                &[],
            )
            .await?;
        Ok(vec![static_set, deployment_set])
    }

    pub(super) async fn create_one(
        &self,
        owner: &SetOwner,
        set_type: &str,
        generate_name: &str,
        manifest: &Manifest,
        extra_labels: &[(&str, &str)],
    ) -> Result<TektonInstallerSet, InstallerSetError> {
        let set = self.make_set(
            owner,
            set_type,
            generate_name,
            manifest.resources().to_vec(),
            extra_labels,
        );
        let created = self.store.create(&set).await?;
        metrics::increment_installer_sets_created(&self.kind, set_type);
        info!(
            kind = %self.kind,
            set_type = %set_type,
            name = %created.name_any(),
            resources = manifest.len(),
            "Created installer set"
        );
        Ok(created)
    }

    /// Give the installer-set controller a moment to initialise the static
    /// set before the deployment set lands; proceeds regardless.
    async fn wait_for_status(&self, name: &str) -> Result<(), InstallerSetError> {
        for attempt in 1..=self.status_poll_attempts {
            let initialised = self
                .store
                .get(name)
                .await?
                .is_some_and(|set| set.ready_condition().is_some());
            if initialised {
                debug!(name = %name, attempt, "Static installer set status initialised");
                return Ok(());
            }
            tokio::time::sleep(self.status_poll_interval).await;
        }
        warn!(
            name = %name,
            attempts = self.status_poll_attempts,
            "Static installer set has no status yet, creating deployment set anyway"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_main_separates_deployments() {
        let manifest = Manifest::new(vec![
            json!({"kind": "ServiceAccount", "metadata": {"name": "sa"}}),
            json!({"kind": "Deployment", "metadata": {"name": "controller"}}),
            json!({"kind": "Service", "metadata": {"name": "svc"}}),
            json!({"kind": "Deployment", "metadata": {"name": "webhook"}}),
        ]);
        let (statics, deployments) = split_main(&manifest);
        assert_eq!(statics.len(), 2);
        assert!(statics.resources().iter().all(|r| r["kind"] != "Deployment"));
        assert_eq!(deployments.len(), 2);
        assert!(deployments.resources().iter().all(|r| r["kind"] == "Deployment"));
    }
}
