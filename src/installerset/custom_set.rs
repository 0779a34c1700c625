use tracing::{debug, info, warn};

use super::{status_check, InstallerSetClient, InstallerSetError, SetOwner, SetState, StatusCheck};
use crate::labels::{custom_type, TYPE_POST, TYPE_PRE};
use crate::manifest::Manifest;
use crate::outcome::ReconcileOutcome;

impl InstallerSetClient {
    /// Converge the `pre` set, applied before the main payload
    ///
    /// # Errors
    ///
    /// See [`InstallerSetClient::ensure_set`].
    pub async fn pre_set(
        &self,
        owner: &SetOwner,
        manifest: &Manifest,
    ) -> Result<ReconcileOutcome, InstallerSetError> {
        self.ensure_set(owner, manifest, TYPE_PRE).await
    }

    /// Converge the `post` set, applied once the main payload is ready
    ///
    /// # Errors
    ///
    /// See [`InstallerSetClient::ensure_set`].
    pub async fn post_set(
        &self,
        owner: &SetOwner,
        manifest: &Manifest,
    ) -> Result<ReconcileOutcome, InstallerSetError> {
        self.ensure_set(owner, manifest, TYPE_POST).await
    }

    /// Converge a `custom-<suffix>` set
    ///
    /// # Errors
    ///
    /// See [`InstallerSetClient::ensure_set`].
    pub async fn custom_set(
        &self,
        owner: &SetOwner,
        suffix: &str,
        manifest: &Manifest,
    ) -> Result<ReconcileOutcome, InstallerSetError> {
        self.ensure_set(owner, manifest, &custom_type(suffix)).await
    }

    /// Create, recreate or update a single-set type, then report its readiness
    ///
    /// # Errors
    ///
    /// Returns [`InstallerSetError::NotReady`] when the set reports
    /// `Ready=False`, or any store failure.
    pub async fn ensure_set(
        &self,
        owner: &SetOwner,
        manifest: &Manifest,
        set_type: &str,
    ) -> Result<ReconcileOutcome, InstallerSetError> {
        let (sets, state) = self.check_set(set_type, owner).await?;
        debug!(kind = %self.kind, set_type = %set_type, found = sets.len(), state = ?state, "Checked installer sets");

        let sets = match state {
            SetState::NotFound => {
                info!(kind = %self.kind, set_type = %set_type, "Installer set not found, creating");
                self.create(owner, manifest, set_type).await?
            }
            SetState::Invalid | SetState::NamespaceDiffer | SetState::VersionDiffer => {
                info!(kind = %self.kind, set_type = %set_type, state = ?state, "Installer set drifted, recreating");
                self.cleanup(set_type).await?;
                return Ok(ReconcileOutcome::Requeue(self.requeue_after));
            }
            SetState::UpdateRequired => self.update(owner, &sets, manifest, set_type).await?,
            SetState::InDeletion => return Ok(ReconcileOutcome::Requeue(self.requeue_after)),
            SetState::Ok => sets,
        };

        self.readiness(set_type, &sets)
    }

    pub(super) fn readiness(
        &self,
        set_type: &str,
        sets: &[crate::crd::TektonInstallerSet],
    ) -> Result<ReconcileOutcome, InstallerSetError> {
        match status_check(sets) {
            StatusCheck::Ready => Ok(ReconcileOutcome::Done),
            StatusCheck::Pending(msg) => {
                debug!(kind = %self.kind, set_type = %set_type, message = %msg, "Installer set not ready yet");
                Ok(ReconcileOutcome::Requeue(self.requeue_after))
            }
            StatusCheck::Failed(msg) => {
                warn!(kind = %self.kind, set_type = %set_type, message = %msg, "Installer set failed");
                Err(InstallerSetError::NotReady(msg))
            }
        }
    }
}
