use tracing::{debug, info, warn};

use super::{status_check, InstallerSetClient, InstallerSetError, SetOwner, SetState, StatusCheck};
use crate::crd::status::{is_condition_unknown, INSTALLER_SET_AVAILABLE, REINSTALLING, UPGRADE_PENDING};
use crate::crd::ComponentStatus;
use crate::labels::TYPE_MAIN;
use crate::manifest::Manifest;
use crate::observability::metrics::{self, InstallEvent};
use crate::outcome::ReconcileOutcome;

impl InstallerSetClient {
    /// Converge the static/deployment pair carrying the component payload
    ///
    /// Drifted pairs are torn down and recreated on a later pass; a pair that
    /// only has a stale spec hash is updated in place.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerSetError::NotReady`] when a set reports
    /// `Ready=False`, or any store failure.
    pub async fn main_set(
        &self,
        owner: &SetOwner,
        manifest: &Manifest,
        status: &mut ComponentStatus,
    ) -> Result<ReconcileOutcome, InstallerSetError> {
        let (sets, state) = self.check_set(TYPE_MAIN, owner).await?;
        debug!(kind = %self.kind, found = sets.len(), state = ?state, "Checked main installer sets");

        let sets = match state {
            SetState::NotFound => {
                info!(kind = %self.kind, "Main installer sets not found, creating");
                let created = self.create(owner, manifest, TYPE_MAIN).await?;
                if is_condition_unknown(&status.conditions, INSTALLER_SET_AVAILABLE) {
                    metrics::record_install_event(&self.kind, InstallEvent::NewInstall);
                }
                created
            }
            SetState::Invalid | SetState::NamespaceDiffer => {
                info!(kind = %self.kind, state = ?state, "Main installer sets drifted, reinstalling");
                self.cleanup_main().await?;
                status.mark_reinstall(REINSTALLING);
                return Ok(ReconcileOutcome::Requeue(self.requeue_after));
            }
            SetState::VersionDiffer => {
                info!(kind = %self.kind, version = %self.version, "Operator version changed, upgrading");
                metrics::record_install_event(&self.kind, InstallEvent::Upgrade);
                self.cleanup_main().await?;
                status.mark_reinstall(UPGRADE_PENDING);
                return Ok(ReconcileOutcome::Requeue(self.requeue_after));
            }
            SetState::UpdateRequired => {
                info!(kind = %self.kind, "Spec changed, updating main installer sets");
                self.update(owner, &sets, manifest, TYPE_MAIN).await?
            }
            SetState::InDeletion => {
                debug!(kind = %self.kind, "Main installer sets are being deleted");
                return Ok(ReconcileOutcome::Requeue(self.requeue_after));
            }
            SetState::Ok => sets,
        };

        status.mark_installer_set_available();

        match status_check(&sets) {
            StatusCheck::Ready => {
                status.mark_installer_set_ready();
                Ok(ReconcileOutcome::Done)
            }
            StatusCheck::Pending(msg) => {
                debug!(kind = %self.kind, message = %msg, "Main installer sets not ready yet");
                status.mark_installer_set_not_ready(&msg);
                Ok(ReconcileOutcome::Requeue(self.requeue_after))
            }
            StatusCheck::Failed(msg) => {
                warn!(kind = %self.kind, message = %msg, "Main installer set failed");
                status.mark_installer_set_not_ready(&msg);
                Err(InstallerSetError::NotReady(msg))
            }
        }
    }
}
