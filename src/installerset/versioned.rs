use kube::ResourceExt;
use tracing::{debug, info};

use super::{classify, Expected, InstallerSetClient, InstallerSetError, SetOwner, SetState};
use crate::labels::{self, custom_type, MetadataContract, RELEASE_MINOR_VERSION_KEY};
use crate::manifest::Manifest;
use crate::outcome::ReconcileOutcome;

/// Versioned sets kept per type, the current minor included
pub const VERSIONED_RETENTION_COUNT: usize = 2;

/// Numeric `(major, minor)` of an `X.Y` label; unparsable parts sort first
fn minor_key(minor: Option<&str>) -> (u64, u64) {
    let mut parts = minor
        .unwrap_or_default()
        .trim_start_matches('v')
        .split('.')
        .map(|p| p.parse::<u64>().unwrap_or(0));
    (parts.next().unwrap_or(0), parts.next().unwrap_or(0))
}

impl InstallerSetClient {
    /// Converge a set kept per `X.Y` operator version
    ///
    /// Patch upgrades keep the existing set. A minor upgrade creates a new
    /// set next to the old ones; once it exists, only the newest
    /// [`VERSIONED_RETENTION_COUNT`] minors are kept.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerSetError::NotReady`] when the set reports
    /// `Ready=False`, or any store failure.
    pub async fn versioned_set(
        &self,
        owner: &SetOwner,
        suffix: &str,
        name_prefix: &str,
        manifest: &Manifest,
    ) -> Result<ReconcileOutcome, InstallerSetError> {
        let set_type = custom_type(suffix);
        let minor = labels::minor_version(&self.version);

        let (current, stale): (Vec<_>, Vec<_>) = self
            .list(&set_type)
            .await?
            .into_iter()
            .partition(|s| s.label(RELEASE_MINOR_VERSION_KEY) == Some(minor.as_str()));

        if current.is_empty() {
            info!(kind = %self.kind, set_type = %set_type, minor = %minor, "Versioned installer set not found, creating");
            self.create_one(
                owner,
                &set_type,
                &format!("{name_prefix}-{minor}-"),
                manifest,
                &[(RELEASE_MINOR_VERSION_KEY, minor.as_str())],
            )
            .await?;
            return Ok(ReconcileOutcome::Requeue(self.requeue_after));
        }

        let mut older = stale;
        older.sort_by(|a, b| {
            minor_key(b.label(RELEASE_MINOR_VERSION_KEY))
                .cmp(&minor_key(a.label(RELEASE_MINOR_VERSION_KEY)))
                .then_with(|| b.name_any().cmp(&a.name_any()))
        });
        let expired = older.split_off(std::cmp::min(
            older.len(),
            VERSIONED_RETENTION_COUNT.saturating_sub(1),
        ));
        if !expired.is_empty() {
            debug!(
                kind = %self.kind,
                set_type = %set_type,
                kept = ?older.iter().map(ResourceExt::name_any).collect::<Vec<_>>(),
                expired = ?expired.iter().map(ResourceExt::name_any).collect::<Vec<_>>(),
                "Pruning installer sets beyond the retained minor versions"
            );
            self.delete_sets(&set_type, &expired).await?;
        }

        let state = classify(
            &current,
            &Expected {
                set_type: &set_type,
                version: None,
                target_namespace: &owner.target_namespace,
                spec_hash: &owner.spec_hash,
            },
        );
        let current = match state {
            SetState::Invalid | SetState::NamespaceDiffer | SetState::VersionDiffer => {
                info!(kind = %self.kind, set_type = %set_type, state = ?state, "Versioned installer set drifted, recreating");
                self.delete_sets(&set_type, &current).await?;
                return Ok(ReconcileOutcome::Requeue(self.requeue_after));
            }
            SetState::InDeletion | SetState::NotFound => {
                return Ok(ReconcileOutcome::Requeue(self.requeue_after));
            }
            SetState::UpdateRequired => {
                let mut updated = Vec::with_capacity(current.len());
                for set in &current {
                    updated.push(self.update_one(owner, &set.name_any(), manifest).await?);
                }
                updated
            }
            SetState::Ok => current,
        };

        self.readiness(&set_type, &current)
    }
}
