//! # Dependency Gate
//!
//! Satellite components install only once the pipeline engine is ready, and
//! some additionally need an API group served by the cluster.

use tracing::debug;

use crate::crd::status::UPGRADE_PENDING;
use crate::crd::TektonPipeline;
use crate::labels::MetadataContract;
use crate::store::{ClusterApi, ObjectStore, StoreError};

/// Fixed name of the pipeline engine CR
pub const PIPELINE_RESOURCE_NAME: &str = "pipeline";

#[derive(Debug, thiserror::Error)]
pub enum DependencyError {
    /// Pipeline CR exists but is not ready yet
    #[error("tekton-pipelines not ready")]
    PipelineNotReady,

    /// Pipeline CR is being reinstalled for an operator upgrade
    #[error("dependency upgrade pending")]
    UpgradePending,

    #[error("tekton-pipelines does not exist")]
    PipelineNotFound,

    #[error("API {0} does not exist. Please install {0}")]
    MissingApi(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DependencyError {
    /// Whether the caller should wait rather than fail
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DependencyError::PipelineNotReady | DependencyError::UpgradePending
        )
    }
}

/// The pipeline engine CR, if it exists and is ready for `version`
///
/// A pipeline CR without the release-version label, or labelled with another
/// version, has not been reconciled by this operator version yet.
///
/// # Errors
///
/// Returns [`DependencyError::PipelineNotFound`] when absent,
/// [`DependencyError::UpgradePending`] while the pipeline is behind `version`
/// or its `Ready` message carries the upgrade marker, and
/// [`DependencyError::PipelineNotReady`] otherwise.
pub async fn pipeline_ready(
    pipelines: &dyn ObjectStore<TektonPipeline>,
    version: &str,
) -> Result<TektonPipeline, DependencyError> {
    let pipeline = pipelines
        .get(PIPELINE_RESOURCE_NAME)
        .await?
        .ok_or(DependencyError::PipelineNotFound)?;

    if upgrade_pending(&pipeline, version) {
        debug!(
            pipeline_version = ?pipeline.release_version(),
            operator_version = %version,
            "Pipeline upgrade pending"
        );
        return Err(DependencyError::UpgradePending);
    }
    if !pipeline.status.as_ref().is_some_and(|s| s.is_ready()) {
        return Err(DependencyError::PipelineNotReady);
    }
    Ok(pipeline)
}

/// Whether `pipeline` still has to be reconciled for `version`
#[must_use]
pub fn upgrade_pending(pipeline: &TektonPipeline, version: &str) -> bool {
    if pipeline.release_version() != Some(version) {
        return true;
    }
    pipeline
        .status
        .as_ref()
        .and_then(|s| s.condition(crate::crd::status::READY))
        .is_some_and(|c| c.message().contains(UPGRADE_PENDING))
}

/// Fail unless discovery serves `group_version`
///
/// # Errors
///
/// Returns [`DependencyError::MissingApi`] when the API is absent.
pub async fn require_api(
    cluster: &dyn ClusterApi,
    group_version: &str,
) -> Result<(), DependencyError> {
    if cluster.has_group_version(group_version).await? {
        debug!(api = %group_version, "Required API present");
        Ok(())
    } else {
        Err(DependencyError::MissingApi(group_version.to_string()))
    }
}
