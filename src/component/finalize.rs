//! Ordered teardown of a component
//!
//! CRDs go first so custom resources carrying finalizers are removed while
//! their controllers still run; installer sets follow with foreground
//! propagation, then the extension gets its turn.

use kube::ResourceExt;
use tracing::{info, warn, Instrument};

use super::{kind_of, main_manifest, ComponentContext, ComponentError, TektonComponent};
use crate::manifest::{self, filter};

/// Tear down everything a component CR installed
///
/// A missing payload only skips the CRD step, and extension failures are
/// logged; neither blocks removal of the finalizer.
///
/// # Errors
///
/// Returns store failures from deleting CRDs or installer sets.
pub async fn finalize<K: TektonComponent>(
    cr: &K,
    ctx: &ComponentContext<K>,
) -> Result<(), ComponentError> {
    let span = tracing::info_span!(
        "controller.component.finalize",
        resource.kind = %kind_of::<K>(),
        resource.name = %cr.name_any()
    );
    async {
        match main_manifest(cr, ctx) {
            Ok(Some(payload)) => {
                for crd in payload.filter(&filter::crds()).resources() {
                    let name = manifest::name(crd);
                    if ctx.crds.delete(name).await? {
                        info!(crd = %name, "Deleted component CRD");
                    }
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Payload unavailable, skipping CRD cleanup"),
        }

        let sets = &ctx.installer_sets;
        sets.cleanup_main().await?;
        sets.cleanup(crate::labels::TYPE_PRE).await?;
        sets.cleanup(crate::labels::TYPE_POST).await?;
        sets.cleanup_custom_sets().await?;

        if let Err(e) = ctx.extension.finalize(cr).await {
            warn!(error = %e, "Extension finalize failed");
        }
        info!("Component finalized");
        Ok(())
    }
    .instrument(span)
    .await
}
