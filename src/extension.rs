//! # Extension Hooks
//!
//! Platform policy plugged into the component reconcilers. The core calls
//! these at fixed points; the default implementation does nothing, so the
//! reconcilers never check whether an extension is present.

use async_trait::async_trait;
use std::marker::PhantomData;

use crate::manifest::Transformer;
use crate::outcome::ReconcileOutcome;

/// Hooks invoked by the component reconciler for resource `K`
#[async_trait]
pub trait Extension<K>: Send + Sync
where
    K: Send + Sync,
{
    /// Transformers run before every built-in transformer
    fn transformers(&self, _cr: &K) -> Vec<Transformer> {
        Vec::new()
    }

    /// Runs before the main installer set is converged
    ///
    /// A non-`Done` outcome is returned to the caller as is. An error marks
    /// `PreReconciler` failed and ends the pass without a retry.
    async fn pre_reconcile(&self, _cr: &K) -> anyhow::Result<ReconcileOutcome> {
        Ok(ReconcileOutcome::Done)
    }

    /// Runs once the installer sets are ready, same contract as
    /// [`Extension::pre_reconcile`]
    async fn post_reconcile(&self, _cr: &K) -> anyhow::Result<ReconcileOutcome> {
        Ok(ReconcileOutcome::Done)
    }

    /// Platform cleanup, after CRDs and installer sets are gone
    async fn finalize(&self, _cr: &K) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Extension that does nothing
pub struct NoopExtension<K>(PhantomData<fn() -> K>);

impl<K> Default for NoopExtension<K> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<K> std::fmt::Debug for NoopExtension<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("NoopExtension")
    }
}

#[async_trait]
impl<K> Extension<K> for NoopExtension<K> where K: Send + Sync {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{TektonChain, TektonChainSpec};

    #[tokio::test]
    async fn test_noop_extension_is_transparent() {
        let ext = NoopExtension::<TektonChain>::default();
        let cr = TektonChain::new("chain", TektonChainSpec::default());
        assert!(ext.transformers(&cr).is_empty());
        assert_eq!(ext.pre_reconcile(&cr).await.unwrap(), ReconcileOutcome::Done);
        assert_eq!(ext.post_reconcile(&cr).await.unwrap(), ReconcileOutcome::Done);
        assert!(ext.finalize(&cr).await.is_ok());
    }
}
