//! # Watch Loop
//!
//! One kube-runtime [`Controller`] per kind. Component controllers watch
//! their own CRs and the installer sets they own; the `TektonConfig`
//! controller watches the satellite CRs instead. Each loop restarts when the
//! stream ends unless a shutdown was requested.

use futures::StreamExt;
use kube::api::Api;
use kube::runtime::{watcher, Controller};
use kube::{Client, Resource};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

use super::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use crate::constants::{DEFAULT_WATCH_BACKOFF_MAX_MS, DEFAULT_WATCH_BACKOFF_START_MS};
use crate::controller::reconciler::{reconcile, ManagedResource, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::{
    ManualApprovalGate, OpenShiftPipelinesAsCode, TektonAddon, TektonChain, TektonConfig,
    TektonDashboard, TektonHub, TektonInstallerSet, TektonPipeline, TektonPruner, TektonResult,
    TektonScheduler, TektonTrigger,
};

/// Whether a kind's controller watches the satellite CRs rather than installer sets
fn owns_satellites(kind: &str) -> bool {
    kind == TektonConfig::kind(&())
}

fn with_owned_watches<K: ManagedResource>(controller: Controller<K>, client: &Client) -> Controller<K> {
    let config = watcher::Config::default;
    if !owns_satellites(&K::kind(&())) {
        return controller.owns(Api::<TektonInstallerSet>::all(client.clone()), config());
    }
    controller
        .owns(Api::<TektonPipeline>::all(client.clone()), config())
        .owns(Api::<TektonTrigger>::all(client.clone()), config())
        .owns(Api::<TektonChain>::all(client.clone()), config())
        .owns(Api::<TektonResult>::all(client.clone()), config())
        .owns(Api::<TektonDashboard>::all(client.clone()), config())
        .owns(Api::<TektonHub>::all(client.clone()), config())
        .owns(Api::<TektonPruner>::all(client.clone()), config())
        .owns(Api::<TektonScheduler>::all(client.clone()), config())
        .owns(Api::<ManualApprovalGate>::all(client.clone()), config())
        .owns(Api::<OpenShiftPipelinesAsCode>::all(client.clone()), config())
        .owns(Api::<TektonAddon>::all(client.clone()), config())
}

/// Run the controller for `K` until shutdown
///
/// # Errors
///
/// Currently never fails; the signature leaves room for startup checks.
pub async fn run_watch_loop<K: ManagedResource>(
    reconciler: Arc<Reconciler<K>>,
    server_state: Arc<ServerState>,
) -> Result<(), anyhow::Error> {
    let kind = K::kind(&()).to_string();
    let backoff_ms = Arc::new(AtomicU64::new(DEFAULT_WATCH_BACKOFF_START_MS));
    let restart_delay = reconciler.config.watch_restart_delay_duration();
    let restart_after_end = reconciler.config.watch_restart_delay_after_end_duration();

    loop {
        if !server_state.ready() {
            info!(kind = %kind, "Shutdown requested, exiting watch loop");
            break;
        }

        let watch_span = tracing::info_span!("controller.watch", kind = %kind);
        info!(parent: &watch_span, kind = %kind, "Starting controller watch loop");

        let client = reconciler.client.clone();
        let backoff = Arc::clone(&backoff_ms);
        let controller =
            Controller::new(Api::<K>::all(client.clone()), watcher::Config::default().any_semantic());
        with_owned_watches(controller, &client)
            .shutdown_on_signal()
            .run(reconcile, handle_reconciliation_error, Arc::clone(&reconciler))
            .filter_map(move |event| {
                let backoff = Arc::clone(&backoff);
                async move {
                    match &event {
                        Ok((obj, _)) => {
                            backoff.store(DEFAULT_WATCH_BACKOFF_START_MS, std::sync::atomic::Ordering::Relaxed);
                            debug!(resource.name = %obj.name, "watch.event.reconciled");
                            Some(event)
                        }
                        Err(e) => {
                            let error_string = format!("{e:?}");
                            handle_watch_stream_error(
                                &error_string,
                                &backoff,
                                DEFAULT_WATCH_BACKOFF_MAX_MS,
                                restart_delay,
                            )
                            .await
                            .map(|()| event)
                        }
                    }
                }
            })
            .for_each(|_| futures::future::ready(()))
            .instrument(watch_span)
            .await;

        if !server_state.ready() {
            info!(kind = %kind, "Shutdown requested, exiting watch loop");
            break;
        }
        warn!(
            kind = %kind,
            delay_secs = restart_after_end.as_secs(),
            "Controller watch stream ended, restarting"
        );
        tokio::time::sleep(restart_after_end).await;
    }

    info!(kind = %kind, "Controller stopped gracefully");
    Ok(())
}
