//! # Runtime
//!
//! Process wiring: initialization, one watch loop per kind, error policy.

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;

use anyhow::Result;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::Client;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::component::{kind_of, ComponentContext, TektonComponent};
use crate::config::OperatorConfig;
use crate::controller::reconciler::{ManagedResource, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::{
    ManualApprovalGate, OpenShiftPipelinesAsCode, TektonAddon, TektonChain, TektonConfig,
    TektonDashboard, TektonHub, TektonInstallerSet, TektonPipeline, TektonPruner, TektonResult,
    TektonScheduler, TektonTrigger,
};
use crate::extension::NoopExtension;
use crate::installerset::InstallerSetClient;
use crate::manifest::payload::PayloadCache;
use crate::store::{ClusterApi, KubeCluster, KubeStore, ObjectStore};
use crate::tektonconfig::{ConfigContext, SatelliteStores};

pub use initialization::{initialize, InitializationResult};

/// Handles shared by every controller
struct Shared {
    client: Client,
    config: Arc<OperatorConfig>,
    installer_sets: Arc<dyn ObjectStore<TektonInstallerSet>>,
    pipelines: Arc<dyn ObjectStore<TektonPipeline>>,
    namespaces: Arc<dyn ObjectStore<Namespace>>,
    crds: Arc<dyn ObjectStore<CustomResourceDefinition>>,
    cluster: Arc<dyn ClusterApi>,
    payloads: Arc<PayloadCache>,
}

impl Shared {
    fn new(client: Client, config: Arc<OperatorConfig>) -> Self {
        Self {
            installer_sets: Arc::new(KubeStore::new(client.clone())),
            pipelines: Arc::new(KubeStore::new(client.clone())),
            namespaces: Arc::new(KubeStore::new(client.clone())),
            crds: Arc::new(KubeStore::new(client.clone())),
            cluster: Arc::new(KubeCluster::new(client.clone())),
            payloads: Arc::new(PayloadCache::new(config.ko_data_path.clone())),
            client,
            config,
        }
    }

    fn store<K: ManagedResource>(&self) -> Arc<dyn ObjectStore<K>> {
        Arc::new(KubeStore::<K>::new(self.client.clone()))
    }

    fn component<K: TektonComponent>(&self) -> Arc<Reconciler<K>> {
        let context = ComponentContext::<K> {
            store: self.store(),
            installer_sets: InstallerSetClient::new(
                Arc::clone(&self.installer_sets),
                &kind_of::<K>(),
                &self.config,
            ),
            pipelines: Arc::clone(&self.pipelines),
            namespaces: Arc::clone(&self.namespaces),
            crds: Arc::clone(&self.crds),
            cluster: Arc::clone(&self.cluster),
            payloads: Arc::clone(&self.payloads),
            extension: Arc::new(NoopExtension::<K>::default()),
            config: Arc::clone(&self.config),
        };
        Arc::new(Reconciler::new(
            self.client.clone(),
            Arc::new(context),
            Arc::clone(&self.config),
        ))
    }

    fn umbrella(&self) -> Arc<Reconciler<TektonConfig>> {
        let context = ConfigContext {
            store: self.store(),
            namespaces: Arc::clone(&self.namespaces),
            cluster: Arc::clone(&self.cluster),
            satellites: SatelliteStores {
                pipeline: Arc::clone(&self.pipelines),
                trigger: self.store(),
                chain: self.store(),
                result: self.store(),
                dashboard: self.store(),
                hub: self.store(),
                pruner: self.store(),
                scheduler: self.store(),
                approval: self.store(),
                pac: self.store(),
                addon: self.store(),
            },
            extension: Arc::new(NoopExtension::<TektonConfig>::default()),
            config: Arc::clone(&self.config),
        };
        Arc::new(Reconciler::new(
            self.client.clone(),
            Arc::new(context),
            Arc::clone(&self.config),
        ))
    }
}

fn spawn<K: ManagedResource>(
    set: &mut JoinSet<Result<()>>,
    reconciler: Arc<Reconciler<K>>,
    server_state: &Arc<ServerState>,
) {
    set.spawn(watch_loop::run_watch_loop(reconciler, Arc::clone(server_state)));
}

/// Run every controller until shutdown
///
/// # Errors
///
/// Returns the first watch loop failure.
pub async fn run(init: InitializationResult) -> Result<()> {
    let InitializationResult {
        client,
        config,
        server_state,
    } = init;

    let shutdown_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, waiting for in-flight reconciliations");
            shutdown_state.set_ready(false);
        }
    });

    let shared = Shared::new(client, config);
    let mut set = JoinSet::new();
    spawn(&mut set, shared.umbrella(), &server_state);
    spawn(&mut set, shared.component::<TektonPipeline>(), &server_state);
    spawn(&mut set, shared.component::<TektonTrigger>(), &server_state);
    spawn(&mut set, shared.component::<TektonChain>(), &server_state);
    spawn(&mut set, shared.component::<TektonResult>(), &server_state);
    spawn(&mut set, shared.component::<TektonDashboard>(), &server_state);
    spawn(&mut set, shared.component::<TektonHub>(), &server_state);
    spawn(&mut set, shared.component::<TektonPruner>(), &server_state);
    spawn(&mut set, shared.component::<TektonScheduler>(), &server_state);
    spawn(&mut set, shared.component::<ManualApprovalGate>(), &server_state);
    spawn(&mut set, shared.component::<OpenShiftPipelinesAsCode>(), &server_state);
    spawn(&mut set, shared.component::<TektonAddon>(), &server_state);
    info!(controllers = set.len(), "Controllers started");

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(error = %e, "Watch loop failed");
                return Err(e);
            }
            Err(e) => {
                error!(error = %e, "Watch loop task panicked");
                return Err(e.into());
            }
        }
    }
    info!("All controllers stopped");
    Ok(())
}
