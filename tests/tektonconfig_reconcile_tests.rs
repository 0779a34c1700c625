//! # TektonConfig Reconcile Scenarios
//!
//! The umbrella reconciler against in-memory satellite stores: profile
//! materialisation, readiness aggregation, profile switches and teardown.

mod common;

use k8s_openapi::api::core::v1::Namespace;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

use common::{ready_component_status, Cluster, FakeCluster, MemoryStore, VERSION};
use tekton_installer_operator::config::{OperatorConfig, Platform};
use tekton_installer_operator::crd::status::{COMPONENTS_READY, PRE_INSTALL, READY, REASON_RESOURCE_IGNORED};
use tekton_installer_operator::crd::{
    ComponentStatus, ManualApprovalGate, OpenShiftPipelinesAsCode, Scc, TektonAddon, TektonChain, TektonConfig,
    TektonConfigSpec, TektonDashboard, TektonHub, TektonPruner, TektonResult, TektonScheduler,
    TektonTrigger, PROFILE_ALL, PROFILE_LITE,
};
use tekton_installer_operator::extension::NoopExtension;
use tekton_installer_operator::labels::{
    MetadataContract, MARK_FOR_DELETION_LABEL, RELEASE_VERSION_KEY, TARGET_NAMESPACE_LABEL,
};
use tekton_installer_operator::outcome::ReconcileOutcome;
use tekton_installer_operator::store::ObjectStore;
use tekton_installer_operator::tektonconfig::scc::SecurityContextConstraints;
use tekton_installer_operator::tektonconfig::{self, ConfigContext, SatelliteStores};

/// Every store the umbrella touches, kept typed for assertions
struct Umbrella {
    cluster: Cluster,
    configs: Arc<MemoryStore<TektonConfig>>,
    triggers: Arc<MemoryStore<TektonTrigger>>,
    chains: Arc<MemoryStore<TektonChain>>,
    results: Arc<MemoryStore<TektonResult>>,
    dashboards: Arc<MemoryStore<TektonDashboard>>,
    hubs: Arc<MemoryStore<TektonHub>>,
    pruners: Arc<MemoryStore<TektonPruner>>,
    schedulers: Arc<MemoryStore<TektonScheduler>>,
    approvals: Arc<MemoryStore<ManualApprovalGate>>,
    pacs: Arc<MemoryStore<OpenShiftPipelinesAsCode>>,
    addons: Arc<MemoryStore<TektonAddon>>,
    ctx: ConfigContext,
}

impl Umbrella {
    fn new(platform: Platform) -> Self {
        Self::with_cluster(platform, FakeCluster::default())
    }

    fn with_cluster(platform: Platform, fake: FakeCluster) -> Self {
        let cluster = Cluster::with_cluster(fake);
        let configs = cluster.store::<TektonConfig>();
        let triggers = cluster.store::<TektonTrigger>();
        let chains = cluster.store::<TektonChain>();
        let results = cluster.store::<TektonResult>();
        let dashboards = cluster.store::<TektonDashboard>();
        let hubs = cluster.store::<TektonHub>();
        let pruners = cluster.store::<TektonPruner>();
        let schedulers = cluster.store::<TektonScheduler>();
        let approvals = cluster.store::<ManualApprovalGate>();
        let pacs = cluster.store::<OpenShiftPipelinesAsCode>();
        let addons = cluster.store::<TektonAddon>();
        let ctx = ConfigContext {
            store: configs.clone(),
            namespaces: cluster.namespaces.clone(),
            cluster: cluster.cluster.clone(),
            satellites: SatelliteStores {
                pipeline: cluster.pipelines.clone(),
                trigger: triggers.clone(),
                chain: chains.clone(),
                result: results.clone(),
                dashboard: dashboards.clone(),
                hub: hubs.clone(),
                pruner: pruners.clone(),
                scheduler: schedulers.clone(),
                approval: approvals.clone(),
                pac: pacs.clone(),
                addon: addons.clone(),
            },
            extension: Arc::new(NoopExtension::<TektonConfig>::default()),
            config: Arc::new(OperatorConfig {
                platform,
                ..(*cluster.config).clone()
            }),
        };
        Self {
            cluster,
            configs,
            triggers,
            chains,
            results,
            dashboards,
            hubs,
            pruners,
            schedulers,
            approvals,
            pacs,
            addons,
            ctx,
        }
    }

    fn seed(&self, spec: TektonConfigSpec) -> TektonConfig {
        self.configs.seed(TektonConfig::new("config", spec))
    }

    async fn pass(&self, cr: &mut TektonConfig) -> ReconcileOutcome {
        tektonconfig::reconcile(cr, &self.ctx).await.unwrap()
    }

    /// Kinds of the satellites currently on the cluster, in creation order
    fn satellites(&self) -> Vec<&'static str> {
        let present = [
            ("TektonPipeline", !self.cluster.pipelines.all().is_empty()),
            ("TektonTrigger", !self.triggers.all().is_empty()),
            ("TektonChain", !self.chains.all().is_empty()),
            ("TektonResult", !self.results.all().is_empty()),
            ("TektonDashboard", !self.dashboards.all().is_empty()),
            ("TektonHub", !self.hubs.all().is_empty()),
            ("TektonPruner", !self.pruners.all().is_empty()),
            ("TektonScheduler", !self.schedulers.all().is_empty()),
            ("ManualApprovalGate", !self.approvals.all().is_empty()),
            ("OpenShiftPipelinesAsCode", !self.pacs.all().is_empty()),
            ("TektonAddon", !self.addons.all().is_empty()),
        ];
        present
            .into_iter()
            .filter_map(|(kind, on)| on.then_some(kind))
            .collect()
    }

    /// Play the component reconcilers: every satellite reports ready at `version`
    async fn mark_satellites_ready(&self, version: &str) {
        let status = ready_component_status(version);
        if self.cluster.pipelines.object("pipeline").is_some() {
            self.cluster.pipelines.patch_status("pipeline", status.clone()).await.unwrap();
        }
        if self.triggers.object("trigger").is_some() {
            self.triggers.patch_status("trigger", status.clone()).await.unwrap();
        }
        if self.chains.object("chain").is_some() {
            self.chains.patch_status("chain", status.clone()).await.unwrap();
        }
        if self.dashboards.object("dashboard").is_some() {
            self.dashboards.patch_status("dashboard", status.clone()).await.unwrap();
        }
        if self.pruners.object("pruner").is_some() {
            self.pruners.patch_status("pruner", status).await.unwrap();
        }
    }
}

fn basic_spec() -> TektonConfigSpec {
    TektonConfigSpec::default()
}

fn condition<'a>(cr: &'a TektonConfig, type_: &str) -> &'a tekton_installer_operator::crd::Condition {
    cr.status.as_ref().and_then(|s| s.condition(type_)).unwrap()
}

/// Stamp, materialise, then converge once every satellite is ready
async fn installed(umbrella: &Umbrella, spec: TektonConfigSpec) -> TektonConfig {
    let mut cr = umbrella.seed(spec);
    assert_eq!(umbrella.pass(&mut cr).await, ReconcileOutcome::ReconcileAgain);
    assert!(matches!(umbrella.pass(&mut cr).await, ReconcileOutcome::Requeue(_)));
    umbrella.mark_satellites_ready(VERSION).await;
    assert_eq!(umbrella.pass(&mut cr).await, ReconcileOutcome::Done);
    cr
}

mod profile_tests {
    use super::*;

    #[tokio::test]
    async fn test_basic_profile_materialises_pipeline_trigger_chain() {
        let umbrella = Umbrella::new(Platform::Kubernetes);
        let mut cr = umbrella.seed(basic_spec());
        umbrella.pass(&mut cr).await;

        let outcome = umbrella.pass(&mut cr).await;

        assert!(matches!(outcome, ReconcileOutcome::Requeue(_)));
        assert_eq!(
            umbrella.satellites(),
            vec!["TektonPipeline", "TektonTrigger", "TektonChain"]
        );
        let pipeline = umbrella.cluster.pipelines.object("pipeline").unwrap();
        assert_eq!(pipeline.spec.common.target_namespace, "tekton-pipelines");
        assert_eq!(pipeline.label(RELEASE_VERSION_KEY), Some(VERSION));
        assert_eq!(pipeline.owner_references()[0].uid, cr.uid().unwrap());
        assert_eq!(pipeline.owner_references()[0].kind, "TektonConfig");
        assert_eq!(
            cr.status.as_ref().unwrap().profile.as_deref(),
            Some("basic")
        );

        let components = condition(&cr, COMPONENTS_READY);
        assert!(components.is_false());
        assert!(components
            .message()
            .contains("TektonPipeline: reconcile again and proceed"));
    }

    #[tokio::test]
    async fn test_target_namespace_is_owned_by_umbrella() {
        let umbrella = Umbrella::new(Platform::Kubernetes);
        let cr = installed(&umbrella, basic_spec()).await;

        let ns = umbrella.cluster.namespaces.object("tekton-pipelines").unwrap();
        assert_eq!(ns.label(TARGET_NAMESPACE_LABEL), Some("true"));
        assert_eq!(ns.owner_references()[0].uid, cr.uid().unwrap());
    }

    #[tokio::test]
    async fn test_ready_satellites_make_umbrella_ready() {
        let umbrella = Umbrella::new(Platform::Kubernetes);
        let cr = installed(&umbrella, basic_spec()).await;

        let status = cr.status.as_ref().unwrap();
        assert!(status.is_ready());
        assert_eq!(status.version.as_deref(), Some(VERSION));
        assert!(condition(&cr, PRE_INSTALL).is_true());
        assert!(condition(&cr, COMPONENTS_READY).is_true());
    }

    #[tokio::test]
    async fn test_satellite_on_previous_version_is_pending() {
        let umbrella = Umbrella::new(Platform::Kubernetes);
        let mut cr = umbrella.seed(basic_spec());
        umbrella.pass(&mut cr).await;
        umbrella.pass(&mut cr).await;
        umbrella.mark_satellites_ready("v0.69.0").await;

        let outcome = umbrella.pass(&mut cr).await;

        assert!(matches!(outcome, ReconcileOutcome::Requeue(_)));
        assert!(condition(&cr, COMPONENTS_READY)
            .message()
            .contains("TektonPipeline: upgrade pending"));
    }

    #[tokio::test]
    async fn test_all_profile_on_kubernetes() {
        let umbrella = Umbrella::new(Platform::Kubernetes);
        let mut cr = umbrella.seed(TektonConfigSpec {
            profile: PROFILE_ALL.to_string(),
            ..TektonConfigSpec::default()
        });
        umbrella.pass(&mut cr).await;
        umbrella.pass(&mut cr).await;

        assert_eq!(
            umbrella.satellites(),
            vec![
                "TektonPipeline",
                "TektonTrigger",
                "TektonChain",
                "TektonDashboard",
                "TektonPruner"
            ]
        );
    }

    #[tokio::test]
    async fn test_results_are_opt_in() {
        let umbrella = Umbrella::new(Platform::Kubernetes);
        let mut spec = basic_spec();
        spec.result.disabled = Some(false);
        let mut cr = umbrella.seed(spec);
        umbrella.pass(&mut cr).await;
        umbrella.pass(&mut cr).await;

        assert!(umbrella.satellites().contains(&"TektonResult"));
        assert!(!umbrella.satellites().contains(&"TektonHub"));
    }

    #[tokio::test]
    async fn test_umbrella_spec_change_reaches_satellite() {
        let umbrella = Umbrella::new(Platform::Kubernetes);
        let mut cr = installed(&umbrella, basic_spec()).await;

        cr.spec.pipeline.defaults.default_timeout_minutes = Some(120);
        umbrella.pass(&mut cr).await;

        let pipeline = umbrella.cluster.pipelines.object("pipeline").unwrap();
        assert_eq!(pipeline.spec.pipeline.defaults.default_timeout_minutes, Some(120));
        assert!(pipeline.status.as_ref().unwrap().is_ready());
    }

    #[tokio::test]
    async fn test_wrong_name_is_ignored() {
        let umbrella = Umbrella::new(Platform::Kubernetes);
        let mut cr = umbrella
            .configs
            .seed(TektonConfig::new("my-config", basic_spec()));

        let outcome = umbrella.pass(&mut cr).await;

        assert_eq!(outcome, ReconcileOutcome::Done);
        let ready = condition(&cr, READY);
        assert_eq!(ready.reason.as_deref(), Some(REASON_RESOURCE_IGNORED));
        assert!(umbrella.satellites().is_empty());
    }
}

mod switch_tests {
    use super::*;

    #[tokio::test]
    async fn test_switch_to_lite_deletes_satellites_in_reverse_order() {
        let umbrella = Umbrella::new(Platform::Kubernetes);
        let mut cr = installed(&umbrella, basic_spec()).await;

        cr.spec.profile = PROFILE_LITE.to_string();
        let outcome = umbrella.pass(&mut cr).await;

        assert_eq!(outcome, ReconcileOutcome::Done);
        assert_eq!(umbrella.satellites(), vec!["TektonPipeline"]);
        assert_eq!(
            umbrella.cluster.deletions(),
            vec!["delete TektonChain/chain", "delete TektonTrigger/trigger"]
        );
    }

    /// Pipeline reports nothing yet, so the next pass stops at readiness
    async fn reset_pipeline_status(umbrella: &Umbrella) {
        let empty = serde_json::to_value(ComponentStatus::default()).unwrap();
        umbrella.cluster.pipelines.patch_status("pipeline", empty).await.unwrap();
    }

    #[tokio::test]
    async fn test_previous_target_namespace_is_marked() {
        let umbrella = Umbrella::new(Platform::Kubernetes);
        let mut cr = installed(&umbrella, basic_spec()).await;
        reset_pipeline_status(&umbrella).await;

        cr.spec.target_namespace = "ci".to_string();
        let outcome = umbrella.pass(&mut cr).await;

        assert!(matches!(outcome, ReconcileOutcome::Requeue(_)));

        let old = umbrella.cluster.namespaces.object("tekton-pipelines").unwrap();
        assert_eq!(old.label(MARK_FOR_DELETION_LABEL), Some("true"));
        let new = umbrella.cluster.namespaces.object("ci").unwrap();
        assert!(new.label(MARK_FOR_DELETION_LABEL).is_none());
        let pipeline = umbrella.cluster.pipelines.object("pipeline").unwrap();
        assert_eq!(pipeline.spec.common.target_namespace, "ci");
    }

    #[tokio::test]
    async fn test_previous_target_namespace_deleted_once_converged() {
        let umbrella = Umbrella::new(Platform::Kubernetes);
        let mut cr = installed(&umbrella, basic_spec()).await;
        reset_pipeline_status(&umbrella).await;
        cr.spec.target_namespace = "ci".to_string();
        umbrella.pass(&mut cr).await;
        assert!(umbrella.cluster.namespaces.object("tekton-pipelines").is_some());

        umbrella.mark_satellites_ready(VERSION).await;
        let outcome = umbrella.pass(&mut cr).await;

        assert_eq!(outcome, ReconcileOutcome::Done);
        assert!(umbrella.cluster.namespaces.object("tekton-pipelines").is_none());
        assert!(umbrella
            .cluster
            .deletions()
            .contains(&"delete Namespace/tekton-pipelines".to_string()));
        assert!(umbrella.cluster.namespaces.object("ci").is_some());
    }
}

mod openshift_tests {
    use super::*;

    fn scc(value: serde_json::Value) -> SecurityContextConstraints {
        serde_json::from_value(value).unwrap()
    }

    fn openshift_cluster() -> FakeCluster {
        FakeCluster {
            group_versions: Vec::new(),
            sccs: vec![
                scc(json!({
                    "metadata": {"name": "restricted-v2"},
                    "runAsUser": {"type": "MustRunAsRange"},
                    "seLinuxContext": {"type": "MustRunAs"},
                    "volumes": ["configMap", "emptyDir", "secret"],
                    "requiredDropCapabilities": ["ALL"]
                })),
                scc(json!({
                    "metadata": {"name": "anyuid"},
                    "priority": 10,
                    "runAsUser": {"type": "RunAsAny"},
                    "seLinuxContext": {"type": "MustRunAs"},
                    "volumes": ["configMap", "emptyDir", "secret"],
                    "requiredDropCapabilities": ["MKNOD"]
                })),
                scc(json!({
                    "metadata": {"name": "pipelines-scc"},
                    "runAsUser": {"type": "MustRunAsRange"},
                    "seLinuxContext": {"type": "MustRunAs"},
                    "volumes": ["configMap", "emptyDir", "secret", "csi"],
                    "requiredDropCapabilities": ["ALL"]
                })),
            ],
        }
    }

    #[tokio::test]
    async fn test_all_profile_on_openshift() {
        let umbrella = Umbrella::with_cluster(Platform::OpenShift, openshift_cluster());
        let mut cr = umbrella.seed(TektonConfigSpec {
            profile: PROFILE_ALL.to_string(),
            ..TektonConfigSpec::default()
        });
        umbrella.pass(&mut cr).await;

        assert!(matches!(umbrella.pass(&mut cr).await, ReconcileOutcome::Requeue(_)));

        assert_eq!(
            umbrella.satellites(),
            vec![
                "TektonPipeline",
                "TektonTrigger",
                "TektonChain",
                "TektonPruner",
                "OpenShiftPipelinesAsCode",
                "TektonAddon"
            ]
        );
        assert_eq!(cr.spec.target_namespace, "openshift-pipelines");
        assert!(condition(&cr, PRE_INSTALL).is_true());
    }

    #[tokio::test]
    async fn test_max_allowed_below_default_fails_pre_install() {
        let umbrella = Umbrella::with_cluster(Platform::OpenShift, openshift_cluster());
        let mut spec = basic_spec();
        spec.platforms.openshift.scc = Some(Scc {
            default: Some("anyuid".to_string()),
            max_allowed: Some("restricted-v2".to_string()),
        });
        let mut cr = umbrella.seed(spec);
        umbrella.pass(&mut cr).await;

        let outcome = umbrella.pass(&mut cr).await;

        assert_eq!(outcome, ReconcileOutcome::Done);
        let pre = condition(&cr, PRE_INSTALL);
        assert!(pre.is_false());
        assert!(pre.message().contains("must have a higher priority"));
        assert!(umbrella.satellites().is_empty());
    }

    #[tokio::test]
    async fn test_namespace_request_beyond_max_does_not_block() {
        let umbrella = Umbrella::with_cluster(Platform::OpenShift, openshift_cluster());
        umbrella.cluster.namespaces.seed(Namespace {
            metadata: ObjectMeta {
                name: Some("team-a".to_string()),
                annotations: Some(BTreeMap::from([(
                    "operator.tekton.dev/scc".to_string(),
                    "anyuid".to_string(),
                )])),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        });
        let mut spec = basic_spec();
        spec.platforms.openshift.scc = Some(Scc {
            default: None,
            max_allowed: Some("restricted-v2".to_string()),
        });
        let mut cr = umbrella.seed(spec);
        umbrella.pass(&mut cr).await;

        umbrella.pass(&mut cr).await;

        assert!(condition(&cr, PRE_INSTALL).is_true());
        assert!(!umbrella.satellites().is_empty());
    }
}

mod finalize_tests {
    use super::*;

    #[tokio::test]
    async fn test_finalize_deletes_satellites_in_reverse_order() {
        let umbrella = Umbrella::new(Platform::Kubernetes);
        let cr = installed(&umbrella, basic_spec()).await;

        tektonconfig::finalize(&cr, &umbrella.ctx).await.unwrap();

        assert!(umbrella.satellites().is_empty());
        assert_eq!(
            umbrella.cluster.deletions(),
            vec![
                "delete TektonChain/chain",
                "delete TektonTrigger/trigger",
                "delete TektonPipeline/pipeline"
            ]
        );
    }

    #[tokio::test]
    async fn test_finalize_removes_marked_namespaces() {
        let umbrella = Umbrella::new(Platform::Kubernetes);
        let mut cr = installed(&umbrella, basic_spec()).await;
        let empty = serde_json::to_value(ComponentStatus::default()).unwrap();
        umbrella.cluster.pipelines.patch_status("pipeline", empty).await.unwrap();
        cr.spec.target_namespace = "ci".to_string();
        umbrella.pass(&mut cr).await;
        assert!(umbrella.cluster.namespaces.object("tekton-pipelines").is_some());

        tektonconfig::finalize(&cr, &umbrella.ctx).await.unwrap();

        assert!(umbrella.cluster.namespaces.object("tekton-pipelines").is_none());
        assert!(umbrella.cluster.namespaces.object("ci").is_some());
    }

    #[tokio::test]
    async fn test_lite_finalize_only_touches_pipeline() {
        let umbrella = Umbrella::new(Platform::Kubernetes);
        let cr = installed(
            &umbrella,
            TektonConfigSpec {
                profile: PROFILE_LITE.to_string(),
                ..TektonConfigSpec::default()
            },
        )
        .await;
        umbrella.triggers.seed(TektonTrigger::new("trigger", Default::default()));

        tektonconfig::finalize(&cr, &umbrella.ctx).await.unwrap();

        assert_eq!(umbrella.satellites(), vec!["TektonTrigger"]);
        assert_eq!(
            umbrella.cluster.deletions(),
            vec!["delete TektonPipeline/pipeline"]
        );
    }
}

mod hook_tests {
    use super::*;
    use async_trait::async_trait;
    use tekton_installer_operator::extension::Extension;

    struct FailingPreInstall;

    #[async_trait]
    impl Extension<TektonConfig> for FailingPreInstall {
        async fn pre_reconcile(&self, _cr: &TektonConfig) -> anyhow::Result<ReconcileOutcome> {
            anyhow::bail!("console plugin API unavailable")
        }
    }

    #[tokio::test]
    async fn test_pre_install_hook_failure_is_recorded() {
        let mut umbrella = Umbrella::new(Platform::Kubernetes);
        umbrella.ctx.extension = Arc::new(FailingPreInstall);
        let mut cr = umbrella.seed(basic_spec());
        umbrella.pass(&mut cr).await;

        let outcome = umbrella.pass(&mut cr).await;

        assert_eq!(outcome, ReconcileOutcome::Done);
        let pre = condition(&cr, PRE_INSTALL);
        assert!(pre.is_false());
        assert!(pre.message().ends_with("with message: console plugin API unavailable"));
        assert!(umbrella.satellites().is_empty());
    }
}
