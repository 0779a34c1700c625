//! Per-kind wiring of the component reconciler

use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::{ComponentDescriptor, ExtraSet, Placement, TektonComponent};
use crate::config::{OperatorConfig, Platform};
use crate::crd::{
    param_value, AdditionalOptions, ComponentStatus, Config, ManualApprovalGate,
    OpenShiftPipelinesAsCode, Param, ResultsApiProperties, TektonAddon, TektonChain,
    TektonDashboard, TektonHub, TektonPipeline, TektonPruner, TektonResult, TektonScheduler,
    TektonTrigger,
};
use crate::manifest::{ensure_object, filter, kind, name, transform, Predicate, Transformer};

pub const RESULTS_API_CONFIG: &str = "tekton-results-api-config";
pub const RESULTS_POSTGRES_STATEFULSET: &str = "tekton-results-postgres";
pub const RESULTS_POSTGRES_SERVICE: &str = "tekton-results-postgres-service";

pub const ADDON_CLUSTER_TASKS_PARAM: &str = "clusterTasks";
pub const ADDON_PIPELINE_TEMPLATES_PARAM: &str = "pipelineTemplates";

const PIPELINE_NAMESPACE_LABEL: &str = "operator.tekton.dev/disable-proxy=true";
const PRUNER_CONFIG_MAP: &str = "tekton-pruner-default-spec";
const SCHEDULER_CONFIG_MAP: &str = "tekton-scheduler-config";
const HUB_API_CONFIG_MAP: &str = "tekton-hub-api";

macro_rules! spec_accessors {
    ($block:ident) => {
        fn target_namespace(&self) -> &str {
            &self.spec.common.target_namespace
        }

        fn set_target_namespace(&mut self, namespace: &str) {
            self.spec.common.target_namespace = namespace.to_string();
        }

        fn component_status(&self) -> Option<&ComponentStatus> {
            self.status.as_ref()
        }

        fn component_status_mut(&mut self) -> &mut ComponentStatus {
            self.status.get_or_insert_with(ComponentStatus::default)
        }

        fn options(&self) -> &AdditionalOptions {
            &self.spec.$block.options
        }

        fn config(&self) -> &Config {
            &self.spec.config
        }
    };
}

impl TektonComponent for TektonPipeline {
    const DESCRIPTOR: ComponentDescriptor = ComponentDescriptor {
        resource_name: "pipeline",
        payload_dir: Some("tekton-pipeline"),
        operand: "tektoncd-pipelines",
        image_prefix: "IMAGE_PIPELINES_",
        obsolete_types: &["pipeline"],
        needs_pipeline: false,
        required_api: None,
    };

    spec_accessors!(pipeline);

    fn set_defaults(&mut self, platform: Platform) {
        self.spec.pipeline.set_defaults(platform);
    }

    fn transformers(&self, _config: &OperatorConfig) -> Vec<Transformer> {
        let pipeline = &self.spec.pipeline;
        let resolvers = &pipeline.resolvers;
        vec![
            transform::add_config_map_values("feature-flags", &pipeline.feature_flags),
            transform::add_config_map_values("config-defaults", &pipeline.defaults),
            transform::add_config_map_values("config-observability", &pipeline.metrics),
            transform::add_config_map_values("resolvers-feature-flags", &resolvers.feature_flags()),
            transform::inject_label_on_namespace(PIPELINE_NAMESPACE_LABEL),
            transform::copy_config_map("bundleresolver-config", resolvers.bundles_resolver_config.clone()),
            transform::copy_config_map("hubresolver-config", resolvers.hub_resolver_config.clone()),
            transform::copy_config_map("cluster-resolver-config", resolvers.cluster_resolver_config.clone()),
            transform::copy_config_map("git-resolver-config", resolvers.git_resolver_config.clone()),
        ]
    }
}

impl TektonComponent for TektonTrigger {
    const DESCRIPTOR: ComponentDescriptor = ComponentDescriptor {
        resource_name: "trigger",
        payload_dir: Some("tekton-triggers"),
        operand: "tektoncd-triggers",
        image_prefix: "IMAGE_TRIGGERS_",
        obsolete_types: &["trigger"],
        needs_pipeline: true,
        required_api: None,
    };

    spec_accessors!(trigger);

    fn set_defaults(&mut self, platform: Platform) {
        self.spec.trigger.set_defaults(platform);
    }

    fn transformers(&self, _config: &OperatorConfig) -> Vec<Transformer> {
        let props = &self.spec.trigger.properties;
        vec![
            transform::add_config_map_values(
                "feature-flags-triggers",
                &json!({ "enable-api-fields": props.enable_api_fields }),
            ),
            transform::add_config_map_values(
                "config-defaults-triggers",
                &json!({ "default-service-account": props.default_service_account }),
            ),
        ]
    }
}

impl TektonComponent for TektonChain {
    const DESCRIPTOR: ComponentDescriptor = ComponentDescriptor {
        resource_name: "chain",
        payload_dir: Some("tekton-chains"),
        operand: "tektoncd-chains",
        image_prefix: "IMAGE_CHAINS_",
        obsolete_types: &["chain"],
        needs_pipeline: true,
        required_api: None,
    };

    spec_accessors!(chain);

    fn transformers(&self, _config: &OperatorConfig) -> Vec<Transformer> {
        vec![transform::add_config_map_values(
            "chains-config",
            &self.spec.chain.properties,
        )]
    }
}

impl TektonComponent for TektonResult {
    const DESCRIPTOR: ComponentDescriptor = ComponentDescriptor {
        resource_name: "result",
        payload_dir: Some("tekton-results"),
        operand: "tektoncd-results",
        image_prefix: "IMAGE_RESULTS_",
        obsolete_types: &["result"],
        needs_pipeline: true,
        required_api: None,
    };

    spec_accessors!(result);

    fn transformers(&self, _config: &OperatorConfig) -> Vec<Transformer> {
        let result = &self.spec.result;
        let db_host = (!result.is_external_db).then(|| {
            format!(
                "{RESULTS_POSTGRES_SERVICE}.{}.svc.cluster.local",
                self.spec.common.target_namespace
            )
        });
        vec![results_api_config(&result.properties, db_host)]
    }

    fn prune(&self) -> Option<Predicate> {
        if !self.spec.result.is_external_db {
            return None;
        }
        Some(filter::any(vec![
            filter::all(vec![
                filter::by_kind("StatefulSet"),
                filter::by_name(RESULTS_POSTGRES_STATEFULSET),
            ]),
            filter::all(vec![
                filter::by_kind("Service"),
                filter::by_name(RESULTS_POSTGRES_SERVICE),
            ]),
        ]))
    }
}

/// Rewrite `KEY=value` lines of the API env file for every set property
///
/// Keys are the uppercased property names; lines for unknown keys and unset
/// properties are left as shipped.
fn results_api_config(props: &ResultsApiProperties, db_host: Option<String>) -> Transformer {
    let mut values: BTreeMap<String, String> = match serde_json::to_value(props) {
        Ok(Value::Object(fields)) => fields
            .into_iter()
            .filter_map(|(k, v)| {
                let v = match v {
                    Value::String(s) if !s.is_empty() => s,
                    Value::Bool(b) => b.to_string(),
                    Value::Number(n) => n.to_string(),
                    _ => return None,
                };
                Some((k.to_uppercase(), v))
            })
            .collect(),
        _ => BTreeMap::new(),
    };
    if let Some(host) = db_host {
        values.entry("DB_HOST".to_string()).or_insert(host);
    }

    Box::new(move |resource| {
        if kind(resource) != "ConfigMap" || name(resource) != RESULTS_API_CONFIG {
            return Ok(());
        }
        let Some(data) = ensure_object(resource, &["data"]) else {
            return Ok(());
        };
        let current = data.get("config").and_then(Value::as_str).unwrap_or_default();
        let rewritten = current
            .split('\n')
            .map(|line| {
                let key = line.split('=').next().unwrap_or_default();
                match values.get(key) {
                    Some(value) => format!("{key}={value}"),
                    None => line.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        data.insert("config".to_string(), Value::String(rewritten));
        Ok(())
    })
}

impl TektonComponent for TektonDashboard {
    const DESCRIPTOR: ComponentDescriptor = ComponentDescriptor {
        resource_name: "dashboard",
        payload_dir: Some("tekton-dashboard/tekton-dashboard-fullaccess"),
        operand: "tektoncd-dashboard",
        image_prefix: "IMAGE_DASHBOARD_",
        obsolete_types: &["dashboard"],
        needs_pipeline: true,
        required_api: None,
    };

    spec_accessors!(dashboard);

    fn payload_dir(&self) -> Option<&'static str> {
        if self.spec.dashboard.readonly {
            Some("tekton-dashboard/tekton-dashboard-readonly")
        } else {
            Self::DESCRIPTOR.payload_dir
        }
    }

    fn prune(&self) -> Option<Predicate> {
        Some(filter::by_kind("Namespace"))
    }
}

impl TektonComponent for TektonHub {
    const DESCRIPTOR: ComponentDescriptor = ComponentDescriptor {
        resource_name: "hub",
        payload_dir: Some("tekton-hub"),
        operand: "tektoncd-hub",
        image_prefix: "IMAGE_HUB_",
        obsolete_types: &[],
        needs_pipeline: true,
        required_api: None,
    };

    spec_accessors!(hub);

    fn transformers(&self, _config: &OperatorConfig) -> Vec<Transformer> {
        let api = &self.spec.hub.api;
        let values = [
            ("CONFIG_FILE_URL", &api.hub_config_url),
            ("CATALOG_REFRESH_INTERVAL", &api.catalog_refresh_interval),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.clone().map(|v| (k.to_string(), v)))
        .collect();
        vec![transform::copy_config_map(HUB_API_CONFIG_MAP, values)]
    }
}

impl TektonComponent for TektonPruner {
    const DESCRIPTOR: ComponentDescriptor = ComponentDescriptor {
        resource_name: "pruner",
        payload_dir: Some("tekton-pruner"),
        operand: "tektoncd-pruner",
        image_prefix: "IMAGE_PRUNER_",
        obsolete_types: &[],
        needs_pipeline: true,
        required_api: None,
    };

    spec_accessors!(pruner);

    fn set_defaults(&mut self, _platform: Platform) {
        self.spec.pruner.set_defaults();
    }

    fn transformers(&self, _config: &OperatorConfig) -> Vec<Transformer> {
        let pruner = &self.spec.pruner;
        let global = json!({
            "schedule": pruner.schedule,
            "keep": pruner.keep,
            "keep-since": pruner.keep_since,
            "resources": pruner.resources,
        });
        vec![transform::add_config_map_values(
            PRUNER_CONFIG_MAP,
            &json!({ "global-config": global }),
        )]
    }
}

impl TektonComponent for TektonScheduler {
    const DESCRIPTOR: ComponentDescriptor = ComponentDescriptor {
        resource_name: "scheduler",
        payload_dir: Some("tekton-scheduler"),
        operand: "tektoncd-scheduler",
        image_prefix: "IMAGE_SCHEDULER_",
        obsolete_types: &[],
        needs_pipeline: true,
        required_api: Some("kueue.x-k8s.io/v1beta1"),
    };

    spec_accessors!(scheduler);

    fn transformers(&self, _config: &OperatorConfig) -> Vec<Transformer> {
        let scheduler = &self.spec.scheduler;
        vec![transform::add_config_map_values(
            SCHEDULER_CONFIG_MAP,
            &json!({
                "multi-cluster-disabled": scheduler.multi_cluster_disabled,
                "multi-cluster-role": scheduler.multi_cluster_role,
            }),
        )]
    }
}

impl TektonComponent for ManualApprovalGate {
    const DESCRIPTOR: ComponentDescriptor = ComponentDescriptor {
        resource_name: "manual-approval-gate",
        payload_dir: Some("manual-approval-gate"),
        operand: "manual-approval-gate",
        image_prefix: "IMAGE_MAG_",
        obsolete_types: &["manualapprovalgate"],
        needs_pipeline: true,
        required_api: None,
    };

    spec_accessors!(approval);
}

impl TektonComponent for OpenShiftPipelinesAsCode {
    const DESCRIPTOR: ComponentDescriptor = ComponentDescriptor {
        resource_name: "pipelines-as-code",
        payload_dir: Some("pipelines-as-code"),
        operand: "pipelines-as-code",
        image_prefix: "IMAGE_PAC_",
        obsolete_types: &["pipelines-as-code"],
        needs_pipeline: true,
        required_api: None,
    };

    spec_accessors!(pac);

    fn transformers(&self, _config: &OperatorConfig) -> Vec<Transformer> {
        vec![transform::copy_config_map(
            "pipelines-as-code",
            self.spec.pac.settings.clone(),
        )]
    }
}

impl TektonComponent for TektonAddon {
    const DESCRIPTOR: ComponentDescriptor = ComponentDescriptor {
        resource_name: "addon",
        payload_dir: None,
        operand: "tektoncd-addons",
        image_prefix: "IMAGE_ADDONS_",
        obsolete_types: &["custom-clustertasks"],
        needs_pipeline: true,
        required_api: None,
    };

    spec_accessors!(addon);

    fn set_defaults(&mut self, _platform: Platform) {
        let params = &mut self.spec.addon.params;
        for name in [ADDON_CLUSTER_TASKS_PARAM, ADDON_PIPELINE_TEMPLATES_PARAM] {
            if param_value(params, name).is_none() {
                params.push(Param {
                    name: name.to_string(),
                    value: "true".to_string(),
                });
            }
        }
    }

    fn extra_sets(&self) -> Vec<ExtraSet> {
        let params = &self.spec.addon.params;
        let enabled = |name| param_value(params, name) != Some("false");
        vec![
            ExtraSet {
                placement: Placement::Custom("triggersresources"),
                payload_dir: "tekton-addon/triggers-resources",
                enabled: true,
            },
            ExtraSet {
                placement: Placement::Custom("pipelinestemplate"),
                payload_dir: "tekton-addon/pipelines-templates",
                enabled: enabled(ADDON_PIPELINE_TEMPLATES_PARAM),
            },
            ExtraSet {
                placement: Placement::Versioned {
                    suffix: "versionedclustertask",
                    name_prefix: "addon-versioned-clustertasks",
                },
                payload_dir: "tekton-addon/addons/02-clustertasks",
                enabled: enabled(ADDON_CLUSTER_TASKS_PARAM),
            },
        ]
    }
}
