//! # Shared Spec Blocks
//!
//! Spec fragments carried by every component CR: additional options merged
//! into the rendered payload, and the common pod shaping block.
//!
//! Kubernetes sub-objects (whole Deployments, tolerations, resource
//! requirements) are kept as raw JSON in the CR and decoded into the typed
//! `k8s-openapi` structs only where a transformer needs them.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Schema for fields holding arbitrary Kubernetes objects
pub fn preserve_unknown_fields(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    schemars::json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}

/// Schema for lists of arbitrary Kubernetes objects
pub fn preserve_unknown_list(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    schemars::json_schema!({
        "type": "array",
        "items": {
            "type": "object",
            "x-kubernetes-preserve-unknown-fields": true
        }
    })
}

/// Overrides merged into the rendered payload after every other transformer
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalOptions {
    /// Skip the options transformer entirely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    /// ConfigMaps keyed by name; missing ones are created in the target namespace
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub config_maps: BTreeMap<String, Value>,
    /// Partial Deployments keyed by name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub deployments: BTreeMap<String, Value>,
    /// Partial StatefulSets keyed by name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub stateful_sets: BTreeMap<String, Value>,
    /// HorizontalPodAutoscalers keyed by name; missing ones are created
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub horizontal_pod_autoscalers: BTreeMap<String, Value>,
}

impl AdditionalOptions {
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled.unwrap_or(false)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.config_maps.is_empty()
            && self.deployments.is_empty()
            && self.stateful_sets.is_empty()
            && self.horizontal_pod_autoscalers.is_empty()
    }

    /// Force `spec.replicas` of a named deployment override
    pub fn set_deployment_replicas(&mut self, name: &str, replicas: i32) {
        let entry = self
            .deployments
            .entry(name.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(serde_json::Map::new());
        }
        if let Value::Object(deployment) = entry {
            let spec = deployment
                .entry("spec")
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            if !spec.is_object() {
                *spec = Value::Object(serde_json::Map::new());
            }
            if let Value::Object(spec) = spec {
                spec.insert("replicas".to_string(), Value::from(replicas));
            }
        }
    }

    /// `spec.replicas` of a named deployment override, if forced
    #[must_use]
    pub fn deployment_replicas(&self, name: &str) -> Option<i64> {
        self.deployments
            .get(name)
            .and_then(|d| d.pointer("/spec/replicas"))
            .and_then(Value::as_i64)
    }
}

/// Replica count for every HA-capable deployment
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HighAvailability {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
}

/// Per-container override inside a [`DeploymentOverride`]
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerOverride {
    pub name: String,
    /// Replaces the container resource requirements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub resource: Option<Value>,
    /// Replaced by name or appended
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(schema_with = "preserve_unknown_list")]
    pub env: Vec<Value>,
    /// Appended to the existing args
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

/// Override for a single named deployment
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentOverride {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<ContainerOverride>,
    /// Takes priority over [`HighAvailability::replicas`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
}

/// Common pod shaping applied to every Deployment of a component
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(schema_with = "preserve_unknown_list")]
    pub tolerations: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_availability: Option<HighAvailability>,
    #[serde(default, rename = "deployments", skip_serializing_if = "Vec::is_empty")]
    pub deployment_override: Vec<DeploymentOverride>,
}

impl Config {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Config::default()
    }
}

/// Name/value parameter, as used by addon and hub blocks
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
pub struct Param {
    pub name: String,
    pub value: String,
}

/// Look up a parameter value by name
#[must_use]
pub fn param_value<'a>(params: &'a [Param], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|p| p.name == name)
        .map(|p| p.value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_deployment_replicas_creates_entry() {
        let mut options = AdditionalOptions::default();
        options.set_deployment_replicas("tekton-results-watcher", 0);
        assert_eq!(options.deployment_replicas("tekton-results-watcher"), Some(0));
    }

    #[test]
    fn test_set_deployment_replicas_keeps_other_fields() {
        let mut options: AdditionalOptions = serde_json::from_value(json!({
            "deployments": {
                "watcher": {"metadata": {"labels": {"a": "b"}}, "spec": {"replicas": 3}}
            }
        }))
        .unwrap();
        options.set_deployment_replicas("watcher", 0);
        assert_eq!(options.deployment_replicas("watcher"), Some(0));
        assert_eq!(
            options.deployments["watcher"].pointer("/metadata/labels/a"),
            Some(&json!("b"))
        );
    }

    #[test]
    fn test_empty_options_serialize_to_empty_object() {
        let options = AdditionalOptions::default();
        assert_eq!(serde_json::to_value(&options).unwrap(), json!({}));
        assert!(options.is_empty());
        assert!(!options.is_disabled());
    }

    #[test]
    fn test_config_deployments_field_name() {
        let config: Config = serde_json::from_value(json!({
            "deployments": [{"name": "tekton-pipelines-controller", "replicas": 2}]
        }))
        .unwrap();
        assert_eq!(config.deployment_override.len(), 1);
        assert_eq!(config.deployment_override[0].replicas, Some(2));
    }

    #[test]
    fn test_param_value_lookup() {
        let params = vec![Param {
            name: "pipelineTemplates".to_string(),
            value: "false".to_string(),
        }];
        assert_eq!(param_value(&params, "pipelineTemplates"), Some("false"));
        assert_eq!(param_value(&params, "missing"), None);
    }
}
