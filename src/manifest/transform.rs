//! # Built-in Transformers
//!
//! Functions that reshape one rendered object at a time. Each constructor
//! returns a boxed closure so reconcilers can assemble a per-CR list and hand
//! it to [`super::Manifest::transform`]. Objects a transformer does not care
//! about pass through untouched.

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Capabilities, PodSecurityContext, PodSpec, SeccompProfile, SecurityContext};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::{ensure_object, filter, kind, name, ManifestError};
use crate::config::{OperatorConfig, ProxySettings};
use crate::constants::DEFAULT_TARGET_NAMESPACE;
use crate::crd::{Config, DeploymentOverride, HighAvailability};
use crate::labels::{OPERAND_NAME_KEY, PRESERVE_NAMESPACE_KEY};

/// Boxed transformer over a raw object
pub type Transformer = Box<dyn Fn(&mut Value) -> Result<(), ManifestError> + Send + Sync>;

/// Image map keys prefixed with this replace container args instead of images
pub const ARG_PREFIX: &str = "arg_";

/// Keeps a RoleBinding's subjects in their original namespace
pub const PRESERVE_RB_SUBJECT_NAMESPACE_KEY: &str =
    "operator.tekton.dev/preserve-rb-subject-namespace";

fn is_true_annotation(resource: &Value, key: &str) -> bool {
    resource
        .pointer("/metadata/annotations")
        .and_then(|a| a.get(key))
        .and_then(Value::as_str)
        == Some("true")
}

fn conversion_error(resource: &Value, source: serde_json::Error) -> ManifestError {
    ManifestError::Conversion {
        kind: kind(resource).to_string(),
        name: name(resource).to_string(),
        source,
    }
}

/// Typed view over a raw object; the edited value replaces the original
fn edit_typed<T, F>(resource: &mut Value, edit: F) -> Result<(), ManifestError>
where
    T: serde::de::DeserializeOwned + Serialize,
    F: FnOnce(&mut T),
{
    let mut typed: T =
        serde_json::from_value(resource.clone()).map_err(|e| conversion_error(resource, e))?;
    edit(&mut typed);
    let edited = serde_json::to_value(&typed).map_err(|e| conversion_error(resource, e))?;
    *resource = edited;
    Ok(())
}

/// Stamp the operand name label on every object
#[must_use]
pub fn inject_operand_name(operand: &str) -> Transformer {
    let operand = operand.to_string();
    Box::new(move |resource| {
        if let Some(labels) = ensure_object(resource, &["metadata", "labels"]) {
            labels.insert(OPERAND_NAME_KEY.to_string(), Value::String(operand.clone()));
        }
        Ok(())
    })
}

/// Move namespaced objects into the target namespace
///
/// Objects annotated with `operator.tekton.dev/preserve-namespace: "true"` keep
/// their own namespace. Namespace references held inside cluster-scoped
/// objects (binding subjects, webhook and conversion services, namespace
/// resource names in ClusterRoles) follow the target too.
#[must_use]
pub fn inject_namespace(target: &str) -> Transformer {
    let target = target.to_string();
    Box::new(move |resource| {
        let preserve = is_true_annotation(resource, PRESERVE_NAMESPACE_KEY);
        if !preserve && filter::is_namespaced(resource) {
            if let Some(meta) = ensure_object(resource, &["metadata"]) {
                meta.insert("namespace".to_string(), Value::String(target.clone()));
            }
        }

        match kind(resource) {
            "RoleBinding" => {
                if !is_true_annotation(resource, PRESERVE_RB_SUBJECT_NAMESPACE_KEY) {
                    replace_subject_namespaces(resource, &target);
                }
            }
            "ClusterRoleBinding" => replace_subject_namespaces(resource, &target),
            "ClusterRole" => replace_namespace_resource_names(resource, &target),
            "CustomResourceDefinition" => {
                replace_service_namespace(resource, "/spec/conversion/webhookClientConfig/service", &target);
            }
            "ClusterInterceptor" => {
                replace_service_namespace(resource, "/spec/clientConfig/service", &target);
            }
            "MutatingWebhookConfiguration" | "ValidatingWebhookConfiguration" => {
                if let Some(webhooks) = resource.get_mut("webhooks").and_then(Value::as_array_mut) {
                    for webhook in webhooks {
                        replace_service_namespace(webhook, "/clientConfig/service", &target);
                    }
                }
            }
            _ => {}
        }
        Ok(())
    })
}

fn replace_subject_namespaces(resource: &mut Value, target: &str) {
    let Some(subjects) = resource.get_mut("subjects").and_then(Value::as_array_mut) else {
        return;
    };
    for subject in subjects.iter_mut().filter_map(Value::as_object_mut) {
        if subject.contains_key("namespace") {
            subject.insert("namespace".to_string(), Value::String(target.to_string()));
        }
    }
}

fn replace_service_namespace(resource: &mut Value, pointer: &str, target: &str) {
    if let Some(service) = resource.pointer_mut(pointer).and_then(Value::as_object_mut) {
        if service.contains_key("namespace") {
            service.insert("namespace".to_string(), Value::String(target.to_string()));
        }
    }
}

fn replace_namespace_resource_names(resource: &mut Value, target: &str) {
    let Some(rules) = resource.get_mut("rules").and_then(Value::as_array_mut) else {
        return;
    };
    for rule in rules.iter_mut().filter_map(Value::as_object_mut) {
        let touches_namespaces = rule
            .get("resources")
            .and_then(Value::as_array)
            .is_some_and(|r| {
                r.iter()
                    .filter_map(Value::as_str)
                    .any(|r| r.starts_with("namespaces"))
            });
        if !touches_namespaces {
            continue;
        }
        if let Some(names) = rule.get_mut("resourceNames").and_then(Value::as_array_mut) {
            for name in names.iter_mut() {
                if name.as_str() == Some(DEFAULT_TARGET_NAMESPACE) {
                    *name = Value::String(target.to_string());
                }
            }
        }
    }
}

/// Controller owner reference on every namespaced object
#[must_use]
pub fn inject_owner(owner: OwnerReference) -> Transformer {
    Box::new(move |resource| {
        if !filter::is_namespaced(resource) {
            return Ok(());
        }
        let owner_value = serde_json::to_value(&owner).map_err(|e| conversion_error(resource, e))?;
        let Some(meta) = ensure_object(resource, &["metadata"]) else {
            return Ok(());
        };
        let refs = meta
            .entry("ownerReferences".to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !refs.is_array() {
            *refs = Value::Array(Vec::new());
        }
        if let Some(refs) = refs.as_array_mut() {
            refs.retain(|r| r.get("uid") != owner_value.get("uid"));
            refs.push(owner_value);
        }
        Ok(())
    })
}

/// Image overrides for one component, from `IMAGE_<PREFIX>...` variables
///
/// The prefix is stripped and the rest lowercased, so
/// `IMAGE_PIPELINES_TEKTON_PIPELINES_CONTROLLER` under prefix `IMAGE_PIPELINES_`
/// becomes `tekton_pipelines_controller`. The registry override, when set,
/// replaces the first path segment of every image or prefixes images that
/// have none.
#[must_use]
pub fn images_from_env(prefix: &str, config: &OperatorConfig) -> BTreeMap<String, String> {
    config
        .images
        .iter()
        .filter_map(|(key, image)| {
            let short = key.strip_prefix(prefix)?;
            let image = match config.registry_override.as_deref() {
                Some(registry) => override_registry(image, registry),
                None => image.clone(),
            };
            Some((short.to_lowercase(), image))
        })
        .collect()
}

fn override_registry(image: &str, registry: &str) -> String {
    match image.split_once('/') {
        Some((_, rest)) => format!("{registry}/{rest}"),
        None => format!("{registry}/{image}"),
    }
}

/// Container name or arg flag as an image map key
fn form_key(name: &str) -> String {
    name.trim_start_matches('-').to_lowercase().replace('-', "_")
}

/// Rewrite container images and image-carrying args of Deployments
///
/// A container whose lowercased, underscore-joined name is a key in `images`
/// gets that image. Keys starting with `arg_` replace the value of a matching
/// arg, in either `-flag=value` or `-flag value` form.
#[must_use]
pub fn deployment_images(images: BTreeMap<String, String>) -> Transformer {
    Box::new(move |resource| {
        if kind(resource) != "Deployment" || images.is_empty() {
            return Ok(());
        }
        let Some(pod) = resource.pointer_mut("/spec/template/spec") else {
            return Ok(());
        };
        for field in ["containers", "initContainers"] {
            let Some(containers) = pod.get_mut(field).and_then(Value::as_array_mut) else {
                continue;
            };
            for container in containers.iter_mut().filter_map(Value::as_object_mut) {
                let key = container
                    .get("name")
                    .and_then(Value::as_str)
                    .map(form_key)
                    .unwrap_or_default();
                if let Some(image) = images.get(&key) {
                    container.insert("image".to_string(), Value::String(image.clone()));
                }
                if let Some(args) = container.get_mut("args").and_then(Value::as_array_mut) {
                    replace_image_args(args, &images);
                }
            }
        }
        Ok(())
    })
}

fn replace_image_args(args: &mut [Value], images: &BTreeMap<String, String>) {
    let mut idx = 0;
    while idx < args.len() {
        let Some(arg) = args[idx].as_str().map(str::to_string) else {
            idx += 1;
            continue;
        };
        if let Some((flag, _)) = arg.split_once('=') {
            let key = format!("{ARG_PREFIX}{}", form_key(flag));
            if let Some(image) = images.get(&key) {
                args[idx] = Value::String(format!("{flag}={image}"));
            }
        } else {
            let key = format!("{ARG_PREFIX}{}", form_key(&arg));
            if let Some(image) = images.get(&key) {
                if idx + 1 < args.len() {
                    args[idx + 1] = Value::String(image.clone());
                    idx += 1;
                }
            }
        }
        idx += 1;
    }
}

/// Render a struct's fields as string data on the named ConfigMap
///
/// Scalars are stringified, nested values rendered as YAML, unset fields
/// and empty strings skipped. Existing keys the struct does not set are left alone.
pub fn add_config_map_values<T: Serialize>(config_map: &str, props: &T) -> Transformer {
    let config_map = config_map.to_string();
    let rendered = serde_json::to_value(props).map(|value| match value {
        Value::Object(fields) => fields
            .into_iter()
            .filter_map(|(k, v)| stringify(&v).map(|s| (k, s)))
            .collect::<BTreeMap<String, String>>(),
        _ => BTreeMap::new(),
    });
    Box::new(move |resource| {
        if kind(resource) != "ConfigMap" || name(resource) != config_map {
            return Ok(());
        }
        let values = rendered
            .as_ref()
            .map_err(|e| ManifestError::Transform(format!("{config_map}: {e}")))?;
        merge_data(resource, values);
        Ok(())
    })
}

fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        nested => serde_yaml::to_string(nested).ok(),
    }
}

fn merge_data(resource: &mut Value, values: &BTreeMap<String, String>) {
    if let Some(data) = ensure_object(resource, &["data"]) {
        for (key, value) in values {
            data.insert(key.clone(), Value::String(value.clone()));
        }
    }
}

/// Copy user-supplied key/values onto the named ConfigMap, overwriting
#[must_use]
pub fn copy_config_map(config_map: &str, values: BTreeMap<String, String>) -> Transformer {
    let config_map = config_map.to_string();
    Box::new(move |resource| {
        if kind(resource) == "ConfigMap" && name(resource) == config_map && !values.is_empty() {
            merge_data(resource, &values);
        }
        Ok(())
    })
}

/// Stamp a `key=value` label onto Namespace objects
#[must_use]
pub fn inject_label_on_namespace(label: &str) -> Transformer {
    let parsed = label
        .split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()));
    let raw = label.to_string();
    Box::new(move |resource| {
        if kind(resource) != "Namespace" {
            return Ok(());
        }
        let (key, value) = parsed
            .as_ref()
            .ok_or_else(|| ManifestError::Transform(format!("label {raw:?} is not key=value")))?;
        if let Some(labels) = ensure_object(resource, &["metadata", "labels"]) {
            labels.insert(key.clone(), Value::String(value.clone()));
        }
        Ok(())
    })
}

/// Pod placement from the component `config` block onto every Deployment
#[must_use]
pub fn add_configuration(config: &Config) -> Transformer {
    let config = config.clone();
    Box::new(move |resource| {
        if kind(resource) != "Deployment" || config.is_empty() {
            return Ok(());
        }
        let Some(pod) = ensure_object(resource, &["spec", "template", "spec"]) else {
            return Ok(());
        };
        if !config.node_selector.is_empty() {
            let selector: Map<String, Value> = config
                .node_selector
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            pod.insert("nodeSelector".to_string(), Value::Object(selector));
        }
        if !config.tolerations.is_empty() {
            pod.insert(
                "tolerations".to_string(),
                Value::Array(config.tolerations.clone()),
            );
        }
        if let Some(class) = config.priority_class_name.as_deref().filter(|c| !c.is_empty()) {
            pod.insert(
                "priorityClassName".to_string(),
                Value::String(class.to_string()),
            );
        }
        Ok(())
    })
}

/// Replica count from the `highAvailability` block onto every Deployment
#[must_use]
pub fn high_availability(ha: Option<HighAvailability>) -> Transformer {
    Box::new(move |resource| {
        let Some(replicas) = ha.as_ref().and_then(|h| h.replicas) else {
            return Ok(());
        };
        if kind(resource) != "Deployment" {
            return Ok(());
        }
        if let Some(spec) = ensure_object(resource, &["spec"]) {
            spec.insert("replicas".to_string(), Value::from(replicas));
        }
        Ok(())
    })
}

/// Per-deployment overrides from the `config.deployments` list
///
/// Replicas replace the current count, container resources are replaced, env
/// entries are replaced by name or appended, args are appended.
#[must_use]
pub fn deployment_override(overrides: Vec<DeploymentOverride>) -> Transformer {
    Box::new(move |resource| {
        if kind(resource) != "Deployment" || overrides.is_empty() {
            return Ok(());
        }
        let deployment = name(resource).to_string();
        let Some(over) = overrides.iter().find(|o| o.name == deployment) else {
            return Ok(());
        };
        if let Some(replicas) = over.replicas {
            if let Some(spec) = ensure_object(resource, &["spec"]) {
                spec.insert("replicas".to_string(), Value::from(replicas));
            }
        }
        let Some(containers) = resource
            .pointer_mut("/spec/template/spec/containers")
            .and_then(Value::as_array_mut)
        else {
            return Ok(());
        };
        for container in containers.iter_mut().filter_map(Value::as_object_mut) {
            let Some(wanted) = over
                .containers
                .iter()
                .find(|c| container.get("name").and_then(Value::as_str) == Some(c.name.as_str()))
            else {
                continue;
            };
            if let Some(resources) = &wanted.resource {
                container.insert("resources".to_string(), resources.clone());
            }
            if !wanted.env.is_empty() {
                let env = container
                    .entry("env".to_string())
                    .or_insert_with(|| Value::Array(Vec::new()));
                if let Some(env) = env.as_array_mut() {
                    merge_named(env, &wanted.env);
                }
            }
            if !wanted.args.is_empty() {
                let args = container
                    .entry("args".to_string())
                    .or_insert_with(|| Value::Array(Vec::new()));
                if let Some(args) = args.as_array_mut() {
                    args.extend(wanted.args.iter().cloned().map(Value::String));
                }
            }
        }
        Ok(())
    })
}

/// Replace list entries by `name`, appending the ones not present
pub(crate) fn merge_named(current: &mut Vec<Value>, wanted: &[Value]) {
    for item in wanted {
        let item_name = item.get("name");
        match current
            .iter_mut()
            .find(|c| item_name.is_some() && c.get("name") == item_name)
        {
            Some(existing) => *existing = item.clone(),
            None => current.push(item.clone()),
        }
    }
}

fn restrict_pod(pod: &mut PodSpec) {
    let security = pod
        .security_context
        .get_or_insert_with(PodSecurityContext::default);
    security.run_as_non_root.get_or_insert(true);
    security
        .seccomp_profile
        .get_or_insert_with(|| SeccompProfile {
            type_: "RuntimeDefault".to_string(),
            ..SeccompProfile::default()
        });
    for container in &mut pod.containers {
        let context = container
            .security_context
            .get_or_insert_with(SecurityContext::default);
        context.allow_privilege_escalation = Some(false);
        context.capabilities = Some(Capabilities {
            drop: Some(vec!["ALL".to_string()]),
            ..Capabilities::default()
        });
    }
}

/// Security fields the `restricted` pod security standard requires
#[must_use]
pub fn add_deployment_restricted_psa() -> Transformer {
    Box::new(|resource| match kind(resource) {
        "Deployment" => edit_typed::<Deployment, _>(resource, |d| {
            if let Some(pod) = d
                .spec
                .as_mut()
                .and_then(|s| s.template.spec.as_mut())
            {
                restrict_pod(pod);
            }
        }),
        "StatefulSet" => edit_typed::<StatefulSet, _>(resource, |s| {
            if let Some(pod) = s
                .spec
                .as_mut()
                .and_then(|s| s.template.spec.as_mut())
            {
                restrict_pod(pod);
            }
        }),
        _ => Ok(()),
    })
}

/// Operator proxy variables onto every Deployment container
///
/// Variables unset on the operator are removed from the containers, so
/// clearing the proxy on the operator clears it on the operands. Env lists
/// touched here end up sorted by name.
#[must_use]
pub fn apply_proxy_settings(proxy: ProxySettings) -> Transformer {
    Box::new(move |resource| {
        if kind(resource) != "Deployment" {
            return Ok(());
        }
        let Some(containers) = resource
            .pointer_mut("/spec/template/spec/containers")
            .and_then(Value::as_array_mut)
        else {
            return Ok(());
        };
        for container in containers.iter_mut().filter_map(Value::as_object_mut) {
            let mut env: BTreeMap<String, Value> = container
                .get("env")
                .and_then(Value::as_array)
                .map(|list| {
                    list.iter()
                        .filter_map(|e| {
                            e.get("name")
                                .and_then(Value::as_str)
                                .map(|n| (n.to_string(), e.clone()))
                        })
                        .collect()
                })
                .unwrap_or_default();
            for (var, value) in proxy.env_pairs() {
                match value {
                    Some(value) => {
                        env.insert(
                            var.to_string(),
                            serde_json::json!({"name": var, "value": value}),
                        );
                    }
                    None => {
                        env.remove(var);
                    }
                }
            }
            if env.is_empty() {
                container.remove("env");
            } else {
                container.insert("env".to_string(), Value::Array(env.into_values().collect()));
            }
        }
        Ok(())
    })
}
