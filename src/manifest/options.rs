//! # Additional Options
//!
//! Applies `spec.options` from a component CR onto the rendered manifest. It
//! runs after every other transformer so user overrides always win. Option
//! entries are partial Kubernetes objects keyed by the name of the object
//! they patch.
//!
//! - ConfigMaps: labels, annotations and data are merged; unknown names are
//!   created in the target namespace.
//! - Deployments and StatefulSets: metadata maps are merged, pod-level scalars
//!   replaced when set, volumes and containers merged by name.
//! - HorizontalPodAutoscalers: target, bounds, metrics and behavior replaced
//!   when set; unknown names are created in the target namespace.
//!
//! Every Deployment also gets its spec fingerprint as a pod template label,
//! so any option change rolls the pods.

use serde_json::{Map, Value};

use super::transform::merge_named;
use super::{ensure_object, kind, name, Manifest, ManifestError};
use crate::crd::AdditionalOptions;
use crate::labels::DEPLOYMENT_SPEC_HASH_KEY;

const HASH_LABEL_LEN: usize = 32;

/// Apply the options to a manifest, returning the result
///
/// # Errors
///
/// Returns an error when an option entry is not an object.
pub fn apply_additional_options(
    manifest: &Manifest,
    target_namespace: &str,
    options: &AdditionalOptions,
) -> Result<Manifest, ManifestError> {
    if options.is_disabled() {
        return Ok(manifest.clone());
    }

    let mut resources = manifest.resources().to_vec();
    for resource in &mut resources {
        let object_name = name(resource).to_string();
        match kind(resource) {
            "ConfigMap" => {
                if let Some(option) = options.config_maps.get(&object_name) {
                    update_config_map(resource, option);
                }
            }
            "Deployment" => {
                if let Some(option) = options.deployments.get(&object_name) {
                    update_workload(resource, option);
                }
                stamp_deployment_hash(resource);
            }
            "StatefulSet" => {
                if let Some(option) = options.stateful_sets.get(&object_name) {
                    update_workload(resource, option);
                }
            }
            "HorizontalPodAutoscaler" => {
                if let Some(option) = options.horizontal_pod_autoscalers.get(&object_name) {
                    update_hpa(resource, option);
                }
            }
            _ => {}
        }
    }

    let mut out = Manifest::new(resources);
    let extra_config_maps = missing_objects(
        &out,
        &options.config_maps,
        "ConfigMap",
        "v1",
        target_namespace,
    )?;
    out.append(extra_config_maps);
    let extra_hpas = missing_objects(
        &out,
        &options.horizontal_pod_autoscalers,
        "HorizontalPodAutoscaler",
        "autoscaling/v2",
        target_namespace,
    )?;
    out.append(extra_hpas);
    Ok(out)
}

/// Overlay string entries of `extra` (at `pointer`) onto the map at `path`
fn merge_map_field(resource: &mut Value, path: &[&str], option: &Value, pointer: &str) {
    let Some(extra) = option.pointer(pointer).and_then(Value::as_object) else {
        return;
    };
    if extra.is_empty() {
        return;
    }
    if let Some(target) = ensure_object(resource, path) {
        for (k, v) in extra {
            target.insert(k.clone(), v.clone());
        }
    }
}

fn update_config_map(resource: &mut Value, option: &Value) {
    merge_map_field(resource, &["metadata", "labels"], option, "/metadata/labels");
    merge_map_field(resource, &["metadata", "annotations"], option, "/metadata/annotations");
    merge_map_field(resource, &["data"], option, "/data");
}

fn update_workload(resource: &mut Value, option: &Value) {
    merge_map_field(resource, &["metadata", "labels"], option, "/metadata/labels");
    merge_map_field(resource, &["metadata", "annotations"], option, "/metadata/annotations");
    merge_map_field(
        resource,
        &["spec", "template", "metadata", "labels"],
        option,
        "/spec/template/metadata/labels",
    );
    merge_map_field(
        resource,
        &["spec", "template", "metadata", "annotations"],
        option,
        "/spec/template/metadata/annotations",
    );

    if let Some(replicas) = option.pointer("/spec/replicas").filter(|r| r.is_number()) {
        if let Some(spec) = ensure_object(resource, &["spec"]) {
            spec.insert("replicas".to_string(), replicas.clone());
        }
    }

    let Some(wanted) = option.pointer("/spec/template/spec").and_then(Value::as_object) else {
        return;
    };
    let Some(pod) = ensure_object(resource, &["spec", "template", "spec"]) else {
        return;
    };
    for field in [
        "affinity",
        "priorityClassName",
        "nodeSelector",
        "tolerations",
        "topologySpreadConstraints",
        "runtimeClassName",
    ] {
        if let Some(value) = wanted.get(field).filter(|v| !is_empty_value(v)) {
            pod.insert(field.to_string(), value.clone());
        }
    }
    if let Some(volumes) = wanted.get("volumes").and_then(Value::as_array) {
        merge_list(pod, "volumes", volumes);
    }
    for field in ["initContainers", "containers"] {
        if let Some(containers) = wanted.get(field).and_then(Value::as_array) {
            update_containers(pod, field, containers);
        }
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn merge_list(parent: &mut Map<String, Value>, field: &str, wanted: &[Value]) {
    if wanted.is_empty() {
        return;
    }
    let list = parent
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !list.is_array() {
        *list = Value::Array(Vec::new());
    }
    if let Some(list) = list.as_array_mut() {
        merge_named(list, wanted);
    }
}

fn update_containers(pod: &mut Map<String, Value>, field: &str, wanted: &[Value]) {
    let current = pod
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !current.is_array() {
        *current = Value::Array(Vec::new());
    }
    let Some(current) = current.as_array_mut() else {
        return;
    };

    let mut to_add = Vec::new();
    for option in wanted {
        let option_name = option.get("name").and_then(Value::as_str);
        let target = current
            .iter_mut()
            .filter_map(Value::as_object_mut)
            .find(|c| option_name.is_some() && c.get("name").and_then(Value::as_str) == option_name);
        let Some(target) = target else {
            to_add.push(option.clone());
            continue;
        };
        if let Some(resources) = option.get("resources").filter(|r| !is_empty_value(r)) {
            target.insert("resources".to_string(), resources.clone());
        }
        for list in ["env", "volumeMounts"] {
            if let Some(items) = option.get(list).and_then(Value::as_array) {
                merge_list(target, list, items);
            }
        }
        if let Some(args) = option.get("args").and_then(Value::as_array) {
            let extra: Vec<String> = args
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
            if !extra.is_empty() {
                let existing: Vec<String> = target
                    .get("args")
                    .and_then(Value::as_array)
                    .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
                    .unwrap_or_default();
                let merged = merge_args(existing, &extra);
                target.insert(
                    "args".to_string(),
                    Value::Array(merged.into_iter().map(Value::String).collect()),
                );
            }
        }
    }
    current.extend(to_add);
}

fn is_flag(arg: &str) -> bool {
    arg.starts_with('-')
}

/// Merge override args into existing ones
///
/// Flags are matched by key in both `-k=v` and `-k v` forms. A matched flag
/// keeps the form it already had; unmatched flags are appended in the form
/// given. Plain tokens and bare flags are deduplicated by exact value.
fn merge_args(mut existing: Vec<String>, extra: &[String]) -> Vec<String> {
    // key -> position of the flag token
    let mut keys: Vec<(String, usize)> = Vec::new();
    for (i, arg) in existing.iter().enumerate() {
        if !is_flag(arg) {
            continue;
        }
        if let Some((k, _)) = arg.split_once('=') {
            keys.push((k.to_string(), i));
        } else if existing.get(i + 1).is_some_and(|next| !is_flag(next)) {
            keys.push((arg.clone(), i));
        }
    }
    let position = |keys: &[(String, usize)], key: &str| {
        keys.iter().find(|(k, _)| k == key).map(|(_, pos)| *pos)
    };

    let mut i = 0;
    while i < extra.len() {
        let arg = &extra[i];
        let pair = if !is_flag(arg) {
            None
        } else if let Some((k, v)) = arg.split_once('=') {
            Some((k.to_string(), v.to_string(), 1))
        } else {
            extra
                .get(i + 1)
                .filter(|next| !is_flag(next))
                .map(|next| (arg.clone(), next.clone(), 2))
        };

        match pair {
            Some((key, value, consumed)) => {
                match position(&keys, &key) {
                    Some(pos) if existing[pos] == key => {
                        if existing.get(pos + 1).is_some_and(|next| !is_flag(next)) {
                            existing[pos + 1] = value;
                        } else {
                            existing.insert(pos + 1, value);
                            for entry in &mut keys {
                                if entry.1 > pos {
                                    entry.1 += 1;
                                }
                            }
                        }
                    }
                    Some(pos) => existing[pos] = format!("{key}={value}"),
                    None => {
                        keys.push((key.clone(), existing.len()));
                        if consumed == 1 {
                            existing.push(format!("{key}={value}"));
                        } else {
                            existing.push(key);
                            existing.push(value);
                        }
                    }
                }
                i += consumed;
            }
            None => {
                if !existing.contains(arg) {
                    existing.push(arg.clone());
                }
                i += 1;
            }
        }
    }
    existing
}

fn update_hpa(resource: &mut Value, option: &Value) {
    merge_map_field(resource, &["metadata", "labels"], option, "/metadata/labels");
    merge_map_field(resource, &["metadata", "annotations"], option, "/metadata/annotations");
    let Some(wanted) = option.get("spec").and_then(Value::as_object) else {
        return;
    };
    let Some(spec) = ensure_object(resource, &["spec"]) else {
        return;
    };
    if let Some(target) = wanted.get("scaleTargetRef") {
        let complete = ["kind", "name"]
            .iter()
            .all(|f| target.get(f).and_then(Value::as_str).is_some_and(|s| !s.is_empty()));
        if complete {
            spec.insert("scaleTargetRef".to_string(), target.clone());
        }
    }
    if let Some(min) = wanted.get("minReplicas").filter(|v| v.is_number()) {
        spec.insert("minReplicas".to_string(), min.clone());
    }
    if let Some(max) = wanted
        .get("maxReplicas")
        .filter(|v| v.as_i64().is_some_and(|n| n > 0))
    {
        spec.insert("maxReplicas".to_string(), max.clone());
    }
    if let Some(metrics) = wanted.get("metrics").filter(|v| !is_empty_value(v)) {
        spec.insert("metrics".to_string(), metrics.clone());
    }
    if let Some(behavior) = wanted.get("behavior").and_then(Value::as_object) {
        let current = spec
            .entry("behavior".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(current) = current.as_object_mut() {
            for direction in ["scaleDown", "scaleUp"] {
                if let Some(rules) = behavior.get(direction).filter(|v| !v.is_null()) {
                    current.insert(direction.to_string(), rules.clone());
                }
            }
        }
    }
}

/// Stamp the pod template with a fingerprint of the deployment spec
///
/// Selector, strategy and the fingerprint label itself are left out so the
/// value only moves when the pod-shaping parts change.
fn stamp_deployment_hash(resource: &mut Value) {
    let Some(spec) = resource.get("spec") else {
        return;
    };
    let mut hashed = spec.clone();
    if let Some(obj) = hashed.as_object_mut() {
        obj.remove("selector");
        obj.remove("strategy");
    }
    if let Some(labels) = ensure_object(&mut hashed, &["template", "metadata", "labels"]) {
        labels.insert(DEPLOYMENT_SPEC_HASH_KEY.to_string(), Value::String(String::new()));
    }
    let mut digest = crate::hash::compute_value(&hashed);
    digest.truncate(HASH_LABEL_LEN);
    if let Some(labels) = ensure_object(resource, &["spec", "template", "metadata", "labels"]) {
        labels.insert(DEPLOYMENT_SPEC_HASH_KEY.to_string(), Value::String(digest));
    }
}

fn missing_objects(
    manifest: &Manifest,
    wanted: &std::collections::BTreeMap<String, Value>,
    object_kind: &str,
    api_version: &str,
    target_namespace: &str,
) -> Result<Vec<Value>, ManifestError> {
    let mut out = Vec::new();
    for (object_name, option) in wanted {
        let exists = manifest
            .resources()
            .iter()
            .any(|r| kind(r) == object_kind && name(r) == object_name);
        if exists {
            continue;
        }
        let mut object = option.clone();
        let Some(root) = object.as_object_mut() else {
            return Err(ManifestError::Transform(format!(
                "{object_kind} option {object_name:?} is not an object"
            )));
        };
        root.entry("kind".to_string())
            .or_insert_with(|| Value::String(object_kind.to_string()));
        root.entry("apiVersion".to_string())
            .or_insert_with(|| Value::String(api_version.to_string()));
        if let Some(meta) = ensure_object(&mut object, &["metadata"]) {
            meta.insert("name".to_string(), Value::String(object_name.clone()));
            meta.insert(
                "namespace".to_string(),
                Value::String(target_namespace.to_string()),
            );
        }
        out.push(object);
    }
    Ok(out)
}
