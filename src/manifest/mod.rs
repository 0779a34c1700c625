//! # Manifest Pipeline
//!
//! A manifest is an ordered list of Kubernetes objects held as JSON values.
//! Reconcilers compose [`filter`] predicates and [`transform`] functions over
//! it; nothing here talks to the cluster.

pub mod filter;
pub mod options;
pub mod payload;
pub mod transform;

use serde_json::Value;

pub use filter::Predicate;
pub use transform::Transformer;

/// Errors raised while loading or shaping manifests
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("payload directory {path} could not be read: {source}")]
    Payload {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("conversion of {kind} {name:?} failed: {source}")]
    Conversion {
        kind: String,
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("transform failed: {0}")]
    Transform(String),
}

/// An ordered set of rendered objects
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    resources: Vec<Value>,
}

impl Manifest {
    #[must_use]
    pub fn new(resources: Vec<Value>) -> Self {
        Self { resources }
    }

    #[must_use]
    pub fn resources(&self) -> &[Value] {
        &self.resources
    }

    #[must_use]
    pub fn into_resources(self) -> Vec<Value> {
        self.resources
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Keep objects matching the predicate, preserving order
    #[must_use]
    pub fn filter(&self, predicate: &Predicate) -> Manifest {
        Manifest::new(
            self.resources
                .iter()
                .filter(|r| predicate(r))
                .cloned()
                .collect(),
        )
    }

    /// Run every transformer over every object, in order
    ///
    /// # Errors
    ///
    /// Returns the first transformer failure.
    pub fn transform(&self, transformers: &[Transformer]) -> Result<Manifest, ManifestError> {
        let mut resources = self.resources.clone();
        for resource in &mut resources {
            for transformer in transformers {
                transformer(resource)?;
            }
        }
        Ok(Manifest::new(resources))
    }

    /// Append objects at the end
    pub fn append(&mut self, more: Vec<Value>) {
        self.resources.extend(more);
    }
}

/// `kind` of a raw object, empty when absent
#[must_use]
pub fn kind(resource: &Value) -> &str {
    resource.get("kind").and_then(Value::as_str).unwrap_or_default()
}

/// `metadata.name` of a raw object, empty when absent
#[must_use]
pub fn name(resource: &Value) -> &str {
    resource
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .unwrap_or_default()
}

/// Mutable map at a JSON pointer path, created when missing
pub fn ensure_object<'a>(
    resource: &'a mut Value,
    path: &[&str],
) -> Option<&'a mut serde_json::Map<String, Value>> {
    let mut current = resource;
    for segment in path {
        let map = current.as_object_mut()?;
        current = map
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if current.is_null() {
            *current = Value::Object(serde_json::Map::new());
        }
    }
    current.as_object_mut()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_and_name_accessors() {
        let cm = json!({"kind": "ConfigMap", "metadata": {"name": "feature-flags"}});
        assert_eq!(kind(&cm), "ConfigMap");
        assert_eq!(name(&cm), "feature-flags");
        assert_eq!(kind(&json!({})), "");
    }

    #[test]
    fn test_ensure_object_creates_path() {
        let mut obj = json!({"metadata": {"name": "x"}});
        ensure_object(&mut obj, &["metadata", "labels"])
            .unwrap()
            .insert("a".to_string(), json!("b"));
        assert_eq!(obj.pointer("/metadata/labels/a"), Some(&json!("b")));
    }

    #[test]
    fn test_transform_runs_in_order() {
        let manifest = Manifest::new(vec![json!({"kind": "ConfigMap", "data": {}})]);
        let first: Transformer = Box::new(|r| {
            r["data"]["v"] = json!("first");
            Ok(())
        });
        let second: Transformer = Box::new(|r| {
            r["data"]["v"] = json!("second");
            Ok(())
        });
        let out = manifest.transform(&[first, second]).unwrap();
        assert_eq!(out.resources()[0]["data"]["v"], json!("second"));
    }
}
