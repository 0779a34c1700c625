//! # Payload Loading
//!
//! Reads a component's packaged YAML bundle from disk. Files are visited in
//! path order so the rendered manifest, and with it every installer set, is
//! stable from one process to the next.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;
use walkdir::WalkDir;

use super::{Manifest, ManifestError};

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e == "yaml" || e == "yml")
}

/// Split a multi-document YAML string, dropping empty documents
///
/// # Errors
///
/// Returns an error if any document is not valid YAML.
pub fn parse_documents(content: &str, origin: &str) -> Result<Vec<Value>, ManifestError> {
    let mut docs = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = Value::deserialize(document).map_err(|source| ManifestError::Yaml {
            path: origin.to_string(),
            source,
        })?;
        let empty = match &value {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        };
        if !empty {
            docs.push(value);
        }
    }
    Ok(docs)
}

/// Load every YAML file under `dir`, recursively, in path order
///
/// # Errors
///
/// Returns an error if the directory is missing or unreadable, or a file
/// holds invalid YAML.
pub fn load_dir(dir: &Path) -> Result<Manifest, ManifestError> {
    let display = dir.display().to_string();
    if !dir.is_dir() {
        return Err(ManifestError::Payload {
            path: display,
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such directory"),
        });
    }

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| ManifestError::Payload {
            path: display.clone(),
            source: e.into(),
        })?;
        if entry.file_type().is_file() && is_yaml(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files.sort();

    let mut resources = Vec::new();
    for file in &files {
        let path = file.display().to_string();
        let content = std::fs::read_to_string(file).map_err(|source| ManifestError::Payload {
            path: path.clone(),
            source,
        })?;
        resources.extend(parse_documents(&content, &path)?);
    }
    debug!(
        dir = %dir.display(),
        files = files.len(),
        resources = resources.len(),
        "Loaded payload"
    );
    Ok(Manifest::new(resources))
}

/// Payload manifests keyed by directory, read once per process
#[derive(Debug)]
pub struct PayloadCache {
    root: PathBuf,
    entries: Mutex<HashMap<PathBuf, Manifest>>,
}

impl PayloadCache {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Manifest for `<root>/<relative>`, loading it on first use
    ///
    /// # Errors
    ///
    /// Returns the load error; failures are not cached.
    pub fn get(&self, relative: &str) -> Result<Manifest, ManifestError> {
        let dir = self.root.join(relative);
        if let Some(hit) = self
            .entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(&dir).cloned())
        {
            return Ok(hit);
        }
        let manifest = load_dir(&dir)?;
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(dir, manifest.clone());
        }
        Ok(manifest)
    }

    /// Insert a manifest directly; used by embedders that render payloads themselves
    pub fn insert(&self, relative: &str, manifest: Manifest) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(self.root.join(relative), manifest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_documents_skips_empty() {
        let docs = parse_documents(
            "---\nkind: ConfigMap\nmetadata:\n  name: a\n---\n---\n# only a comment\n---\nkind: Secret\n",
            "inline",
        )
        .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1]["kind"], "Secret");
    }

    #[test]
    fn test_parse_documents_reports_origin() {
        let err = parse_documents("kind: [unclosed", "bad.yaml").unwrap_err();
        assert!(err.to_string().contains("bad.yaml"));
    }

    #[test]
    fn test_load_dir_is_sorted_and_recursive() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("b.yaml"), "kind: B\n").unwrap();
        fs::write(tmp.path().join("a.yml"), "kind: A\n---\nkind: A2\n").unwrap();
        fs::write(tmp.path().join("sub/c.yaml"), "kind: C\n").unwrap();
        fs::write(tmp.path().join("notes.txt"), "kind: Ignored\n").unwrap();

        let manifest = load_dir(tmp.path()).unwrap();
        let kinds: Vec<&str> = manifest.resources().iter().map(crate::manifest::kind).collect();
        assert_eq!(kinds, vec!["A", "A2", "B", "C"]);
    }

    #[test]
    fn test_missing_dir_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(load_dir(&tmp.path().join("absent")).is_err());
    }

    #[test]
    fn test_cache_serves_loaded_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("pipeline")).unwrap();
        fs::write(tmp.path().join("pipeline/x.yaml"), "kind: X\n").unwrap();
        let cache = PayloadCache::new(tmp.path());
        assert_eq!(cache.get("pipeline").unwrap().len(), 1);

        // Served from memory once loaded
        fs::remove_dir_all(tmp.path().join("pipeline")).unwrap();
        assert_eq!(cache.get("pipeline").unwrap().len(), 1);
    }
}
