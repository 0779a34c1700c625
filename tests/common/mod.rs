//! Shared fixtures for the reconciler scenario tests
//!
//! An in-memory cluster: one [`MemoryStore`] per resource type, all writing
//! into a shared journal so tests can assert the order of writes across
//! types. Payloads are written to a scratch `KO_DATA_PATH`.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use tekton_installer_operator::component::{ComponentContext, TektonComponent};
use tekton_installer_operator::config::OperatorConfig;
use tekton_installer_operator::crd::{ComponentStatus, TektonInstallerSet, TektonPipeline};
use tekton_installer_operator::extension::{Extension, NoopExtension};
use tekton_installer_operator::installerset::InstallerSetClient;
use tekton_installer_operator::labels::{self, CREATED_BY_KEY, INSTALLER_SET_TYPE_KEY};
use tekton_installer_operator::manifest::payload::PayloadCache;
use tekton_installer_operator::store::{ClusterApi, ObjectStore, StoreError};
use tekton_installer_operator::tektonconfig::scc::SecurityContextConstraints;

pub const VERSION: &str = "v0.70.0";

pub const PIPELINE_PAYLOAD: &str = r#"
apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: tasks.tekton.dev
spec:
  group: tekton.dev
---
apiVersion: v1
kind: ServiceAccount
metadata:
  name: tekton-pipelines-controller
  namespace: tekton-pipelines
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: config-defaults
  namespace: tekton-pipelines
data:
  _example: "see docs"
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: feature-flags
  namespace: tekton-pipelines
data: {}
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: tekton-pipelines-controller
  namespace: tekton-pipelines
spec:
  selector:
    matchLabels:
      app: tekton-pipelines-controller
  template:
    metadata:
      labels:
        app: tekton-pipelines-controller
    spec:
      containers:
        - name: tekton-pipelines-controller
          image: gcr.io/tekton-releases/controller:v0.70.0
"#;

pub const TRIGGER_PAYLOAD: &str = r#"
apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: eventlisteners.triggers.tekton.dev
spec:
  group: triggers.tekton.dev
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: feature-flags-triggers
  namespace: tekton-pipelines
data: {}
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: tekton-triggers-controller
  namespace: tekton-pipelines
spec:
  selector:
    matchLabels:
      app: tekton-triggers-controller
  template:
    metadata:
      labels:
        app: tekton-triggers-controller
    spec:
      containers:
        - name: tekton-triggers-controller
          image: gcr.io/tekton-releases/triggers-controller:v0.30.0
"#;

/// Ordered log of `create`/`delete` calls, as `"<verb> <Kind>/<name>"`
pub type Journal = Arc<Mutex<Vec<String>>>;

/// [`ObjectStore`] over a map, with API-server-like naming and versioning
///
/// Replacing an object keeps the stored status, the way the main endpoint of
/// a resource with a status subresource does. Status writes replace the
/// whole status.
pub struct MemoryStore<K> {
    kind: String,
    objects: Mutex<BTreeMap<String, K>>,
    sequence: AtomicU64,
    journal: Journal,
}

impl<K> MemoryStore<K>
where
    K: Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(journal: &Journal) -> Self {
        Self {
            kind: K::kind(&()).to_string(),
            objects: Mutex::new(BTreeMap::new()),
            sequence: AtomicU64::new(0),
            journal: Arc::clone(journal),
        }
    }

    fn record(&self, verb: &str, name: &str) {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{verb} {}/{name}", self.kind));
    }

    fn next(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Store an object as if a user had created it, without journaling
    pub fn seed(&self, mut obj: K) -> K {
        let n = self.next();
        let name = obj.name_any();
        let meta = obj.meta_mut();
        meta.uid = Some(format!("uid-{}-{n}", self.kind.to_lowercase()));
        meta.resource_version = Some("1".to_string());
        meta.generation = Some(1);
        self.objects.lock().unwrap().insert(name, obj.clone());
        obj
    }

    pub fn object(&self, name: &str) -> Option<K> {
        self.objects.lock().unwrap().get(name).cloned()
    }

    pub fn all(&self) -> Vec<K> {
        self.objects.lock().unwrap().values().cloned().collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    /// Edit a stored object behind the reconciler's back
    pub fn mutate(&self, name: &str, edit: impl FnOnce(&mut K)) {
        if let Some(obj) = self.objects.lock().unwrap().get_mut(name) {
            edit(obj);
        }
    }

    /// Set `metadata.deletionTimestamp`, as a pending finalizer would leave it
    pub fn terminate(&self, name: &str) {
        let mut objects = self.objects.lock().unwrap();
        let Some(obj) = objects.get(name) else {
            return;
        };
        let mut value = serde_json::to_value(obj).unwrap();
        value["metadata"]["deletionTimestamp"] = json!("2026-01-01T00:00:00Z");
        objects.insert(name.to_string(), serde_json::from_value(value).unwrap());
    }

    fn not_found(&self, name: &str) -> StoreError {
        StoreError::NotFound {
            kind: self.kind.clone(),
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl<K> ObjectStore<K> for MemoryStore<K>
where
    K: Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, name: &str) -> Result<Option<K>, StoreError> {
        Ok(self.object(name))
    }

    async fn list(&self, selector: &str) -> Result<Vec<K>, StoreError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .values()
            .filter(|o| labels::matches_selector(o.labels(), selector))
            .cloned()
            .collect())
    }

    async fn create(&self, obj: &K) -> Result<K, StoreError> {
        let n = self.next();
        let mut created = obj.clone();
        let name = match created.meta().name.clone().filter(|n| !n.is_empty()) {
            Some(name) => name,
            None => format!(
                "{}{n:05}",
                created.meta().generate_name.clone().unwrap_or_default()
            ),
        };
        {
            let mut objects = self.objects.lock().unwrap();
            if objects.contains_key(&name) {
                return Err(StoreError::AlreadyExists {
                    kind: self.kind.clone(),
                    name,
                });
            }
            let meta = created.meta_mut();
            meta.name = Some(name.clone());
            meta.uid = Some(format!("uid-{}-{n}", self.kind.to_lowercase()));
            meta.resource_version = Some("1".to_string());
            meta.generation = Some(1);
            objects.insert(name.clone(), created.clone());
        }
        self.record("create", &name);
        Ok(created)
    }

    async fn replace(&self, obj: &K) -> Result<K, StoreError> {
        let name = obj.name_any();
        let mut objects = self.objects.lock().unwrap();
        let current = objects.get(&name).ok_or_else(|| self.not_found(&name))?;
        let current_version = current.resource_version();
        if let Some(version) = obj.resource_version() {
            if Some(&version) != current_version.as_ref() {
                return Err(StoreError::Conflict {
                    kind: self.kind.clone(),
                    name,
                    message: "the object has been modified".to_string(),
                });
            }
        }

        let status = serde_json::to_value(current)?.get("status").cloned();
        let mut value = serde_json::to_value(obj)?;
        if let Some(map) = value.as_object_mut() {
            match status {
                Some(status) => map.insert("status".to_string(), status),
                None => map.remove("status"),
            };
        }
        let mut replaced: K = serde_json::from_value(value)?;
        let next = current_version
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0)
            + 1;
        let uid = current.uid();
        let meta = replaced.meta_mut();
        meta.resource_version = Some(next.to_string());
        meta.uid = uid;
        objects.insert(name, replaced.clone());
        Ok(replaced)
    }

    async fn patch_status(&self, name: &str, status: Value) -> Result<(), StoreError> {
        let mut objects = self.objects.lock().unwrap();
        let current = objects.get(name).ok_or_else(|| self.not_found(name))?;
        let mut value = serde_json::to_value(current)?;
        value["status"] = status;
        objects.insert(name.to_string(), serde_json::from_value(value)?);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        let removed = self.objects.lock().unwrap().remove(name).is_some();
        if removed {
            self.record("delete", name);
        }
        Ok(removed)
    }
}

/// Discovery and SCC listing from fixed data
#[derive(Debug, Default)]
pub struct FakeCluster {
    pub group_versions: Vec<String>,
    pub sccs: Vec<SecurityContextConstraints>,
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn has_group_version(&self, group_version: &str) -> Result<bool, StoreError> {
        Ok(self.group_versions.iter().any(|gv| gv == group_version))
    }

    async fn list_sccs(&self) -> Result<Vec<SecurityContextConstraints>, StoreError> {
        Ok(self.sccs.clone())
    }
}

pub fn write_payload(root: &Path, dir: &str, content: &str) {
    let dir = root.join(dir);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("release.yaml"), content).unwrap();
}

/// Operator settings that keep scenario tests fast
pub fn test_config(root: &Path, version: &str) -> OperatorConfig {
    OperatorConfig {
        version: version.to_string(),
        ko_data_path: root.to_path_buf(),
        requeue_after_secs: 1,
        update_retry_max_attempts: 3,
        update_retry_initial_delay_ms: 1,
        status_poll_attempts: 0,
        status_poll_interval_secs: 0,
        ..OperatorConfig::default()
    }
}

/// Status of a component that finished reconciling at `version`
pub fn ready_component_status(version: &str) -> Value {
    let mut status = ComponentStatus::default();
    status.initialize_conditions();
    status.mark_dependencies_installed();
    status.mark_pre_reconciler_complete();
    status.mark_installer_set_available();
    status.mark_installer_set_ready();
    status.mark_post_reconciler_complete();
    status.version = Some(version.to_string());
    serde_json::to_value(status).unwrap()
}

/// The shared cluster state of one scenario
pub struct Cluster {
    pub journal: Journal,
    pub installer_sets: Arc<MemoryStore<TektonInstallerSet>>,
    pub pipelines: Arc<MemoryStore<TektonPipeline>>,
    pub namespaces: Arc<MemoryStore<Namespace>>,
    pub crds: Arc<MemoryStore<CustomResourceDefinition>>,
    pub cluster: Arc<FakeCluster>,
    pub payloads: Arc<PayloadCache>,
    pub config: Arc<OperatorConfig>,
    payload_root: TempDir,
}

impl Cluster {
    /// Empty cluster with the pipeline and trigger payloads on disk
    pub fn new() -> Self {
        Self::with_cluster(FakeCluster::default())
    }

    pub fn with_cluster(cluster: FakeCluster) -> Self {
        let payload_root = TempDir::new().unwrap();
        write_payload(payload_root.path(), "tekton-pipeline", PIPELINE_PAYLOAD);
        write_payload(payload_root.path(), "tekton-triggers", TRIGGER_PAYLOAD);
        let journal: Journal = Arc::default();
        Self {
            installer_sets: Arc::new(MemoryStore::new(&journal)),
            pipelines: Arc::new(MemoryStore::new(&journal)),
            namespaces: Arc::new(MemoryStore::new(&journal)),
            crds: Arc::new(MemoryStore::new(&journal)),
            cluster: Arc::new(cluster),
            payloads: Arc::new(PayloadCache::new(payload_root.path())),
            config: Arc::new(test_config(payload_root.path(), VERSION)),
            journal,
            payload_root,
        }
    }

    pub fn payload_root(&self) -> &Path {
        self.payload_root.path()
    }

    /// Run subsequent contexts as a different operator release
    pub fn upgrade_to(&mut self, version: &str) {
        self.config = Arc::new(test_config(self.payload_root.path(), version));
    }

    pub fn store<K>(&self) -> Arc<MemoryStore<K>>
    where
        K: Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        Arc::new(MemoryStore::new(&self.journal))
    }

    pub fn component<K: TektonComponent>(&self, store: &Arc<MemoryStore<K>>) -> ComponentContext<K> {
        self.component_with(store, Arc::new(NoopExtension::<K>::default()))
    }

    pub fn component_with<K: TektonComponent>(
        &self,
        store: &Arc<MemoryStore<K>>,
        extension: Arc<dyn Extension<K>>,
    ) -> ComponentContext<K> {
        let installer_sets: Arc<dyn ObjectStore<TektonInstallerSet>> = self.installer_sets.clone();
        ComponentContext {
            store: store.clone(),
            installer_sets: InstallerSetClient::new(installer_sets, &K::kind(&()), &self.config),
            pipelines: self.pipelines.clone(),
            namespaces: self.namespaces.clone(),
            crds: self.crds.clone(),
            cluster: self.cluster.clone(),
            payloads: Arc::clone(&self.payloads),
            extension,
            config: Arc::clone(&self.config),
        }
    }

    /// Installer sets of a kind and type, sorted by name
    pub fn sets(&self, kind: &str, set_type: &str) -> Vec<TektonInstallerSet> {
        let selector = labels::selector(&[(CREATED_BY_KEY, kind), (INSTALLER_SET_TYPE_KEY, set_type)]);
        let mut sets: Vec<_> = self
            .installer_sets
            .all()
            .into_iter()
            .filter(|s| labels::matches_selector(s.labels(), &selector))
            .collect();
        sets.sort_by_key(ResourceExt::name_any);
        sets
    }

    /// Play the installer-set controller: every set reports `Ready`
    pub fn mark_sets_ready(&self) {
        self.set_ready_condition(json!({"type": "Ready", "status": "True"}));
    }

    pub fn mark_sets_failed(&self, message: &str) {
        self.set_ready_condition(json!({
            "type": "Ready",
            "status": "False",
            "reason": "Error",
            "message": message,
        }));
    }

    fn set_ready_condition(&self, condition: Value) {
        for name in self.installer_sets.names() {
            self.installer_sets.mutate(&name, |set| {
                set.status = Some(serde_json::from_value(json!({"conditions": [condition.clone()]})).unwrap());
            });
        }
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    pub fn deletions(&self) -> Vec<String> {
        self.journal()
            .into_iter()
            .filter(|e| e.starts_with("delete "))
            .collect()
    }
}
