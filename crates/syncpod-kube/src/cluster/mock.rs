//! In-memory cluster for testing
//!
//! Keeps objects in a map and emulates the server behaviour the engine
//! relies on: resourceVersion preconditions, namespace existence, CRDs
//! registering new resources, immutable fields. Every call is counted and
//! logged so tests can assert on ordering and write volume.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::{Value, json};
use syncpod_core::{GroupKind, Object, ObjectKey};

use super::{ApiResult, ClusterApi, scope_namespace};
use crate::error::{ApiError, ApiErrorKind};
use crate::surface::{ApiResourceInfo, ApiSurface};

/// API verbs the mock records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultVerb {
    Discover,
    Get,
    List,
    Create,
    Update,
    Delete,
}

impl FaultVerb {
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Delete)
    }
}

impl fmt::Display for FaultVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Discover => "discover",
            Self::Get => "get",
            Self::List => "list",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// One recorded call
///
/// `list` calls carry a key with an empty namespace and name; `discover`
/// calls carry an empty key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub verb: FaultVerb,
    pub key: ObjectKey,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub discovers: usize,
    pub gets: usize,
    pub lists: usize,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl OperationCounts {
    pub fn writes(&self) -> usize {
        self.creates + self.updates + self.deletes
    }
}

#[derive(Debug)]
struct Fault {
    verb: FaultVerb,
    kind: ApiErrorKind,
    remaining: usize,
}

#[derive(Debug, Default)]
struct MockState {
    resources: Vec<ApiResourceInfo>,
    objects: BTreeMap<ObjectKey, Object>,
    next_rv: u64,
    counts: OperationCounts,
    log: Vec<Operation>,
    faults: Vec<Fault>,
    racers: Vec<Object>,
    immutable: Vec<(GroupKind, String)>,
}

impl MockState {
    fn record(&mut self, verb: FaultVerb, key: ObjectKey) -> ApiResult<()> {
        match verb {
            FaultVerb::Discover => self.counts.discovers += 1,
            FaultVerb::Get => self.counts.gets += 1,
            FaultVerb::List => self.counts.lists += 1,
            FaultVerb::Create => self.counts.creates += 1,
            FaultVerb::Update => self.counts.updates += 1,
            FaultVerb::Delete => self.counts.deletes += 1,
        }
        let injected = self
            .faults
            .iter_mut()
            .find(|f| f.verb == verb && f.remaining > 0)
            .map(|f| {
                f.remaining -= 1;
                f.kind
            });
        let result = match injected {
            Some(kind) => Err(ApiError::new(kind, injected_message(kind, &key))),
            None => Ok(()),
        };
        self.log.push(Operation { verb, key });
        result
    }

    fn bump(&mut self) -> String {
        self.next_rv += 1;
        self.next_rv.to_string()
    }

    /// Stamp the fields the server owns on a newly created object
    fn admit(&mut self, object: &mut Object) {
        let rv = self.bump();
        let metadata = object.metadata_mut();
        metadata.insert("resourceVersion".to_string(), Value::String(rv.clone()));
        metadata.insert("uid".to_string(), Value::String(format!("uid-{}", rv)));
        metadata.insert(
            "creationTimestamp".to_string(),
            Value::String(
                chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            ),
        );
        metadata.insert("generation".to_string(), json!(1));
        stamp_server_labels(object);
    }

    fn register_crd(&mut self, crd: &Object) {
        let spec = &crd.as_value()["spec"];
        let group = spec["group"].as_str().unwrap_or_default();
        let kind = spec["names"]["kind"].as_str().unwrap_or_default();
        let plural = spec["names"]["plural"].as_str().unwrap_or_default();
        let namespaced = spec["scope"].as_str() != Some("Cluster");
        let versions = spec["versions"].as_array().cloned().unwrap_or_default();

        for version in versions {
            if version["served"].as_bool() == Some(false) {
                continue;
            }
            let Some(name) = version["name"].as_str() else {
                continue;
            };
            let info = ApiResourceInfo::new(group, name, kind, plural, namespaced);
            if !self.resources.contains(&info) {
                self.resources.push(info);
            }
        }
    }

    fn immutable_violation(&self, existing: &Object, updated: &Object) -> Option<String> {
        let gk = existing.group_kind();
        self.immutable
            .iter()
            .filter(|(kind, _)| *kind == gk)
            .find(|(_, field)| {
                let pointer = format!("/{}", field.replace('.', "/"));
                existing.as_value().pointer(&pointer) != updated.as_value().pointer(&pointer)
            })
            .map(|(_, field)| {
                format!(
                    "{} \"{}\" is invalid: {}: Forbidden: updates to {} are forbidden",
                    gk,
                    existing.name(),
                    field,
                    field
                )
            })
    }
}

/// Labels a real API server maintains on every write
fn stamp_server_labels(object: &mut Object) {
    if object.group_kind() == GroupKind::core("Namespace") {
        let name = object.name().to_string();
        object.set_label("kubernetes.io/metadata.name", &name);
    }
}

fn injected_message(kind: ApiErrorKind, key: &ObjectKey) -> String {
    match kind {
        ApiErrorKind::Conflict => conflict_message(key),
        ApiErrorKind::AlreadyExists => format!("{} already exists", key),
        ApiErrorKind::NotFound => format!("{} not found", key),
        other => format!("injected {} for {}", other, key),
    }
}

fn conflict_message(key: &ObjectKey) -> String {
    format!(
        "Operation cannot be fulfilled on {}: the object has been modified; please apply your changes to the latest version and try again",
        key
    )
}

/// In-memory [`ClusterApi`] implementation
///
/// Clones share state, so a test can hand one clone to the engine and keep
/// another for assertions.
#[derive(Clone, Default)]
pub struct MockCluster {
    state: Arc<RwLock<MockState>>,
}

impl MockCluster {
    /// Create a cluster that serves nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cluster serving the common built-in resources
    pub fn with_core_resources() -> Self {
        let cluster = Self::new();
        for resource in [
            ApiResourceInfo::new("", "v1", "Namespace", "namespaces", false),
            ApiResourceInfo::new("", "v1", "ConfigMap", "configmaps", true),
            ApiResourceInfo::new("", "v1", "Secret", "secrets", true),
            ApiResourceInfo::new("", "v1", "ServiceAccount", "serviceaccounts", true),
            ApiResourceInfo::new("", "v1", "Service", "services", true),
            ApiResourceInfo::new("", "v1", "Endpoints", "endpoints", true),
            ApiResourceInfo::new("", "v1", "Pod", "pods/log", true).with_verbs(&["get"]),
            ApiResourceInfo::new("apps", "v1", "Deployment", "deployments", true),
            ApiResourceInfo::new("extensions", "v1beta1", "Deployment", "deployments", true),
            ApiResourceInfo::new("rbac.authorization.k8s.io", "v1", "ClusterRole", "clusterroles", false),
            ApiResourceInfo::new("storage.k8s.io", "v1", "StorageClass", "storageclasses", false),
            ApiResourceInfo::new(
                "apiextensions.k8s.io",
                "v1",
                "CustomResourceDefinition",
                "customresourcedefinitions",
                false,
            ),
        ] {
            cluster.add_resource(resource);
        }
        cluster
    }

    fn state(&self) -> RwLockWriteGuard<'_, MockState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serve an additional resource from the next discovery on
    pub fn add_resource(&self, resource: ApiResourceInfo) {
        self.state().resources.push(resource);
    }

    /// Store an object as if another actor had created it
    pub fn seed(&self, mut object: Object) {
        let mut state = self.state();
        state.admit(&mut object);
        state.objects.insert(object.key(), object);
    }

    /// Fail the next `times` calls of `verb` with `kind`
    pub fn inject(&self, verb: FaultVerb, kind: ApiErrorKind, times: usize) {
        self.state().faults.push(Fault {
            verb,
            kind,
            remaining: times,
        });
    }

    /// Let another writer create `object` just before the engine does
    ///
    /// The engine's next create for the same key finds the object already
    /// stored and gets `AlreadyExists`.
    pub fn race_create(&self, object: Object) {
        self.state().racers.push(object);
    }

    /// Reject updates that change `field` (dotted path) on objects of `gk`
    pub fn mark_immutable(&self, gk: GroupKind, field: &str) {
        self.state().immutable.push((gk, field.to_string()));
    }

    pub fn get_object(&self, key: &ObjectKey) -> Option<Object> {
        self.state().objects.get(key).cloned()
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.state().objects.contains_key(key)
    }

    pub fn objects(&self) -> Vec<Object> {
        self.state().objects.values().cloned().collect()
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.state().counts.clone()
    }

    /// Reset operation counts and the operation log
    pub fn reset_counts(&self) {
        let mut state = self.state();
        state.counts = OperationCounts::default();
        state.log.clear();
    }

    /// Every call made since the last reset, in order
    pub fn operations(&self) -> Vec<Operation> {
        self.state().log.clone()
    }

    /// Position of the first `verb` call on `key` in the log
    pub fn position(&self, verb: FaultVerb, key: &ObjectKey) -> Option<usize> {
        self.state()
            .log
            .iter()
            .position(|op| op.verb == verb && op.key == *key)
    }
}

fn key_for(resource: &ApiResourceInfo, namespace: Option<&str>, name: &str) -> ObjectKey {
    ObjectKey::new(resource.group_kind(), namespace.unwrap_or_default(), name)
}

#[async_trait]
impl ClusterApi for MockCluster {
    async fn discover(&self) -> ApiResult<ApiSurface> {
        let mut state = self.state();
        state.record(
            FaultVerb::Discover,
            ObjectKey::new(GroupKind::core(""), "", ""),
        )?;
        Ok(ApiSurface::from_resources(state.resources.clone()))
    }

    async fn get(
        &self,
        resource: &ApiResourceInfo,
        namespace: Option<&str>,
        name: &str,
    ) -> ApiResult<Object> {
        let key = key_for(resource, namespace, name);
        let mut state = self.state();
        state.record(FaultVerb::Get, key.clone())?;
        state
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("{} \"{}\" not found", resource.plural, name)))
    }

    async fn list(&self, resource: &ApiResourceInfo) -> ApiResult<Vec<Object>> {
        let gk = resource.group_kind();
        let mut state = self.state();
        state.record(FaultVerb::List, ObjectKey::new(gk.clone(), "", ""))?;
        Ok(state
            .objects
            .iter()
            .filter(|(key, _)| key.group_kind == gk)
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn create(&self, resource: &ApiResourceInfo, object: &Object) -> ApiResult<Object> {
        let namespace = scope_namespace(resource, object);
        let key = key_for(resource, namespace, object.name());
        let mut state = self.state();
        state.record(FaultVerb::Create, key.clone())?;

        if let Some(pos) = state.racers.iter().position(|r| r.key() == key) {
            let mut raced = state.racers.remove(pos);
            state.admit(&mut raced);
            state.objects.insert(key.clone(), raced);
        }
        if state.objects.contains_key(&key) {
            return Err(ApiError::new(
                ApiErrorKind::AlreadyExists,
                format!("{} \"{}\" already exists", resource.plural, object.name()),
            ));
        }
        if let Some(ns) = namespace {
            let ns_key = ObjectKey::new(GroupKind::core("Namespace"), "", ns);
            if !state.objects.contains_key(&ns_key) {
                return Err(ApiError::not_found(format!("namespaces \"{}\" not found", ns)));
            }
        }

        let mut stored = object.clone();
        state.admit(&mut stored);
        if key.group_kind == GroupKind::new("apiextensions.k8s.io", "CustomResourceDefinition") {
            state.register_crd(&stored);
        }
        state.objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn update(&self, resource: &ApiResourceInfo, object: &Object) -> ApiResult<Object> {
        let namespace = scope_namespace(resource, object);
        let key = key_for(resource, namespace, object.name());
        let mut state = self.state();
        state.record(FaultVerb::Update, key.clone())?;

        let Some(existing) = state.objects.get(&key).cloned() else {
            return Err(ApiError::not_found(format!(
                "{} \"{}\" not found",
                resource.plural,
                object.name()
            )));
        };
        if let Some(rv) = object.resource_version() {
            if existing.resource_version() != Some(rv) {
                return Err(ApiError::new(ApiErrorKind::Conflict, conflict_message(&key)));
            }
        }
        if let Some(message) = state.immutable_violation(&existing, object) {
            return Err(ApiError::new(ApiErrorKind::Invalid, message));
        }

        let mut stored = object.clone();
        let rv = state.bump();
        let metadata = stored.metadata_mut();
        for field in ["uid", "creationTimestamp", "generation"] {
            if let Some(value) = existing.metadata().and_then(|m| m.get(field)) {
                metadata.insert(field.to_string(), value.clone());
            }
        }
        metadata.insert("resourceVersion".to_string(), Value::String(rv));
        stamp_server_labels(&mut stored);
        state.objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn delete(
        &self,
        resource: &ApiResourceInfo,
        namespace: Option<&str>,
        name: &str,
    ) -> ApiResult<()> {
        let key = key_for(resource, namespace, name);
        let mut state = self.state();
        state.record(FaultVerb::Delete, key.clone())?;
        state
            .objects
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| ApiError::not_found(format!("{} \"{}\" not found", resource.plural, name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configmaps() -> ApiResourceInfo {
        ApiResourceInfo::new("", "v1", "ConfigMap", "configmaps", true)
    }

    fn namespace(name: &str) -> Object {
        Object::from_yaml(
            &format!("apiVersion: v1\nkind: Namespace\nmetadata:\n  name: {}\n", name),
            "test",
        )
        .unwrap()
    }

    fn configmap(ns: &str, name: &str) -> Object {
        Object::from_yaml(
            &format!(
                "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {}\n  namespace: {}\ndata:\n  k: v\n",
                name, ns
            ),
            "test",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_requires_namespace() {
        let cluster = MockCluster::with_core_resources();
        let err = cluster.create(&configmaps(), &configmap("ns-a", "cm")).await.unwrap_err();
        assert!(err.is_not_found());

        cluster.seed(namespace("ns-a"));
        let created = cluster.create(&configmaps(), &configmap("ns-a", "cm")).await.unwrap();
        assert!(created.resource_version().is_some());

        let err = cluster.create(&configmaps(), &configmap("ns-a", "cm")).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_update_checks_resource_version() {
        let cluster = MockCluster::with_core_resources();
        cluster.seed(namespace("ns"));
        let created = cluster.create(&configmaps(), &configmap("ns", "cm")).await.unwrap();

        let mut stale = created.clone();
        stale.set_resource_version(Some("0"));
        let err = cluster.update(&configmaps(), &stale).await.unwrap_err();
        assert!(err.is_conflict());

        let updated = cluster.update(&configmaps(), &created).await.unwrap();
        assert_ne!(updated.resource_version(), created.resource_version());
        assert_eq!(updated.metadata().unwrap()["uid"], created.metadata().unwrap()["uid"]);
    }

    #[tokio::test]
    async fn test_injected_faults_run_out() {
        let cluster = MockCluster::with_core_resources();
        cluster.inject(FaultVerb::Get, ApiErrorKind::Forbidden, 1);

        let err = cluster.get(&configmaps(), Some("ns"), "cm").await.unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::Forbidden);
        let err = cluster.get(&configmaps(), Some("ns"), "cm").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(cluster.operation_counts().gets, 2);
    }

    #[tokio::test]
    async fn test_crd_registers_resource() {
        let cluster = MockCluster::with_core_resources();
        let crds = ApiResourceInfo::new(
            "apiextensions.k8s.io",
            "v1",
            "CustomResourceDefinition",
            "customresourcedefinitions",
            false,
        );
        let crd = Object::from_yaml(
            r#"
apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: widgets.example.com
spec:
  group: example.com
  scope: Namespaced
  names:
    kind: Widget
    plural: widgets
  versions:
    - name: v1
      served: true
    - name: v1alpha1
      served: false
"#,
            "crd.yaml",
        )
        .unwrap();

        assert!(!cluster.discover().await.unwrap().has_group("example.com"));
        cluster.create(&crds, &crd).await.unwrap();

        let surface = cluster.discover().await.unwrap();
        let widgets: Vec<_> = surface.resources().filter(|r| r.kind == "Widget").collect();
        assert_eq!(widgets.len(), 1);
        assert_eq!(widgets[0].version, "v1");
        assert!(widgets[0].namespaced);
    }

    #[tokio::test]
    async fn test_immutable_field_rejected() {
        let cluster = MockCluster::with_core_resources();
        let classes = ApiResourceInfo::new("storage.k8s.io", "v1", "StorageClass", "storageclasses", false);
        cluster.mark_immutable(GroupKind::new("storage.k8s.io", "StorageClass"), "parameters");

        let class = Object::from_yaml(
            "apiVersion: storage.k8s.io/v1\nkind: StorageClass\nmetadata:\n  name: fast\nprovisioner: x\nparameters:\n  type: gp2\n",
            "sc.yaml",
        )
        .unwrap();
        let mut live = cluster.create(&classes, &class).await.unwrap();
        live.as_value_mut()["parameters"]["type"] = json!("gp3");

        let err = cluster.update(&classes, &live).await.unwrap_err();
        assert!(err.is_immutable_field());
    }

    #[tokio::test]
    async fn test_operation_log() {
        let cluster = MockCluster::with_core_resources();
        cluster.seed(namespace("ns"));
        cluster.create(&configmaps(), &configmap("ns", "a")).await.unwrap();
        cluster.delete(&configmaps(), Some("ns"), "a").await.unwrap();

        let verbs: Vec<_> = cluster.operations().iter().map(|op| op.verb).collect();
        assert_eq!(verbs, vec![FaultVerb::Create, FaultVerb::Delete]);
        assert_eq!(cluster.operation_counts().writes(), 2);

        cluster.reset_counts();
        assert!(cluster.operations().is_empty());
        assert!(!cluster.contains(&configmap("ns", "a").key()));
    }
}
