//! Deleting objects the catalog no longer contains
//!
//! Only live objects carrying the ownership label are candidates, so
//! anything another actor created is never touched.

use std::collections::BTreeSet;

use syncpod_core::{Configuration, GroupKind, ObjectKey};
use tracing::{debug, info};

use crate::cluster::ClusterApi;
use crate::error::{Result, SyncError};
use crate::loader::DesiredStore;
use crate::surface::{ApiResourceInfo, ApiSurface};

/// Finds and deletes engine-owned objects absent from the desired store
pub struct OrphanCollector<'a, C: ClusterApi + ?Sized> {
    cluster: &'a C,
    config: &'a Configuration,
}

impl<'a, C: ClusterApi + ?Sized> OrphanCollector<'a, C> {
    pub fn new(cluster: &'a C, config: &'a Configuration) -> Self {
        Self { cluster, config }
    }

    /// Resources worth scanning, one per GroupKind
    ///
    /// Skips anything that cannot be listed, subresources, and the
    /// configured duplicate and derived kinds.
    pub fn candidates<'s>(&self, surface: &'s ApiSurface) -> Vec<&'s ApiResourceInfo> {
        let kinds = &self.config.kinds;
        let mut seen: BTreeSet<GroupKind> = BTreeSet::new();
        surface
            .resources()
            .filter(|r| r.supports("list") && !r.is_subresource())
            .filter(|r| {
                let gk = r.group_kind();
                !kinds.is_duplicate(&gk) && !kinds.is_derived(&gk)
            })
            .filter(|r| seen.insert(r.group_kind()))
            .collect()
    }

    /// Delete every owned live object whose key is not in `store`
    ///
    /// Store keys are compared as the server scopes them, so a cluster-scoped
    /// asset that names a namespace still matches its live object. Returns
    /// the deleted keys. A list or delete failure aborts the
    /// collection; objects already gone count as deleted by someone else.
    pub async fn collect(&self, surface: &ApiSurface, store: &DesiredStore) -> Result<Vec<ObjectKey>> {
        let owned_label = self.config.labels.owned.as_str();
        let desired: BTreeSet<ObjectKey> = store.keys().map(|key| surface.scoped_key(key)).collect();
        let mut deleted = Vec::new();

        for resource in self.candidates(surface) {
            let gk = resource.group_kind();
            let live = self
                .cluster
                .list(resource)
                .await
                .map_err(|source| SyncError::Orphan {
                    kind: gk.to_string(),
                    source,
                })?;

            for object in live {
                if object.label(owned_label) != Some("true") {
                    continue;
                }
                let namespace = if resource.namespaced { object.namespace() } else { None };
                let key = ObjectKey::new(gk.clone(), namespace.unwrap_or_default(), object.name());
                if desired.contains(&key) {
                    continue;
                }

                match self.cluster.delete(resource, namespace, object.name()).await {
                    Ok(()) => {
                        info!(%key, "deleted orphan");
                        deleted.push(key);
                    }
                    Err(e) if e.is_not_found() => {
                        debug!(%key, "orphan already gone");
                    }
                    Err(source) => {
                        return Err(SyncError::Orphan {
                            kind: gk.to_string(),
                            source,
                        });
                    }
                }
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{FaultVerb, MockCluster};
    use crate::error::ApiErrorKind;
    use serde_json::json;
    use syncpod_core::Object;

    fn configmap(name: &str, owned: bool) -> Object {
        let mut obj = Object::from_value(
            json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": name, "namespace": "ns"}}),
            "test",
        )
        .unwrap();
        if owned {
            obj.set_label("syncpod.io/owned", "true");
        }
        obj
    }

    #[tokio::test]
    async fn test_candidates_skip_duplicates_and_derived() {
        let cluster = MockCluster::with_core_resources();
        let surface = cluster.discover().await.unwrap();
        let config = Configuration::for_platform("gcp");
        let collector = OrphanCollector::new(&cluster, &config);

        let kinds: Vec<String> = collector
            .candidates(&surface)
            .iter()
            .map(|r| r.group_kind().to_string())
            .collect();
        assert!(kinds.contains(&"ConfigMap".to_string()));
        assert!(kinds.contains(&"Deployment.apps".to_string()));
        assert!(!kinds.contains(&"Deployment.extensions".to_string()));
        assert!(!kinds.contains(&"Endpoints".to_string()));
        assert!(!kinds.contains(&"Pod".to_string()));
    }

    #[tokio::test]
    async fn test_collect_deletes_only_owned_orphans() {
        let cluster = MockCluster::with_core_resources();
        cluster.seed(configmap("kept", true));
        cluster.seed(configmap("orphan", true));
        cluster.seed(configmap("foreign", false));
        let surface = cluster.discover().await.unwrap();
        let config = Configuration::for_platform("gcp");

        let mut store = DesiredStore::new();
        let kept = configmap("kept", false);
        store.insert(kept.key(), kept);

        let deleted = OrphanCollector::new(&cluster, &config)
            .collect(&surface, &store)
            .await
            .unwrap();

        assert_eq!(deleted, vec![configmap("orphan", true).key()]);
        assert!(cluster.contains(&configmap("kept", true).key()));
        assert!(cluster.contains(&configmap("foreign", false).key()));
    }

    #[tokio::test]
    async fn test_unowned_object_in_store_untouched() {
        let cluster = MockCluster::with_core_resources();
        cluster.seed(configmap("shared", false));
        let surface = cluster.discover().await.unwrap();
        let config = Configuration::for_platform("gcp");

        let mut store = DesiredStore::new();
        let shared = configmap("shared", false);
        store.insert(shared.key(), shared);

        let deleted = OrphanCollector::new(&cluster, &config)
            .collect(&surface, &store)
            .await
            .unwrap();
        assert!(deleted.is_empty());
        assert_eq!(cluster.operation_counts().deletes, 0);
    }

    #[tokio::test]
    async fn test_alias_kind_never_collected() {
        let deployment = |api_version: &str| {
            let mut obj = Object::from_value(
                json!({
                    "apiVersion": api_version,
                    "kind": "Deployment",
                    "metadata": {"name": "web", "namespace": "ns"},
                }),
                "test",
            )
            .unwrap();
            obj.set_label("syncpod.io/owned", "true");
            obj
        };
        let cluster = MockCluster::with_core_resources();
        cluster.seed(deployment("apps/v1"));
        cluster.seed(deployment("extensions/v1beta1"));
        let surface = cluster.discover().await.unwrap();
        let config = Configuration::for_platform("gcp");

        let mut store = DesiredStore::new();
        let web = deployment("apps/v1");
        store.insert(web.key(), web);

        let deleted = OrphanCollector::new(&cluster, &config)
            .collect(&surface, &store)
            .await
            .unwrap();
        assert!(deleted.is_empty());
        assert!(cluster.contains(&deployment("apps/v1").key()));
        assert!(cluster.contains(&deployment("extensions/v1beta1").key()));
    }

    #[tokio::test]
    async fn test_cluster_scoped_store_key_matches_live() {
        let role = |namespace: Option<&str>| {
            let mut metadata = json!({"name": "reader"});
            if let Some(ns) = namespace {
                metadata["namespace"] = json!(ns);
            }
            let mut obj = Object::from_value(
                json!({
                    "apiVersion": "rbac.authorization.k8s.io/v1",
                    "kind": "ClusterRole",
                    "metadata": metadata,
                }),
                "test",
            )
            .unwrap();
            obj.set_label("syncpod.io/owned", "true");
            obj
        };
        let cluster = MockCluster::with_core_resources();
        cluster.seed(role(None));
        let surface = cluster.discover().await.unwrap();
        let config = Configuration::for_platform("gcp");

        // The asset named a namespace the server ignores
        let mut store = DesiredStore::new();
        let desired = role(Some("ns-a"));
        store.insert(desired.key(), desired);

        let deleted = OrphanCollector::new(&cluster, &config)
            .collect(&surface, &store)
            .await
            .unwrap();
        assert!(deleted.is_empty());
        assert!(cluster.contains(&role(None).key()));
    }

    #[tokio::test]
    async fn test_list_failure_aborts() {
        let cluster = MockCluster::with_core_resources();
        let surface = cluster.discover().await.unwrap();
        let config = Configuration::for_platform("gcp");
        cluster.inject(FaultVerb::List, ApiErrorKind::Forbidden, 1);

        let err = OrphanCollector::new(&cluster, &config)
            .collect(&surface, &DesiredStore::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Orphan { .. }));
    }

    #[tokio::test]
    async fn test_already_deleted_is_fine() {
        let cluster = MockCluster::with_core_resources();
        cluster.seed(configmap("orphan", true));
        let surface = cluster.discover().await.unwrap();
        let config = Configuration::for_platform("gcp");
        cluster.inject(FaultVerb::Delete, ApiErrorKind::NotFound, 1);

        let deleted = OrphanCollector::new(&cluster, &config)
            .collect(&surface, &DesiredStore::new())
            .await
            .unwrap();
        assert!(deleted.is_empty());
    }
}
