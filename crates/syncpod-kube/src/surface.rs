//! API surface discovery and resource resolution
//!
//! The surface is an immutable snapshot of what the API server serves,
//! keyed group -> version -> resources. A refresh builds a new snapshot and
//! swaps it in whole; readers holding the previous one keep a consistent view.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use syncpod_core::{GroupKind, GroupVersionKind, KindPolicy, ObjectKey};
use tracing::debug;

use crate::cluster::ClusterApi;
use crate::error::{Result, SyncError};

/// Verbs assumed for a resource when none are given
pub const STANDARD_VERBS: &[&str] = &["create", "delete", "get", "list", "patch", "update", "watch"];

/// REST metadata for one served resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResourceInfo {
    pub group: String,
    pub version: String,
    pub kind: String,
    /// URL path segment, e.g. `configmaps` or `deployments/scale`
    pub plural: String,
    pub namespaced: bool,
    pub verbs: Vec<String>,
}

impl ApiResourceInfo {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
        plural: impl Into<String>,
        namespaced: bool,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
            plural: plural.into(),
            namespaced,
            verbs: STANDARD_VERBS.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Replace the verb list
    pub fn with_verbs(mut self, verbs: &[&str]) -> Self {
        self.verbs = verbs.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn supports(&self, verb: &str) -> bool {
        self.verbs.iter().any(|v| v == verb)
    }

    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::new(self.group.clone(), self.version.clone(), self.kind.clone())
    }

    pub fn group_kind(&self) -> GroupKind {
        GroupKind::new(self.group.clone(), self.kind.clone())
    }

    pub fn api_version(&self) -> String {
        self.gvk().api_version()
    }

    /// Subresources (`pods/log`, `deployments/scale`) are never write targets
    pub fn is_subresource(&self) -> bool {
        self.plural.contains('/')
    }
}

/// Snapshot of every resource the server reported
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiSurface {
    groups: BTreeMap<String, BTreeMap<String, Vec<ApiResourceInfo>>>,
}

impl ApiSurface {
    pub fn from_resources(resources: impl IntoIterator<Item = ApiResourceInfo>) -> Self {
        let mut groups: BTreeMap<String, BTreeMap<String, Vec<ApiResourceInfo>>> = BTreeMap::new();
        for resource in resources {
            groups
                .entry(resource.group.clone())
                .or_default()
                .entry(resource.version.clone())
                .or_default()
                .push(resource);
        }
        Self { groups }
    }

    /// All resources, in group then version order
    pub fn resources(&self) -> impl Iterator<Item = &ApiResourceInfo> {
        self.groups
            .values()
            .flat_map(|versions| versions.values())
            .flatten()
    }

    pub fn len(&self) -> usize {
        self.resources().count()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    /// Find the write target for a GVK
    ///
    /// Subresources and resources listed as virtual in `policy` never match.
    pub fn find(
        &self,
        gvk: &GroupVersionKind,
        key: &ObjectKey,
        policy: &KindPolicy,
    ) -> Result<&ApiResourceInfo> {
        let versions = self
            .groups
            .get(&gvk.group)
            .ok_or_else(|| SyncError::GroupNotFound {
                group: gvk.group.clone(),
                key: key.to_string(),
            })?;

        versions
            .get(&gvk.version)
            .into_iter()
            .flatten()
            .find(|r| {
                r.kind == gvk.kind && !r.is_subresource() && !policy.is_virtual(&r.group, &r.plural)
            })
            .ok_or_else(|| SyncError::KindNotFound {
                kind: gvk.kind.clone(),
                api_version: gvk.api_version(),
                key: key.to_string(),
            })
    }
}

impl ApiSurface {
    /// `key` as the server scopes it
    ///
    /// Cluster-scoped kinds drop any namespace the asset carried. Kinds the
    /// surface does not serve are returned unchanged.
    pub fn scoped_key(&self, key: &ObjectKey) -> ObjectKey {
        let cluster_scoped = self
            .resources()
            .find(|r| {
                !r.is_subresource() && r.group == key.group_kind.group && r.kind == key.group_kind.kind
            })
            .is_some_and(|r| !r.namespaced);
        if cluster_scoped && !key.namespace.is_empty() {
            ObjectKey::new(key.group_kind.clone(), "", key.name.clone())
        } else {
            key.clone()
        }
    }
}

/// Holds the current surface snapshot and swaps it on refresh
pub struct SurfaceResolver {
    current: ArcSwap<ApiSurface>,
}

impl SurfaceResolver {
    pub fn new(surface: ApiSurface) -> Self {
        Self {
            current: ArcSwap::from_pointee(surface),
        }
    }

    /// Run discovery and build the first snapshot
    pub async fn build<C: ClusterApi + ?Sized>(cluster: &C) -> Result<Self> {
        let surface = cluster.discover().await.map_err(SyncError::Discovery)?;
        debug!(resources = surface.len(), "API surface discovered");
        Ok(Self::new(surface))
    }

    /// Re-run discovery and replace the snapshot
    ///
    /// On failure the previous snapshot stays in place.
    pub async fn refresh<C: ClusterApi + ?Sized>(&self, cluster: &C) -> Result<()> {
        let surface = cluster.discover().await.map_err(SyncError::Discovery)?;
        debug!(resources = surface.len(), "API surface refreshed");
        self.current.store(Arc::new(surface));
        Ok(())
    }

    pub fn snapshot(&self) -> Arc<ApiSurface> {
        self.current.load_full()
    }

    pub fn resolve(
        &self,
        gvk: &GroupVersionKind,
        key: &ObjectKey,
        policy: &KindPolicy,
    ) -> Result<ApiResourceInfo> {
        self.current.load().find(gvk, key, policy).cloned()
    }
}
