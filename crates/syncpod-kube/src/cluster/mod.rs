//! Access to the remote object API
//!
//! The engine talks to the cluster only through [`ClusterApi`]:
//! - [`KubeCluster`]: a live API server via a kube client
//! - [`MockCluster`]: in-memory state with an operation log, for tests

mod live;
mod mock;

pub use live::KubeCluster;
pub use mock::{FaultVerb, MockCluster, Operation, OperationCounts};

use async_trait::async_trait;
use syncpod_core::Object;

use crate::error::ApiError;
use crate::surface::{ApiResourceInfo, ApiSurface};

/// Result of a single remote call
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Field manager name reported on writes
pub const FIELD_MANAGER: &str = "syncpod";

/// Dynamically-typed object API
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Report every served group, version and resource
    async fn discover(&self) -> ApiResult<ApiSurface>;

    /// Fetch one object; a missing object is `NotFound`
    async fn get(
        &self,
        resource: &ApiResourceInfo,
        namespace: Option<&str>,
        name: &str,
    ) -> ApiResult<Object>;

    /// List every instance across all namespaces
    async fn list(&self, resource: &ApiResourceInfo) -> ApiResult<Vec<Object>>;

    /// Create an object; an existing one is `AlreadyExists`
    async fn create(&self, resource: &ApiResourceInfo, object: &Object) -> ApiResult<Object>;

    /// Replace an object, guarded by its resourceVersion
    async fn update(&self, resource: &ApiResourceInfo, object: &Object) -> ApiResult<Object>;

    /// Delete an object
    async fn delete(
        &self,
        resource: &ApiResourceInfo,
        namespace: Option<&str>,
        name: &str,
    ) -> ApiResult<()>;
}

/// Namespace argument for a call against `resource`
///
/// Cluster-scoped resources ignore any namespace the object carries.
pub(crate) fn scope_namespace<'a>(resource: &ApiResourceInfo, object: &'a Object) -> Option<&'a str> {
    if resource.namespaced {
        object.namespace()
    } else {
        None
    }
}
