//! [`ClusterApi`] backed by a live API server

use async_trait::async_trait;
use kube::{
    Client,
    api::{Api, DeleteParams, DynamicObject, ListParams, PostParams},
    core::TypeMeta,
    discovery::{ApiResource, Discovery, Scope},
};
use syncpod_core::Object;

use super::{ApiResult, ClusterApi, FIELD_MANAGER, scope_namespace};
use crate::error::{ApiError, ApiErrorKind};
use crate::surface::{ApiResourceInfo, ApiSurface};

/// Cluster access through a kube client and dynamic discovery
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect with the ambient kubeconfig or in-cluster service account
    pub async fn try_default() -> Result<Self, kube::Error> {
        Ok(Self::new(Client::try_default().await?))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn api(&self, resource: &ApiResourceInfo, namespace: Option<&str>) -> Api<DynamicObject> {
        let ar = api_resource(resource);
        match (resource.namespaced, namespace) {
            (true, Some(ns)) => Api::namespaced_with(self.client.clone(), ns, &ar),
            (true, None) => Api::default_namespaced_with(self.client.clone(), &ar),
            (false, _) => Api::all_with(self.client.clone(), &ar),
        }
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }
}

fn api_resource(resource: &ApiResourceInfo) -> ApiResource {
    ApiResource {
        group: resource.group.clone(),
        version: resource.version.clone(),
        api_version: resource.api_version(),
        kind: resource.kind.clone(),
        plural: resource.plural.clone(),
    }
}

/// Map a kube client error onto the engine's error categories
fn api_error(err: kube::Error) -> ApiError {
    match err {
        kube::Error::Api(resp) => {
            let kind = match (resp.code, resp.reason.as_str()) {
                (404, _) => ApiErrorKind::NotFound,
                (409, "AlreadyExists") => ApiErrorKind::AlreadyExists,
                (409, _) => ApiErrorKind::Conflict,
                (403, _) => ApiErrorKind::Forbidden,
                (422, _) => ApiErrorKind::Invalid,
                _ => ApiErrorKind::Other,
            };
            ApiError::new(kind, resp.message)
        }
        other => ApiError::new(ApiErrorKind::Other, other.to_string()),
    }
}

fn to_dynamic(object: &Object) -> ApiResult<DynamicObject> {
    serde_json::from_value(object.as_value().clone())
        .map_err(|e| ApiError::new(ApiErrorKind::Invalid, format!("cannot encode object: {}", e)))
}

fn from_dynamic(mut obj: DynamicObject, resource: &ApiResourceInfo) -> ApiResult<Object> {
    // List items come back without apiVersion/kind
    if obj.types.is_none() {
        obj.types = Some(TypeMeta {
            api_version: resource.api_version(),
            kind: resource.kind.clone(),
        });
    }
    let value = serde_json::to_value(&obj)
        .map_err(|e| ApiError::new(ApiErrorKind::Other, format!("cannot decode object: {}", e)))?;
    Object::from_value(value, &resource.plural)
        .map_err(|e| ApiError::new(ApiErrorKind::Other, e.to_string()))
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn discover(&self) -> ApiResult<ApiSurface> {
        let discovery = Discovery::new(self.client.clone())
            .run()
            .await
            .map_err(api_error)?;

        let mut resources = Vec::new();
        for group in discovery.groups() {
            for version in group.versions() {
                for (ar, caps) in group.versioned_resources(version) {
                    let verbs: Vec<&str> = caps.operations.iter().map(String::as_str).collect();
                    resources.push(
                        ApiResourceInfo::new(
                            ar.group,
                            ar.version,
                            ar.kind,
                            ar.plural,
                            caps.scope == Scope::Namespaced,
                        )
                        .with_verbs(&verbs),
                    );
                }
            }
        }
        Ok(ApiSurface::from_resources(resources))
    }

    async fn get(
        &self,
        resource: &ApiResourceInfo,
        namespace: Option<&str>,
        name: &str,
    ) -> ApiResult<Object> {
        let obj = self
            .api(resource, namespace)
            .get(name)
            .await
            .map_err(api_error)?;
        from_dynamic(obj, resource)
    }

    async fn list(&self, resource: &ApiResourceInfo) -> ApiResult<Vec<Object>> {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &api_resource(resource));
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(api_error)?;
        list.items
            .into_iter()
            .map(|obj| from_dynamic(obj, resource))
            .collect()
    }

    async fn create(&self, resource: &ApiResourceInfo, object: &Object) -> ApiResult<Object> {
        let obj = to_dynamic(object)?;
        let created = self
            .api(resource, scope_namespace(resource, object))
            .create(&Self::post_params(), &obj)
            .await
            .map_err(api_error)?;
        from_dynamic(created, resource)
    }

    async fn update(&self, resource: &ApiResourceInfo, object: &Object) -> ApiResult<Object> {
        let obj = to_dynamic(object)?;
        let updated = self
            .api(resource, scope_namespace(resource, object))
            .replace(object.name(), &Self::post_params(), &obj)
            .await
            .map_err(api_error)?;
        from_dynamic(updated, resource)
    }

    async fn delete(
        &self,
        resource: &ApiResourceInfo,
        namespace: Option<&str>,
        name: &str,
    ) -> ApiResult<()> {
        self.api(resource, namespace)
            .delete(name, &DeleteParams::background())
            .await
            .map_err(api_error)?;
        Ok(())
    }
}
