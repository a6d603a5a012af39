//! Converging one desired object
//!
//! Each attempt reads the live object fresh and then creates, leaves alone,
//! updates or replaces it. Lost optimistic-concurrency races send the
//! object around the loop again, up to the configured number of attempts.

use std::fmt;

use syncpod_core::{
    Configuration, Object, ObjectKey,
    normalize::{apply_defaults, strip_server_fields},
};
use tracing::{debug, info, warn};

use crate::cluster::{ClusterApi, scope_namespace};
use crate::diff::{render_diff, semantically_equal};
use crate::error::{ApiError, Result, RetryReason, SyncError};
use crate::surface::{ApiResourceInfo, SurfaceResolver};

/// What a reconcile did to the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
    /// Deleted and created again because an immutable field changed
    Recreated,
    Unchanged,
}

impl fmt::Display for WriteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Recreated => "recreated",
            Self::Unchanged => "unchanged",
        };
        f.write_str(s)
    }
}

/// Result of a single attempt
#[derive(Debug)]
enum Attempt {
    Done(WriteOutcome),
    Retry(RetryReason, ApiError),
}

/// Applies desired objects one at a time
pub struct Reconciler<'a, C: ClusterApi + ?Sized> {
    cluster: &'a C,
    resolver: &'a SurfaceResolver,
    config: &'a Configuration,
}

impl<'a, C: ClusterApi + ?Sized> Reconciler<'a, C> {
    pub fn new(cluster: &'a C, resolver: &'a SurfaceResolver, config: &'a Configuration) -> Self {
        Self {
            cluster,
            resolver,
            config,
        }
    }

    /// Make the live object match `desired`
    ///
    /// Fails if the kind is not discoverable, if a namespaced object has no
    /// namespace, on any unexpected API error, or when conflicts outlast the
    /// retry budget.
    pub async fn reconcile(&self, desired: &Object) -> Result<WriteOutcome> {
        let resource = self
            .resolver
            .resolve(&desired.gvk(), &desired.key(), &self.config.kinds)?;

        let mut desired = scoped(&resource, desired)?;
        let key = desired.key();
        desired.set_label(&self.config.labels.owned, "true");
        desired.set_resource_version(None);

        let attempts = self.config.retry.attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.attempt(&resource, &key, &desired).await? {
                Attempt::Done(outcome) => return Ok(outcome),
                Attempt::Retry(reason, source) if attempt >= attempts => {
                    return Err(SyncError::RetriesExhausted {
                        key: key.to_string(),
                        attempts,
                        reason,
                        source,
                    });
                }
                Attempt::Retry(reason, source) => {
                    warn!(%key, %reason, attempt, error = %source, "retrying");
                    tokio::time::sleep(self.config.retry.backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(
        &self,
        resource: &ApiResourceInfo,
        key: &ObjectKey,
        desired: &Object,
    ) -> Result<Attempt> {
        let namespace = scope_namespace(resource, desired);
        let live = match self.cluster.get(resource, namespace, desired.name()).await {
            Ok(live) => live,
            Err(e) if e.is_not_found() => return self.create(resource, key, desired, WriteOutcome::Created).await,
            Err(e) => return Err(SyncError::api("get", key, e)),
        };

        let resource_version = live.resource_version().map(str::to_string);
        let mut live = live;
        strip_server_fields(&mut live);
        apply_defaults(&mut live);

        if semantically_equal(&live, desired) {
            debug!(%key, "unchanged");
            return Ok(Attempt::Done(WriteOutcome::Unchanged));
        }

        let mut update = desired.clone();
        update.set_resource_version(resource_version.as_deref());
        match self.cluster.update(resource, &update).await {
            Ok(_) => {
                if self.config.kinds.is_sensitive(&key.group_kind) {
                    info!(%key, "updated");
                } else {
                    info!(%key, diff = %render_diff(&live, desired), "updated");
                }
                Ok(Attempt::Done(WriteOutcome::Updated))
            }
            Err(e) if e.is_conflict() => Ok(Attempt::Retry(RetryReason::Conflict, e)),
            Err(e) if e.is_immutable_field() => {
                warn!(%key, error = %e, "immutable field changed, replacing object");
                self.replace(resource, key, desired).await
            }
            Err(e) => Err(SyncError::api("update", key, e)),
        }
    }

    async fn create(
        &self,
        resource: &ApiResourceInfo,
        key: &ObjectKey,
        desired: &Object,
        outcome: WriteOutcome,
    ) -> Result<Attempt> {
        match self.cluster.create(resource, desired).await {
            Ok(_) => {
                info!(%key, "{}", outcome);
                Ok(Attempt::Done(outcome))
            }
            Err(e) if e.is_already_exists() => Ok(Attempt::Retry(RetryReason::CreateRaced, e)),
            Err(e) => Err(SyncError::api("create", key, e)),
        }
    }

    /// Delete the live object and create the desired one in its place
    async fn replace(
        &self,
        resource: &ApiResourceInfo,
        key: &ObjectKey,
        desired: &Object,
    ) -> Result<Attempt> {
        let namespace = scope_namespace(resource, desired);
        match self.cluster.delete(resource, namespace, desired.name()).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(SyncError::api("delete", key, e)),
        }
        self.create(resource, key, desired, WriteOutcome::Recreated).await
    }
}

/// Copy of `desired` with its namespace matching the resource scope
///
/// Cluster-scoped kinds lose any namespace the asset set; namespaced kinds
/// must name one.
fn scoped(resource: &ApiResourceInfo, desired: &Object) -> Result<Object> {
    let mut object = desired.clone();
    if !resource.namespaced {
        object.metadata_mut().remove("namespace");
    } else if object.namespace().is_none() {
        return Err(SyncError::MissingNamespace {
            key: desired.key().to_string(),
        });
    }
    Ok(object)
}
