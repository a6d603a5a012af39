//! syncpod Kube - reconciliation against a Kubernetes-style object API
//!
//! This crate provides:
//! - **Catalog Loader**: Decode, filter, template and normalize assets into a desired store
//! - **Surface Resolver**: Dynamic discovery of served groups, versions and kinds
//! - **Phases**: Fixed apply order (CRDs, namespaces, service accounts, config, storage, rest)
//! - **Reconciler**: Idempotent create/update/replace with conflict retry
//! - **Orphan Collector**: Deletes owned objects the catalog dropped
//! - **Cluster Access**: A kube-backed client and an in-memory mock behind one trait

pub mod cluster;
pub mod diff;
pub mod error;
pub mod loader;
pub mod orphans;
pub mod phases;
pub mod reconcile;
pub mod surface;
pub mod sync;

pub use cluster::{ApiResult, ClusterApi, FaultVerb, KubeCluster, MockCluster, Operation, OperationCounts};
pub use diff::{needs_update, render_diff, semantically_equal};
pub use error::{ApiError, ApiErrorKind, Result, RetryReason, SyncError};
pub use loader::{CatalogLoader, DesiredStore, is_eligible};
pub use orphans::OrphanCollector;
pub use phases::{Phase, PhasePlan, plan};
pub use reconcile::{Reconciler, WriteOutcome};
pub use surface::{ApiResourceInfo, ApiSurface, SurfaceResolver};
pub use sync::{DesiredState, SyncEngine, SyncOutcome};
