//! The sync engine: one pass applies every phase, then collects orphans

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use syncpod_core::{AssetProvider, Configuration, ObjectKey};
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::cluster::ClusterApi;
use crate::error::Result;
use crate::loader::{CatalogLoader, DesiredStore};
use crate::orphans::OrphanCollector;
use crate::phases::{PhasePlan, plan};
use crate::reconcile::{Reconciler, WriteOutcome};
use crate::surface::{ApiSurface, SurfaceResolver};

/// Configuration and the store loaded from it, swapped together
#[derive(Debug)]
pub struct DesiredState {
    pub config: Configuration,
    pub store: DesiredStore,
}

/// What one pass did
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub created: Vec<ObjectKey>,
    pub updated: Vec<ObjectKey>,
    pub recreated: Vec<ObjectKey>,
    pub unchanged: Vec<ObjectKey>,
    pub deleted: Vec<ObjectKey>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// When the next pass should run
    pub requeue_after: Option<Duration>,
}

impl SyncOutcome {
    fn started() -> Self {
        let now = Utc::now();
        Self {
            created: Vec::new(),
            updated: Vec::new(),
            recreated: Vec::new(),
            unchanged: Vec::new(),
            deleted: Vec::new(),
            started_at: now,
            finished_at: now,
            requeue_after: None,
        }
    }

    /// File a reconciled key under its outcome
    pub fn record(&mut self, key: ObjectKey, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Created => self.created.push(key),
            WriteOutcome::Updated => self.updated.push(key),
            WriteOutcome::Recreated => self.recreated.push(key),
            WriteOutcome::Unchanged => self.unchanged.push(key),
        }
    }

    /// Number of objects written or deleted
    pub fn writes(&self) -> usize {
        self.created.len() + self.updated.len() + self.recreated.len() + self.deleted.len()
    }

    pub fn has_changes(&self) -> bool {
        self.writes() > 0
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// Generate a human-readable summary
    pub fn summary(&self) -> String {
        let mut parts = Vec::with_capacity(4);
        if !self.created.is_empty() {
            parts.push(format!("{} created", self.created.len()));
        }
        if !self.updated.is_empty() {
            parts.push(format!("{} updated", self.updated.len()));
        }
        if !self.recreated.is_empty() {
            parts.push(format!("{} recreated", self.recreated.len()));
        }
        if !self.deleted.is_empty() {
            parts.push(format!("{} deleted", self.deleted.len()));
        }
        if parts.is_empty() {
            "No changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Drives reconciliation passes against one cluster
///
/// Built once: the catalog is loaded and discovery run at construction.
/// Passes are serialized; a call to [`SyncEngine::sync`] made while another
/// pass runs waits for it to finish.
pub struct SyncEngine<C: ClusterApi> {
    cluster: C,
    loader: CatalogLoader,
    desired: ArcSwap<DesiredState>,
    resolver: SurfaceResolver,
    pass_lock: Mutex<()>,
}

impl<C: ClusterApi> SyncEngine<C> {
    /// Load the catalog and discover the API surface
    pub async fn new(config: Configuration, cluster: C, assets: Arc<dyn AssetProvider>) -> Result<Self> {
        config.validate()?;
        let loader = CatalogLoader::new(assets);
        let store = loader.load(&config).await?;
        let resolver = SurfaceResolver::build(&cluster).await?;
        info!(
            objects = store.len(),
            platform = %config.platform,
            "sync engine ready"
        );

        Ok(Self {
            cluster,
            loader,
            desired: ArcSwap::from_pointee(DesiredState { config, store }),
            resolver,
            pass_lock: Mutex::new(()),
        })
    }

    /// Load the catalog again under a new configuration
    ///
    /// The running pass, if any, keeps the state it started with. On error
    /// the previous state stays in place.
    pub async fn reload(&self, config: Configuration) -> Result<()> {
        config.validate()?;
        let store = self.loader.load(&config).await?;
        info!(objects = store.len(), platform = %config.platform, "catalog reloaded");
        self.desired.store(Arc::new(DesiredState { config, store }));
        Ok(())
    }

    /// Run one full pass: every phase in order, then orphan collection
    pub async fn sync(&self) -> Result<SyncOutcome> {
        let _pass = self.pass_lock.lock().await;
        let desired = self.desired.load_full();
        let mut outcome = SyncOutcome::started();
        let reconciler = Reconciler::new(&self.cluster, &self.resolver, &desired.config);

        for (phase, keys) in plan(&desired.store).phases {
            if phase.refreshes_surface_before() {
                self.resolver.refresh(&self.cluster).await?;
            }
            debug!(%phase, objects = keys.len(), "applying phase");
            let surface = self.resolver.snapshot();

            for key in keys {
                let Some(object) = desired.store.get(&key) else {
                    continue;
                };
                match reconciler.reconcile(object).await {
                    Ok(result) => outcome.record(surface.scoped_key(&key), result),
                    Err(e) => {
                        error!(%key, %phase, error = %e, "reconcile failed");
                        return Err(e);
                    }
                }
            }
        }

        let surface = self.resolver.snapshot();
        outcome.deleted = OrphanCollector::new(&self.cluster, &desired.config)
            .collect(&surface, &desired.store)
            .await
            .inspect_err(|e| error!(error = %e, "orphan collection failed"))?;

        outcome.finished_at = Utc::now();
        outcome.requeue_after = Some(desired.config.interval());
        info!(
            summary = %outcome.summary(),
            elapsed_ms = outcome.duration().num_milliseconds(),
            "sync pass complete"
        );
        Ok(outcome)
    }

    /// Run passes forever, one per tick
    ///
    /// A late tick is delayed rather than made up for. Failed passes are
    /// logged and the loop carries on.
    pub async fn sync_periodic(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.sync().await {
                error!(error = %e, "sync pass failed, retrying next interval");
            }
        }
    }

    /// Keys the next pass would apply, by phase
    pub fn plan(&self) -> PhasePlan {
        plan(&self.desired.load().store)
    }

    pub fn desired(&self) -> Arc<DesiredState> {
        self.desired.load_full()
    }

    pub fn surface(&self) -> Arc<ApiSurface> {
        self.resolver.snapshot()
    }

    pub fn cluster(&self) -> &C {
        &self.cluster
    }
}
