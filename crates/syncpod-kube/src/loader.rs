//! Catalog loading: assets in, desired store out
//!
//! Each asset is decoded, filtered, templated and normalized on a blocking
//! worker. Workers share nothing mutable; their results are merged in one
//! step once every worker has finished, so a failed load never publishes a
//! partial store.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use syncpod_core::{
    AssetProvider, Configuration, LabelKeys, Object, ObjectKey, decode_documents,
    normalize::apply_defaults,
};
use syncpod_engine::{Engine, TemplateContext};
use tracing::{debug, warn};

use crate::error::{Result, SyncError};

/// Desired state keyed by object identity, iterated in key order
pub type DesiredStore = BTreeMap<ObjectKey, Object>;

/// Builds the desired store from an asset provider
pub struct CatalogLoader {
    assets: Arc<dyn AssetProvider>,
    engine: Arc<Engine>,
}

impl CatalogLoader {
    pub fn new(assets: Arc<dyn AssetProvider>) -> Self {
        Self {
            assets,
            engine: Arc::new(Engine::default()),
        }
    }

    /// Use a custom template engine
    pub fn with_engine(mut self, engine: Engine) -> Self {
        self.engine = Arc::new(engine);
        self
    }

    /// Load every asset and merge the results
    ///
    /// On a key collision the object from the asset whose name sorts last
    /// wins. The first failure aborts the whole load.
    pub async fn load(&self, config: &Configuration) -> Result<DesiredStore> {
        let config = Arc::new(config.clone());
        let context = Arc::new(TemplateContext::from_config(&config)?);
        let names = self.assets.names();
        let workers = config.loader.effective_workers();
        debug!(assets = names.len(), workers, "loading catalog");

        let mut batches: Vec<(String, Vec<Object>)> = stream::iter(names)
            .map(|name| {
                let assets = Arc::clone(&self.assets);
                let engine = Arc::clone(&self.engine);
                let config = Arc::clone(&config);
                let context = Arc::clone(&context);
                tokio::task::spawn_blocking(move || -> Result<(String, Vec<Object>)> {
                    let objects = load_asset(assets.as_ref(), &name, &config, &context, &engine)?;
                    Ok((name, objects))
                })
            })
            .buffer_unordered(workers)
            .map(|joined| match joined {
                Ok(result) => result,
                Err(e) => Err(SyncError::Worker(e.to_string())),
            })
            .try_collect()
            .await?;

        batches.sort_by(|a, b| a.0.cmp(&b.0));

        let mut store = DesiredStore::new();
        for (asset, objects) in batches {
            for object in objects {
                let key = object.key();
                if store.insert(key.clone(), object).is_some() {
                    warn!(%key, asset = %asset, "object defined more than once, keeping the later asset");
                }
            }
        }
        debug!(objects = store.len(), "catalog loaded");
        Ok(store)
    }
}

/// Decode, filter, template and normalize the objects of one asset
pub fn load_asset(
    assets: &dyn AssetProvider,
    name: &str,
    config: &Configuration,
    context: &TemplateContext,
    engine: &Engine,
) -> Result<Vec<Object>> {
    let load_error = |source| SyncError::Load {
        asset: name.to_string(),
        source,
    };
    let bytes = assets.get(name).map_err(load_error)?;
    let documents = decode_documents(&bytes, name).map_err(load_error)?;

    let mut objects = Vec::with_capacity(documents.len());
    for mut object in documents {
        if !object.has_label(&config.labels.managed) {
            warn!(
                asset = name,
                key = %object.key(),
                label = %config.labels.managed,
                "skipping object without the managed label"
            );
            continue;
        }
        if !is_eligible(&object, &config.labels, &config.platform) {
            debug!(asset = name, key = %object.key(), platform = %config.platform, "skipping object for another platform");
            continue;
        }
        engine.render_object(&mut object, context, name)?;
        apply_defaults(&mut object);
        objects.push(object);
    }
    Ok(objects)
}

/// Whether an object applies to the configured platform
///
/// Objects without the platform label apply everywhere.
pub fn is_eligible(object: &Object, labels: &LabelKeys, platform: &str) -> bool {
    match object.label(&labels.platform) {
        Some(value) => value.eq_ignore_ascii_case(platform),
        None => true,
    }
}
