//! CLI commands

pub mod plan;
pub mod render;
pub mod run;

use std::path::Path;
use std::sync::Arc;

use syncpod_core::{AssetProvider, Configuration, CoreError, DirAssets};
use syncpod_kube::{CatalogLoader, DesiredStore};
use tracing::debug;

use crate::error::{CliError, Result};

/// Read the configuration file and open the asset directory
pub(crate) fn load_inputs(
    config_path: &Path,
    assets_path: &Path,
) -> Result<(Configuration, Arc<dyn AssetProvider>)> {
    let config = Configuration::from_file(config_path).map_err(|e| match e {
        CoreError::Io(io) => CliError::config_with_help(
            format!("cannot read {}: {}", config_path.display(), io),
            "pass the configuration file with --config",
        ),
        other => CliError::config_with_help(
            format!("{}: {}", config_path.display(), other),
            "top-level keys are platform, config, values, syncInterval, labels, retry, kinds and loader",
        ),
    })?;

    let assets = DirAssets::open(assets_path)?;
    debug!(
        platform = %config.platform,
        assets = assets.names().len(),
        root = %assets_path.display(),
        "inputs loaded"
    );
    Ok((config, Arc::new(assets)))
}

/// Build the desired store offline
pub(crate) async fn load_store(config_path: &Path, assets_path: &Path) -> Result<(Configuration, DesiredStore)> {
    let (config, assets) = load_inputs(config_path, assets_path)?;
    let store = CatalogLoader::new(assets).load(&config).await?;
    Ok((config, store))
}
