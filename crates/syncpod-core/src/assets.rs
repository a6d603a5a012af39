//! Asset providers: the read-only catalog of manifest bytes
//!
//! Catalogs are produced at build time and handed to the engine either as
//! an embedded name/bytes table or as a directory of manifest files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{CoreError, Result};

/// Source of raw manifest assets
///
/// Implementations must be Send + Sync so loader workers can share them.
pub trait AssetProvider: Send + Sync {
    /// Names of every asset in the catalog
    fn names(&self) -> Vec<String>;

    /// Raw bytes of one asset
    fn get(&self, name: &str) -> Result<Vec<u8>>;
}

/// Catalog compiled into the binary (e.g. with `include_bytes!`)
#[derive(Debug, Clone, Default)]
pub struct EmbeddedAssets {
    assets: BTreeMap<String, &'static [u8]>,
}

impl EmbeddedAssets {
    pub fn new(assets: &[(&str, &'static [u8])]) -> Self {
        Self {
            assets: assets
                .iter()
                .map(|(name, bytes)| (name.to_string(), *bytes))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

impl AssetProvider for EmbeddedAssets {
    fn names(&self) -> Vec<String> {
        self.assets.keys().cloned().collect()
    }

    fn get(&self, name: &str) -> Result<Vec<u8>> {
        self.assets
            .get(name)
            .map(|bytes| bytes.to_vec())
            .ok_or_else(|| CoreError::AssetNotFound {
                name: name.to_string(),
            })
    }
}

/// Catalog read from a directory of `.yaml`, `.yml` and `.json` files
///
/// Asset names are paths relative to the root, with `/` separators.
#[derive(Debug, Clone)]
pub struct DirAssets {
    root: PathBuf,
    names: Vec<String>,
}

impl DirAssets {
    /// Scan a directory recursively; hidden files and directories are skipped
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(CoreError::AssetNotFound {
                name: root.display().to_string(),
            });
        }

        let mut names = Vec::new();
        let walker = WalkDir::new(&root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() || !is_manifest(entry.path()) {
                continue;
            }
            let relative = entry.path().strip_prefix(&root).unwrap_or(entry.path());
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            names.push(name);
        }
        names.sort();
        debug!(root = %root.display(), count = names.len(), "asset directory scanned");

        Ok(Self { root, names })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AssetProvider for DirAssets {
    fn names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn get(&self, name: &str) -> Result<Vec<u8>> {
        if !self.names.iter().any(|n| n == name) {
            return Err(CoreError::AssetNotFound {
                name: name.to_string(),
            });
        }
        Ok(std::fs::read(self.root.join(name))?)
    }
}

fn is_manifest(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml" | "json")
    )
}
