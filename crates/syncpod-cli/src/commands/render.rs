//! Render command - print the desired store without touching a cluster

use std::fs;
use std::path::Path;

use console::style;
use syncpod_core::ObjectKey;
use syncpod_kube::DesiredStore;

use crate::error::Result;

pub async fn run(config_path: &Path, assets_path: &Path, output_dir: Option<&Path>) -> Result<()> {
    let (_, store) = super::load_store(config_path, assets_path).await?;

    match output_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            for (key, object) in &store {
                fs::write(dir.join(file_name(key)), object.to_yaml()?)?;
            }
            eprintln!(
                "{} Wrote {} object(s) to {}",
                style("✓").green().bold(),
                store.len(),
                dir.display()
            );
        }
        None => print!("{}", render_documents(&store)?),
    }
    Ok(())
}

/// All objects as one multi-document YAML stream, in key order
pub fn render_documents(store: &DesiredStore) -> Result<String> {
    let mut out = String::new();
    for object in store.values() {
        out.push_str("---\n");
        out.push_str(&object.to_yaml()?);
    }
    Ok(out)
}

/// `kind[.group][.namespace].name.yaml`, lowercased
fn file_name(key: &ObjectKey) -> String {
    let mut parts = vec![key.group_kind.kind.to_lowercase()];
    if !key.group_kind.group.is_empty() {
        parts.push(key.group_kind.group.clone());
    }
    if !key.namespace.is_empty() {
        parts.push(key.namespace.clone());
    }
    parts.push(key.name.clone());
    format!("{}.yaml", parts.join("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncpod_core::GroupKind;

    #[test]
    fn test_file_name() {
        let key = ObjectKey::new(GroupKind::core("ConfigMap"), "ns-a", "cm-1");
        assert_eq!(file_name(&key), "configmap.ns-a.cm-1.yaml");

        let key = ObjectKey::new(GroupKind::new("storage.k8s.io", "StorageClass"), "", "fast");
        assert_eq!(file_name(&key), "storageclass.storage.k8s.io.fast.yaml");
    }
}
