//! Plan command - show what a pass would apply, phase by phase

use std::path::Path;

use console::style;
use syncpod_kube::plan;

use crate::error::Result;

pub async fn run(config_path: &Path, assets_path: &Path) -> Result<()> {
    let (config, store) = super::load_store(config_path, assets_path).await?;
    let plan = plan(&store);

    println!(
        "{} Plan for platform {}",
        style("→").blue().bold(),
        style(&config.platform).cyan()
    );
    for (phase, keys) in &plan.phases {
        if keys.is_empty() {
            continue;
        }
        println!();
        println!("{} ({})", style(phase).bold(), keys.len());
        for key in keys {
            println!("  {}", key);
        }
    }
    println!();
    println!(
        "{} {} object(s); orphans owned by syncpod are removed after the last phase",
        style("✓").green().bold(),
        plan.len()
    );
    Ok(())
}
