//! Run command - reconcile the cluster once or on an interval

use std::path::Path;
use std::time::Duration;

use console::style;
use humantime_serde::re::humantime;
use syncpod_kube::{KubeCluster, SyncEngine, SyncError, SyncOutcome};
use tracing::info;

use crate::error::Result;

pub async fn run(
    config_path: &Path,
    assets_path: &Path,
    once: bool,
    interval: Option<Duration>,
) -> Result<()> {
    let (config, assets) = super::load_inputs(config_path, assets_path)?;
    let interval = interval.unwrap_or_else(|| config.interval());

    let cluster = KubeCluster::try_default().await.map_err(SyncError::from)?;
    let engine = SyncEngine::new(config, cluster, assets).await?;
    println!(
        "{} Loaded {} object(s) for platform {}",
        style("→").blue().bold(),
        engine.desired().store.len(),
        style(&engine.desired().config.platform).cyan()
    );

    if once {
        let outcome = engine.sync().await?;
        print_outcome(&outcome);
        return Ok(());
    }

    println!(
        "{} Syncing every {}",
        style("→").blue().bold(),
        humantime::format_duration(interval)
    );
    tokio::select! {
        _ = engine.sync_periodic(interval) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, stopping");
        }
    }
    Ok(())
}

fn print_outcome(outcome: &SyncOutcome) {
    for key in &outcome.created {
        println!("  {} {}", style("+").green(), key);
    }
    for key in &outcome.updated {
        println!("  {} {}", style("~").yellow(), key);
    }
    for key in &outcome.recreated {
        println!("  {} {}", style("±").yellow(), key);
    }
    for key in &outcome.deleted {
        println!("  {} {}", style("-").red(), key);
    }
    println!(
        "{} {} ({} unchanged, {}ms)",
        style("✓").green().bold(),
        outcome.summary(),
        outcome.unchanged.len(),
        outcome.duration().num_milliseconds()
    );
}
