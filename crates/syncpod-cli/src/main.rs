//! syncpod CLI - keep a cluster in sync with a bundled object catalog

use clap::{Parser, Subcommand};
use humantime_serde::re::humantime;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod exit_codes;

#[derive(Parser)]
#[command(name = "syncpod")]
#[command(author = "syncpod Contributors")]
#[command(version)]
#[command(about = "Keeps a cluster in sync with a bundled catalog of templated objects", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the cluster against the catalog
    Run {
        /// Configuration file
        #[arg(short, long, env = "SYNCPOD_CONFIG")]
        config: PathBuf,

        /// Asset directory
        #[arg(short, long, env = "SYNCPOD_ASSETS")]
        assets: PathBuf,

        /// Run a single pass and exit
        #[arg(long)]
        once: bool,

        /// Time between passes (overrides syncInterval), e.g. "30s" or "5m"
        #[arg(long, value_parser = parse_duration)]
        interval: Option<Duration>,
    },

    /// Render the desired objects locally
    Render {
        /// Configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Asset directory
        #[arg(short, long)]
        assets: PathBuf,

        /// Output directory (if not set, outputs to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the objects each phase would apply
    Plan {
        /// Configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Asset directory
        #[arg(short, long)]
        assets: PathBuf,
    },
}

fn parse_duration(s: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(s)
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    let result = match cli.command {
        Commands::Run {
            config,
            assets,
            once,
            interval,
        } => commands::run::run(&config, &assets, once, interval).await,

        Commands::Render {
            config,
            assets,
            output,
        } => commands::render::run(&config, &assets, output.as_deref()).await,

        Commands::Plan { config, assets } => commands::plan::run(&config, &assets).await,
    };

    if let Err(err) = result {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}
