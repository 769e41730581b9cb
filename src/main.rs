//! Deadwood CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "deadwood")]
#[command(about = "Track which definitions each source file produced and unload them selectively", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Project root path (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Config file (defaults to deadwood.toml in the project root)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List tracked files and the symbol each one defines
    Scan {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Dry run: track every file, then report what each change would unload
    Watch {
        /// Stat files on each heartbeat instead of watching in the background
        #[arg(long)]
        sync: bool,

        /// Use the polling backend only
        #[arg(long, conflicts_with = "sync")]
        poll: bool,

        /// Heartbeat interval in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,
    },
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for command output
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("deadwood={}", log_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("Deadwood v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Project root: {}", cli.root.display());

    match cli.command {
        Commands::Scan { json } => {
            let config = commands::load_config(&cli.root, cli.config.as_deref())?;
            commands::scan(&config, json)
        }
        Commands::Watch { sync, poll, interval_ms } => {
            let mut config = commands::load_config(&cli.root, cli.config.as_deref())?;
            if sync {
                config.async_mode = false;
            }
            if poll {
                config.poll_only = true;
            }
            commands::watch(config, interval_ms).await
        }
        Commands::Version => {
            println!("Deadwood v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
