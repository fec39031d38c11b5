use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mapkeeper::{cli, config, server};

#[derive(Parser)]
#[command(name = "mapkeeper", version, about = "Reset and backup service for the map POI database")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server
    Serve,
    /// Delete every POI, comment, image and grid square of one map
    Reset {
        /// deep_desert, hagga_basin or combined
        #[arg(long)]
        map: String,
        /// Confirmation phrase, e.g. "DELETE DEEP DESERT". Prompted for when omitted.
        #[arg(long)]
        confirm: Option<String>,
    },
    /// Snapshot a map's rows and files into the backup folder
    Backup {
        /// deep_desert, hagga_basin or combined (default)
        #[arg(long)]
        map: Option<String>,
    },
    /// List, delete or restore stored backups
    Backups {
        #[command(subcommand)]
        action: BackupsAction,
    },
    /// Show what a reset of a map would delete
    Inventory {
        #[arg(long)]
        map: String,
    },
    /// Check database integrity and storage configuration
    Doctor,
}

#[derive(Subcommand)]
enum BackupsAction {
    /// List stored backups with their row and file counts
    List {
        /// deep_desert, hagga_basin or combined. Every scope when omitted.
        #[arg(long)]
        map: Option<String>,
    },
    /// Delete one backup folder, e.g. backup_deep_desert_2025-01-01T00-00-00-000Z
    Delete { name: String },
    /// Put a backup's rows and files back. Rows that already exist are kept.
    Restore { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::MapkeeperConfig::load()?;

    // Log to stderr so stdout stays clean for command output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => server::serve(config).await?,
        // The http blob backend blocks; keep it off the runtime threads.
        Command::Reset { map, confirm } => {
            tokio::task::spawn_blocking(move || cli::reset::reset(&config, &map, confirm.as_deref()))
                .await??
        }
        Command::Backup { map } => {
            tokio::task::spawn_blocking(move || cli::backup::backup(&config, map.as_deref()))
                .await??
        }
        Command::Backups { action } => {
            tokio::task::spawn_blocking(move || match action {
                BackupsAction::List { map } => cli::backups::list(&config, map.as_deref()),
                BackupsAction::Delete { name } => cli::backups::delete(&config, &name),
                BackupsAction::Restore { name } => cli::backups::restore(&config, &name),
            })
            .await??
        }
        Command::Inventory { map } => cli::inventory::inventory(&config, &map)?,
        Command::Doctor => cli::doctor::doctor(&config)?,
    }

    Ok(())
}
