//! # xferlog
//!
//! Operator tool for a transfer history store: lists peers and transfers,
//! shows reconstructed state, and dumps the raw event log.

mod commands;

use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use xferlog_store::{Database, StoreConfig};

use crate::commands::Format;

#[derive(Parser)]
#[command(name = "xferlog")]
#[command(about = "Inspect the event-sourced history of peer-to-peer transfers", long_about = None)]
struct Cli {
    /// Store file to open (overrides XFERLOG_STORAGE_PATH and the platform default)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List every known peer
    Peers,
    /// List a peer's transfers with their current state
    Transfers {
        #[arg(long)]
        peer: String,
    },
    /// Show a transfer, its paths and their reconstructed state
    Show { transfer_id: String },
    /// Print the ordered event log of a transfer, or of one of its paths
    History {
        transfer_id: String,

        #[arg(long)]
        path: Option<String>,
    },
    /// Dump every transfer created at or after a timestamp (YYYY-MM-DD HH:MM:SS[.fff], UTC)
    Since { timestamp: String },
    /// Remove a peer together with its transfers, paths and events
    PeerRemove { peer: String },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,xferlog=info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = StoreConfig::from_env();
    if let Some(db) = cli.db {
        config.storage_path = Some(db);
    }
    let db = Database::new(config)?;

    let format = if cli.json { Format::Json } else { Format::Text };
    let mut stdout = io::stdout().lock();
    commands::run(&db, cli.command, format, &mut stdout)
}
