//! keyshelf - admin CLI for keyshelf databases.
//!
//! Inspects and maintains the stores of one redb database file:
//!
//! - Listing stores and their schemas (`keyshelf stores`, `keyshelf stats`)
//! - Exporting and importing JSON snapshots (`keyshelf export`, `keyshelf import`)
//! - Sweeping expired entries (`keyshelf sweep`)
//!
//! See `keyshelf --help` for full usage information.

#![allow(clippy::redundant_pub_crate)] // Explicit pub(crate) documents intent, aids refactoring

use anyhow::Result;
use clap::{Parser, Subcommand};
use keyshelf::logging::{LogConfig, LogFormat, init_logging};
use std::path::PathBuf;

mod commands;

const AFTER_HELP: &str = "\
EXAMPLES:
  keyshelf stores                               List stores in ~/.keyshelf/keyshelf.redb
  keyshelf --db app.redb stats shows            Schema and row counts of 'shows'
  keyshelf --db app.redb export shows -o s.json Export 'shows' to a snapshot file
  keyshelf --db app.redb import shows s.json    Replace 'shows' with a snapshot
  keyshelf --db app.redb import shows s.json --merge
  keyshelf --db app.redb --schema schema.toml import users u.json";

#[derive(Parser)]
#[command(name = "keyshelf")]
#[command(version)]
#[command(about = "Inspect and maintain keyshelf databases")]
#[command(after_help = AFTER_HELP)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database file (default: ~/.keyshelf/keyshelf.redb)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// TOML schema describing store versions and indexes
    #[arg(long, global = true)]
    schema: Option<PathBuf>,

    /// Enable verbose/debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format: pretty, json or compact
    #[arg(long, global = true, default_value = "pretty")]
    log_format: LogFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// List every store in the database
    Stores,
    /// Show version, key policy, indexes and row counts of a store
    Stats {
        /// Store identifier
        store: String,
    },
    /// List the indexes of a store
    Indexes {
        /// Store identifier
        store: String,
    },
    /// Delete expired entries now
    Sweep {
        /// Store identifier
        store: String,
    },
    /// Export a store as a JSON snapshot
    Export {
        /// Store identifier
        store: String,
        /// Output file (default: stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Import a JSON snapshot into a store
    ///
    /// Replaces the store's contents unless --merge is given. The store is
    /// created if it does not exist yet.
    Import {
        /// Store identifier
        store: String,
        /// Snapshot file written by `export`
        file: PathBuf,
        /// Keep existing rows; snapshot rows overwrite on key collision
        #[arg(long)]
        merge: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    init_logging(&config.format(cli.log_format));

    let ctx = commands::Context::open(cli.db.as_deref(), cli.schema.as_deref())?;

    match cli.command {
        Commands::Stores => commands::store::list(&ctx)?,
        Commands::Stats { store } => commands::store::stats(&ctx, &store).await?,
        Commands::Indexes { store } => commands::store::indexes(&ctx, &store).await?,
        Commands::Sweep { store } => commands::store::sweep(&ctx, &store).await?,
        Commands::Export { store, out } => {
            commands::snapshot::export(&ctx, &store, out.as_deref()).await?;
        },
        Commands::Import { store, file, merge } => {
            commands::snapshot::import(&ctx, &store, &file, merge).await?;
        },
    }

    Ok(())
}
