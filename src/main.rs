//! # Archivist CLI (`archivist`)
//!
//! Harvests digitized items from a remote catalog into a local full-text
//! index and serves ranked search over it.
//!
//! ## Usage
//!
//! ```bash
//! archivist --config ./config/archivist.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `archivist init` | Create the SQLite database and schema |
//! | `archivist harvest` | Harvest every configured collection |
//! | `archivist search "<query>"` | Search the index |
//! | `archivist serve` | Start the HTTP search API |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! archivist init
//!
//! # Harvest one collection without writing the index
//! archivist harvest --collection laurentianuniversitylambda --dry-run
//!
//! # Second page of 1923 hits, as JSON
//! archivist search "strike" --year 1923 --page 1 --json
//! ```

use archivist::{config, harvest, migrate, search, server};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Archivist: catalog harvester and full-text search service.
#[derive(Parser)]
#[command(
    name = "archivist",
    about = "Archivist — harvest digitized catalog items and search their full text",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/archivist.toml")]
    config: PathBuf,

    /// Log filter (e.g. `debug`, `archivist=trace`). Overrides `RUST_LOG`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Harvest configured collections into the index.
    Harvest {
        /// Harvest only this collection instead of the configured list.
        #[arg(long)]
        collection: Option<String>,

        /// Fetch and cache items without writing the index.
        #[arg(long)]
        dry_run: bool,
    },

    /// Search the index.
    Search {
        /// Free-text query; every word must match.
        query: String,

        /// Only items from this year.
        #[arg(long)]
        year: Option<i32>,

        /// Results per page (defaults to `[search].default_limit`).
        #[arg(long)]
        limit: Option<i64>,

        /// Zero-based page number.
        #[arg(long, default_value_t = 0)]
        page: i64,

        /// Print the JSON response instead of a listing.
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP search API on `[server].bind`.
    Serve,
}

fn init_tracing(level: Option<&str>) -> anyhow::Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref())?;

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Harvest {
            collection,
            dry_run,
        } => {
            harvest::run_harvest(&cfg, collection, dry_run).await?;
        }
        Commands::Search {
            query,
            year,
            limit,
            page,
            json,
        } => {
            search::run_search(&cfg, &query, year, limit, page, json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
