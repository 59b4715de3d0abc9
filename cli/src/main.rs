mod commands;
mod config;
mod fetch;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{cmd_browse, cmd_categories, cmd_compare, cmd_search, cmd_status, cmd_sync};
use crate::config::Config;
use chow_core::db::Database;

#[derive(Parser)]
#[command(
    name = "chow",
    version,
    about = "A local-first food nutrition comparison CLI",
    long_about = "\n\n   ██████╗██╗  ██╗ ██████╗ ██╗    ██╗
  ██╔════╝██║  ██║██╔═══██╗██║    ██║
  ██║     ███████║██║   ██║██║ █╗ ██║
  ██║     ██╔══██║██║   ██║██║███╗██║
  ╚██████╗██║  ██║╚██████╔╝╚███╔███╔╝
   ╚═════╝╚═╝  ╚═╝ ╚═════╝  ╚══╝╚══╝
      compare what you're eating.
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync the product catalog (network, then cache, then bundled defaults)
    Sync {
        /// Fetch even if the catalog is still fresh
        #[arg(long)]
        force: bool,
        /// Forget the stored sync state before fetching
        #[arg(long)]
        reset: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show catalog size and freshness
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List product categories
    Categories {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List products in a category
    Browse {
        /// Category name (see 'chow categories')
        category: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search products by name or brand
    Search {
        /// Search query
        query: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compare two products side by side, per 100g
    Compare {
        /// First product (id or name)
        first: String,
        /// Second product (id or name)
        second: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::open(&config.db_path)?;

    match cli.command {
        Commands::Sync { force, reset, json } => cmd_sync(&db, &config, force, reset, json),
        Commands::Status { json } => cmd_status(&db, &config, json),
        Commands::Categories { json } => cmd_categories(&db, json),
        Commands::Browse { category, json } => cmd_browse(&db, &category, json),
        Commands::Search { query, json } => cmd_search(&db, &query, json),
        Commands::Compare {
            first,
            second,
            json,
        } => cmd_compare(&db, &first, &second, json),
    }
}
