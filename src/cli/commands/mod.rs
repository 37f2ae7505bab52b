//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod crawl;
mod extract;
mod index;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "vinecrawl")]
#[command(about = "Crawl a wine catalog, extract item records and bulk-load them into a search index")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

/// Check if JSON logging is requested (for early logging setup).
pub fn is_log_json() -> bool {
    std::env::args().any(|arg| arg == "--log-json")
}

#[derive(Subcommand)]
enum Commands {
    /// Discover, render, extract and index every catalog item
    Crawl {
        /// Number of concurrent workers (overrides config)
        #[arg(short, long)]
        workers: Option<usize>,
        /// Stop discovery after this many catalog pages
        #[arg(long)]
        max_pages: Option<u32>,
        /// Process at most this many discovered items
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Walk the catalog and print item URLs (does not render or index)
    Discover {
        /// Stop after this many catalog pages
        #[arg(long)]
        max_pages: Option<u32>,
    },

    /// Extract one item page and print the record as JSON
    Extract {
        /// Item page URL
        url: String,
        /// Read the rendered page from a saved HTML file instead of a browser
        #[arg(long)]
        html: Option<PathBuf>,
    },

    /// Show the number of documents in the index
    Count,
}

async fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Ok(Config::load_from_path(&path).await?),
        None => Ok(Config::load().await),
    }
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config).await?;

    match cli.command {
        Commands::Crawl {
            workers,
            max_pages,
            limit,
        } => {
            if let Some(workers) = workers {
                config.crawl.workers = workers;
            }
            if max_pages.is_some() {
                config.catalog.max_pages = max_pages;
            }
            crawl::cmd_crawl(&config, limit).await
        }
        Commands::Discover { max_pages } => {
            if max_pages.is_some() {
                config.catalog.max_pages = max_pages;
            }
            crawl::cmd_discover(&config).await
        }
        Commands::Extract { url, html } => extract::cmd_extract(&config, &url, html.as_deref()).await,
        Commands::Count => index::cmd_count(&config).await,
    }
}
