//! CLI commands implementation.

mod compact_cmd;
mod crawl_cmd;
mod status_cmd;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Settings;

#[derive(Parser)]
#[command(name = "cinecrawl")]
#[command(about = "Resumable crawler for paginated film catalog listings")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl every slice of the configured year, then compact
    Crawl {
        /// Release year to crawl (overrides config)
        #[arg(short, long)]
        year: Option<i32>,

        /// Output directory for the persisted store (overrides config)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Fetch title pages for fuller blurbs after the crawl
        #[arg(long)]
        enrich: bool,

        /// Run the browser with a visible window
        #[arg(long)]
        headed: bool,

        /// Only crawl the first N slices (0 = all)
        #[arg(short, long, default_value = "0")]
        limit: usize,
    },

    /// Remove duplicate identities from the persisted store
    Compact {
        /// Output directory holding the store (overrides config)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },

    /// Show per-slice progress and ledger size
    Status {
        /// Output directory holding the store (overrides config)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Crawl {
            year,
            out_dir,
            enrich,
            headed,
            limit,
        } => {
            if let Some(year) = year {
                settings.crawl.year = year;
            }
            if let Some(out_dir) = out_dir {
                settings.crawl.out_dir = out_dir;
            }
            if enrich {
                settings.crawl.enrich_blurbs = true;
            }
            if headed {
                settings.driver.headless = false;
            }
            crawl_cmd::cmd_crawl(settings, limit).await
        }
        Commands::Compact { out_dir } => {
            if let Some(out_dir) = out_dir {
                settings.crawl.out_dir = out_dir;
            }
            compact_cmd::cmd_compact(&settings)
        }
        Commands::Status { out_dir } => {
            if let Some(out_dir) = out_dir {
                settings.crawl.out_dir = out_dir;
            }
            status_cmd::cmd_status(&settings)
        }
    }
}
