//! feedsync: multi-vendor product feed importer
//!
//! Imports vendor product feeds (XML, JSON, CSV) into a normalized catalog.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use feedsync::config::{Config, LogFormat};
use feedsync::types::FeedFormat;
use std::path::PathBuf;
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

use commands::{feeds, import, init, preview, serve};

#[derive(Parser)]
#[command(name = "feedsync")]
#[command(about = "Multi-vendor product feed importer")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "feedsync.toml")]
    config: PathBuf,

    /// Database URL (overrides [database].url)
    #[arg(long)]
    database: Option<String>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Output directory
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Run the HTTP API and background importer
    Serve {
        /// Listen address (overrides [http].listen_addr)
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Show what a feed looks like without importing it
    Preview {
        /// Feed URL or local path
        url: String,

        /// Feed format (xml, json, csv); detected when omitted
        #[arg(short, long)]
        format: Option<FeedFormat>,

        /// XML item element
        #[arg(long)]
        item_element: Option<String>,

        /// Print the raw preview as JSON
        #[arg(long)]
        json: bool,
    },

    /// Import a feed once, in the foreground
    Import {
        /// Feed URL or local path
        source: String,

        /// Feed format (xml, json, csv); detected when omitted
        #[arg(short, long)]
        format: Option<FeedFormat>,

        /// XML item element
        #[arg(long)]
        item_element: Option<String>,

        /// Explicit field mapping, RAW=canonical (repeatable)
        #[arg(short, long = "map")]
        mapping: Vec<String>,

        /// Import into an in-memory store and discard the result
        #[arg(long)]
        dry_run: bool,

        /// Suppress progress output
        #[arg(short, long)]
        quiet: bool,
    },

    /// Manage registered feeds
    Feeds {
        #[command(subcommand)]
        action: FeedAction,
    },
}

#[derive(Subcommand)]
pub enum FeedAction {
    /// List registered feeds
    List,

    /// Register a feed
    Add {
        /// Display name
        name: String,

        /// Feed URL or absolute local path
        url: String,

        /// Feed format (xml, json, csv); detected when omitted
        #[arg(short, long)]
        format: Option<FeedFormat>,

        /// XML item element
        #[arg(long)]
        item_element: Option<String>,

        /// Explicit field mapping, RAW=canonical (repeatable)
        #[arg(short, long = "map")]
        mapping: Vec<String>,

        /// Vendor identifier
        #[arg(long)]
        vendor_id: Option<String>,

        /// Informational schedule, e.g. "daily"
        #[arg(long)]
        schedule: Option<String>,

        /// Register the feed as inactive
        #[arg(long)]
        inactive: bool,
    },

    /// Delete a feed (its products are kept)
    Remove {
        /// Feed ID
        id: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(&cli.config)?;
    if let Some(database) = cli.database {
        config.database.url = database;
    }

    // Setup logging
    let level = config.logging.level.with_verbosity(cli.verbose).to_tracing();
    match config.logging.format {
        LogFormat::Json => {
            let subscriber = FmtSubscriber::builder().with_max_level(level).json().finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Text => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_target(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    match cli.command {
        Commands::Init { path, force } => init::init_config(path, force).await,
        Commands::Serve { listen } => serve::serve(config, listen).await,
        Commands::Preview {
            url,
            format,
            item_element,
            json,
        } => preview::preview_feed(config, url, format, item_element, json).await,
        Commands::Import {
            source,
            format,
            item_element,
            mapping,
            dry_run,
            quiet,
        } => {
            import::import_feed(
                config,
                import::ImportArgs {
                    source,
                    format,
                    item_element,
                    mapping,
                    dry_run,
                    quiet,
                },
            )
            .await
        }
        Commands::Feeds { action } => feeds::handle_feeds(config, action).await,
    }
}
