use anyhow::{Context, Result};
use feedsync::config::Config;
use feedsync::daemon::build_coordinator;
use feedsync::import::RunStatus;
use feedsync::store::{CatalogStore, FeedStore, MemoryStore, Store};
use feedsync::types::{FeedDefinition, FeedFormat, FeedUpdate};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use super::{open_store, parse_mapping, resolve_source};

/// Arguments of `feedsync import`
pub struct ImportArgs {
    pub source: String,
    pub format: Option<FeedFormat>,
    pub item_element: Option<String>,
    pub mapping: Vec<String>,
    pub dry_run: bool,
    pub quiet: bool,
}

pub async fn import_feed(mut config: Config, args: ImportArgs) -> Result<()> {
    config.fetch.allow_local_files = true;
    let source = resolve_source(&args.source)?;
    let mapping = parse_mapping(&args.mapping)?;

    let store: Arc<dyn Store> = if args.dry_run {
        info!("Dry run: importing into an in-memory catalog");
        Arc::new(MemoryStore::new())
    } else {
        open_store(&config).await?
    };

    let mut feed = find_or_register(store.as_ref(), &source).await?;
    let overrides = FeedUpdate {
        format: args.format,
        item_element: args.item_element,
        field_mapping: if mapping.is_empty() { None } else { Some(mapping) },
        ..Default::default()
    };
    overrides.apply(&mut feed);
    store.update_feed(&feed).await?;

    let coordinator = build_coordinator(&config, store.clone())?;
    let cancel = AtomicBool::new(false);
    let run_id = Uuid::new_v4();

    println!("Importing {} (feed {})", source, feed.id);

    let run = coordinator.run(&feed, run_id, &cancel);
    tokio::pin!(run);

    let mut ticker = tokio::time::interval(Duration::from_secs(2));
    ticker.tick().await;
    let mut interrupted = false;

    let result = loop {
        tokio::select! {
            result = &mut run => break result,
            _ = ticker.tick(), if !args.quiet => {
                let state = coordinator.progress().snapshot(feed.id);
                println!(
                    "  [{}] {}/{} ({:.1}%)",
                    state.status, state.processed, state.total, state.percent
                );
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                warn!("Interrupted, stopping after the current records");
                interrupted = true;
                cancel.store(true, Ordering::Relaxed);
            }
        }
    };

    let state = coordinator.progress().snapshot(feed.id);
    match result {
        Ok(summary) => {
            println!();
            println!("Import complete{}:", if args.dry_run { " (dry run)" } else { "" });
            println!("  Records:   {}", summary.total);
            println!("  Created:   {}", summary.created);
            println!("  Updated:   {}", summary.updated);
            println!("  Skipped:   {}", summary.skipped);
            println!("  Errors:    {}", summary.errors);
            if args.dry_run {
                println!("  Products:  {}", store.count_products().await?);
                println!("  Categories: {}", store.count_categories().await?);
            }
            Ok(())
        }
        Err(e) if state.status == RunStatus::Cancelled => {
            println!("{}", state.message);
            Err(e).context("Import cancelled")
        }
        Err(e) => Err(e).with_context(|| format!("Import of {} failed", source)),
    }
}

/// Reuse the feed registered for `url`, or register a new one named after it
async fn find_or_register(store: &dyn Store, url: &str) -> Result<FeedDefinition> {
    if let Some(feed) = store.list_feeds().await?.into_iter().find(|f| f.url == url) {
        info!("Using registered feed '{}' ({})", feed.name, feed.id);
        return Ok(feed);
    }

    let name = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|n| !n.is_empty())
        .unwrap_or(url);
    let feed = FeedDefinition::new(name, url);
    store.create_feed(&feed).await?;
    info!("Registered feed '{}' ({})", feed.name, feed.id);
    Ok(feed)
}
