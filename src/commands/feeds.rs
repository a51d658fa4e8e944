use anyhow::{Context, Result};
use feedsync::config::Config;
use feedsync::daemon::http::types::CreateFeedRequest;
use feedsync::store::FeedStore;

use super::{open_store, parse_mapping, resolve_source};
use crate::FeedAction;

pub async fn handle_feeds(config: Config, action: FeedAction) -> Result<()> {
    let store = open_store(&config).await?;

    match action {
        FeedAction::List => {
            let feeds = store.list_feeds().await?;
            if feeds.is_empty() {
                println!("No feeds registered");
                return Ok(());
            }

            println!("{} feed(s):", feeds.len());
            for feed in feeds {
                println!();
                println!("{} {}", feed.id, feed.name);
                println!("  URL:       {}", feed.url);
                println!(
                    "  Format:    {}",
                    feed.format.map(|f| f.to_string()).unwrap_or_else(|| "auto".to_string())
                );
                println!("  Active:    {}", feed.active);
                if let Some(schedule) = &feed.schedule {
                    println!("  Schedule:  {}", schedule);
                }
                match feed.last_run {
                    Some(at) => println!(
                        "  Last run:  {} ({}, {} products)",
                        at.format("%Y-%m-%d %H:%M:%S"),
                        feed.last_status.as_deref().unwrap_or("unknown"),
                        feed.product_count
                    ),
                    None => println!("  Last run:  never"),
                }
            }
        }
        FeedAction::Add {
            name,
            url,
            format,
            item_element,
            mapping,
            vendor_id,
            schedule,
            inactive,
        } => {
            let request = CreateFeedRequest {
                name,
                url: resolve_source(&url)?,
                format: format.map(|f| f.to_string()),
                vendor_id,
                schedule,
                item_element,
                field_mapping: parse_mapping(&mapping)?,
                active: Some(!inactive),
            };
            let feed = request.into_feed().map_err(anyhow::Error::msg)?;
            store.create_feed(&feed).await.context("Failed to register feed")?;
            println!("Registered feed {} ({})", feed.name, feed.id);
        }
        FeedAction::Remove { id } => {
            if store.delete_feed(id).await? {
                println!("Removed feed {}", id);
            } else {
                anyhow::bail!("Feed {} not found", id);
            }
        }
    }

    Ok(())
}
