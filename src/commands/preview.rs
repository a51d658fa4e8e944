use anyhow::{Context, Result};
use feedsync::config::Config;
use feedsync::daemon::build_coordinator;
use feedsync::import::PreviewRequest;
use feedsync::store::MemoryStore;
use feedsync::types::{FeedFormat, RawRecord};
use std::sync::Arc;

use super::resolve_source;

pub async fn preview_feed(
    mut config: Config,
    url: String,
    format: Option<FeedFormat>,
    item_element: Option<String>,
    json: bool,
) -> Result<()> {
    // The operator owns the filesystem here
    config.fetch.allow_local_files = true;
    // Previews never touch the catalog
    let coordinator = build_coordinator(&config, Arc::new(MemoryStore::new()))?;
    let request = PreviewRequest {
        url: resolve_source(&url)?,
        format,
        item_element,
    };

    let preview = coordinator
        .preview(&request)
        .await
        .with_context(|| format!("Failed to preview {}", url))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&preview)?);
        return Ok(());
    }

    println!("Feed: {}", url);
    println!("  Format:      {}", preview.detected_type);
    println!(
        "  Items:       {}{}",
        preview.total_items,
        if preview.truncated { "+ (preview cap reached)" } else { "" }
    );
    println!("  Fields ({}):", preview.fields.len());
    for field in &preview.fields {
        println!("    {}", field);
    }

    for (i, record) in preview.sample.iter().enumerate() {
        println!();
        println!("Sample {}:", i + 1);
        print_record(record);
    }

    Ok(())
}

fn print_record(record: &RawRecord) {
    let mut names: Vec<&String> = record.fields.keys().collect();
    names.sort();
    for name in names {
        let text = record.fields[name].as_text();
        let shown: String = text.chars().take(80).collect();
        if shown.len() < text.len() {
            println!("  {}: {}...", name, shown);
        } else {
            println!("  {}: {}", name, shown);
        }
    }
    for param in &record.params {
        println!("  [{}] {}", param.name, param.value);
    }
}
