//! Single-page extraction for checking selectors against a live or saved page.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use super::crawl::geo_resolver;
use crate::config::Config;
use crate::extract::ItemExtractor;
use crate::identity;
use crate::scrapers::{ChromiumRenderer, RenderSessionPool};
use crate::services::attach_coordinates;

/// Render (or read) one item page and print its record as JSON.
pub async fn cmd_extract(config: &Config, url: &str, html: Option<&Path>) -> anyhow::Result<()> {
    let document = match html {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let renderer = Arc::new(ChromiumRenderer::launch(&config.browser).await?);
            let mut pool = RenderSessionPool::new(
                renderer,
                ItemExtractor::anchor_selector(&config.selectors),
                &config.browser,
            );
            pool.fetch(url).await?
        }
    };

    let extractor = ItemExtractor::new(&config.selectors)?;
    let mut item = extractor.extract(url, &document)?;
    let geo = geo_resolver(config)?;
    attach_coordinates(&mut item, geo.as_ref()).await;

    let record = identity::assign(item);
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
