//! Catalog discovery and full crawl commands.

use std::sync::Arc;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use crate::config::Config;
use crate::extract::ItemExtractor;
use crate::index::ElasticIndex;
use crate::pipeline::{
    CrawlCoordinator, CrawlSummary, JsonlFailureLog, StopSignal, SubmissionGate, WorkerSettings,
};
use crate::scrapers::{CatalogWalker, ChromiumRenderer, HttpCatalogSource, Renderer};
use crate::services::{GeoResolver, NoopResolver, NominatimResolver};

/// Walk the catalog behind a spinner.
async fn discover_urls(config: &Config) -> anyhow::Result<Vec<String>> {
    let source = HttpCatalogSource::new(&config.catalog)?;
    let walker = CatalogWalker::new(source, &config.catalog, &config.selectors)?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(format!("Walking catalog at {}...", config.catalog.endpoint));
    pb.enable_steady_tick(Duration::from_millis(100));

    let result = walker.walk().await;
    pb.finish_and_clear();
    Ok(result?)
}

/// Print discovered item URLs, one per line.
pub async fn cmd_discover(config: &Config) -> anyhow::Result<()> {
    let urls = discover_urls(config).await?;
    for url in &urls {
        println!("{}", url);
    }
    eprintln!("{} Discovered {} item URLs", style("✓").green(), urls.len());
    Ok(())
}

pub(super) fn geo_resolver(config: &Config) -> anyhow::Result<Arc<dyn GeoResolver>> {
    if config.geocode.enabled {
        Ok(Arc::new(NominatimResolver::new(&config.geocode)?))
    } else {
        Ok(Arc::new(NoopResolver))
    }
}

/// Run the whole pipeline.
pub async fn cmd_crawl(config: &Config, limit: Option<usize>) -> anyhow::Result<()> {
    let mut urls = discover_urls(config).await?;
    println!(
        "{} Discovered {} item URLs",
        style("✓").green(),
        urls.len()
    );
    if let Some(limit) = limit {
        urls.truncate(limit);
    }
    if urls.is_empty() {
        println!("{} Nothing to crawl", style("!").yellow());
        return Ok(());
    }

    let renderer: Arc<dyn Renderer> = Arc::new(ChromiumRenderer::launch(&config.browser).await?);
    let extractor = Arc::new(ItemExtractor::new(&config.selectors)?);
    let backend = Arc::new(ElasticIndex::new(&config.index)?);
    let failure_log = config.failure_log_path();
    let failures = Arc::new(JsonlFailureLog::new(&failure_log));
    let gate = Arc::new(SubmissionGate::new(
        backend,
        config.index.index.clone(),
        failures,
    ));

    let stop = StopSignal::new();
    let stop_on_signal = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing current pages");
            stop_on_signal.raise();
        }
    });

    let coordinator = CrawlCoordinator::new(
        renderer,
        extractor,
        geo_resolver(config)?,
        gate.clone(),
        WorkerSettings::from_config(config),
        stop,
    );

    println!(
        "{} Crawling {} items with {} workers",
        style("→").cyan(),
        urls.len(),
        config.crawl.workers.max(1)
    );
    let summary = coordinator.run(urls, config.crawl.workers).await;
    print_summary(&summary);

    let not_indexed = summary.submission.rejected + summary.submission.failed;
    if not_indexed > 0 {
        println!(
            "  {} {} documents logged to {}",
            style("→").dim(),
            not_indexed,
            failure_log.display()
        );
    }

    match gate.count().await {
        Ok(count) => println!(
            "{:<20} {}",
            "Index Total:",
            style(count).bold()
        ),
        Err(e) => println!("{} Could not count index: {}", style("!").yellow(), e),
    }

    Ok(())
}

fn print_summary(summary: &CrawlSummary) {
    println!("\n{}", style("Crawl Summary").bold());
    println!("{}", "-".repeat(40));
    println!("{:<20} {}", "URLs:", summary.urls);
    println!("{:<20} {}", "Workers:", summary.workers.len());
    println!("{:<20} {}", "Extracted:", summary.extracted);
    println!("{:<20} {}", "Fetch Failures:", summary.fetch_failures);
    if summary.skipped > 0 {
        println!("{:<20} {}", "Skipped (stopped):", summary.skipped);
    }
    println!(
        "{:<20} {}",
        "Committed:",
        style(summary.submission.committed).green()
    );
    println!("{:<20} {}", "Rejected:", summary.submission.rejected);
    println!("{:<20} {}", "Submit Failures:", summary.submission.failed);
    if summary.lost_workers > 0 {
        println!(
            "{:<20} {}",
            "Lost Workers:",
            style(summary.lost_workers).red()
        );
    }
}
