//! Discovery → workers → bulk submission, with in-memory collaborators.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use vinecrawl::config::{CatalogConfig, Selectors};
use vinecrawl::extract::ItemExtractor;
use vinecrawl::index::{BulkOutcome, IndexBackend, IndexError};
use vinecrawl::models::ItemRecord;
use vinecrawl::pipeline::{
    CrawlCoordinator, MemoryFailureLog, StopSignal, SubmissionGate, WorkerSettings,
};
use vinecrawl::scrapers::{
    BrowserEngineConfig, CatalogError, CatalogSource, CatalogWalker, RenderContext, RenderError,
    Renderer,
};
use vinecrawl::services::NoopResolver;

const PREFIX: &str = "https://www.vinetur.com/vinos/";

struct TwoPageCatalog;

#[async_trait]
impl CatalogSource for TwoPageCatalog {
    async fn fetch_page(&self, page: u32) -> Result<String, CatalogError> {
        Ok(match page {
            1 => r#"
                <article><a href="/vinos/alba/">Alba</a></article>
                <article><a href="/vinos/brisa/">Brisa</a></article>
                <article><a href="/vinos/cierzo/">Cierzo</a></article>
            "#
            .to_string(),
            2 => r#"<article><a href="/vinos/alba/">Alba</a></article>"#.to_string(),
            _ => panic!("page {page} should not be requested"),
        })
    }
}

/// Serves a product page per URL; URLs in `stalled` never show the anchor.
struct StaticSite {
    stalled: Vec<String>,
}

struct StaticPage {
    url: String,
    stalled: Vec<String>,
}

#[async_trait]
impl Renderer for StaticSite {
    async fn open(&self) -> Result<Box<dyn RenderContext>, RenderError> {
        Ok(Box::new(StaticPage {
            url: String::new(),
            stalled: self.stalled.clone(),
        }))
    }
}

#[async_trait]
impl RenderContext for StaticPage {
    async fn navigate(&mut self, url: &str) -> Result<(), RenderError> {
        self.url = url.to_string();
        Ok(())
    }

    async fn wait_for(&mut self, _selector: &str) -> Result<(), RenderError> {
        if self.stalled.contains(&self.url) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn content(&mut self) -> Result<String, RenderError> {
        let slug = self
            .url
            .trim_start_matches(PREFIX)
            .trim_end_matches('/')
            .to_string();
        Ok(format!(
            r#"<html><body>
                 <div class="product-info"><h1>{slug}</h1><h2>Bodega {slug}</h2></div>
                 <table class="wine-info"><tr><th>Grado</th><td>13,5%</td></tr></table>
               </body></html>"#
        ))
    }

    async fn close(self: Box<Self>) {}
}

#[derive(Default)]
struct MemoryIndex {
    documents: Mutex<HashMap<String, ItemRecord>>,
    batches: Mutex<Vec<usize>>,
}

#[async_trait]
impl IndexBackend for MemoryIndex {
    async fn bulk_upsert(
        &self,
        _index: &str,
        records: &[ItemRecord],
    ) -> Result<BulkOutcome, IndexError> {
        self.batches.lock().unwrap().push(records.len());
        let mut documents = self.documents.lock().unwrap();
        let mut outcome = BulkOutcome::default();
        for record in records {
            documents.insert(record.id.clone(), record.clone());
            outcome.accepted.push(record.id.clone());
        }
        Ok(outcome)
    }

    async fn count(&self, _index: &str) -> Result<u64, IndexError> {
        Ok(self.documents.lock().unwrap().len() as u64)
    }
}

fn settings() -> WorkerSettings {
    WorkerSettings {
        anchor: Selectors::default().anchor,
        browser: BrowserEngineConfig::default(),
        batch_size: 10,
        flush_interval: Duration::from_secs(30),
        fetch_retries: 1,
    }
}

fn coordinator(
    stalled: &[&str],
    index: Arc<MemoryIndex>,
    failures: Arc<MemoryFailureLog>,
    stop: StopSignal,
) -> (CrawlCoordinator, Arc<SubmissionGate>) {
    let renderer = Arc::new(StaticSite {
        stalled: stalled.iter().map(|s| s.to_string()).collect(),
    });
    let gate = Arc::new(SubmissionGate::new(index, "vinos_embeddings", failures));
    let coordinator = CrawlCoordinator::new(
        renderer,
        Arc::new(ItemExtractor::new(&Selectors::default()).unwrap()),
        Arc::new(NoopResolver),
        gate.clone(),
        settings(),
        stop,
    );
    (coordinator, gate)
}

#[tokio::test(start_paused = true)]
async fn crawl_indexes_every_page_that_renders() {
    let walker =
        CatalogWalker::new(TwoPageCatalog, &CatalogConfig::default(), &Selectors::default())
            .unwrap();
    let urls = walker.walk().await.unwrap();
    assert_eq!(
        urls,
        vec![
            format!("{PREFIX}alba/"),
            format!("{PREFIX}brisa/"),
            format!("{PREFIX}cierzo/"),
        ]
    );

    let index = Arc::new(MemoryIndex::default());
    let failures = Arc::new(MemoryFailureLog::new());
    let cierzo = format!("{PREFIX}cierzo/");
    let (coordinator, gate) = coordinator(
        &[cierzo.as_str()],
        index.clone(),
        failures.clone(),
        StopSignal::new(),
    );

    let summary = coordinator.run(urls, 2).await;

    let assigned: Vec<usize> = summary.workers.iter().map(|w| w.assigned).collect();
    assert_eq!(assigned, vec![2, 1]);
    assert_eq!(summary.extracted, 2);
    assert_eq!(summary.fetch_failures, 1);
    assert_eq!(summary.submission.committed, 2);
    assert_eq!(summary.lost_workers, 0);
    assert!(failures.entries().is_empty());

    assert_eq!(gate.count().await.unwrap(), 2);
    // One final flush from the worker that extracted anything
    assert_eq!(*index.batches.lock().unwrap(), vec![2]);

    let documents = index.documents.lock().unwrap();
    let alba = documents
        .values()
        .find(|r| r.item.url.ends_with("/alba/"))
        .unwrap();
    assert_eq!(alba.item.name.as_deref(), Some("alba"));
    assert_eq!(alba.item.producer.as_deref(), Some("Bodega alba"));
    assert_eq!(alba.id.len(), 64);
}

#[tokio::test(start_paused = true)]
async fn raised_stop_signal_skips_remaining_urls() {
    let index = Arc::new(MemoryIndex::default());
    let failures = Arc::new(MemoryFailureLog::new());
    let stop = StopSignal::new();
    stop.raise();
    let (coordinator, _) = coordinator(&[], index.clone(), failures, stop);

    let urls: Vec<String> = ["a", "b", "c", "d"]
        .iter()
        .map(|s| format!("{PREFIX}{s}/"))
        .collect();
    let summary = coordinator.run(urls, 2).await;

    assert_eq!(summary.skipped, 4);
    assert_eq!(summary.extracted, 0);
    assert!(index.batches.lock().unwrap().is_empty());
}
