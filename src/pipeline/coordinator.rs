//! Fan-out of item URLs over a fixed pool of workers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::submitter::{BulkSubmitter, FlushReport, SubmissionGate};
use crate::config::Config;
use crate::extract::{ExtractError, ItemExtractor};
use crate::identity;
use crate::models::ItemRecord;
use crate::scrapers::{BrowserEngineConfig, RenderError, RenderSessionPool, Renderer};
use crate::services::{attach_coordinates, GeoResolver};

/// Base delay before retrying a transient fetch failure; grows linearly per attempt.
const RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Cooperative cancellation flag, checked by workers between URLs.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A single URL's fetch-and-extract failure.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Render(e) => e.is_transient(),
            FetchError::Extract(e) => e.is_transient(),
        }
    }
}

/// Split `items` into at most `workers` contiguous chunks of ceil(n / workers).
pub fn partition<T: Clone>(items: &[T], workers: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    let size = items.len().div_ceil(workers.max(1));
    items.chunks(size).map(<[T]>::to_vec).collect()
}

/// Worker tuning shared by every worker of a run.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub anchor: String,
    pub browser: BrowserEngineConfig,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub fetch_retries: u32,
}

impl WorkerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            anchor: ItemExtractor::anchor_selector(&config.selectors).to_string(),
            browser: config.browser.clone(),
            batch_size: config.crawl.batch_size,
            flush_interval: Duration::from_secs(config.crawl.flush_interval_secs),
            fetch_retries: config.crawl.fetch_retries,
        }
    }
}

/// What one worker did with its chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker: usize,
    pub assigned: usize,
    pub extracted: usize,
    pub fetch_failures: usize,
    /// URLs left untouched because the stop signal was raised.
    pub skipped: usize,
    pub submission: FlushReport,
}

/// Aggregate of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub urls: usize,
    pub workers: Vec<WorkerReport>,
    pub extracted: usize,
    pub fetch_failures: usize,
    pub skipped: usize,
    pub submission: FlushReport,
    /// Workers that panicked or were cancelled.
    pub lost_workers: usize,
}

impl CrawlSummary {
    fn absorb(&mut self, report: WorkerReport) {
        self.extracted += report.extracted;
        self.fetch_failures += report.fetch_failures;
        self.skipped += report.skipped;
        self.submission.merge(report.submission);
        self.workers.push(report);
    }
}

/// Drives the render → extract → identity → buffer pipeline over all URLs.
pub struct CrawlCoordinator {
    renderer: Arc<dyn Renderer>,
    extractor: Arc<ItemExtractor>,
    geo: Arc<dyn GeoResolver>,
    gate: Arc<SubmissionGate>,
    settings: WorkerSettings,
    stop: StopSignal,
}

impl CrawlCoordinator {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        extractor: Arc<ItemExtractor>,
        geo: Arc<dyn GeoResolver>,
        gate: Arc<SubmissionGate>,
        settings: WorkerSettings,
        stop: StopSignal,
    ) -> Self {
        Self {
            renderer,
            extractor,
            geo,
            gate,
            settings,
            stop,
        }
    }

    /// Process every URL and wait for all workers to finish.
    pub async fn run(&self, urls: Vec<String>, workers: usize) -> CrawlSummary {
        let chunks = partition(&urls, workers);
        info!(urls = urls.len(), workers = chunks.len(), "Starting crawl");

        let mut handles = Vec::with_capacity(chunks.len());
        for (id, chunk) in chunks.into_iter().enumerate() {
            let worker = Worker {
                id,
                pool: RenderSessionPool::new(
                    self.renderer.clone(),
                    &self.settings.anchor,
                    &self.settings.browser,
                ),
                submitter: BulkSubmitter::new(
                    self.gate.clone(),
                    self.settings.batch_size,
                    self.settings.flush_interval,
                ),
                extractor: self.extractor.clone(),
                geo: self.geo.clone(),
                stop: self.stop.clone(),
                fetch_retries: self.settings.fetch_retries,
            };
            handles.push(tokio::spawn(worker.run(chunk)));
        }

        let mut summary = CrawlSummary {
            urls: urls.len(),
            ..Default::default()
        };
        for handle in handles {
            match handle.await {
                Ok(report) => summary.absorb(report),
                Err(e) => {
                    error!(error = %e, "Worker task failed");
                    summary.lost_workers += 1;
                }
            }
        }

        info!(
            extracted = summary.extracted,
            fetch_failures = summary.fetch_failures,
            committed = summary.submission.committed,
            "Crawl finished"
        );
        summary
    }
}

/// Owns one render session and one buffer for its whole chunk.
struct Worker {
    id: usize,
    pool: RenderSessionPool,
    submitter: BulkSubmitter,
    extractor: Arc<ItemExtractor>,
    geo: Arc<dyn GeoResolver>,
    stop: StopSignal,
    fetch_retries: u32,
}

impl Worker {
    async fn run(mut self, chunk: Vec<String>) -> WorkerReport {
        let mut report = WorkerReport {
            worker: self.id,
            assigned: chunk.len(),
            ..Default::default()
        };
        debug!(worker = self.id, urls = chunk.len(), "Worker started");

        for (done, url) in chunk.iter().enumerate() {
            if self.stop.is_raised() {
                report.skipped = chunk.len() - done;
                info!(worker = self.id, skipped = report.skipped, "Stop requested");
                break;
            }

            match self.fetch_record(url).await {
                Ok(record) => {
                    report.extracted += 1;
                    self.submitter.push(record).await;
                }
                Err(e) => {
                    report.fetch_failures += 1;
                    warn!(worker = self.id, url = %url, error = %e, "Skipping page");
                    self.submitter.tick().await;
                }
            }
        }

        self.submitter.flush().await;
        report.submission = self.submitter.totals();
        debug!(worker = self.id, extracted = report.extracted, "Worker finished");
        report
    }

    /// Render and extract, retrying transient failures from scratch.
    async fn fetch_record(&mut self, url: &str) -> Result<ItemRecord, FetchError> {
        let mut attempt: u32 = 0;
        let mut item = loop {
            match self.try_fetch(url).await {
                Ok(item) => break item,
                Err(e) if e.is_transient() && attempt < self.fetch_retries => {
                    attempt += 1;
                    debug!(url, attempt, error = %e, "Retrying page");
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(e) => return Err(e),
            }
        };

        attach_coordinates(&mut item, self.geo.as_ref()).await;
        Ok(identity::assign(item))
    }

    async fn try_fetch(&mut self, url: &str) -> Result<crate::models::ExtractedItem, FetchError> {
        let html = self.pool.fetch(url).await?;
        Ok(self.extractor.extract(url, &html)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Selectors;
    use crate::index::{BulkOutcome, IndexBackend, IndexError};
    use crate::pipeline::failure_log::MemoryFailureLog;
    use crate::scrapers::RenderContext;
    use crate::services::NoopResolver;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// How the fake browser misbehaves.
    #[derive(Clone, Copy)]
    enum Flake {
        /// Navigation fails for the first N contexts, then pages render.
        FailNavigations(usize),
        /// The browser cannot open any context.
        LaunchBroken,
    }

    struct FlakyRenderer {
        flake: Flake,
        opened: AtomicUsize,
    }

    struct FlakyPage {
        fail: bool,
    }

    #[async_trait]
    impl Renderer for FlakyRenderer {
        async fn open(&self) -> Result<Box<dyn RenderContext>, RenderError> {
            let n = self.opened.fetch_add(1, Ordering::SeqCst);
            match self.flake {
                Flake::LaunchBroken => Err(RenderError::Launch("browser exited".into())),
                Flake::FailNavigations(failures) => Ok(Box::new(FlakyPage { fail: n < failures })),
            }
        }
    }

    #[async_trait]
    impl RenderContext for FlakyPage {
        async fn navigate(&mut self, url: &str) -> Result<(), RenderError> {
            if self.fail {
                return Err(RenderError::Navigation {
                    url: url.to_string(),
                    message: "net::ERR_CONNECTION_RESET".into(),
                });
            }
            Ok(())
        }

        async fn wait_for(&mut self, _selector: &str) -> Result<(), RenderError> {
            Ok(())
        }

        async fn content(&mut self) -> Result<String, RenderError> {
            Ok(r#"<div class="product-info"><h1>Alba</h1></div>"#.to_string())
        }

        async fn close(self: Box<Self>) {}
    }

    struct AcceptAll;

    #[async_trait]
    impl IndexBackend for AcceptAll {
        async fn bulk_upsert(
            &self,
            _index: &str,
            records: &[ItemRecord],
        ) -> Result<BulkOutcome, IndexError> {
            Ok(BulkOutcome {
                accepted: records.iter().map(|r| r.id.clone()).collect(),
                rejected: Vec::new(),
            })
        }

        async fn count(&self, _index: &str) -> Result<u64, IndexError> {
            Ok(0)
        }
    }

    async fn crawl_one(flake: Flake, fetch_retries: u32) -> (CrawlSummary, usize) {
        let renderer = Arc::new(FlakyRenderer {
            flake,
            opened: AtomicUsize::new(0),
        });
        let gate = Arc::new(SubmissionGate::new(
            Arc::new(AcceptAll),
            "wines",
            Arc::new(MemoryFailureLog::new()),
        ));
        let settings = WorkerSettings {
            anchor: Selectors::default().anchor,
            browser: BrowserEngineConfig::default(),
            batch_size: 10,
            flush_interval: Duration::from_secs(30),
            fetch_retries,
        };
        let coordinator = CrawlCoordinator::new(
            renderer.clone(),
            Arc::new(ItemExtractor::new(&Selectors::default()).unwrap()),
            Arc::new(NoopResolver),
            gate,
            settings,
            StopSignal::new(),
        );
        let summary = coordinator
            .run(vec!["https://x/vinos/alba/".to_string()], 1)
            .await;
        (summary, renderer.opened.load(Ordering::SeqCst))
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_is_retried_with_a_fresh_context() {
        let (summary, opened) = crawl_one(Flake::FailNavigations(1), 2).await;
        assert_eq!(opened, 2);
        assert_eq!(summary.extracted, 1);
        assert_eq!(summary.fetch_failures, 0);
        assert_eq!(summary.submission.committed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_stop_after_configured_attempts() {
        let (summary, opened) = crawl_one(Flake::FailNavigations(10), 2).await;
        assert_eq!(opened, 3);
        assert_eq!(summary.extracted, 0);
        assert_eq!(summary.fetch_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_failure_is_not_retried() {
        let (summary, opened) = crawl_one(Flake::LaunchBroken, 3).await;
        assert_eq!(opened, 1);
        assert_eq!(summary.fetch_failures, 1);
    }

    #[test]
    fn partition_uses_contiguous_ceil_sized_chunks() {
        let urls: Vec<u32> = (1..=3).collect();
        assert_eq!(partition(&urls, 2), vec![vec![1, 2], vec![3]]);

        let urls: Vec<u32> = (1..=10).collect();
        let chunks = partition(&urls, 4);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0], vec![1, 2, 3]);
        assert_eq!(chunks[3], vec![10]);
    }

    #[test]
    fn fewer_items_than_workers_yields_fewer_chunks() {
        let urls = vec!["a", "b"];
        assert_eq!(partition(&urls, 8), vec![vec!["a"], vec!["b"]]);
        assert!(partition::<&str>(&[], 4).is_empty());
        assert_eq!(partition(&urls, 0), vec![vec!["a", "b"]]);
    }

    #[test]
    fn stop_signal_is_shared_between_clones() {
        let stop = StopSignal::new();
        let worker_view = stop.clone();
        assert!(!worker_view.is_raised());
        stop.raise();
        assert!(worker_view.is_raised());
    }

    #[test]
    fn transient_classification_follows_source_error() {
        let anchor = FetchError::from(ExtractError::AnchorMissing { url: "u".into() });
        assert!(anchor.is_transient());
        let launch = FetchError::from(RenderError::Launch("no chrome".into()));
        assert!(!launch.is_transient());
    }
}
