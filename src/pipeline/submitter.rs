//! Worker-local buffering and serialized bulk submission.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, info};

use super::failure_log::{FailedDocument, FailureSink};
use crate::index::{IndexBackend, IndexError};
use crate::models::ItemRecord;

/// Counts from one or more flushes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub submitted: usize,
    /// Accepted by the backend.
    pub committed: usize,
    /// Refused individually within an accepted batch.
    pub rejected: usize,
    /// Lost with a batch whose request failed outright.
    pub failed: usize,
}

impl FlushReport {
    pub fn merge(&mut self, other: FlushReport) {
        self.submitted += other.submitted;
        self.committed += other.committed;
        self.rejected += other.rejected;
        self.failed += other.failed;
    }
}

/// The one path to the index shared by every worker.
///
/// Flushes are serialized: a batch is submitted and its failures recorded
/// before the next worker's batch starts.
pub struct SubmissionGate {
    backend: Arc<dyn IndexBackend>,
    index: String,
    failures: Arc<dyn FailureSink>,
    lock: Mutex<()>,
}

impl SubmissionGate {
    pub fn new(
        backend: Arc<dyn IndexBackend>,
        index: impl Into<String>,
        failures: Arc<dyn FailureSink>,
    ) -> Self {
        Self {
            backend,
            index: index.into(),
            failures,
            lock: Mutex::new(()),
        }
    }

    /// Submit one batch. Never retries; failures go to the failure sink.
    pub async fn submit(&self, batch: &[ItemRecord]) -> FlushReport {
        let mut report = FlushReport {
            submitted: batch.len(),
            ..Default::default()
        };
        if batch.is_empty() {
            return report;
        }

        let _guard = self.lock.lock().await;
        match self.backend.bulk_upsert(&self.index, batch).await {
            Ok(outcome) => {
                report.committed = outcome.accepted.len();
                report.rejected = outcome.rejected.len();
                if !outcome.rejected.is_empty() {
                    let by_id: HashMap<&str, &ItemRecord> =
                        batch.iter().map(|r| (r.id.as_str(), r)).collect();
                    let failed: Vec<FailedDocument> = outcome
                        .rejected
                        .iter()
                        .map(|rejection| match by_id.get(rejection.id.as_str()) {
                            Some(record) => FailedDocument::from_record(record, &rejection.reason),
                            None => FailedDocument {
                                id: rejection.id.clone(),
                                reason: rejection.reason.clone(),
                                payload: serde_json::Value::Null,
                                failed_at: chrono::Utc::now(),
                            },
                        })
                        .collect();
                    self.failures.record(&failed).await;
                }
                info!(
                    index = %self.index,
                    committed = report.committed,
                    rejected = report.rejected,
                    "Flushed batch"
                );
            }
            Err(e) => {
                error!(index = %self.index, documents = batch.len(), error = %e, "Bulk submission failed");
                report.failed = batch.len();
                let reason = e.to_string();
                let failed: Vec<FailedDocument> = batch
                    .iter()
                    .map(|r| FailedDocument::from_record(r, reason.as_str()))
                    .collect();
                self.failures.record(&failed).await;
            }
        }
        report
    }

    pub async fn count(&self) -> Result<u64, IndexError> {
        self.backend.count(&self.index).await
    }
}

/// Per-worker buffer flushed on size or age, whichever is reached first.
pub struct BulkSubmitter {
    gate: Arc<SubmissionGate>,
    buffer: Vec<ItemRecord>,
    batch_size: usize,
    flush_interval: Duration,
    last_flush: Instant,
    totals: FlushReport,
}

impl BulkSubmitter {
    pub fn new(gate: Arc<SubmissionGate>, batch_size: usize, flush_interval: Duration) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            gate,
            buffer: Vec::with_capacity(batch_size),
            batch_size,
            flush_interval,
            last_flush: Instant::now(),
            totals: FlushReport::default(),
        }
    }

    /// Append a record, flushing if a threshold is now reached.
    pub async fn push(&mut self, record: ItemRecord) -> Option<FlushReport> {
        self.buffer.push(record);
        self.tick().await
    }

    /// Flush if the buffer is non-empty and a threshold has been reached.
    pub async fn tick(&mut self) -> Option<FlushReport> {
        if self.due() {
            Some(self.flush().await)
        } else {
            None
        }
    }

    fn due(&self) -> bool {
        !self.buffer.is_empty()
            && (self.buffer.len() >= self.batch_size
                || self.last_flush.elapsed() >= self.flush_interval)
    }

    /// Submit everything buffered. The buffer is empty afterwards whatever the outcome.
    pub async fn flush(&mut self) -> FlushReport {
        let batch = std::mem::take(&mut self.buffer);
        self.last_flush = Instant::now();
        if batch.is_empty() {
            return FlushReport::default();
        }
        let report = self.gate.submit(&batch).await;
        self.totals.merge(report);
        report
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn totals(&self) -> FlushReport {
        self.totals
    }
}
