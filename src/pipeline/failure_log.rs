//! Reconciliation log for documents the index did not accept.

use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{error, warn};

use crate::models::ItemRecord;

/// One document that was rejected or whose batch failed to submit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedDocument {
    pub id: String,
    pub reason: String,
    pub payload: serde_json::Value,
    pub failed_at: DateTime<Utc>,
}

impl FailedDocument {
    pub fn from_record(record: &ItemRecord, reason: impl Into<String>) -> Self {
        Self {
            id: record.id.clone(),
            reason: reason.into(),
            payload: serde_json::to_value(record).unwrap_or(serde_json::Value::Null),
            failed_at: Utc::now(),
        }
    }
}

/// Destination for failed documents. Recording never fails the caller.
#[async_trait]
pub trait FailureSink: Send + Sync {
    async fn record(&self, failures: &[FailedDocument]);
}

/// Appends one JSON object per line.
pub struct JsonlFailureLog {
    path: PathBuf,
    file: Mutex<Option<tokio::fs::File>>,
}

impl JsonlFailureLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, lines: &str) -> std::io::Result<()> {
        let mut guard = self.file.lock().await;
        if guard.is_none() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            *guard = Some(file);
        }
        if let Some(file) = guard.as_mut() {
            file.write_all(lines.as_bytes()).await?;
            file.flush().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl FailureSink for JsonlFailureLog {
    async fn record(&self, failures: &[FailedDocument]) {
        let mut lines = String::new();
        for failure in failures {
            warn!(id = %failure.id, reason = %failure.reason, "Document not indexed");
            match serde_json::to_string(failure) {
                Ok(line) => {
                    lines.push_str(&line);
                    lines.push('\n');
                }
                Err(e) => error!(id = %failure.id, error = %e, "Failed to serialize failure entry"),
            }
        }
        if lines.is_empty() {
            return;
        }
        if let Err(e) = self.append(&lines).await {
            error!(path = %self.path.display(), error = %e, "Failed to write failure log");
        }
    }
}

/// Keeps failures in memory; for dry runs and tests.
#[derive(Default)]
pub struct MemoryFailureLog {
    entries: StdMutex<Vec<FailedDocument>>,
}

impl MemoryFailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<FailedDocument> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl FailureSink for MemoryFailureLog {
    async fn record(&self, failures: &[FailedDocument]) {
        for failure in failures {
            warn!(id = %failure.id, reason = %failure.reason, "Document not indexed");
        }
        if let Ok(mut entries) = self.entries.lock() {
            entries.extend_from_slice(failures);
        }
    }
}
