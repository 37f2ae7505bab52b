//! Search index backends.

mod elastic;

pub use elastic::ElasticIndex;

use async_trait::async_trait;

use crate::models::ItemRecord;

/// Errors for a whole index request. Per-document rejections are not errors;
/// they are reported in [`BulkOutcome::rejected`].
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("index request failed: {0}")]
    Transport(String),
    #[error("index returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed index response: {0}")]
    Decode(String),
    #[error("failed to serialize document {id}: {message}")]
    Serialize { id: String, message: String },
    #[error("invalid index configuration: {0}")]
    Config(String),
}

/// A document the backend refused within an otherwise accepted batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub id: String,
    pub reason: String,
}

/// Per-document result of a bulk request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkOutcome {
    pub accepted: Vec<String>,
    pub rejected: Vec<Rejection>,
}

#[async_trait]
pub trait IndexBackend: Send + Sync {
    /// Upsert every record by id in one request.
    async fn bulk_upsert(&self, index: &str, records: &[ItemRecord])
        -> Result<BulkOutcome, IndexError>;

    /// Number of documents currently in `index`.
    async fn count(&self, index: &str) -> Result<u64, IndexError>;
}
