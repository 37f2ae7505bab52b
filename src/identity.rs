//! Deterministic record identity.

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::models::{ExtractedItem, ItemRecord};

/// Hex SHA-256 of `url` followed by `name` (empty when absent).
///
/// The same page extracted twice with the same name upserts the same
/// document; a renamed item gets a new id.
pub fn compute_id(url: &str, name: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(name.unwrap_or_default().as_bytes());
    hex::encode(hasher.finalize())
}

/// Wrap an extracted item with its id and capture timestamp.
pub fn assign(item: ExtractedItem) -> ItemRecord {
    ItemRecord {
        id: compute_id(&item.url, item.name.as_deref()),
        captured_at: Utc::now(),
        item,
    }
}
