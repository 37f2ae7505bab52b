//! Elasticsearch-compatible backend over the REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder};
use serde_json::Value;
use tracing::debug;

use super::{BulkOutcome, IndexBackend, IndexError, Rejection};
use crate::config::IndexConfig;
use crate::models::ItemRecord;

pub struct ElasticIndex {
    client: Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
}

impl ElasticIndex {
    pub fn new(config: &IndexConfig) -> Result<Self, IndexError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| IndexError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(user) => request.basic_auth(user, self.password.as_deref()),
            None => request,
        }
    }

    async fn send_json(&self, request: RequestBuilder) -> Result<Value, IndexError> {
        let response = self
            .authed(request)
            .send()
            .await
            .map_err(|e| IndexError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IndexError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| IndexError::Decode(e.to_string()))
    }
}

/// NDJSON body: one `index` action keyed by `_id` per record.
fn bulk_body(index: &str, records: &[ItemRecord]) -> Result<String, IndexError> {
    let mut body = String::new();
    for record in records {
        let action = serde_json::json!({"index": {"_index": index, "_id": record.id}});
        let doc = serde_json::to_string(record).map_err(|e| IndexError::Serialize {
            id: record.id.clone(),
            message: e.to_string(),
        })?;
        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(&doc);
        body.push('\n');
    }
    Ok(body)
}

/// Split a `_bulk` response into accepted and rejected ids.
///
/// Items are matched to records by position; the response's `_id` wins when present.
fn parse_bulk_response(records: &[ItemRecord], response: &Value) -> Result<BulkOutcome, IndexError> {
    let items = response
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| IndexError::Decode("bulk response has no items array".to_string()))?;
    if items.len() != records.len() {
        return Err(IndexError::Decode(format!(
            "bulk response has {} items for {} documents",
            items.len(),
            records.len()
        )));
    }

    let mut outcome = BulkOutcome::default();
    for (record, item) in records.iter().zip(items) {
        // Each item is {"<action>": {...}}
        let result = item
            .as_object()
            .and_then(|obj| obj.values().next())
            .ok_or_else(|| IndexError::Decode("bulk item has no action result".to_string()))?;

        let id = result
            .get("_id")
            .and_then(Value::as_str)
            .unwrap_or(&record.id)
            .to_string();
        let status = result.get("status").and_then(Value::as_u64).unwrap_or(0);

        match result.get("error") {
            Some(error) => outcome.rejected.push(Rejection {
                id,
                reason: error_reason(error),
            }),
            None if !(200..300).contains(&status) => outcome.rejected.push(Rejection {
                id,
                reason: format!("status {}", status),
            }),
            None => outcome.accepted.push(id),
        }
    }
    Ok(outcome)
}

fn error_reason(error: &Value) -> String {
    match (
        error.get("type").and_then(Value::as_str),
        error.get("reason").and_then(Value::as_str),
    ) {
        (Some(kind), Some(reason)) => format!("{}: {}", kind, reason),
        (Some(kind), None) => kind.to_string(),
        (None, Some(reason)) => reason.to_string(),
        (None, None) => error.to_string(),
    }
}

#[async_trait]
impl IndexBackend for ElasticIndex {
    async fn bulk_upsert(
        &self,
        index: &str,
        records: &[ItemRecord],
    ) -> Result<BulkOutcome, IndexError> {
        if records.is_empty() {
            return Ok(BulkOutcome::default());
        }

        let body = bulk_body(index, records)?;
        let request = self
            .client
            .post(format!("{}/_bulk", self.base_url))
            .header(header::CONTENT_TYPE, "application/x-ndjson")
            .body(body);

        let response = self.send_json(request).await?;
        let outcome = parse_bulk_response(records, &response)?;
        debug!(
            index,
            accepted = outcome.accepted.len(),
            rejected = outcome.rejected.len(),
            "Bulk request completed"
        );
        Ok(outcome)
    }

    async fn count(&self, index: &str) -> Result<u64, IndexError> {
        let request = self.client.get(format!("{}/{}/_count", self.base_url, index));
        let response = self.send_json(request).await?;
        response
            .get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| IndexError::Decode("count response has no count".to_string()))
    }
}
