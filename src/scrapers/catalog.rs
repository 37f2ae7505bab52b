//! Catalog discovery: page through the listing endpoint and collect item URLs.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, info};
use url::Url;

use super::user_agent::resolve_user_agent;
use crate::config::{CatalogConfig, CatalogMethod, Selectors};

/// Errors while paginating the catalog. Any of these ends the walk.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog request for page {page} failed: {source}")]
    Transport {
        page: u32,
        #[source]
        source: reqwest::Error,
    },
    #[error("catalog page {page} returned HTTP {status}")]
    Status { page: u32, status: u16 },
    #[error("catalog page {page} is not valid JSON: {message}")]
    Decode { page: u32, message: String },
    #[error("catalog page {page} has no HTML string at `{path}`")]
    MissingField { page: u32, path: String },
    #[error("invalid catalog configuration: {0}")]
    Config(String),
}

/// One page of the catalog listing, as an HTML fragment.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_page(&self, page: u32) -> Result<String, CatalogError>;
}

/// Catalog source backed by the site's AJAX listing endpoint.
pub struct HttpCatalogSource {
    client: Client,
    endpoint: String,
    method: CatalogMethod,
    page_param: String,
    filter: HashMap<String, String>,
    html_field: Option<String>,
}

impl HttpCatalogSource {
    pub fn new(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .user_agent(resolve_user_agent(config.user_agent.as_deref()))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| CatalogError::Config(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            method: config.method,
            page_param: config.page_param.clone(),
            filter: config.filter.clone(),
            html_field: config.html_field.clone(),
        })
    }

    fn params(&self, page: u32) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = self
            .filter
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        params.sort();
        params.push((self.page_param.clone(), page.to_string()));
        params
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    async fn fetch_page(&self, page: u32) -> Result<String, CatalogError> {
        let params = self.params(page);
        let request = match self.method {
            CatalogMethod::Get => self.client.get(&self.endpoint).query(&params),
            CatalogMethod::Post => self.client.post(&self.endpoint).form(&params),
        };

        let response = request
            .send()
            .await
            .map_err(|source| CatalogError::Transport { page, source })?;
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                page,
                status: status.as_u16(),
            });
        }
        let body = response
            .text()
            .await
            .map_err(|source| CatalogError::Transport { page, source })?;

        match &self.html_field {
            None => Ok(body),
            Some(path) => html_from_json(page, &body, path),
        }
    }
}

fn html_from_json(page: u32, body: &str, path: &str) -> Result<String, CatalogError> {
    let data: serde_json::Value = serde_json::from_str(body).map_err(|e| CatalogError::Decode {
        page,
        message: e.to_string(),
    })?;
    extract_path(&data, path)
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| CatalogError::MissingField {
            page,
            path: path.to_string(),
        })
}

/// Extract a value from nested JSON using dot-notation path.
pub fn extract_path<'a>(data: &'a serde_json::Value, path: &str) -> &'a serde_json::Value {
    if path.is_empty() {
        return data;
    }

    let mut current = data;
    for key in path.split('.') {
        current = match current {
            serde_json::Value::Object(map) => map.get(key).unwrap_or(&serde_json::Value::Null),
            serde_json::Value::Array(arr) => match key.parse::<usize>() {
                Ok(idx) => arr.get(idx).unwrap_or(&serde_json::Value::Null),
                Err(_) => &serde_json::Value::Null,
            },
            _ => &serde_json::Value::Null,
        };
    }

    current
}

/// Item links in a catalog fragment, in document order.
///
/// Relative hrefs resolve against `base`; fragments are dropped; only URLs
/// starting with `prefix` (and longer than it) are kept.
pub fn parse_item_links(html: &str, base: &Url, prefix: &str, links: &Selector) -> Vec<String> {
    let fragment = Html::parse_fragment(html);
    fragment
        .select(links)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .map(|mut url| {
            url.set_fragment(None);
            url.to_string()
        })
        .filter(|url| url.starts_with(prefix) && url.len() > prefix.len())
        .collect()
}

/// Walks catalog pages until one adds no unseen item link.
pub struct CatalogWalker<S> {
    source: S,
    base: Url,
    prefix: String,
    links: Selector,
    page_delay: Duration,
    max_pages: Option<u32>,
}

impl<S: CatalogSource> CatalogWalker<S> {
    pub fn new(source: S, config: &CatalogConfig, selectors: &Selectors) -> Result<Self, CatalogError> {
        let base = Url::parse(&config.endpoint)
            .map_err(|e| CatalogError::Config(format!("endpoint {}: {}", config.endpoint, e)))?;
        let links = Selector::parse(&selectors.catalog_links)
            .map_err(|e| CatalogError::Config(format!("catalog_links selector: {}", e)))?;

        Ok(Self {
            source,
            base,
            prefix: config.item_prefix.clone(),
            links,
            page_delay: config.page_delay(),
            max_pages: config.max_pages,
        })
    }

    /// Collect every distinct item URL, in discovery order.
    ///
    /// Pages are requested sequentially starting at 1 with `page_delay`
    /// between requests. A page error aborts the walk.
    pub async fn walk(&self) -> Result<Vec<String>, CatalogError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut urls = Vec::new();
        let mut page: u32 = 1;

        loop {
            if self.max_pages.is_some_and(|max| page > max) {
                info!(pages = page - 1, "Reached catalog page limit");
                break;
            }
            if page > 1 {
                tokio::time::sleep(self.page_delay).await;
            }

            let html = self.source.fetch_page(page).await?;
            let fresh: Vec<String> = parse_item_links(&html, &self.base, &self.prefix, &self.links)
                .into_iter()
                .filter(|url| seen.insert(url.clone()))
                .collect();

            if fresh.is_empty() {
                debug!(page, "Catalog page added no new items, stopping");
                break;
            }

            info!(page, new = fresh.len(), total = urls.len() + fresh.len(), "Catalog page");
            urls.extend(fresh);
            page += 1;
        }

        Ok(urls)
    }
}
