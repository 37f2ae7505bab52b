//! Configuration management for vinecrawl using the prefer crate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::scrapers::BrowserEngineConfig;

/// Hard floor for the spacing between catalog page requests.
pub const MIN_PAGE_DELAY_MS: u64 = 500;

/// Errors raised while loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {format} config: {message}")]
    Parse { format: &'static str, message: String },
}

/// HTTP method used against the catalog endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogMethod {
    Get,
    #[default]
    Post,
}

/// Catalog (listing) endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// AJAX endpoint returning one page of item links.
    #[serde(default = "default_catalog_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub method: CatalogMethod,
    /// Name of the page-number request parameter.
    #[serde(default = "default_page_param")]
    pub page_param: String,
    /// Free-text filter form fields sent with every page request.
    #[serde(default)]
    pub filter: HashMap<String, String>,
    /// Dot path to the HTML fragment when the endpoint answers with JSON.
    #[serde(default)]
    pub html_field: Option<String>,
    /// Only links starting with this prefix are item pages.
    #[serde(default = "default_item_prefix")]
    pub item_prefix: String,
    /// Delay between page requests in milliseconds (never below `MIN_PAGE_DELAY_MS`).
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
    #[serde(default)]
    pub max_pages: Option<u32>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
}

fn default_catalog_endpoint() -> String {
    "https://www.vinetur.com/wp-admin/admin-ajax.php".to_string()
}

fn default_page_param() -> String {
    "page".to_string()
}

fn default_item_prefix() -> String {
    "https://www.vinetur.com/vinos/".to_string()
}

fn default_page_delay_ms() -> u64 {
    1500
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            endpoint: default_catalog_endpoint(),
            method: CatalogMethod::default(),
            page_param: default_page_param(),
            filter: HashMap::new(),
            html_field: None,
            item_prefix: default_item_prefix(),
            page_delay_ms: default_page_delay_ms(),
            max_pages: None,
            request_timeout_secs: default_request_timeout(),
            user_agent: None,
        }
    }
}

impl CatalogConfig {
    /// Effective inter-page delay, clamped to the politeness floor.
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms.max(MIN_PAGE_DELAY_MS))
    }
}

/// Search index backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_index_url")]
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_index_name")]
    pub index: String,
    /// Accept self-signed certificates (local development clusters).
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

fn default_index_url() -> String {
    "https://localhost:9200".to_string()
}

fn default_index_name() -> String {
    "vinos_embeddings".to_string()
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: default_index_url(),
            username: None,
            password: None,
            index: default_index_name(),
            accept_invalid_certs: false,
            timeout_secs: default_request_timeout(),
        }
    }
}

impl IndexConfig {
    /// Apply `ES_URL`, `ES_USER` and `ES_PASS` overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("ES_URL") {
            if !url.is_empty() {
                self.url = url;
            }
        }
        if let Ok(user) = std::env::var("ES_USER") {
            self.username = Some(user);
        }
        if let Ok(pass) = std::env::var("ES_PASS") {
            self.password = Some(pass);
        }
        self
    }
}

/// Worker pool and flush thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Flush when a worker's buffer holds this many records.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Flush when this many seconds passed since the worker's last flush.
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,
    /// Extra attempts for a page after a transient fetch failure.
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,
    /// JSONL file receiving every document the index did not accept.
    #[serde(default = "default_failure_log")]
    pub failure_log: String,
}

fn default_workers() -> usize {
    4
}

fn default_batch_size() -> usize {
    10
}

fn default_flush_interval() -> u64 {
    30
}

fn default_fetch_retries() -> u32 {
    1
}

fn default_failure_log() -> String {
    "failed_documents.jsonl".to_string()
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            batch_size: default_batch_size(),
            flush_interval_secs: default_flush_interval(),
            fetch_retries: default_fetch_retries(),
            failure_log: default_failure_log(),
        }
    }
}

/// Geocoding lookup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Nominatim-compatible search endpoint.
    #[serde(default = "default_geocode_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_geocode_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_geocode_endpoint() -> String {
    "https://nominatim.openstreetmap.org/search".to_string()
}

fn default_geocode_timeout() -> u64 {
    5
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_geocode_endpoint(),
            timeout_secs: default_geocode_timeout(),
            user_agent: None,
        }
    }
}

/// CSS selectors describing the item page layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    /// Identity region; its presence confirms the page rendered.
    pub anchor: String,
    pub name: String,
    pub producer: String,
    pub metadata: String,
    pub category: String,
    pub appellation_link: String,
    pub description: String,
    pub sensory: String,
    pub production_notes: String,
    pub attribute_rows: String,
    pub aging_icon: String,
    pub awards: String,
    pub price: String,
    /// Links inside a catalog page fragment.
    pub catalog_links: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            anchor: "div.product-info".to_string(),
            name: "h1".to_string(),
            producer: "h2".to_string(),
            metadata: "div.product-meta".to_string(),
            category: ".category".to_string(),
            appellation_link: "a".to_string(),
            description: "div.product-description".to_string(),
            sensory: "div.tasting-notes".to_string(),
            production_notes: "div.vinification".to_string(),
            attribute_rows: "table.wine-info tr".to_string(),
            aging_icon: "i.icon-check, span.icon-check".to_string(),
            awards: "div.awards".to_string(),
            price: ".price".to_string(),
            catalog_links: "a[href]".to_string(),
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub browser: BrowserEngineConfig,
    #[serde(default)]
    pub geocode: GeocodeConfig,
    #[serde(default)]
    pub selectors: Selectors,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Falls back to defaults (with env overrides) when no file is found.
    pub async fn load() -> Self {
        match prefer::load("vinecrawl").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::warn!("Ignoring config file: {}", e);
                            Self::default_with_env()
                        }
                    }
                } else {
                    Self::default_with_env()
                }
            }
            Err(_) => Self::default_with_env(),
        }
    }

    /// Create a default config with environment variable overrides applied.
    pub fn default_with_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
        let path = PathBuf::from(expanded);

        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config = Self::parse(&contents, ext)?;
        config.source_path = Some(path);
        Ok(config.with_env_overrides())
    }

    /// Parse config text in the format named by `ext`.
    pub fn parse(contents: &str, ext: &str) -> Result<Self, ConfigError> {
        match ext {
            "toml" => toml::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "TOML",
                message: e.to_string(),
            }),
            "yaml" | "yml" => serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "YAML",
                message: e.to_string(),
            }),
            _ => serde_json::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "JSON",
                message: e.to_string(),
            }),
        }
    }

    fn with_env_overrides(mut self) -> Self {
        self.index = self.index.with_env_overrides();
        self.browser = self.browser.with_env_overrides();
        self
    }

    /// Resolve the failure log path relative to the config file location.
    pub fn failure_log_path(&self) -> PathBuf {
        let expanded = shellexpand::tilde(&self.crawl.failure_log).into_owned();
        let path = PathBuf::from(expanded);
        if path.is_absolute() {
            return path;
        }
        match self.source_path.as_ref().and_then(|p| p.parent()) {
            Some(base) => base.join(path),
            None => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = Config::parse("", "toml").unwrap();
        assert_eq!(config.crawl.workers, 4);
        assert_eq!(config.crawl.batch_size, 10);
        assert_eq!(config.index.index, "vinos_embeddings");
        assert_eq!(config.selectors, Selectors::default());
    }

    #[test]
    fn toml_sections_override_defaults() {
        let config = Config::parse(
            r#"
            [catalog]
            endpoint = "https://catalog.test/ajax"
            method = "get"
            item_prefix = "https://catalog.test/item/"
            page_delay_ms = 2000

            [catalog.filter]
            action = "filtrar_vinos"
            q = ""

            [crawl]
            workers = 2
            batch_size = 50

            [selectors]
            anchor = "section.ficha"
            "#,
            "toml",
        )
        .unwrap();

        assert_eq!(config.catalog.method, CatalogMethod::Get);
        assert_eq!(config.catalog.filter["action"], "filtrar_vinos");
        assert_eq!(config.crawl.workers, 2);
        assert_eq!(config.crawl.flush_interval_secs, 30);
        assert_eq!(config.selectors.anchor, "section.ficha");
        assert_eq!(config.selectors.name, "h1");
    }

    #[test]
    fn yaml_and_json_are_supported() {
        let yaml = Config::parse("crawl:\n  workers: 8\n", "yaml").unwrap();
        assert_eq!(yaml.crawl.workers, 8);

        let json = Config::parse(r#"{"index": {"index": "wines"}}"#, "json").unwrap();
        assert_eq!(json.index.index, "wines");
    }

    #[test]
    fn malformed_config_reports_format() {
        let err = Config::parse("workers = [", "toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { format: "TOML", .. }));
    }

    #[test]
    fn page_delay_never_below_floor() {
        let catalog = CatalogConfig {
            page_delay_ms: 10,
            ..Default::default()
        };
        assert_eq!(catalog.page_delay(), Duration::from_millis(MIN_PAGE_DELAY_MS));

        let catalog = CatalogConfig {
            page_delay_ms: 2500,
            ..Default::default()
        };
        assert_eq!(catalog.page_delay(), Duration::from_millis(2500));
    }

    #[test]
    fn failure_log_resolves_next_to_config_file() {
        let config = Config {
            source_path: Some(PathBuf::from("/etc/vinecrawl/vinecrawl.toml")),
            ..Default::default()
        };
        assert_eq!(
            config.failure_log_path(),
            PathBuf::from("/etc/vinecrawl/failed_documents.jsonl")
        );
    }
}
