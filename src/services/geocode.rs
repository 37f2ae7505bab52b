//! Location → coordinates lookup.
//!
//! Best effort: every failure mode (network, timeout, empty result,
//! malformed payload) resolves to `None` and is logged, never raised.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::GeocodeConfig;
use crate::models::{AttributeKey, AttributeValue, Coordinates, ExtractedItem};
use crate::scrapers::resolve_user_agent;

#[async_trait]
pub trait GeoResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Option<Coordinates>;
}

/// Resolver used when geocoding is disabled.
pub struct NoopResolver;

#[async_trait]
impl GeoResolver for NoopResolver {
    async fn resolve(&self, _query: &str) -> Option<Coordinates> {
        None
    }
}

/// Nominatim API response entry.
#[derive(Debug, Deserialize)]
struct NominatimResponse {
    lat: String,
    lon: String,
}

/// Nominatim-compatible geocoder with a per-run cache.
pub struct NominatimResolver {
    client: Client,
    endpoint: String,
    timeout: Duration,
    cache: Mutex<HashMap<String, Option<Coordinates>>>,
}

impl NominatimResolver {
    pub fn new(config: &GeocodeConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(resolve_user_agent(config.user_agent.as_deref()))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            cache: Mutex::new(HashMap::new()),
        })
    }

    fn search_url(&self, query: &str) -> String {
        format!(
            "{}?q={}&format=json&limit=1",
            self.endpoint,
            urlencoding::encode(query)
        )
    }

    async fn lookup(&self, query: &str) -> Option<Coordinates> {
        let response = match self
            .client
            .get(self.search_url(query))
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(query, error = %e, "Geocoding request failed");
                return None;
            }
        };

        let results: Vec<NominatimResponse> = match response.json().await {
            Ok(results) => results,
            Err(e) => {
                warn!(query, error = %e, "Failed to parse geocoding response");
                return None;
            }
        };

        let Some(first) = results.first() else {
            debug!(query, "Location not found by geocoder");
            return None;
        };
        parse_coordinates(first)
    }
}

fn parse_coordinates(entry: &NominatimResponse) -> Option<Coordinates> {
    match (entry.lat.parse(), entry.lon.parse()) {
        (Ok(lat), Ok(lon)) => Some(Coordinates { lat, lon }),
        _ => {
            warn!(lat = %entry.lat, lon = %entry.lon, "Invalid coordinates in geocoding response");
            None
        }
    }
}

#[async_trait]
impl GeoResolver for NominatimResolver {
    async fn resolve(&self, query: &str) -> Option<Coordinates> {
        let key = query.trim().to_lowercase();
        if key.is_empty() {
            return None;
        }
        if let Some(hit) = self.cache.lock().await.get(&key) {
            return *hit;
        }

        // Lock is not held across the request; a concurrent miss may look up twice.
        let result = self.lookup(query.trim()).await;
        self.cache.lock().await.insert(key, result);
        result
    }
}

/// Attach coordinates for the item's location, if it has one and it resolves.
pub async fn attach_coordinates(item: &mut ExtractedItem, resolver: &dyn GeoResolver) {
    let Some(location) = item.location().map(str::to_string) else {
        return;
    };
    if let Some(coords) = resolver.resolve(&location).await {
        debug!(url = %item.url, %location, lat = coords.lat, lon = coords.lon, "Geocoded location");
        item.attributes
            .insert(AttributeKey::Coordinates, AttributeValue::Coordinates(coords));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedResolver {
        answer: Option<Coordinates>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GeoResolver for FixedResolver {
        async fn resolve(&self, _query: &str) -> Option<Coordinates> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer
        }
    }

    fn item_at(location: Option<&str>) -> ExtractedItem {
        let mut item = ExtractedItem::new("https://x/vinos/a/");
        if let Some(loc) = location {
            item.attributes
                .insert(AttributeKey::Location, AttributeValue::Text(loc.into()));
        }
        item
    }

    #[tokio::test]
    async fn coordinates_attached_when_resolved() {
        let resolver = FixedResolver {
            answer: Some(Coordinates { lat: 42.57, lon: -2.85 }),
            calls: AtomicUsize::new(0),
        };
        let mut item = item_at(Some("Haro, La Rioja"));
        attach_coordinates(&mut item, &resolver).await;
        assert_eq!(
            item.attributes.get(&AttributeKey::Coordinates),
            Some(&AttributeValue::Coordinates(Coordinates { lat: 42.57, lon: -2.85 }))
        );
    }

    #[tokio::test]
    async fn failed_lookup_leaves_record_intact() {
        let resolver = FixedResolver {
            answer: None,
            calls: AtomicUsize::new(0),
        };
        let mut item = item_at(Some("Nowhere"));
        let before = item.clone();
        attach_coordinates(&mut item, &resolver).await;
        assert_eq!(item, before);
    }

    #[tokio::test]
    async fn no_location_skips_lookup() {
        let resolver = FixedResolver {
            answer: None,
            calls: AtomicUsize::new(0),
        };
        let mut item = item_at(None);
        attach_coordinates(&mut item, &resolver).await;
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unreachable_geocoder_resolves_to_none() {
        let config = GeocodeConfig {
            endpoint: "http://127.0.0.1:9/search".into(),
            timeout_secs: 1,
            ..Default::default()
        };
        let resolver = NominatimResolver::new(&config).unwrap();
        assert_eq!(resolver.resolve("Haro").await, None);
        // Failure is cached for the run
        assert!(resolver.cache.lock().await.contains_key("haro"));
    }

    #[test]
    fn query_is_url_encoded() {
        let resolver = NominatimResolver::new(&GeocodeConfig::default()).unwrap();
        assert_eq!(
            resolver.search_url("Haro, La Rioja"),
            "https://nominatim.openstreetmap.org/search?q=Haro%2C%20La%20Rioja&format=json&limit=1"
        );
    }

    #[test]
    fn malformed_coordinates_are_absent() {
        let entry = NominatimResponse {
            lat: "north".into(),
            lon: "-2.8".into(),
        };
        assert_eq!(parse_coordinates(&entry), None);
    }
}
