//! User agent sent on catalog, page and geocoder requests.
//!
//! Nominatim's usage policy requires an agent that identifies the
//! application, so the default names the crawler and its version.

pub const USER_AGENT: &str = concat!(
    "vinecrawl/",
    env!("CARGO_PKG_VERSION"),
    " (wine catalog indexer)"
);

/// The configured agent, or vinecrawl's own when unset or blank.
pub fn resolve_user_agent(configured: Option<&str>) -> String {
    configured
        .map(str::trim)
        .filter(|ua| !ua.is_empty())
        .unwrap_or(USER_AGENT)
        .to_string()
}
