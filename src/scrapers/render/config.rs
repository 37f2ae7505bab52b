//! Render engine configuration types.

use serde::{Deserialize, Serialize};

/// Headless browser configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserEngineConfig {
    /// Run in headless mode (default: true).
    /// Set to false to watch pages render while tuning selectors.
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Proxy server URL (e.g., "socks5://127.0.0.1:1080").
    #[serde(default)]
    pub proxy: Option<String>,

    /// Page navigation timeout in seconds.
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,

    /// How long to wait for the identity anchor after navigation, in seconds.
    #[serde(default = "default_anchor_timeout")]
    pub anchor_timeout_secs: u64,

    /// Additional Chrome arguments.
    #[serde(default)]
    pub chrome_args: Vec<String>,

    /// Remote Chrome DevTools URL (e.g., "ws://localhost:9222").
    /// If set, connects to existing browser instead of launching one.
    #[serde(default)]
    pub remote_url: Option<String>,

    /// User agent override for rendered pages; the browser default is kept when unset.
    #[serde(default)]
    pub user_agent: Option<String>,
}

pub fn default_headless() -> bool {
    true
}

pub fn default_navigation_timeout() -> u64 {
    30
}

pub fn default_anchor_timeout() -> u64 {
    10
}

impl Default for BrowserEngineConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            proxy: None,
            navigation_timeout_secs: default_navigation_timeout(),
            anchor_timeout_secs: default_anchor_timeout(),
            chrome_args: Vec::new(),
            remote_url: None,
            user_agent: None,
        }
    }
}

impl BrowserEngineConfig {
    /// Apply `BROWSER_URL` (remote DevTools endpoint) from the environment.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("BROWSER_URL") {
            if !url.is_empty() {
                self.remote_url = Some(url);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_section_keeps_defaults() {
        let config: BrowserEngineConfig =
            toml::from_str("headless = false\nchrome_args = [\"--lang=es\"]").unwrap();
        assert!(!config.headless);
        assert_eq!(config.chrome_args, vec!["--lang=es"]);
        assert_eq!(config.navigation_timeout_secs, 30);
        assert_eq!(config.anchor_timeout_secs, 10);
        assert!(config.remote_url.is_none());
    }
}
