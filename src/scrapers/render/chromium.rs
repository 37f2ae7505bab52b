//! Chromium renderer over the DevTools protocol.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tracing::{debug, info};

use super::{BrowserEngineConfig, RenderContext, RenderError, Renderer};

/// Poll interval while waiting for the anchor selector.
const ANCHOR_POLL: Duration = Duration::from_millis(250);

/// A launched (or connected) browser shared by every worker; each fetch
/// opens its own tab.
pub struct ChromiumRenderer {
    browser: Browser,
    user_agent: Option<String>,
}

impl ChromiumRenderer {
    /// Common Chrome executable paths to check.
    const CHROME_PATHS: &'static [&'static str] = &[
        // Linux
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/opt/google/chrome/google-chrome",
    ];

    fn find_chrome() -> Result<PathBuf, RenderError> {
        for path in Self::CHROME_PATHS {
            let p = std::path::Path::new(path);
            if p.exists() {
                info!("Found Chrome at: {}", path);
                return Ok(p.to_path_buf());
            }
        }

        for cmd in &["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
            if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
                if output.status.success() {
                    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !path.is_empty() {
                        info!("Found Chrome in PATH: {}", path);
                        return Ok(PathBuf::from(path));
                    }
                }
            }
        }

        Err(RenderError::Launch(
            "Chrome/Chromium not found; install it or set BROWSER_URL to a remote DevTools endpoint"
                .to_string(),
        ))
    }

    /// Launch a local browser, or connect to `remote_url` when configured.
    pub async fn launch(config: &BrowserEngineConfig) -> Result<Self, RenderError> {
        let browser = match &config.remote_url {
            Some(url) => Self::connect_remote(url, config).await?,
            None => Self::launch_local(config).await?,
        };
        let user_agent = config
            .user_agent
            .as_deref()
            .map(str::trim)
            .filter(|ua| !ua.is_empty())
            .map(str::to_string);

        Ok(Self {
            browser,
            user_agent,
        })
    }

    async fn launch_local(config: &BrowserEngineConfig) -> Result<Browser, RenderError> {
        info!("Launching browser (headless={})", config.headless);
        let chrome_path = Self::find_chrome()?;

        let mut builder = BrowserConfig::builder().chrome_executable(chrome_path);
        // with_head means NOT headless
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(ref proxy) = config.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }
        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--no-sandbox")
            .arg("--disable-gpu");
        for arg in &config.chrome_args {
            builder = builder.arg(arg);
        }

        let browser_config = builder.build().map_err(RenderError::Launch)?;
        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(browser)
    }

    async fn connect_remote(url: &str, config: &BrowserEngineConfig) -> Result<Browser, RenderError> {
        info!(
            "Connecting to remote browser at {} (timeout: {}s)",
            url, config.navigation_timeout_secs
        );

        // The WebSocket URL comes from the /json/version endpoint
        let http_url = url.replace("ws://", "http://").replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let resp: serde_json::Value = reqwest::Client::new()
            .get(&version_url)
            .timeout(Duration::from_secs(config.navigation_timeout_secs))
            .send()
            .await
            .map_err(|e| RenderError::Launch(format!("remote browser unreachable: {}", e)))?
            .json()
            .await
            .map_err(|e| RenderError::Launch(format!("bad browser version info: {}", e)))?;

        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| RenderError::Launch("no webSocketDebuggerUrl in response".to_string()))?;

        info!("Connecting to WebSocket: {}", ws_url);
        let handler_config = chromiumoxide::handler::HandlerConfig {
            request_timeout: Duration::from_secs(config.navigation_timeout_secs),
            ..Default::default()
        };

        let (browser, mut handler) = Browser::connect_with_config(ws_url, handler_config)
            .await
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(browser)
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn open(&self) -> Result<Box<dyn RenderContext>, RenderError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| RenderError::Context(e.to_string()))?;

        // Must be set before the first navigation
        if let Some(ref ua) = self.user_agent {
            page.execute(SetUserAgentOverrideParams::new(ua.clone()))
                .await
                .map_err(|e| RenderError::Context(e.to_string()))?;
        }

        Ok(Box::new(ChromiumPage { page, url: None }))
    }
}

struct ChromiumPage {
    page: Page,
    url: Option<String>,
}

impl ChromiumPage {
    fn current_url(&self) -> String {
        self.url.clone().unwrap_or_default()
    }
}

#[async_trait]
impl RenderContext for ChromiumPage {
    async fn navigate(&mut self, url: &str) -> Result<(), RenderError> {
        self.url = Some(url.to_string());
        debug!("Navigating to {}", url);
        let nav_params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|message| RenderError::Navigation {
                url: url.to_string(),
                message,
            })?;

        self.page
            .execute(nav_params)
            .await
            .map_err(|e| RenderError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str) -> Result<(), RenderError> {
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(ANCHOR_POLL).await;
        }
    }

    async fn content(&mut self) -> Result<String, RenderError> {
        self.page.content().await.map_err(|e| RenderError::Capture {
            url: self.current_url(),
            message: e.to_string(),
        })
    }

    async fn close(self: Box<Self>) {
        // Close the tab to prevent accumulation
        let _ = self.page.close().await;
    }
}
