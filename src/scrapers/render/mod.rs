//! Rendered page fetching.
//!
//! Item pages are built client-side, so every fetch goes through a render
//! context: open, navigate, wait for the identity anchor, capture the DOM,
//! close. Contexts are opened per fetch and never shared.

#[cfg(feature = "browser")]
mod chromium;
mod config;

#[cfg(feature = "browser")]
pub use chromium::ChromiumRenderer;
pub use config::BrowserEngineConfig;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

/// Render failures. All but launch problems are scoped to a single URL.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("failed to open render context: {0}")]
    Context(String),
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },
    #[error("timed out after {timeout:?} waiting for {stage} on {url}")]
    Timeout {
        url: String,
        stage: &'static str,
        timeout: Duration,
    },
    #[error("failed to capture document for {url}: {message}")]
    Capture { url: String, message: String },
    #[error("browser support not compiled. Rebuild with: cargo build --features browser")]
    Unavailable,
}

impl RenderError {
    /// Whether a fresh attempt at the same URL may succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, RenderError::Launch(_) | RenderError::Unavailable)
    }
}

/// Source of render contexts (a browser process, or a fake in tests).
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn open(&self) -> Result<Box<dyn RenderContext>, RenderError>;
}

/// One isolated page/tab.
#[async_trait]
pub trait RenderContext: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), RenderError>;

    /// Resolve once `selector` matches; may wait indefinitely, callers bound it.
    async fn wait_for(&mut self, selector: &str) -> Result<(), RenderError>;

    async fn content(&mut self) -> Result<String, RenderError>;

    async fn close(self: Box<Self>);
}

/// Per-worker render session: scoped context acquisition with bounded waits.
pub struct RenderSessionPool {
    renderer: Arc<dyn Renderer>,
    anchor: String,
    navigation_timeout: Duration,
    anchor_timeout: Duration,
}

impl RenderSessionPool {
    pub fn new(renderer: Arc<dyn Renderer>, anchor: &str, config: &BrowserEngineConfig) -> Self {
        Self {
            renderer,
            anchor: anchor.to_string(),
            navigation_timeout: Duration::from_secs(config.navigation_timeout_secs),
            anchor_timeout: Duration::from_secs(config.anchor_timeout_secs),
        }
    }

    /// Render `url` and return its DOM once the anchor is present.
    ///
    /// The context is closed on every path.
    pub async fn fetch(&mut self, url: &str) -> Result<String, RenderError> {
        let mut context = self.renderer.open().await?;
        let result = self.render(context.as_mut(), url).await;
        context.close().await;

        match &result {
            Ok(html) => debug!(url, bytes = html.len(), "Rendered page"),
            Err(e) => warn!(url, error = %e, "Render failed"),
        }
        result
    }

    async fn render(&self, context: &mut dyn RenderContext, url: &str) -> Result<String, RenderError> {
        tokio::time::timeout(self.navigation_timeout, context.navigate(url))
            .await
            .map_err(|_| RenderError::Timeout {
                url: url.to_string(),
                stage: "navigation",
                timeout: self.navigation_timeout,
            })??;

        tokio::time::timeout(self.anchor_timeout, context.wait_for(&self.anchor))
            .await
            .map_err(|_| RenderError::Timeout {
                url: url.to_string(),
                stage: "anchor",
                timeout: self.anchor_timeout,
            })??;

        context.content().await
    }
}

// Stub for when browser feature is disabled
#[cfg(not(feature = "browser"))]
pub struct ChromiumRenderer;

#[cfg(not(feature = "browser"))]
impl ChromiumRenderer {
    pub async fn launch(_config: &BrowserEngineConfig) -> Result<Self, RenderError> {
        Err(RenderError::Unavailable)
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn open(&self) -> Result<Box<dyn RenderContext>, RenderError> {
        Err(RenderError::Unavailable)
    }
}
