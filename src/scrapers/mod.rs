//! Network-facing fetchers: catalog pagination and rendered item pages.

pub mod catalog;
pub mod render;
mod user_agent;

pub use catalog::{CatalogError, CatalogSource, CatalogWalker, HttpCatalogSource};
pub use render::{
    BrowserEngineConfig, ChromiumRenderer, RenderContext, RenderError, RenderSessionPool, Renderer,
};
pub use user_agent::{resolve_user_agent, USER_AGENT};
