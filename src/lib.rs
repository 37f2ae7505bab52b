//! vinecrawl - wine catalog crawler and search index loader.
//!
//! Walks a paginated catalog, renders each item page, extracts a
//! normalized record and bulk-loads it into an Elasticsearch-compatible
//! index.

pub mod cli;
pub mod config;
pub mod extract;
pub mod identity;
pub mod index;
pub mod models;
pub mod pipeline;
pub mod scrapers;
pub mod services;
