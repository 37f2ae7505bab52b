//! Index inspection commands.

use console::style;

use crate::config::Config;
use crate::index::{ElasticIndex, IndexBackend};

pub async fn cmd_count(config: &Config) -> anyhow::Result<()> {
    let index = ElasticIndex::new(&config.index)?;
    let count = index.count(&config.index.index).await?;
    println!(
        "{:<20} {}",
        format!("{}:", config.index.index),
        style(count).bold()
    );
    Ok(())
}
