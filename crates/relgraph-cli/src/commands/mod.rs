//! CLI command implementations.

pub mod blob;
pub mod query;
pub mod sdl;
pub mod tables;

use anyhow::{Context, Result};
use relgraph_adapter_pg::{PostgresAdapter, PostgresAdapterOptions};
use relgraph_core::RelgraphConfig;
use std::path::PathBuf;
use std::sync::Arc;

/// Global flags that take precedence over the configuration file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub database_url: Option<String>,
    pub db_schema: Option<String>,
}

impl Overrides {
    pub fn load_config(&self) -> Result<RelgraphConfig> {
        let mut config = match &self.config {
            Some(path) => RelgraphConfig::from_file(path)
                .with_context(|| format!("Failed to load configuration from {:?}", path))?,
            None => RelgraphConfig::default(),
        };
        if let Some(url) = &self.database_url {
            config.upstream.database_url = Some(url.clone());
            config.upstream.database_url_env = None;
        }
        if let Some(schema) = &self.db_schema {
            config.schema.db_schema = schema.clone();
        }
        Ok(config)
    }
}

/// Load the configuration and connect the Postgres adapter.
pub async fn connect(overrides: &Overrides) -> Result<Arc<PostgresAdapter>> {
    let config = overrides.load_config()?;
    let adapter = PostgresAdapter::new(
        &config.upstream.connection_string(),
        PostgresAdapterOptions::from_config(&config),
    )
    .await
    .context("Failed to connect to the upstream database")?;
    Ok(Arc::new(adapter))
}
