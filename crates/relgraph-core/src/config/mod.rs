//! Configuration types for relgraph.
//!
//! A single YAML file (`relgraph.yaml`) describes the upstream database, where
//! the semantic annotation tables live, which tables are exposed and how blob
//! links are built. Every section has defaults, so an empty file is valid.

pub mod upstream;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub use upstream::{PoolConfig, UpstreamConfig};

/// Complete relgraph configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelgraphConfig {
    /// Upstream Postgres connection.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Semantic annotation store.
    #[serde(default)]
    pub annotations: AnnotationsConfig,

    /// Table selection.
    #[serde(default)]
    pub schema: SchemaConfig,

    /// Blob link generation.
    #[serde(default)]
    pub blobs: BlobConfig,
}

/// Where the annotation tables (`nlp_table`, `nlp_field`, ...) live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Database schema holding the annotation tables.
    #[serde(default = "default_db_schema")]
    pub schema: String,

    /// Prefix of the annotation table names.
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,
}

impl Default for AnnotationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schema: default_db_schema(),
            table_prefix: default_table_prefix(),
        }
    }
}

/// Which tables are turned into graph types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Database schema to introspect.
    #[serde(default = "default_db_schema")]
    pub db_schema: String,

    /// Only these tables, when non-empty.
    #[serde(default)]
    pub include: Vec<String>,

    /// Never these tables.
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            db_schema: default_db_schema(),
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

impl SchemaConfig {
    pub fn allows(&self, table: &str) -> bool {
        if self.exclude.iter().any(|t| t == table) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|t| t == table)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobConfig {
    /// Base URL blob links are appended to.
    #[serde(default = "default_link_base")]
    pub link_base: String,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            link_base: default_link_base(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_db_schema() -> String {
    "public".to_string()
}

fn default_table_prefix() -> String {
    "nlp_".to_string()
}

fn default_link_base() -> String {
    "http://localhost:4000".to_string()
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RelgraphConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(table) = self
            .schema
            .include
            .iter()
            .find(|t| self.schema.exclude.contains(t))
        {
            return Err(ConfigError::Config(format!(
                "table '{table}' is both included and excluded"
            )));
        }
        if self.upstream.pool.max_connections == 0 {
            return Err(ConfigError::Config(
                "upstream.pool.max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
