//! `relgraph query`: execute one GraphQL request.

use anyhow::{Context, Result};
use async_graphql::{Request, Variables};
use relgraph_schema::{BUILD_PROGRESS_TOTAL, NlpSchema, TracingProgress};
use std::fs;

use super::{Overrides, connect};

pub async fn run(overrides: &Overrides, query: String, variables: Option<String>) -> Result<()> {
    let query = match query.strip_prefix('@') {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read query file: {}", path))?,
        None => query,
    };

    let mut request = Request::new(query);
    if let Some(variables) = variables {
        let json: serde_json::Value =
            serde_json::from_str(&variables).context("Variables must be a JSON object")?;
        request = request.variables(Variables::from_json(json));
    }

    let adapter = connect(overrides).await?;
    let progress = TracingProgress::new(BUILD_PROGRESS_TOTAL);
    let schema = NlpSchema::new(adapter.clone())
        .create_executable(Some(&progress))
        .await?;

    let response = schema
        .execute(request.data(adapter.create_context().await?))
        .await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    if !response.errors.is_empty() {
        anyhow::bail!("query failed with {} error(s)", response.errors.len());
    }
    Ok(())
}
