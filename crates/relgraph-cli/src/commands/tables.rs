//! `relgraph tables`: dump the merged metadata snapshot.

use anyhow::Result;
use relgraph_schema::Adapter;

use super::{Overrides, connect};

pub async fn run(overrides: &Overrides) -> Result<()> {
    let adapter = connect(overrides).await?;
    let tables = adapter.get_tables().await?;
    println!("{}", serde_json::to_string_pretty(&tables)?);
    Ok(())
}
