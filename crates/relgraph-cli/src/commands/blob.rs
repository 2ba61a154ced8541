//! `relgraph blob`: resolve a blob link id to its bytes.

use anyhow::Result;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use super::{Overrides, connect};

pub async fn run(overrides: &Overrides, id: String, out: Option<PathBuf>) -> Result<()> {
    let adapter = connect(overrides).await?;
    let Some(bytes) = adapter.read_blob(&id).await? else {
        anyhow::bail!("no content behind blob id");
    };

    match out {
        Some(path) => {
            fs::write(&path, &bytes)?;
            tracing::info!(path = %path.display(), bytes = bytes.len(), "wrote blob");
        }
        None => std::io::stdout().write_all(&bytes)?,
    }
    Ok(())
}
