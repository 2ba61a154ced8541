//! `relgraph sdl`: build the schema and print it.

use anyhow::Result;
use relgraph_schema::{BUILD_PROGRESS_TOTAL, NlpSchema, TracingProgress};
use std::fs;
use std::path::PathBuf;

use super::{Overrides, connect};

pub async fn run(overrides: &Overrides, out: Option<PathBuf>) -> Result<()> {
    let adapter = connect(overrides).await?;
    let progress = TracingProgress::new(BUILD_PROGRESS_TOTAL);
    let schema = NlpSchema::new(adapter)
        .create_executable(Some(&progress))
        .await?;

    let sdl = schema.sdl();
    match out {
        Some(path) => {
            fs::write(&path, sdl)?;
            tracing::info!(path = %path.display(), "wrote schema");
        }
        None => println!("{}", sdl),
    }
    Ok(())
}
