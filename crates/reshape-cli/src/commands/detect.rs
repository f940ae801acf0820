//! Detect the format of a file

use anyhow::{Context, Result};
use reshape_core::detect;

/// Run the detect command
pub async fn run(file: &str) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file))?;

    let format = detect(&bytes, Some(file));
    tracing::debug!(file, len = bytes.len(), %format, "detected format");
    println!("{}", format.extension());
    Ok(())
}
