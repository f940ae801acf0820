//! Convert a file through a mapping profile

use anyhow::{Context, Result};
use std::path::Path;

use reshape_core::Config;
use reshape_core::format::extension_for;
use reshape_runtime::TransformationExecutor;

use crate::pipeline::{FileExecutor, convert_bytes, write_jsonl};

/// Run the convert command
pub async fn run(config_path: &str, input: &str, profile_name: &str, output: Option<&str>) -> Result<()> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    let profile = config
        .profile(profile_name)
        .context("Failed to load profile")?;
    let input = Path::new(input);

    let output_link = match output {
        Some(output) => {
            let bytes = tokio::fs::read(input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let hint = input.file_name().and_then(|n| n.to_str());

            let rows = convert_bytes(&config, &profile, &bytes, hint)?;
            write_jsonl(Path::new(output), &rows)?;
            tracing::info!(rows = rows.len(), "✓ Converted {}", input.display());
            output.to_string()
        }
        None => {
            let extension = extension_for(config.output_format(&profile)?);
            FileExecutor::new(config)?
                .transform_upload(profile_name, input, extension)
                .await?
        }
    };

    println!("{}", output_link);
    Ok(())
}
