//! Print a template's flattened field paths

use anyhow::{Context, Result};
use reshape_core::Config;

/// Run the schema command
pub async fn run(config_path: &str, template_name: &str) -> Result<()> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    let template = config
        .template(template_name)
        .context("Failed to load template")?;

    tracing::debug!(template = %template.name, format = %template.format, "flattening template");
    for field in template.flat_fields() {
        println!("{}\t{}", field.path, field.kind);
    }
    Ok(())
}
