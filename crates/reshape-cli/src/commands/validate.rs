//! Validate configuration command

use anyhow::{Context, Result};
use std::collections::HashMap;

use reshape_core::Config;

/// Run the validate command
pub async fn run(config_path: &str) -> Result<()> {
    tracing::info!("Validating configuration: {}", config_path);

    let config = Config::load(config_path).context("Failed to load configuration")?;

    tracing::info!("✓ Project: {}", config.project.name);
    tracing::info!("✓ Version: {}", config.project.version);

    let templates: HashMap<_, _> = config
        .load_templates()
        .context("Failed to load templates")?
        .into_iter()
        .map(|t| (t.name.clone(), t))
        .collect();
    tracing::info!("✓ Templates: {}", templates.len());

    let profiles = config.load_profiles().context("Failed to load profiles")?;

    let mut problems = Vec::new();
    for profile in &profiles {
        if let Some(source) = &profile.source_template
            && !templates.contains_key(source)
        {
            problems.push(format!(
                "profile '{}': source template '{}' not found",
                profile.name, source
            ));
        }
        if let Some(target) = &profile.target_template {
            match templates.get(target) {
                Some(template) => {
                    if let Err(e) = profile.validate_targets(&template.flat_fields()) {
                        problems.push(e.to_string());
                    }
                }
                None => problems.push(format!(
                    "profile '{}': target template '{}' not found",
                    profile.name, target
                )),
            }
        }
    }
    tracing::info!("✓ Profiles: {}", profiles.len());

    for source in &config.project.watch {
        if !profiles.iter().any(|p| p.name == source.mapping_template_id) {
            problems.push(format!(
                "watched source '{}': profile '{}' not found",
                source.url, source.mapping_template_id
            ));
        }
    }
    tracing::info!("✓ Watched sources: {}", config.project.watch.len());

    if !problems.is_empty() {
        for problem in &problems {
            tracing::error!("✗ {}", problem);
        }
        anyhow::bail!("Configuration has {} problem(s)", problems.len());
    }

    tracing::info!("✓ Configuration is valid");
    Ok(())
}
