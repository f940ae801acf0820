//! Run the watched-source daemon

use anyhow::{Context, Result};
use std::sync::Arc;

use reshape_core::Config;
use reshape_runtime::{InMemoryCatalog, WatchDaemon, shutdown};

use crate::pipeline::FileExecutor;

/// Run the watch command
pub async fn run(config_path: &str, once: bool) -> Result<()> {
    tracing::info!("Loading configuration from {}", config_path);

    let config = Config::load(config_path).context("Failed to load configuration")?;

    tracing::info!("Project: {}", config.project.name);

    let mut catalog = InMemoryCatalog::new(config.project.watch.clone());
    for profile in config.load_profiles().context("Failed to load profiles")? {
        if let Some(format) = config.output_format(&profile)? {
            catalog = catalog.with_output_format(profile.name, format);
        }
    }

    if config.project.watch.is_empty() {
        tracing::warn!("No watched sources configured");
    }

    let (trigger, signal) = shutdown::channel();
    let executor = Arc::new(FileExecutor::new(config.clone())?.with_shutdown(signal.clone()));
    let daemon = WatchDaemon::new(config.settings(), Arc::new(catalog), executor)?;

    if once {
        let reports = daemon.run_once(&signal).await;
        let converted = reports
            .iter()
            .filter(|r| matches!(&r.result, Ok(outcome) if outcome.is_converted()))
            .count();
        let failed = reports.iter().filter(|r| r.result.is_err()).count();

        tracing::info!(
            "Scanned {} source(s): {} converted, {} failed",
            config.project.watch.len(),
            converted,
            failed
        );
        if failed > 0 {
            anyhow::bail!("{} watched source(s) failed to convert", failed);
        }
        return Ok(());
    }

    tracing::info!("Watching {} source(s) (press Ctrl+C to stop)", config.project.watch.len());

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received shutdown signal");
                trigger.trigger();
            }
            Err(e) => tracing::error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    daemon.run(signal).await.context("Watch daemon error")?;

    tracing::info!("Reshape stopped");
    Ok(())
}
