//! Watched-source daemon
//!
//! A single loop wakes every scan period, asks the catalog which sources are
//! due and spawns one independent cycle per due source. The loop never waits
//! on a cycle; cycles for the same fetch URL are serialized by a keyed lock.
//!
//! One cycle:
//!
//! ```text
//! lock(url) → fetch → sha256 → compare fingerprint ─ equal ─▶ Unchanged
//!                                      │
//!                                  different
//!                                      ▼
//!         convert → append history → re-fetch → sha256 → store ─▶ Converted
//! ```

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use reshape_core::format::extension_for;
use reshape_core::{ConversionRecord, Settings, WatchedSource};

use crate::error::{Error, Result};
use crate::executor::{SourceCatalog, TransformationExecutor};
use crate::fetch::ContentFetcher;
use crate::fingerprint::{FingerprintStore, InMemoryFingerprintStore};
use crate::hashing::sha256_hex_reader;
use crate::jobs::{CycleOutcome, CycleReport};
use crate::locks::KeyedLocks;
use crate::shutdown::ShutdownSignal;

/// Periodic change detector for watched sources
#[derive(Clone)]
pub struct WatchDaemon {
    inner: Arc<Inner>,
    scan_period: Duration,
}

struct Inner {
    catalog: Arc<dyn SourceCatalog>,
    executor: Arc<dyn TransformationExecutor>,
    fingerprints: Arc<dyn FingerprintStore>,
    fetcher: ContentFetcher,
    locks: KeyedLocks,
}

impl WatchDaemon {
    /// Create a daemon with an in-memory fingerprint store
    pub fn new(
        settings: &Settings,
        catalog: Arc<dyn SourceCatalog>,
        executor: Arc<dyn TransformationExecutor>,
    ) -> Result<Self> {
        Self::with_fingerprint_store(
            settings,
            catalog,
            executor,
            Arc::new(InMemoryFingerprintStore::new()),
        )
    }

    /// Create a daemon that keeps fingerprints in `fingerprints`
    pub fn with_fingerprint_store(
        settings: &Settings,
        catalog: Arc<dyn SourceCatalog>,
        executor: Arc<dyn TransformationExecutor>,
        fingerprints: Arc<dyn FingerprintStore>,
    ) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(Inner {
                catalog,
                executor,
                fingerprints,
                fetcher: ContentFetcher::from_settings(settings)?,
                locks: KeyedLocks::new(),
            }),
            scan_period: Duration::from_secs(settings.scan_period_seconds.max(1)),
        })
    }

    /// Time between scans
    pub fn scan_period(&self) -> Duration {
        self.scan_period
    }

    /// Run until `shutdown` fires, then wait for in-flight cycles
    pub async fn run(&self, mut shutdown: ShutdownSignal) -> Result<()> {
        tracing::info!(period = ?self.scan_period, "starting watch daemon");

        let mut ticker = tokio::time::interval(self.scan_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.triggered() => break,
                _ = ticker.tick() => {
                    while let Some(joined) = tasks.try_join_next() {
                        report(joined);
                    }
                    self.scan(&mut tasks, &shutdown).await;
                }
            }
        }

        tracing::info!(in_flight = tasks.len(), "shutting down watch daemon");
        while let Some(joined) = tasks.join_next().await {
            report(joined);
        }
        tracing::info!("watch daemon stopped");
        Ok(())
    }

    /// Scan once and wait for every dispatched cycle
    pub async fn run_once(&self, shutdown: &ShutdownSignal) -> Vec<CycleReport> {
        let mut tasks = JoinSet::new();
        self.scan(&mut tasks, shutdown).await;

        let mut reports = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(cycle) => {
                    cycle.log();
                    reports.push(cycle);
                }
                Err(e) => tracing::error!(error = %e, "conversion cycle panicked"),
            }
        }
        reports
    }

    /// Dispatch a cycle for every due source; returns how many were spawned
    async fn scan(&self, tasks: &mut JoinSet<CycleReport>, shutdown: &ShutdownSignal) -> usize {
        let sources = match self.inner.catalog.watched_sources().await {
            Ok(sources) => sources,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "failed to list watched sources");
                return 0;
            }
        };
        if sources.is_empty() {
            return 0;
        }
        let history = match self.inner.catalog.conversion_history().await {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "failed to read conversion history");
                return 0;
            }
        };

        let now = Utc::now();
        let mut spawned = 0;
        for source in sources {
            if !source.is_due(&history, now) {
                continue;
            }
            tracing::debug!(url = %source.url, mapping = %source.mapping_template_id, "source due");

            let inner = Arc::clone(&self.inner);
            let shutdown = shutdown.clone();
            tasks.spawn(async move {
                let result = inner.run_cycle(&source, &shutdown).await;
                CycleReport { source, result }
            });
            spawned += 1;
        }
        spawned
    }

    /// Run one cycle for `source` in the current task
    pub async fn run_cycle(&self, source: &WatchedSource, shutdown: &ShutdownSignal) -> Result<CycleOutcome> {
        self.inner.run_cycle(source, shutdown).await
    }
}

fn report(joined: std::result::Result<CycleReport, tokio::task::JoinError>) {
    match joined {
        Ok(cycle) => cycle.log(),
        Err(e) => tracing::error!(error = %e, "conversion cycle panicked"),
    }
}

impl Inner {
    async fn run_cycle(&self, source: &WatchedSource, shutdown: &ShutdownSignal) -> Result<CycleOutcome> {
        let url = source.fetch_url();
        let mapping = source.mapping_template_id.as_str();

        let _guard = shutdown.cancellable(self.locks.lock(url)).await?;

        let content = self.fetcher.fetch(url, shutdown).await?;
        let sha256 = sha256_hex_reader(content.bytes.as_slice(), shutdown).await?;

        let previous = shutdown
            .cancellable(self.fingerprints.get(url, Some(mapping)))
            .await?;
        if previous.as_deref() == Some(sha256.as_str()) {
            return Ok(CycleOutcome::Unchanged);
        }
        tracing::debug!(url, mapping, sha256 = %sha256, previous = ?previous, "content changed");

        let format = shutdown
            .cancellable(self.catalog.output_format(mapping))
            .await?
            .map_err(Error::external("resolving output format"))?;

        let output_link = shutdown
            .cancellable(
                self.executor
                    .transform_from_url(mapping, url, extension_for(format)),
            )
            .await?
            .map_err(Error::external("conversion failed"))?;

        let record = ConversionRecord {
            converted_at: Utc::now(),
            input_ref: source.url.clone(),
            output_link: output_link.clone(),
            mapping_template_id: mapping.to_string(),
        };
        shutdown
            .cancellable(self.catalog.append_history(record))
            .await?
            .map_err(Error::external("recording history"))?;

        // The executor fetched on its own; fingerprint what is served now.
        let refreshed = self.fetcher.fetch(url, shutdown).await?;
        let sha256 = sha256_hex_reader(refreshed.bytes.as_slice(), shutdown).await?;

        shutdown
            .cancellable(self.fingerprints.set(url, Some(mapping), sha256.clone()))
            .await?;

        Ok(CycleOutcome::Converted {
            output_link,
            sha256,
        })
    }
}
