//! Seams owned by the hosting application
//!
//! The daemon does not know how conversions are performed or where watched
//! sources and history are persisted. Hosts provide a
//! [`TransformationExecutor`] and a [`SourceCatalog`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use reshape_core::{ConversionRecord, Format, WatchedSource};

/// Runs a mapping template against an input and stores the output
#[async_trait]
pub trait TransformationExecutor: Send + Sync {
    /// Convert a local file; returns a link to the output
    async fn transform_upload(
        &self,
        mapping_template_id: &str,
        path: &Path,
        output_extension: &str,
    ) -> anyhow::Result<String>;

    /// Fetch and convert a remote resource; returns a link to the output
    async fn transform_from_url(
        &self,
        mapping_template_id: &str,
        url: &str,
        output_extension: &str,
    ) -> anyhow::Result<String>;
}

/// Watched sources, conversion history and template formats
#[async_trait]
pub trait SourceCatalog: Send + Sync {
    /// Snapshot of the watched sources
    async fn watched_sources(&self) -> anyhow::Result<Vec<WatchedSource>>;

    /// Snapshot of the conversion history
    async fn conversion_history(&self) -> anyhow::Result<Vec<ConversionRecord>>;

    /// Append one history record
    async fn append_history(&self, record: ConversionRecord) -> anyhow::Result<()>;

    /// Declared output format of a mapping template
    async fn output_format(&self, mapping_template_id: &str) -> anyhow::Result<Option<Format>>;
}

/// Catalog held entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    sources: RwLock<Vec<WatchedSource>>,
    history: RwLock<Vec<ConversionRecord>>,
    formats: RwLock<HashMap<String, Format>>,
}

impl InMemoryCatalog {
    /// Create a catalog watching `sources`
    pub fn new(sources: Vec<WatchedSource>) -> Self {
        Self {
            sources: RwLock::new(sources),
            ..Self::default()
        }
    }

    /// Declare the output format of a mapping template
    pub fn with_output_format(self, mapping_template_id: impl Into<String>, format: Format) -> Self {
        self.formats
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(mapping_template_id.into(), format);
        self
    }

    /// Start watching another source
    pub fn add_source(&self, source: WatchedSource) {
        self.sources
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(source);
    }

    /// Copy of the history recorded so far
    pub fn history(&self) -> Vec<ConversionRecord> {
        self.history
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl SourceCatalog for InMemoryCatalog {
    async fn watched_sources(&self) -> anyhow::Result<Vec<WatchedSource>> {
        Ok(self
            .sources
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    async fn conversion_history(&self) -> anyhow::Result<Vec<ConversionRecord>> {
        Ok(self.history())
    }

    async fn append_history(&self, record: ConversionRecord) -> anyhow::Result<()> {
        self.history
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
        Ok(())
    }

    async fn output_format(&self, mapping_template_id: &str) -> anyhow::Result<Option<Format>> {
        Ok(self
            .formats
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(mapping_template_id)
            .copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_in_memory_catalog() {
        let catalog = InMemoryCatalog::new(vec![WatchedSource::new("http://x/a.csv", 5, "people")])
            .with_output_format("people", Format::Json);
        catalog.add_source(WatchedSource::new("http://x/b.csv", 5, "orders"));

        assert_eq!(catalog.watched_sources().await.unwrap().len(), 2);
        assert_eq!(catalog.output_format("people").await.unwrap(), Some(Format::Json));
        assert_eq!(catalog.output_format("orders").await.unwrap(), None);

        catalog
            .append_history(ConversionRecord {
                converted_at: Utc::now(),
                input_ref: "http://x/a.csv".to_string(),
                output_link: "out/1.jsonl".to_string(),
                mapping_template_id: "people".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(catalog.conversion_history().await.unwrap().len(), 1);
    }
}
